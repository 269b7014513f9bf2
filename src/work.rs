//! Input and output records for batch processing.
//!
//! Every input record carries an `id`, which is copied to the matching output
//! record. Output records also carry a [`WorkStatus`] and a list of non-fatal
//! error messages, so that one bad document never aborts a whole batch.

use std::sync::{Arc, Mutex};

use futures::StreamExt as _;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::{
    async_utils::{
        BoxedStream,
        io::{RecordStream, read_jsonl_or_csv, write_output},
    },
    cmd::StreamOpts,
    prelude::*,
    ui::Ui,
};

/// Input record wrapping some data `T`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WorkInput<T>
where
    T: 'static,
{
    /// The unique ID of the work item.
    pub id: Value,

    /// The input data for the work item.
    #[serde(flatten)]
    pub data: T,
}

/// A stream of input records, plus the record count if known.
pub struct WorkInputStream<T>
where
    T: 'static,
{
    pub stream: BoxedStream<Result<WorkInput<T>>>,
    pub len: Option<usize>,
}

impl<T> WorkInput<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Convert from a JSON value to the input type.
    pub fn from_json(value: Value) -> Result<Self> {
        serde_json::from_value::<Self>(value).context("failed to deserialize input record")
    }

    /// Read a stream from a [`Path`] or from standard input.
    pub async fn read_stream(ui: &Ui, path: Option<&Path>) -> Result<WorkInputStream<T>> {
        let RecordStream { stream, len } = read_jsonl_or_csv(ui, path).await?;
        Ok(WorkInputStream {
            stream: stream.map(|value| Self::from_json(value?)).boxed(),
            len,
        })
    }
}

/// Output status of a work item.
#[derive(Clone, Copy, Debug, JsonSchema, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    // Every page was mapped. There may still be non-fatal errors.
    Ok,

    // The document could not be processed at all.
    Failed,
}

/// Output record wrapping some data `T`.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct WorkOutput<T>
where
    T: 'static,
{
    /// The unique ID of the work item.
    pub id: Value,

    /// What is the status of this work item?
    pub status: WorkStatus,

    /// Any errors or warnings that occurred during processing.
    pub errors: Vec<String>,

    /// The output data for the work item.
    #[serde(flatten)]
    pub data: T,
}

impl<T> WorkOutput<T>
where
    T: Serialize + Send + 'static,
{
    /// Create a new failed output record.
    pub fn new_failed(id: Value, errors: Vec<String>, data: T) -> Self {
        Self {
            id,
            status: WorkStatus::Failed,
            errors,
            data,
        }
    }

    /// Convert from the output type to a JSON value.
    pub fn to_json(&self) -> Result<Value> {
        serde_json::to_value(self).context("failed to serialize output")
    }

    /// Write a stream of outputs to a [`Path`] or to standard output.
    pub async fn write_stream(
        ui: &Ui,
        path: Option<&Path>,
        stream: BoxedStream<Result<Self>>,
        stream_opts: &StreamOpts,
    ) -> Result<()> {
        let (stream, counters) = WorkOutputCounters::wrap_stream(stream);
        let output = stream.map(|value| value?.to_json()).boxed();
        write_output(path, output).await?;
        counters.finish(ui, stream_opts)
    }
}

/// Counters associated with a stream of work items.
#[derive(Clone, Debug, Default)]
pub struct WorkOutputCounters {
    /// How many records did we process?
    pub total_record_count: usize,

    /// How many records did we fail to process?
    pub failure_count: usize,

    /// How many non-fatal errors did we encounter?
    pub non_fatal_error_count: usize,
}

impl WorkOutputCounters {
    /// Wrap a stream with counters.
    pub fn wrap_stream<T>(
        stream: BoxedStream<Result<WorkOutput<T>>>,
    ) -> (
        BoxedStream<Result<WorkOutput<T>>>,
        Arc<Mutex<WorkOutputCounters>>,
    )
    where
        T: Send + 'static,
    {
        let counters = Arc::new(Mutex::new(Self::default()));
        let counters_clone = counters.clone();
        let stream = stream
            .map(move |value| {
                let value = value?;
                counters_clone.update(&value);
                Ok(value)
            })
            .boxed();
        (stream, counters)
    }
}

/// We actually want to put methods in `Mutex<WorkOutputCounters>`, because
/// that's the type we actually work with. To do that, we need to define an
/// extension trait with the methods we want.
pub trait WorkItemCounterExt {
    /// Update counters for a work item.
    fn update<T>(&self, item: &WorkOutput<T>);

    /// Display counter values to the user, and fail if too many records
    /// failed.
    fn finish(self: Arc<Self>, ui: &Ui, stream_opts: &StreamOpts) -> Result<()>;
}

impl WorkItemCounterExt for Mutex<WorkOutputCounters> {
    fn update<T>(&self, item: &WorkOutput<T>) {
        // Hold a sync lock, but just for an instant to update counters.
        let mut counters = self.lock().expect("lock poisoned");
        counters.total_record_count += 1;
        if item.status != WorkStatus::Ok {
            counters.failure_count += 1;
        } else {
            counters.non_fatal_error_count += item.errors.len();
        }
    }

    fn finish(self: Arc<Self>, ui: &Ui, stream_opts: &StreamOpts) -> Result<()> {
        let counters = self.lock().expect("lock poisoned").to_owned();
        let failure_rate = if counters.total_record_count == 0 {
            0.0
        } else {
            counters.failure_count as f32 / counters.total_record_count as f32
        };
        if failure_rate > stream_opts.allowed_failure_rate {
            return Err(anyhow!(
                "{}/{} ({:.2}%) of outputs were failures, but only {:.2}% were allowed",
                counters.failure_count,
                counters.total_record_count,
                failure_rate * 100.0,
                stream_opts.allowed_failure_rate * 100.0
            ));
        }
        if counters.non_fatal_error_count > 0 {
            ui.display_message(
                "⚠️",
                &format!(
                    "{} non-fatal errors encountered",
                    counters.non_fatal_error_count
                ),
            );
        }
        if counters.failure_count > 0 {
            ui.display_message(
                "❌",
                &format!("{} records could not be processed", counters.failure_count),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt as _;

    use super::*;

    fn output(status: WorkStatus, errors: &[&str]) -> WorkOutput<()> {
        WorkOutput {
            id: Value::from(1),
            status,
            errors: errors.iter().map(|&e| e.to_owned()).collect(),
            data: (),
        }
    }

    fn stream_opts(allowed_failure_rate: f32) -> StreamOpts {
        StreamOpts {
            take_first: None,
            job_count: Some(1),
            allowed_failure_rate,
        }
    }

    #[tokio::test]
    async fn counters_track_failures_and_warnings() -> Result<()> {
        let outputs = vec![
            Ok(output(WorkStatus::Ok, &["page 2: no text detected"])),
            Ok(output(WorkStatus::Failed, &["bad file"])),
            Ok(output(WorkStatus::Ok, &[])),
            Ok(output(WorkStatus::Ok, &[])),
        ];
        let (stream, counters) =
            WorkOutputCounters::wrap_stream(futures::stream::iter(outputs).boxed());
        let collected = stream.try_collect::<Vec<_>>().await?;
        assert_eq!(collected.len(), 4);
        {
            let counters = counters.lock().expect("lock poisoned");
            assert_eq!(counters.total_record_count, 4);
            assert_eq!(counters.failure_count, 1);
            assert_eq!(counters.non_fatal_error_count, 1);
        }

        let ui = Ui::init_for_tests();
        assert!(counters.clone().finish(&ui, &stream_opts(0.25)).is_ok());
        assert!(counters.finish(&ui, &stream_opts(0.1)).is_err());
        Ok(())
    }

    #[test]
    fn output_flattens_data() {
        #[derive(Serialize)]
        struct Data {
            path: &'static str,
        }
        let record = WorkOutput {
            id: Value::from("doc-1"),
            status: WorkStatus::Failed,
            errors: vec!["oops".to_owned()],
            data: Data { path: "a.json" },
        };
        let json = record.to_json().unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "doc-1",
                "status": "failed",
                "errors": ["oops"],
                "path": "a.json",
            })
        );
    }
}
