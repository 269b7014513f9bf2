//! The `map` subcommand.

use std::sync::{Arc, Mutex};

use clap::Args;
use futures::StreamExt as _;

use crate::{
    async_utils::{BoxedStream, io::write_text},
    cmd::StreamOpts,
    config::Config,
    documents::{DocumentInput, DocumentOutput, map_documents},
    prelude::*,
    summary::Summary,
    ui::{ProgressConfig, Ui},
    work::{WorkInput, WorkOutput},
};

/// Map OCR detections to named fields.
#[derive(Debug, Args)]
pub struct MapOpts {
    /// Input file, JSONL or CSV, with `id` and `path` fields. Defaults to
    /// standard input.
    pub input_path: Option<PathBuf>,

    /// Mapping configuration (TOML or JSON).
    #[clap(short = 'c', long = "config", value_name = "CONFIG")]
    pub config_path: PathBuf,

    /// Output file, JSONL. Defaults to standard output.
    #[clap(short = 'o', long = "out")]
    pub output_path: Option<PathBuf>,

    /// Also write a plain-text summary to this file.
    #[clap(long = "summary", value_name = "PATH")]
    pub summary_path: Option<PathBuf>,

    /// Drop boxes below this confidence. Overrides the config file.
    #[clap(long = "confidence")]
    pub min_confidence: Option<f64>,

    #[clap(flatten)]
    pub stream_opts: StreamOpts,
}

/// The `map` subcommand.
#[instrument(level = "debug", skip_all)]
pub async fn cmd_map(ui: Ui, opts: &MapOpts) -> Result<()> {
    // Configuration problems are fatal, and we want to find them before we
    // touch any input.
    let config = Config::load(&opts.config_path).await?;
    let pipeline = config
        .to_pipeline(opts.min_confidence)
        .with_context(|| format!("invalid configuration in {:?}", opts.config_path))?;
    info!(
        mode = pipeline.policy.mode().as_str(),
        min_confidence = pipeline.min_confidence,
        line_tolerance = pipeline.line_tolerance,
        "Mapping documents"
    );
    // Only keep records around if we've been asked for a summary.
    let summary = opts
        .summary_path
        .as_ref()
        .map(|_| Arc::new(Mutex::new(Summary::new(pipeline.policy.clone()))));
    let pipeline = Arc::new(pipeline);

    // Open up our input stream and parse into records.
    let stream_opts = &opts.stream_opts;
    let input =
        WorkInput::<DocumentInput>::read_stream(&ui, opts.input_path.as_deref()).await?;
    let len = stream_opts.apply_len_opts(input.len);
    let stream = stream_opts.apply_stream_input_opts(input.stream);

    // Configure our progress bar.
    let pb = ui.new_from_len(
        &ProgressConfig {
            emoji: "🗂️",
            msg: "Mapping documents",
            done_msg: "Mapped documents",
        },
        len,
    );

    let job_count = stream_opts.job_count();
    let output = pb
        .wrap_stream(map_documents(stream, pipeline).buffered(job_count))
        .boxed();
    let output = record_summary(output, summary.clone());

    // The summary is written even if too many documents failed.
    let result = WorkOutput::<DocumentOutput>::write_stream(
        &ui,
        opts.output_path.as_deref(),
        output,
        stream_opts,
    )
    .await;

    if let (Some(summary_path), Some(summary)) = (&opts.summary_path, summary) {
        let text = summary.lock().expect("lock poisoned").to_string();
        write_text(summary_path, &text).await?;
        ui.display_message(
            "📝",
            &format!("Wrote summary to {}", summary_path.display()),
        );
    }
    result
}

/// Record each output in `summary` as it streams past, if we have one.
fn record_summary(
    output: BoxedStream<Result<WorkOutput<DocumentOutput>>>,
    summary: Option<Arc<Mutex<Summary>>>,
) -> BoxedStream<Result<WorkOutput<DocumentOutput>>> {
    let Some(summary) = summary else {
        return output;
    };
    output
        .map(move |output| -> Result<_> {
            let output = output?;
            summary.lock().expect("lock poisoned").record(&output);
            Ok(output)
        })
        .boxed()
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt as _;

    use super::*;
    use crate::mapping::MappingPolicy;

    fn outputs() -> BoxedStream<Result<WorkOutput<DocumentOutput>>> {
        let records = (0..3)
            .map(|id| {
                Ok(WorkOutput::new_failed(
                    Value::from(id),
                    vec![],
                    DocumentOutput {
                        path: format!("{id}.json").into(),
                        pages: vec![],
                    },
                ))
            })
            .collect::<Vec<Result<_>>>();
        futures::stream::iter(records).boxed()
    }

    #[tokio::test]
    async fn summary_records_every_output() -> Result<()> {
        let summary = Arc::new(Mutex::new(Summary::new(MappingPolicy::Sequential {
            field_names: vec![],
        })));
        let passed = record_summary(outputs(), Some(summary.clone()))
            .try_collect::<Vec<_>>()
            .await?;
        assert_eq!(passed.len(), 3);
        assert_eq!(summary.lock().expect("lock poisoned").document_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn outputs_pass_through_without_summary() -> Result<()> {
        let passed = record_summary(outputs(), None)
            .try_collect::<Vec<_>>()
            .await?;
        let ids = passed.iter().map(|o| o.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids, [Value::from(0), Value::from(1), Value::from(2)]);
        Ok(())
    }
}
