//! I/O utilities.
//!
//! This module reads configuration and detections files (JSON or TOML), input
//! record streams (JSONL or CSV), and writes JSONL output and plain text.
//! Formats are detected from the file extension, or from the first byte when
//! reading standard input.

use std::{pin::Pin, sync::Arc, task::Context};

use futures::{TryStreamExt as _, pin_mut, stream::StreamExt as _};
use peekable::tokio::AsyncPeekable;
use serde_json::Map;
use tokio::{
    fs::File,
    io::{
        AsyncBufRead, AsyncBufReadExt as _, AsyncRead, AsyncReadExt as _, AsyncWrite,
        AsyncWriteExt as _, BufReader, BufWriter, ReadBuf,
    },
};
use tokio_stream::wrappers::LinesStream;

use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

use super::BoxedStream;

/// An async reader that knows whether its input looks like JSON.
pub struct SmartReader {
    /// Is our input JSON or JSONL (as opposed to TOML or CSV)?
    is_json_like: bool,

    /// A human-readable description of the input source, for error messages.
    description: String,

    /// Our underlying reader, pinned so async reads can hold pointers into it.
    reader: Pin<Box<dyn AsyncBufRead + Unpin + Send + Sync + 'static>>,
}

impl SmartReader {
    /// Create a new `SmartReader` from an existing reader, sniffing the first
    /// byte to decide whether it holds JSON.
    pub async fn new_from_reader(
        description: String,
        reader: impl AsyncRead + Unpin + Send + Sync + 'static,
    ) -> Result<Self> {
        let mut peekable = AsyncPeekable::new(Box::new(BufReader::new(reader)));
        let mut first = vec![0; 1];
        peekable
            .peek_exact(&mut first)
            .await
            .with_context(|| format!("failed to read from {}", description))?;
        Ok(Self {
            is_json_like: matches!(first[0], b'{' | b'['),
            description,
            reader: Box::pin(BufReader::new(peekable)),
        })
    }

    /// Create a new `SmartReader` from a [`Path`], using the extension to
    /// pick a format.
    pub async fn new_from_path(path: &Path) -> Result<Self> {
        let ext = path.extension().unwrap_or_default();
        let is_json_like = ext == "json" || ext == "jsonl";
        let file = File::open(path)
            .await
            .with_context(|| format!("failed to open {:?}", path))?;
        Ok(Self {
            is_json_like,
            description: path.to_string_lossy().into_owned(),
            reader: Box::pin(BufReader::new(file)),
        })
    }

    /// Create a new `SmartReader` from either a [`Path`] or standard input.
    pub async fn new_from_path_or_stdin(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::new_from_path(path).await,
            None => Self::new_from_reader("stdin".to_owned(), tokio::io::stdin()).await,
        }
    }

    /// Is our input JSON-like?
    pub fn is_json_like(&self) -> bool {
        self.is_json_like
    }
}

impl AsyncRead for SmartReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        Pin::get_mut(self).reader.as_mut().poll_read(cx, buf)
    }
}

impl AsyncBufRead for SmartReader {
    fn poll_fill_buf(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> std::task::Poll<std::io::Result<&[u8]>> {
        Pin::get_mut(self).reader.as_mut().poll_fill_buf(cx)
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        Pin::get_mut(self).reader.as_mut().consume(amt)
    }
}

/// Read TOML or JSON from a file.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut reader = SmartReader::new_from_path(path).await?;
    let mut data = String::new();
    // Read all at once because our parsing libraries don't do async I/O.
    reader
        .read_to_string(&mut data)
        .await
        .with_context(|| format!("failed to read {:?}", path))?;
    if reader.is_json_like() {
        serde_json::from_str(&data)
            .with_context(|| format!("failed to parse JSON from {:?}", path))
    } else {
        toml::from_str(&data)
            .with_context(|| format!("failed to parse TOML from {:?}", path))
    }
}

/// A stream of [`serde_json::Value`] values.
pub type JsonStream = BoxedStream<Result<Value>>;

/// A stream of input records, plus the record count if we know it.
pub struct RecordStream {
    pub stream: JsonStream,
    pub len: Option<usize>,
}

/// Count JSONL or CSV records in a file, so we can show a real progress bar.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
async fn count_jsonl_or_csv_records(ui: &Ui, path: &Path) -> Result<Option<usize>> {
    // Named pipes and the like can only be read once.
    if !path.is_file() {
        return Ok(None);
    }

    let spinner = ui.new_spinner(&ProgressConfig {
        emoji: "🧮",
        msg: "Counting input records",
        done_msg: "Counted input records",
    });
    let reader = SmartReader::new_from_path(path).await?;
    let count = if reader.is_json_like() {
        LinesStream::new(reader.lines())
            .try_fold(0, |acc, line| async move {
                Ok(if line.trim().is_empty() { acc } else { acc + 1 })
            })
            .await?
    } else {
        csv_async::AsyncReaderBuilder::new()
            .create_reader(reader)
            .into_byte_records()
            .try_fold(0, |acc, _record| async move { Ok(acc + 1) })
            .await?
    };
    spinner.finish_with_message(format!("Found {count} records"));
    Ok(Some(count))
}

/// Read JSONL or CSV records from a file or stdin.
///
/// CSV rows become JSON objects keyed by the header row, with string values.
pub async fn read_jsonl_or_csv(ui: &Ui, path: Option<&Path>) -> Result<RecordStream> {
    let len = match path {
        Some(path) => count_jsonl_or_csv_records(ui, path).await?,
        None => None,
    };

    let reader = SmartReader::new_from_path_or_stdin(path).await?;
    let description = Arc::new(reader.description.clone());
    let stream: JsonStream = if reader.is_json_like() {
        LinesStream::new(reader.lines())
            .try_filter(|line| futures::future::ready(!line.trim().is_empty()))
            .map(move |line| {
                let line = line
                    .with_context(|| format!("failed to read line from {}", description))?;
                serde_json::from_str::<Value>(&line).with_context(|| {
                    format!("failed to parse JSON from {}: {:?}", description, line)
                })
            })
            .boxed()
    } else {
        let mut reader = csv_async::AsyncReaderBuilder::new().create_reader(reader);
        let headers = Arc::new(
            reader
                .headers()
                .await
                .with_context(|| format!("failed to read CSV headers from {}", description))?
                .to_owned(),
        );
        reader
            .into_records()
            .map(move |record| {
                let record = record.with_context(|| {
                    format!("failed to read CSV record from {}", description)
                })?;
                let map = headers
                    .iter()
                    .zip(record.iter())
                    .map(|(header, value)| {
                        (header.to_owned(), Value::String(value.to_owned()))
                    })
                    .collect::<Map<String, Value>>();
                Ok(Value::Object(map))
            })
            .boxed()
    };
    Ok(RecordStream { stream, len })
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("failed to create {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a stream of JSON values, one per line, to a file or stdout.
pub async fn write_output(path: Option<&Path>, stream: JsonStream) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    pin_mut!(stream);
    while let Some(value) = stream.next().await {
        let json = serde_json::to_string(&value?).context("failed to serialize output")?;
        writer
            .write_all(json.as_bytes())
            .await
            .context("failed to write output")?;
        writer
            .write_all(b"\n")
            .await
            .context("failed to write output")?;
    }
    writer.flush().await.context("failed to flush output")?;
    Ok(())
}

/// Write a string to a file.
pub async fn write_text(path: &Path, text: &str) -> Result<()> {
    let mut writer = create_writer(Some(path)).await?;
    writer
        .write_all(text.as_bytes())
        .await
        .with_context(|| format!("failed to write {:?}", path))?;
    writer
        .flush()
        .await
        .with_context(|| format!("failed to flush {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt as _;

    use super::*;

    #[tokio::test]
    async fn reads_jsonl_records_skipping_blank_lines() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("input.jsonl");
        tokio::fs::write(&path, "{\"id\": 1}\n\n{\"id\": 2}\n").await?;

        let ui = Ui::init_for_tests();
        let RecordStream { stream, len } = read_jsonl_or_csv(&ui, Some(&path)).await?;
        let values = stream.try_collect::<Vec<_>>().await?;
        assert_eq!(len, Some(2));
        assert_eq!(values, [serde_json::json!({"id": 1}), serde_json::json!({"id": 2})]);
        Ok(())
    }

    #[tokio::test]
    async fn reads_csv_records_as_string_objects() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("input.csv");
        tokio::fs::write(&path, "id,path\na,one.json\nb,two.json\n").await?;

        let ui = Ui::init_for_tests();
        let RecordStream { stream, len } = read_jsonl_or_csv(&ui, Some(&path)).await?;
        let values = stream.try_collect::<Vec<_>>().await?;
        assert_eq!(len, Some(2));
        assert_eq!(values[1], serde_json::json!({"id": "b", "path": "two.json"}));
        Ok(())
    }

    #[tokio::test]
    async fn reads_toml_and_json_by_extension() -> Result<()> {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Sample {
            name: String,
        }

        let dir = tempfile::TempDir::new()?;
        let toml_path = dir.path().join("sample.toml");
        tokio::fs::write(&toml_path, "name = \"toml\"\n").await?;
        let json_path = dir.path().join("sample.json");
        tokio::fs::write(&json_path, "{\"name\": \"json\"}").await?;

        let from_toml = read_json_or_toml::<Sample>(&toml_path).await?;
        let from_json = read_json_or_toml::<Sample>(&json_path).await?;
        assert_eq!(from_toml.name, "toml");
        assert_eq!(from_json.name, "json");
        Ok(())
    }
}
