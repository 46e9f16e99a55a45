//! 🚰 Sinks — where spooled records go after the produce call hands them over.
//!
//! The spooler never calls a sink. The runner does: produce a batch, push it into the sink,
//! and only then persist the cursor. A sink that loses a batch after `receive` returned
//! is a sink that lies, so the file sink flushes on `close` and the runner always closes.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (`StdoutSink`, `FileSink`, `InMemorySink`) → `SinkBackend` enum
//! - Every record goes out as one NDJSON line (`Record` is `Serialize`).
//! - Config is externally tagged: `sink = "Stdout"`, `[sink.File]`, `sink = "InMemory"`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{self, AsyncWriteExt};
use tracing::trace;

use crate::common::{Record, RecordBatch};

mod file_sink;
mod in_mem_sink;

pub use file_sink::{FileSink, FileSinkConfig};
pub use in_mem_sink::InMemorySink;

/// 🕳️ Somewhere for a batch to land.
///
/// # Contract 📜
/// - `receive` writes the whole batch or returns an error. No partial success is reported.
/// - `close` flushes and releases. MUST be called, even after a failed run.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    async fn receive(&mut self, batch: RecordBatch) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

/// 🔧 Which sink to build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub enum SinkConfig {
    #[default]
    Stdout,
    File(FileSinkConfig),
    InMemory,
}

/// 📜 One record as one NDJSON line, newline included.
pub(crate) fn render_line(record: &Record) -> Result<String> {
    let mut the_line = serde_json::to_string(record)
        .with_context(|| format!("💀 could not serialize the record at {}::{}", record.key, record.offset))?;
    the_line.push('\n');
    Ok(the_line)
}

/// 📺 Writes NDJSON to stdout. Logs go to stderr, so the two never interleave.
#[derive(Debug)]
pub struct StdoutSink {
    out: io::BufWriter<io::Stdout>,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self {
            out: io::BufWriter::new(io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn receive(&mut self, batch: RecordBatch) -> Result<()> {
        trace!("📺 {} records headed for stdout", batch.len());
        for the_record in batch.iter() {
            self.out.write_all(render_line(the_record)?.as_bytes()).await?;
        }
        // -- a downstream pipe should see each batch as soon as it is acknowledged
        self.out.flush().await.context("💀 stdout refused the flush. Is the pipe closed?")
    }

    async fn close(&mut self) -> Result<()> {
        self.out.flush().await.context("💀 stdout refused the final flush")
    }
}

/// 🎭 The many faces of a sink. Dispatches via match.
#[derive(Debug)]
pub enum SinkBackend {
    Stdout(StdoutSink),
    File(FileSink),
    InMemory(InMemorySink),
}

impl SinkBackend {
    pub async fn from_config(config: &SinkConfig) -> Result<Self> {
        match config {
            SinkConfig::Stdout => Ok(Self::Stdout(StdoutSink::new())),
            SinkConfig::File(file_config) => Ok(Self::File(FileSink::new(file_config.clone()).await?)),
            SinkConfig::InMemory => Ok(Self::InMemory(InMemorySink::new())),
        }
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn receive(&mut self, batch: RecordBatch) -> Result<()> {
        match self {
            Self::Stdout(sink) => sink.receive(batch).await,
            Self::File(sink) => sink.receive(batch).await,
            Self::InMemory(sink) => sink.receive(batch).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            Self::Stdout(sink) => sink.close().await,
            Self::File(sink) => sink.close().await,
            Self::InMemory(sink) => sink.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_each_record_is_exactly_one_line() {
        let the_line = render_line(&Record::new("file1.log", 0, "Hello World")).unwrap();
        assert_eq!(the_line, "{\"key\":\"file1.log\",\"offset\":0,\"body\":\"Hello World\"}\n");
        let the_tricky = render_line(&Record::new("k", 0, "multi\nline")).unwrap();
        assert_eq!(the_tricky.matches('\n').count(), 1);
    }

    #[tokio::test]
    async fn the_one_where_the_backend_builds_from_config() {
        let mut the_sink = SinkBackend::from_config(&SinkConfig::InMemory).await.unwrap();
        assert!(matches!(the_sink, SinkBackend::InMemory(_)));
        the_sink.receive(RecordBatch::new(vec![Record::new("k", 0, "x")])).await.unwrap();
        the_sink.close().await.unwrap();
    }
}
