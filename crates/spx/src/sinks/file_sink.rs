//! 📂 The file sink. Previously, on "Things That Could Go Wrong With A File"...
//!
//! The disk was full. The directory did not exist. The process got killed between
//! a write and a flush. Every one of those is survivable, because the runner only saves
//! the cursor after `receive` returns, and a replayed batch is better than a lost one.
//!
//! 🦆 (mandatory, no notes)

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{self, AsyncWriteExt};
use tracing::trace;

use crate::common::RecordBatch;
use crate::sinks::{Sink, render_line};

/// 🚰 `[sink.File]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileSinkConfig {
    pub file_name: PathBuf,
    /// ➕ Append instead of truncating. A resumed run wants this on.
    #[serde(default)]
    pub append: bool,
}

impl From<&str> for FileSinkConfig {
    fn from(file_name: &str) -> Self {
        Self {
            file_name: file_name.into(),
            append: false,
        }
    }
}

/// 🚰 NDJSON into a file through a `BufWriter`. Flushes after every batch and on close.
#[derive(Debug)]
pub struct FileSink {
    file_buf: io::BufWriter<File>,
    config: FileSinkConfig,
}

impl FileSink {
    pub async fn new(config: FileSinkConfig) -> Result<Self> {
        let the_handle = if config.append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.file_name)
                .await
        } else {
            File::create(&config.file_name).await
        }
        .with_context(|| {
            format!(
                "💀 The sink file '{}' could not be conjured into existence. \
                 We stared at the path. The path stared back. Does the parent directory exist?",
                config.file_name.display()
            )
        })?;

        Ok(Self {
            file_buf: io::BufWriter::new(the_handle),
            config,
        })
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn receive(&mut self, batch: RecordBatch) -> Result<()> {
        trace!("📬 {} records walked into {}", batch.len(), self.config.file_name.display());
        for the_record in batch.iter() {
            self.file_buf.write_all(render_line(the_record)?.as_bytes()).await?;
        }
        // -- the cursor gets saved right after this returns, so the bytes must be out of our buffer
        self.file_buf.flush().await.with_context(|| {
            format!("💀 flushing a batch into '{}' failed", self.config.file_name.display())
        })
    }

    async fn close(&mut self) -> Result<()> {
        trace!("🎬 final flush for {}", self.config.file_name.display());
        self.file_buf.flush().await.context(
            "💀 Error flushing the sink file. The bytes are still in memory. The disk remains unwritten.",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Record;

    #[tokio::test]
    async fn the_one_where_batches_land_as_ndjson_lines() {
        let the_dir = tempfile::tempdir().unwrap();
        let the_path = the_dir.path().join("out.ndjson");
        let mut the_sink = FileSink::new(FileSinkConfig::from(the_path.to_str().unwrap()))
            .await
            .unwrap();

        the_sink
            .receive(RecordBatch::new(vec![
                Record::new("file1.log", 0, "Hello World"),
                Record::new("file1.log", 12, "again"),
            ]))
            .await
            .unwrap();
        the_sink.close().await.unwrap();

        let the_contents = std::fs::read_to_string(&the_path).unwrap();
        let the_lines: Vec<&str> = the_contents.lines().collect();
        assert_eq!(the_lines.len(), 2);
        let the_second: serde_json::Value = serde_json::from_str(the_lines[1]).unwrap();
        assert_eq!(the_second["offset"], 12);
        assert_eq!(the_second["body"], "again");
    }

    #[tokio::test]
    async fn the_one_where_append_keeps_what_was_there() {
        let the_dir = tempfile::tempdir().unwrap();
        let the_path = the_dir.path().join("out.ndjson");
        std::fs::write(&the_path, "{\"earlier\":true}\n").unwrap();

        let mut the_sink = FileSink::new(FileSinkConfig {
            file_name: the_path.clone(),
            append: true,
        })
        .await
        .unwrap();
        the_sink
            .receive(RecordBatch::new(vec![Record::new("k", 0, "later")]))
            .await
            .unwrap();
        the_sink.close().await.unwrap();

        let the_contents = std::fs::read_to_string(&the_path).unwrap();
        assert_eq!(the_contents.lines().count(), 2);
        assert!(the_contents.starts_with("{\"earlier\":true}"));
    }

    #[tokio::test]
    async fn the_one_where_a_missing_directory_is_reported() {
        let the_dir = tempfile::tempdir().unwrap();
        let the_path = the_dir.path().join("nope").join("out.ndjson");
        let the_error = FileSink::new(FileSinkConfig {
            file_name: the_path,
            append: false,
        })
        .await
        .unwrap_err();
        assert!(the_error.to_string().contains("could not be conjured"));
    }
}
