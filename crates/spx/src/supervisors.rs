//! 🎬 *[camera pans across a bucket full of logs]*
//! 🎬 "In a world where objects keep arriving..."
//! 🎬 "One supervisor dared to read them all. In order. Exactly once."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor is the calling runtime the spooler was built for. It owns the loop:
//!
//! ```text
//! load cursor → produce → sink.receive → save cursor → repeat
//! ```
//!
//! 🧠 Knowledge graph:
//! - The cursor is saved only after the sink took the batch. A crash in between replays
//!   the batch on restart. Nothing is ever skipped.
//! - The run ends on the first drained cycle with no records, unless `follow` is on.
//!   Then it naps `poll_interval_ms` and asks again.
//! - The sink is closed and the session destroyed on every exit path, errors included.

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::app_config::AppConfig;
use crate::checkpoint;
use crate::error::SpoolError;
use crate::producer::SpoolSession;
use crate::progress::{ProgressMetrics, SpoolTotals};
use crate::sinks::{Sink, SinkBackend};
use crate::validation::{ValidationIssue, validate_runtime};

/// 📦 Runs one spool session from the saved cursor until the source is drained.
#[derive(Debug)]
pub struct Supervisor {
    app_config: AppConfig,
}

impl Supervisor {
    pub fn new(app_config: AppConfig) -> Self {
        Self { app_config }
    }

    /// 🚀 Build the session and sink from config, then run.
    pub async fn run(&self) -> Result<SpoolTotals> {
        let the_session = SpoolSession::init(self.app_config.spool_config())
            .await
            .context("💀 the spool session refused to start")?;
        let the_sink = match SinkBackend::from_config(&self.app_config.sink).await {
            Ok(the_sink) => the_sink,
            Err(e) => {
                // -- the session already holds a client; give it back before bailing
                if let Err(the_close_error) = the_session.destroy().await {
                    warn!("⚠️ destroying the session after a sink failure also failed: {the_close_error}");
                }
                return Err(e.context("💀 the sink could not be built"));
            }
        };
        let the_metrics = ProgressMetrics::new(the_session.source_uri().to_string());
        self.run_with(the_session, the_sink, the_metrics).await
    }

    /// 🔄 Drive an already-built session into an already-built sink.
    pub async fn run_with<S: Sink>(
        &self,
        mut session: SpoolSession,
        mut sink: S,
        mut metrics: ProgressMetrics,
    ) -> Result<SpoolTotals> {
        let the_result = match self.check_runtime() {
            Ok(()) => self.spool(&mut session, &mut sink, &mut metrics).await,
            Err(e) => Err(e),
        };

        let the_sink_closed = sink.close().await.context("💀 closing the sink failed");
        let the_session_destroyed = session
            .destroy()
            .await
            .context("💀 destroying the spool session failed");
        let the_summary = metrics.finish();
        info!("📊 spool summary\n{the_summary}");

        the_result?;
        the_sink_closed?;
        the_session_destroyed?;
        Ok(metrics.totals())
    }

    fn check_runtime(&self) -> Result<()> {
        let the_runtime = &self.app_config.runtime;
        let the_issues = validate_runtime(the_runtime.max_batch_size, the_runtime.max_wait());
        if the_issues.iter().any(ValidationIssue::is_error) {
            return Err(SpoolError::Configuration(the_issues).into());
        }
        Ok(())
    }

    async fn spool<S: Sink>(
        &self,
        session: &mut SpoolSession,
        sink: &mut S,
        metrics: &mut ProgressMetrics,
    ) -> Result<()> {
        let the_runtime = &self.app_config.runtime;
        let mut the_cursor = match &the_runtime.cursor_file {
            Some(the_path) => checkpoint::load(the_path).await?,
            None => None,
        };
        let mut the_cycles: u64 = 0;

        loop {
            if the_runtime.max_cycles.is_some_and(|max| the_cycles >= max) {
                info!("🛑 stopping after {the_cycles} cycles (runtime.max_cycles)");
                return Ok(());
            }

            let the_outcome = session
                .produce(
                    the_cursor.as_deref(),
                    the_runtime.max_batch_size,
                    the_runtime.max_wait(),
                )
                .await?;
            the_cycles += 1;
            metrics.update(&the_outcome);

            for the_failure in &the_outcome.failures {
                warn!(
                    "🚑 '{}' failed to decode at byte {}: {}",
                    the_failure.key, the_failure.offset, the_failure.message
                );
            }
            for the_key in &the_outcome.post_processed {
                debug!("🗑️ post-processing finished for '{the_key}'");
            }

            let the_idle = the_outcome.drained && the_outcome.records.is_empty();
            if !the_outcome.records.is_empty() {
                sink.receive(the_outcome.records)
                    .await
                    .context("💀 the sink rejected a batch; the cursor was not advanced")?;
            }

            if let Some(the_token) = the_outcome.cursor {
                if the_cursor.as_deref() != Some(the_token.as_str()) {
                    if let Some(the_path) = &the_runtime.cursor_file {
                        checkpoint::save(the_path, &the_token).await?;
                    }
                    the_cursor = Some(the_token);
                }
            }

            if the_idle {
                if the_runtime.follow {
                    debug!("💤 drained; polling again in {:?}", the_runtime.poll_interval());
                    tokio::time::sleep(the_runtime.poll_interval()).await;
                } else {
                    info!("✅ source drained after {the_cycles} cycles");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use figment::Figment;
    use figment::providers::{Format, Toml};

    use super::*;
    use crate::app_config::{ActionConfig, ActionKind, SourceConfig};
    use crate::producer::SpoolConfig;
    use crate::sinks::InMemorySink;
    use crate::stores::{InMemoryObjectStore, StoreBackend};

    fn the_config(cursor_file: Option<&Path>) -> AppConfig {
        let the_toml = r#"
            [source]
            bucket = "mybucket"
            pattern = "*.log"
        "#;
        let mut the_config: AppConfig = Figment::new()
            .merge(Toml::string(the_toml))
            .extract()
            .unwrap();
        the_config.post_processing = ActionConfig {
            action: ActionKind::Archive,
            bucket: Some("archive".to_string()),
            folder: String::new(),
        };
        the_config.runtime.cursor_file = cursor_file.map(Path::to_path_buf);
        the_config
    }

    async fn the_store() -> InMemoryObjectStore {
        let the_store = InMemoryObjectStore::new();
        the_store.create_bucket("mybucket").await;
        the_store.create_bucket("archive").await;
        the_store.put("mybucket", "file1.log", "Hello World\n").await;
        the_store.put("mybucket", "file2.log", "one\ntwo\n").await;
        the_store.put("mybucket", "notes.txt", "skip me\n").await;
        the_store
    }

    async fn the_session(config: &AppConfig, store: &InMemoryObjectStore) -> SpoolSession {
        let the_spool: SpoolConfig = config.spool_config();
        SpoolSession::init_with_store(the_spool, StoreBackend::InMemory(store.clone()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn the_one_where_everything_is_spooled_archived_and_checkpointed() {
        let the_dir = tempfile::tempdir().unwrap();
        let the_cursor_file = the_dir.path().join("spx.cursor");
        let the_config = the_config(Some(&the_cursor_file));
        let the_store = the_store().await;
        let the_sink = InMemorySink::new();

        let the_totals = Supervisor::new(the_config.clone())
            .run_with(
                the_session(&the_config, &the_store).await,
                the_sink.clone(),
                ProgressMetrics::hidden("test".to_string()),
            )
            .await
            .unwrap();

        let the_bodies: Vec<String> = the_sink.records().await.into_iter().map(|r| r.body).collect();
        assert_eq!(the_bodies, vec!["Hello World", "one", "two"]);
        assert_eq!(the_totals.records, 3);
        assert_eq!(the_totals.objects, 2);
        assert!(the_sink.is_closed().await);
        assert!(the_store.is_closed());

        assert_eq!(the_store.keys("mybucket").await, vec!["notes.txt".to_string()]);
        assert_eq!(the_store.object_count("archive", "").await, 2);
        let the_saved = checkpoint::load(&the_cursor_file).await.unwrap().unwrap();
        assert!(the_saved.starts_with("file2.log::-1::"));
    }

    #[tokio::test]
    async fn the_one_where_a_second_run_resumes_instead_of_replaying() {
        let the_dir = tempfile::tempdir().unwrap();
        let the_cursor_file = the_dir.path().join("spx.cursor");
        let mut the_config = the_config(Some(&the_cursor_file));
        the_config.post_processing = ActionConfig::default();
        let the_store = the_store().await;

        let the_first = InMemorySink::new();
        Supervisor::new(the_config.clone())
            .run_with(
                the_session(&the_config, &the_store).await,
                the_first.clone(),
                ProgressMetrics::hidden("test".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(the_first.records().await.len(), 3);

        the_store.put("mybucket", "file3.log", "late\n").await;
        let the_second = InMemorySink::new();
        Supervisor::new(the_config.clone())
            .run_with(
                the_session(&the_config, &the_store).await,
                the_second.clone(),
                ProgressMetrics::hidden("test".to_string()),
            )
            .await
            .unwrap();
        let the_records = the_second.records().await;
        assert_eq!(the_records.len(), 1);
        assert_eq!(the_records[0].key, "file3.log");
    }

    #[tokio::test]
    async fn the_one_where_max_cycles_stops_early() {
        let mut the_config = the_config(None);
        the_config.runtime.max_cycles = Some(1);
        let the_store = the_store().await;
        let the_sink = InMemorySink::new();

        let the_totals = Supervisor::new(the_config.clone())
            .run_with(
                the_session(&the_config, &the_store).await,
                the_sink.clone(),
                ProgressMetrics::hidden("test".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(the_totals.cycles, 1);
        assert_eq!(the_sink.records().await.len(), 1);
        // -- file1.log is exhausted but its archive is owed to a cycle that never ran
        assert_eq!(the_store.object_count("archive", "").await, 0);
    }

    #[tokio::test]
    async fn the_one_where_a_zero_batch_size_is_refused_and_still_cleans_up() {
        let mut the_config = the_config(None);
        the_config.runtime.max_batch_size = 0;
        let the_store = the_store().await;
        let the_sink = InMemorySink::new();

        let the_error = Supervisor::new(the_config.clone())
            .run_with(
                the_session(&the_config, &the_store).await,
                the_sink.clone(),
                ProgressMetrics::hidden("test".to_string()),
            )
            .await
            .unwrap_err();
        assert!(format!("{the_error:#}").contains("runtime.max_batch_size"));
        assert!(the_sink.is_closed().await);
        assert!(the_store.is_closed());
    }

    #[test]
    fn the_one_where_the_source_section_parses_alone() {
        let the_source: SourceConfig = serde_json::from_str(r#"{"bucket":"b"}"#).unwrap();
        assert_eq!(the_source.delimiter, "/");
        assert_eq!(the_source.list_page_size, 1000);
    }
}
