//! 🚀 The Batch Producer — `init`, `produce`, `destroy`. The public face of spooling.
//!
//! 🎬 *[the runtime knocks. "got anything for me? here's where we left off." the session
//! checks the cursor, pays any post-processing it owes, reads what fits in the budget,
//! and hands back records plus a new cursor. the runtime persists the cursor. repeat.]*
//!
//! 🧠 Knowledge graph:
//! - [`SpoolSession`] owns the store client. Exactly one per logical stream.
//!   `produce` takes `&mut self`, so two concurrent calls do not compile.
//! - `init` validates before it touches anything, then checks that every bucket exists.
//! - `destroy` closes the store. Dropping a session without it logs a warning.
//! - The cursor is a string only at this boundary. Everything inside is [`Cursor`].
//!
//! ⚠️ Multiple workers on one Location must split it into disjoint folders or globs.
//! Nothing here coordinates between sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::common::RecordBatch;
use crate::cursor::Cursor;
use crate::decoders::{DecoderBackend, FormatConfig};
use crate::error::{SpoolError, StoreOperation};
use crate::lister::{DEFAULT_PAGE_SIZE, ObjectLister};
use crate::location::Location;
use crate::post_process::PostProcessAction;
use crate::spooler::state::SpoolState;
use crate::spooler::{SpoolTracker, TrackerSettings};
use crate::stores::{ObjectStore, StoreBackend, StoreConfig};
use crate::validation::{self, ERROR_SECTION, SUCCESS_SECTION, ValidationIssue};

/// 🧾 What to do when a record will not decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeErrorPolicy {
    /// 🚑 Give up on the object, send it through the error action, move on.
    #[default]
    RouteObject,
    /// 🛑 Fail the whole `produce` call with [`SpoolError::Decode`].
    Abort,
}

/// 💀 One decode failure that was routed instead of raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailure {
    pub key: String,
    pub offset: u64,
    pub message: String,
}

/// 📦 What one `produce` call hands back.
#[derive(Debug, Default)]
pub struct ProduceOutcome {
    /// 🏷️ Token to persist and pass to the next call. `None` only before the first object.
    pub cursor: Option<String>,
    pub records: RecordBatch,
    pub failures: Vec<DecodeFailure>,
    /// 🗑️ Keys whose post-processing completed during this call.
    pub post_processed: Vec<String>,
    /// 💤 The listing found nothing further. New objects may still show up later.
    pub drained: bool,
}

/// 🔧 Fully resolved session configuration. [`crate::app_config`] builds one from TOML/env.
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    pub store: StoreConfig,
    pub source: Location,
    pub list_page_size: usize,
    pub on_success: PostProcessAction,
    pub on_error: PostProcessAction,
    pub decode_policy: DecodeErrorPolicy,
    pub format: FormatConfig,
}

impl SpoolConfig {
    pub fn new(source: Location) -> Self {
        Self {
            store: StoreConfig::default(),
            source,
            list_page_size: DEFAULT_PAGE_SIZE,
            on_success: PostProcessAction::None,
            on_error: PostProcessAction::None,
            decode_policy: DecodeErrorPolicy::default(),
            format: FormatConfig::default(),
        }
    }

    pub fn on_success(mut self, action: PostProcessAction) -> Self {
        self.on_success = action;
        self
    }

    pub fn on_error(mut self, action: PostProcessAction) -> Self {
        self.on_error = action;
        self
    }

    pub fn decode_policy(mut self, policy: DecodeErrorPolicy) -> Self {
        self.decode_policy = policy;
        self
    }

    pub fn format(mut self, format: FormatConfig) -> Self {
        self.format = format;
        self
    }

    /// 🪣 Every bucket the session will touch, with the config field that named it.
    fn referenced_buckets(&self) -> Vec<(String, &str)> {
        let mut the_buckets = vec![("source.bucket".to_string(), self.source.bucket.as_str())];
        for (the_section, the_action) in [
            (SUCCESS_SECTION, &self.on_success),
            (ERROR_SECTION, &self.on_error),
        ] {
            if let Some(the_destination) = the_action.archive_destination()
                && !the_buckets
                    .iter()
                    .any(|(_, b)| *b == the_destination.bucket.as_str())
            {
                the_buckets.push((
                    format!("{the_section}.bucket"),
                    the_destination.bucket.as_str(),
                ));
            }
        }
        the_buckets
    }
}

/// 🎟️ One spooling session: a store client plus the tracker that remembers where we are.
#[derive(Debug)]
pub struct SpoolSession {
    store: StoreBackend,
    tracker: SpoolTracker,
    source_uri: String,
    destroyed: bool,
}

impl SpoolSession {
    /// 🚀 Validate, connect, check buckets. Nothing is listed or read yet.
    pub async fn init(config: SpoolConfig) -> Result<Self, SpoolError> {
        let the_store = StoreBackend::from_config(&config.store)
            .await
            .map_err(|e| {
                SpoolError::Configuration(vec![ValidationIssue::error(
                    "store",
                    format!("could not build the object store client: {e:#}"),
                )])
            })?;
        Self::init_with_store(config, the_store).await
    }

    /// 🔌 Same as [`init`](Self::init), with a store the caller already built.
    pub async fn init_with_store(
        config: SpoolConfig,
        store: StoreBackend,
    ) -> Result<Self, SpoolError> {
        match Self::prepare(&config, &store).await {
            Ok(the_tracker) => {
                let the_session = Self {
                    source_uri: config.source.display_uri(),
                    store,
                    tracker: the_tracker,
                    destroyed: false,
                };
                info!(
                    "🚀 spool session ready for {} (success: {}, error: {})",
                    the_session.source_uri, config.on_success, config.on_error
                );
                Ok(the_session)
            }
            Err(the_error) => {
                // -- 🔌 the session never existed, so nobody else will close this
                if let Err(the_close_error) = store.close().await {
                    warn!("⚠️ closing the store after a failed init also failed: {the_close_error:#}");
                }
                Err(the_error)
            }
        }
    }

    async fn prepare(config: &SpoolConfig, store: &StoreBackend) -> Result<SpoolTracker, SpoolError> {
        reject_errors(validation::validate(
            &config.source,
            &config.on_success,
            &config.on_error,
        ))?;

        let mut the_missing = Vec::new();
        for (the_field, the_bucket) in config.referenced_buckets() {
            let the_exists = store.bucket_exists(the_bucket).await.map_err(|e| {
                SpoolError::store(StoreOperation::BucketExists, the_bucket, "", e)
            })?;
            if !the_exists {
                the_missing.push(ValidationIssue::error(
                    the_field,
                    format!("bucket '{the_bucket}' does not exist"),
                ));
            }
        }
        reject_errors(the_missing)?;

        let the_lister = ObjectLister::new(config.source.clone(), config.list_page_size)
            .map_err(|e| {
                SpoolError::Configuration(vec![ValidationIssue::error(
                    "source.pattern",
                    e.to_string(),
                )])
            })?;
        let the_decoder = DecoderBackend::from_config(&config.format).map_err(|e| {
            SpoolError::Configuration(vec![ValidationIssue::error("format", format!("{e:#}"))])
        })?;

        Ok(SpoolTracker::new(TrackerSettings {
            lister: the_lister,
            on_success: config.on_success.clone(),
            on_error: config.on_error.clone(),
            decoder: the_decoder,
            max_line_length: config.format.max_line_length(),
            decode_policy: config.decode_policy,
        }))
    }

    /// 🔄 Next chunk of records, resuming from `cursor`.
    ///
    /// Stops at `max_records`, when `time_budget` runs out, at the end of an object,
    /// or when nothing is left. Errors leave the session resumable from the caller's
    /// last persisted cursor.
    pub async fn produce(
        &mut self,
        cursor: Option<&str>,
        max_records: usize,
        time_budget: Duration,
    ) -> Result<ProduceOutcome, SpoolError> {
        let the_cursor = Cursor::decode(cursor)?;
        self.tracker
            .cycle(&self.store, the_cursor.as_ref(), max_records, time_budget)
            .await
    }

    pub fn state(&self) -> &SpoolState {
        self.tracker.state()
    }

    pub fn source_uri(&self) -> &str {
        &self.source_uri
    }

    /// 🗑️ Release the store client. Always call this, success or failure.
    pub async fn destroy(mut self) -> Result<(), SpoolError> {
        self.destroyed = true;
        if let Some(the_owed) = self.tracker.state().pending_obligation() {
            warn!(
                "⚠️ destroying the session while post-processing of '{}' is still owed; \
                 it will not run unless a later session replays an earlier cursor",
                the_owed.key
            );
        }
        self.store.close().await.map_err(|e| {
            SpoolError::store(StoreOperation::Close, &self.source_uri, "", e)
        })?;
        info!("🔌 spool session for {} destroyed", self.source_uri);
        Ok(())
    }
}

impl Drop for SpoolSession {
    fn drop(&mut self) {
        if !self.destroyed {
            warn!(
                "⚠️ spool session for {} dropped without destroy(); the store client was not closed",
                self.source_uri
            );
        }
    }
}

fn reject_errors(issues: Vec<ValidationIssue>) -> Result<(), SpoolError> {
    if issues.iter().any(ValidationIssue::is_error) {
        return Err(SpoolError::Configuration(issues));
    }
    for the_warning in &issues {
        warn!("⚠️ {the_warning}");
    }
    Ok(())
}
