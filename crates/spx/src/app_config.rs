//! 🔧 App Configuration — TOML and `SPX_*` env vars in, one typed struct out.
//!
//! 📡 "The bucket was right there in the config. It was just spelled `mybukcet`." — incident #41 🦆
//!
//! 🏗️ Powered by Figment, same as always: env vars as the base layer, an optional TOML file
//! merged on top (file wins). Nested keys from the environment use `__`, so
//! `SPX_RUNTIME__MAX_BATCH_SIZE=50` lands in `[runtime] max_batch_size`.
//!
//! ```toml
//! [store.S3]
//! region = "eu-west-1"
//!
//! [source]
//! bucket = "mybucket"
//! folder = "NorthAmerica/USA"
//! pattern = "*.log"
//!
//! [post_processing]
//! action = "archive"
//! folder = "NorthAmerica/USA-archived"   # bucket defaults to the source bucket
//!
//! [error_handling]
//! action = "archive"
//! bucket = "quarantine"
//! on_decode_error = "route_object"
//!
//! [format.CommonLog]
//!
//! [runtime]
//! max_batch_size = 500
//! cursor_file = "spx.cursor"
//!
//! [sink.File]
//! file_name = "out.ndjson"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::decoders::FormatConfig;
use crate::lister::DEFAULT_PAGE_SIZE;
use crate::location::{DEFAULT_DELIMITER, Location};
use crate::post_process::PostProcessAction;
use crate::producer::{DecodeErrorPolicy, SpoolConfig};
use crate::sinks::SinkConfig;
use crate::stores::StoreConfig;

/// 📦 Everything the `spx` binary needs to know, in one place.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub post_processing: ActionConfig,
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    #[serde(default)]
    pub format: FormatConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// 🗺️ `[source]` — where to spool from.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub bucket: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_list_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl SourceConfig {
    pub fn location(&self) -> Location {
        Location {
            bucket: self.bucket.clone(),
            folder: self.folder.clone(),
            pattern: self.pattern.clone(),
            delimiter: self.delimiter.clone(),
        }
    }
}

/// 🎭 `action = "none" | "delete" | "archive"`.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    None,
    Delete,
    Archive,
}

/// 🗑️ `[post_processing]` — what happens after an object was read cleanly.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ActionConfig {
    #[serde(default)]
    pub action: ActionKind,
    /// 🪣 Archive bucket. Unset = the source bucket (a move to another prefix).
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub folder: String,
}

/// 🚑 `[error_handling]` — same knobs as `[post_processing]`, plus the decode-error policy.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ErrorHandlingConfig {
    #[serde(default)]
    pub action: ActionKind,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub on_decode_error: DecodeErrorPolicy,
}

fn resolve_action(
    kind: ActionKind,
    bucket: Option<&str>,
    folder: &str,
    source: &SourceConfig,
) -> PostProcessAction {
    match kind {
        ActionKind::None => PostProcessAction::None,
        ActionKind::Delete => PostProcessAction::Delete,
        ActionKind::Archive => PostProcessAction::Archive(
            Location::new(bucket.unwrap_or(&source.bucket), folder)
                .with_delimiter(source.delimiter.clone()),
        ),
    }
}

/// ⏱️ `[runtime]` — the calling loop's knobs. The spooler itself only sees batch size and budget.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// 🏷️ Where the cursor is persisted between runs. Unset = always start from the beginning.
    #[serde(default)]
    pub cursor_file: Option<PathBuf>,
    /// 🔁 Keep polling for new objects after the source is drained.
    #[serde(default)]
    pub follow: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 🛑 Stop after this many produce calls. Unset = no limit.
    #[serde(default)]
    pub max_cycles: Option<u64>,
}

fn default_max_batch_size() -> usize {
    1000
}

fn default_max_wait_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    5000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_wait_ms: default_max_wait_ms(),
            cursor_file: None,
            follow: false,
            poll_interval_ms: default_poll_interval_ms(),
            max_cycles: None,
        }
    }
}

impl RuntimeConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl AppConfig {
    /// 🔄 The session's view of this config.
    pub fn spool_config(&self) -> SpoolConfig {
        SpoolConfig {
            store: self.store.clone(),
            source: self.source.location(),
            list_page_size: self.source.list_page_size,
            on_success: resolve_action(
                self.post_processing.action,
                self.post_processing.bucket.as_deref(),
                &self.post_processing.folder,
                &self.source,
            ),
            on_error: resolve_action(
                self.error_handling.action,
                self.error_handling.bucket.as_deref(),
                &self.error_handling.folder,
                &self.source,
            ),
            decode_policy: self.error_handling.on_decode_error,
            format: self.format.clone(),
        }
    }
}

/// 🚀 Load the config from `SPX_*` env vars plus an optional TOML file (file wins).
///
/// No file → env vars only. There is no implicit `spx.toml` fallback.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {}",
        config_file_name
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<environment only>".to_string())
    );

    let the_figment = Figment::new().merge(Env::prefixed("SPX_").split("__"));
    let the_figment = match config_file_name {
        Some(file_name) => the_figment.merge(Toml::file(file_name)),
        None => the_figment,
    };

    let the_context = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (SPX_*). \
             Check that [source] has a bucket and that every enum section is spelled like the docs.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (SPX_*). \
                 No file was given, so at least SPX_SOURCE__BUCKET must be set."
            .to_string(),
    };

    the_figment.extract().context(the_context)
}
