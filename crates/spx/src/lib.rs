//! 🧵 spx — a resumable spooler for object stores.
//!
//! 🎬 *[a bucket fills with logs. nobody knows which ones were read. until now.]*
//!
//! Point it at `s3://bucket/folder/*.log`, call `produce` with the last cursor you saved,
//! get back records plus a new cursor. Objects are read in ascending key order, each record
//! exactly once as long as you persist the cursor after you persist the records. Finished
//! objects can be deleted or archived; undecodable ones can be routed somewhere else.
//!
//! 🧠 Knowledge graph:
//! - Library surface: [`SpoolSession`] (`init` / `produce` / `destroy`) and its config.
//! - Binary surface: [`run`], which the `spx` CLI calls with a loaded [`AppConfig`].
//! - Everything under `stores` speaks anyhow; everything the session returns is [`SpoolError`].

pub mod app_config;
pub mod checkpoint;
pub mod common;
pub mod cursor;
pub mod decoders;
pub mod error;
pub mod lister;
pub mod location;
pub mod post_process;
pub mod producer;
pub mod progress;
pub mod sinks;
pub mod spooler;
pub mod stores;
pub mod supervisors;
pub mod validation;

use anyhow::{Context, Result};

pub use app_config::{AppConfig, load_config};
pub use common::{Record, RecordBatch};
pub use cursor::Cursor;
pub use error::SpoolError;
pub use location::Location;
pub use post_process::PostProcessAction;
pub use producer::{DecodeErrorPolicy, ProduceOutcome, SpoolConfig, SpoolSession};
pub use progress::SpoolTotals;

/// 🚀 Spool until the source is drained (or forever, with `runtime.follow`).
pub async fn run(app_config: AppConfig) -> Result<SpoolTotals> {
    supervisors::Supervisor::new(app_config)
        .run()
        .await
        .context("💀 the spool run did not finish")
}
