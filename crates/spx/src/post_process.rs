//! 🗑️ Post-processing — what happens to an object after we are done with it.
//!
//! 🎬 *[the last line of file1.log has been delivered. the cursor says -1. the object sits
//! there, fully read, waiting to learn its fate.]*
//!
//! Three fates: left alone, deleted, or archived (server-side copy, then delete).
//! Archive is NOT atomic. Copy fails → source untouched. Delete fails → copied-but-not-deleted.
//! Either way the caller gets a [`SpoolError::PostProcess`] naming the key and the action,
//! and nobody retries anything in here.
//!
//! 🧠 Knowledge graph:
//! - Archive key = destination prefix + key relative to the source prefix.
//!   `NorthAmerica/USA/file7.log` from folder `NorthAmerica/USA` into `archive/` → `archive/file7.log`.
//! - The validator guarantees the destination is never the same place as the source,
//!   otherwise archived objects would be re-listed forever.

use std::fmt;

use tracing::info;

use crate::error::SpoolError;
use crate::location::{Location, ObjectHandle};
use crate::stores::ObjectStore;

/// 🎭 One of the two independent actions (on success, on error).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PostProcessAction {
    /// 💤 Leave it where it is. The cursor is what keeps it from being re-read.
    #[default]
    None,
    Delete,
    /// 📦 Move under another location.
    Archive(Location),
}

impl PostProcessAction {
    pub fn archive_destination(&self) -> Option<&Location> {
        match self {
            Self::Archive(the_destination) => Some(the_destination),
            _ => None,
        }
    }
}

impl fmt::Display for PostProcessAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Delete => f.write_str("delete"),
            Self::Archive(the_destination) => {
                write!(f, "archive to {}", the_destination.display_uri())
            }
        }
    }
}

/// 🔧 Applies actions for objects listed under one source location.
#[derive(Debug, Clone)]
pub struct PostProcessor {
    source: Location,
}

impl PostProcessor {
    pub fn new(source: Location) -> Self {
        Self { source }
    }

    /// 🔑 Where `key` lands when archived into `destination`.
    pub fn archive_key(&self, destination: &Location, key: &str) -> String {
        format!("{}{}", destination.prefix(), self.source.relative_key(key))
    }

    /// 🚀 Run `action` for `object`. Synchronous from the caller's point of view; not interruptible.
    pub async fn apply<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        object: &ObjectHandle,
        action: &PostProcessAction,
    ) -> Result<(), SpoolError> {
        let the_failure = |e: anyhow::Error| SpoolError::PostProcess {
            key: object.key.clone(),
            action: action.to_string(),
            source: e.into(),
        };

        match action {
            PostProcessAction::None => Ok(()),
            PostProcessAction::Delete => {
                store
                    .delete(&self.source.bucket, &object.key)
                    .await
                    .map_err(the_failure)?;
                info!("🗑️ deleted s3://{}/{}", self.source.bucket, object.key);
                Ok(())
            }
            PostProcessAction::Archive(the_destination) => {
                let the_target_key = self.archive_key(the_destination, &object.key);
                store
                    .copy(
                        &self.source.bucket,
                        &object.key,
                        &the_destination.bucket,
                        &the_target_key,
                    )
                    .await
                    .map_err(the_failure)?;
                // -- ⚠️ from here until the delete returns, the object exists in both places
                store
                    .delete(&self.source.bucket, &object.key)
                    .await
                    .map_err(|e| {
                        the_failure(e.context(format!(
                            "copied to s3://{}/{the_target_key} but the source was not deleted",
                            the_destination.bucket
                        )))
                    })?;
                info!(
                    "📦 archived s3://{}/{} → s3://{}/{the_target_key}",
                    self.source.bucket, object.key, the_destination.bucket
                );
                Ok(())
            }
        }
    }
}
