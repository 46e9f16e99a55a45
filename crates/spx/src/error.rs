//! 💀 Errors — the five ways a spooling cycle can go sideways.
//!
//! 🎬 *[a cursor arrives malformed. a bucket refuses to list. a log line refuses to parse.]*
//! *[somewhere, an archive copy half-finishes and stares into the void.]*
//!
//! 🧠 Knowledge graph:
//! - Stores, sinks and the app layer speak `anyhow` (with lots of `.context(...)`).
//! - The spooler boundary speaks [`SpoolError`] so callers can `match` on the failure class
//!   and pick a retry policy. The core never retries on its own.
//! - Store errors are boxed into the typed variant right where the spooler calls the store.
//!
//! 🦆 The duck has been classified as `TransientStore`. It will be back.

use std::fmt;

use thiserror::Error;

use crate::validation::ValidationIssue;

/// 📦 Boxed cause, so `anyhow` errors from the stores can ride inside a typed variant.
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// 🔧 Which remote primitive blew up. Shows up in logs and in the error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    List,
    Get,
    Copy,
    Delete,
    BucketExists,
    Close,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_name = match self {
            Self::List => "list",
            Self::Get => "get",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::BucketExists => "bucket_exists",
            Self::Close => "close",
        };
        f.write_str(the_name)
    }
}

/// 🎭 Everything the spooler can report to whoever is driving it.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// 🔧 Validation failed before a single object was touched.
    #[error("💀 configuration rejected with {} issue(s): {}", .0.len(), render_issues(.0))]
    Configuration(Vec<ValidationIssue>),

    /// 📡 Network, timeout, auth hiccup. State is left resumable; retry is the caller's call.
    #[error("💀 object store {operation} failed for s3://{bucket}/{key}")]
    TransientStore {
        operation: StoreOperation,
        bucket: String,
        key: String,
        #[source]
        source: BoxedCause,
    },

    /// 🧾 A record refused to decode and the policy says that is fatal.
    #[error("💀 could not decode record in '{key}' at byte {offset}: {message}")]
    Decode {
        key: String,
        offset: u64,
        message: String,
    },

    /// 🗑️ Archive or delete failed. The object is untouched or copied-but-not-deleted.
    #[error("💀 post-processing '{action}' failed for '{key}', left for operator intervention")]
    PostProcess {
        key: String,
        action: String,
        #[source]
        source: BoxedCause,
    },

    /// 🏷️ The resumption token did not survive the round trip.
    #[error("💀 cursor '{token}' is malformed: {reason}")]
    Cursor { token: String, reason: String },
}

impl SpoolError {
    /// 📡 Shorthand used at every store call site.
    pub(crate) fn store(
        operation: StoreOperation,
        bucket: &str,
        key: &str,
        source: anyhow::Error,
    ) -> Self {
        Self::TransientStore {
            operation,
            bucket: bucket.to_string(),
            key: key.to_string(),
            source: source.into(),
        }
    }

    /// 🔁 Whether an outer supervision layer may simply call `produce` again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore { .. })
    }
}

fn render_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::Severity;

    #[test]
    fn the_one_where_configuration_errors_list_every_issue() {
        let the_error = SpoolError::Configuration(vec![
            ValidationIssue::new(Severity::Error, "post_processing.folder", "loops forever"),
            ValidationIssue::new(Severity::Error, "error_handling.folder", "also loops"),
        ]);
        let the_message = the_error.to_string();
        assert!(the_message.contains("2 issue(s)"));
        assert!(the_message.contains("post_processing.folder"));
        assert!(the_message.contains("error_handling.folder"));
    }

    #[test]
    fn the_one_where_only_store_errors_are_transient() {
        let the_store_error = SpoolError::store(
            StoreOperation::List,
            "mybucket",
            "",
            anyhow::anyhow!("connection refused"),
        );
        assert!(the_store_error.is_transient());
        assert!(the_store_error.to_string().contains("list"));

        let the_decode_error = SpoolError::Decode {
            key: "file1.log".into(),
            offset: 12,
            message: "nope".into(),
        };
        assert!(!the_decode_error.is_transient());
    }

    #[test]
    fn the_one_where_the_store_cause_survives_the_boxing() {
        let the_error = SpoolError::store(
            StoreOperation::Copy,
            "b",
            "k",
            anyhow::anyhow!("access denied"),
        );
        let the_cause = std::error::Error::source(&the_error)
            .expect("💀 the boxed cause went missing");
        assert_eq!(the_cause.to_string(), "access denied");
    }
}
