//! 🔍 Configuration validation — catching infinite loops before they start.
//!
//! 🎬 *[a log file is archived into the folder it came from. it is listed again. it is read
//! again. it is archived again. the sun rises and sets. the bill arrives.]*
//!
//! The one check that really matters: an archive destination that is the same place as the
//! source re-injects every finished object into the enumeration. That is a hard error.
//! Everything else here is the usual "your bucket name is an empty string" hygiene.
//!
//! 🧠 Knowledge graph:
//! - "Same place" = same bucket AND same effective prefix ([`Location::same_place`]).
//! - Same bucket + different folder is fine. Different bucket + same folder is fine.
//! - Issues carry a config path (`post_processing.folder`) so the message points at the TOML line.

use std::fmt;
use std::time::Duration;

use glob::Pattern;

use crate::location::Location;
use crate::post_process::PostProcessAction;

/// 🚦 How loud an issue is. Only `Error` blocks session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// 📋 One thing wrong with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// 🏷️ Config path, e.g. `error_handling.folder`.
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(severity: Severity, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, field, message)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "[{the_level}] {}: {}", self.field, self.message)
    }
}

/// 🏷️ Config section names for the two actions.
pub const SUCCESS_SECTION: &str = "post_processing";
pub const ERROR_SECTION: &str = "error_handling";

/// 🔍 Check the source location and both post-processing actions.
///
/// Returns every issue found, not just the first. Empty = good to go.
pub fn validate(
    source: &Location,
    success_action: &PostProcessAction,
    error_action: &PostProcessAction,
) -> Vec<ValidationIssue> {
    let mut the_issues = Vec::new();

    if source.bucket.trim().is_empty() {
        the_issues.push(ValidationIssue::error(
            "source.bucket",
            "source bucket must not be empty",
        ));
    }
    if source.delimiter.is_empty() {
        the_issues.push(ValidationIssue::error(
            "source.delimiter",
            "delimiter must not be empty",
        ));
    }
    if let Some(the_pattern) = source.pattern.as_deref()
        && let Err(the_error) = Pattern::new(the_pattern)
    {
        the_issues.push(ValidationIssue::error(
            "source.pattern",
            format!("'{the_pattern}' is not a valid glob: {the_error}"),
        ));
    }

    check_action(source, success_action, SUCCESS_SECTION, &mut the_issues);
    check_action(source, error_action, ERROR_SECTION, &mut the_issues);

    the_issues
}

fn check_action(
    source: &Location,
    action: &PostProcessAction,
    section: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(the_destination) = action.archive_destination() else {
        return;
    };

    if the_destination.bucket.trim().is_empty() {
        issues.push(ValidationIssue::error(
            format!("{section}.bucket"),
            "archive bucket must not be empty",
        ));
        return;
    }

    if the_destination.same_place(source) {
        issues.push(ValidationIssue::error(
            format!("{section}.folder"),
            format!(
                "archive destination {} is the source location; archived objects would be listed again",
                the_destination.display_uri()
            ),
        ));
    }
}

/// ⏱️ Runtime knobs that make `produce` meaningless when zero.
pub fn validate_runtime(max_batch_size: usize, max_wait: Duration) -> Vec<ValidationIssue> {
    let mut the_issues = Vec::new();
    if max_batch_size == 0 {
        the_issues.push(ValidationIssue::error(
            "runtime.max_batch_size",
            "must be greater than zero",
        ));
    }
    if max_wait.is_zero() {
        the_issues.push(ValidationIssue::error(
            "runtime.max_wait_ms",
            "must be greater than zero",
        ));
    }
    the_issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn the_source() -> Location {
        Location::new("mybucket", "myFolder").with_pattern("*.log")
    }

    fn archive(bucket: &str, folder: &str) -> PostProcessAction {
        PostProcessAction::Archive(Location::new(bucket, folder))
    }

    #[test]
    fn the_one_where_both_archives_point_home_and_we_get_two_errors() {
        let the_issues = validate(
            &the_source(),
            &archive("mybucket", "myFolder"),
            &archive("mybucket", "myFolder/"),
        );
        assert_eq!(the_issues.len(), 2);
        assert!(the_issues.iter().all(ValidationIssue::is_error));
        assert_eq!(the_issues[0].field, "post_processing.folder");
        assert_eq!(the_issues[1].field, "error_handling.folder");
    }

    #[test]
    fn the_one_where_only_one_archive_collides() {
        let the_issues = validate(
            &the_source(),
            &archive("mybucket", "done"),
            &archive("mybucket", "myFolder"),
        );
        assert_eq!(the_issues.len(), 1);
        assert_eq!(the_issues[0].field, "error_handling.folder");
    }

    #[test]
    fn the_one_where_a_different_folder_in_the_same_bucket_is_fine() {
        let the_issues = validate(
            &the_source(),
            &archive("mybucket", "myOtherFolder"),
            &archive("mybucket", "myOtherFolder"),
        );
        assert!(the_issues.is_empty(), "💀 unexpected issues: {the_issues:?}");
    }

    #[test]
    fn the_one_where_the_same_folder_in_another_bucket_is_fine() {
        let the_issues = validate(
            &the_source(),
            &archive("myOtherBucket", "myFolder"),
            &archive("myOtherBucket", "myFolder"),
        );
        assert!(the_issues.is_empty(), "💀 unexpected issues: {the_issues:?}");
    }

    #[test]
    fn the_one_where_delete_and_none_never_collide() {
        assert!(validate(&the_source(), &PostProcessAction::Delete, &PostProcessAction::None).is_empty());
    }

    #[test]
    fn the_one_where_hygiene_checks_pile_up() {
        let the_source = Location::new("", "x").with_pattern("[oops").with_delimiter("");
        let the_issues = validate(&the_source, &archive("", "a"), &PostProcessAction::None);
        let the_fields: Vec<_> = the_issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(
            the_fields,
            vec![
                "source.bucket",
                "source.delimiter",
                "source.pattern",
                "post_processing.bucket"
            ]
        );
    }

    #[test]
    fn the_one_where_zero_budgets_are_refused() {
        assert_eq!(validate_runtime(0, Duration::ZERO).len(), 2);
        assert!(validate_runtime(1000, Duration::from_millis(1000)).is_empty());
    }

    #[test]
    fn the_one_where_issues_render_with_their_field() {
        let the_issue = ValidationIssue::error("post_processing.folder", "loops");
        assert_eq!(the_issue.to_string(), "[error] post_processing.folder: loops");
    }
}
