//! 🗺️ Locations and object handles — the nouns of spooling.
//!
//! A [`Location`] says *where* to look (bucket + folder + optional glob + delimiter).
//! An [`ObjectHandle`] is one thing we found there, frozen at listing time.
//!
//! 🧠 Knowledge graph:
//! - "Effective prefix" = folder + exactly one trailing delimiter (empty folder = bucket root).
//! - Two locations are the same place iff bucket and effective prefix match. The validator
//!   and the archive key arithmetic both lean on this.
//! - Handles order by key, byte-wise. That order IS the processing order.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// 📏 The default path delimiter. S3 does not care, humans do.
pub const DEFAULT_DELIMITER: &str = "/";

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

/// 🗺️ A logical root to enumerate: bucket, folder, optional name glob, delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Location {
    pub bucket: String,
    #[serde(default)]
    pub folder: String,
    /// 🌟 Matched against the base name (after the last delimiter), not the full key.
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

impl Location {
    pub fn new(bucket: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            folder: folder.into(),
            pattern: None,
            delimiter: default_delimiter(),
        }
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// 📁 Folder with exactly one trailing delimiter, or `""` for the bucket root.
    pub fn prefix(&self) -> String {
        if self.folder.is_empty() || self.delimiter.is_empty() {
            return self.folder.clone();
        }
        let the_trimmed = self.folder.trim_end_matches(self.delimiter.as_str());
        if the_trimmed.is_empty() {
            // -- 🐛 a folder made only of delimiters is the root wearing a disguise
            return String::new();
        }
        format!("{the_trimmed}{}", self.delimiter)
    }

    /// 🎯 Same bucket, same effective folder. Pattern deliberately not compared.
    pub fn same_place(&self, other: &Location) -> bool {
        self.bucket == other.bucket && self.prefix() == other.prefix()
    }

    /// 🔪 Key with the source prefix shaved off. Keys outside the prefix come back whole.
    pub fn relative_key<'a>(&self, key: &'a str) -> &'a str {
        let the_prefix = self.prefix();
        key.strip_prefix(the_prefix.as_str()).unwrap_or(key)
    }

    /// 🏷️ Last path segment — what the glob is matched against.
    pub fn base_name<'a>(&self, key: &'a str) -> &'a str {
        if self.delimiter.is_empty() {
            return key;
        }
        key.rsplit(self.delimiter.as_str()).next().unwrap_or(key)
    }

    /// 📁 Does this key look like a directory marker rather than an object?
    pub fn is_directory_marker(&self, key: &str, size: u64) -> bool {
        if !self.delimiter.is_empty() && key.ends_with(self.delimiter.as_str()) {
            return true;
        }
        size == 0 && key == self.prefix()
    }

    /// 🔗 Human-readable `s3://bucket/prefix` label for logs and the progress bar.
    pub fn display_uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix())
    }
}

/// 📦 One object as the listing saw it. Immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectHandle {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }
}

impl PartialOrd for ObjectHandle {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectHandle {
    fn cmp(&self, other: &Self) -> Ordering {
        // -- 🔢 byte-wise on the key, same as S3 list order. Ties broken for Ord consistency.
        self.key
            .as_bytes()
            .cmp(other.key.as_bytes())
            .then(self.size.cmp(&other.size))
            .then(self.last_modified.cmp(&other.last_modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_folders_get_exactly_one_trailing_slash() {
        assert_eq!(Location::new("b", "").prefix(), "");
        assert_eq!(Location::new("b", "myFolder").prefix(), "myFolder/");
        assert_eq!(Location::new("b", "NorthAmerica/USA/").prefix(), "NorthAmerica/USA/");
        assert_eq!(Location::new("b", "double//").prefix(), "double/");
        assert_eq!(Location::new("b", "/").prefix(), "");
    }

    #[test]
    fn the_one_where_same_place_ignores_trailing_slash_drama() {
        let the_source = Location::new("mybucket", "myFolder");
        assert!(the_source.same_place(&Location::new("mybucket", "myFolder/")));
        assert!(!the_source.same_place(&Location::new("other-bucket", "myFolder")));
        assert!(!the_source.same_place(&Location::new("mybucket", "elsewhere")));
    }

    #[test]
    fn the_one_where_relative_keys_lose_their_prefix() {
        let the_source = Location::new("b", "NorthAmerica/USA");
        assert_eq!(the_source.relative_key("NorthAmerica/USA/file7.log"), "file7.log");
        assert_eq!(the_source.relative_key("Europe/file.log"), "Europe/file.log");
        assert_eq!(Location::new("b", "").relative_key("file1.log"), "file1.log");
    }

    #[test]
    fn the_one_where_directory_markers_are_spotted() {
        let the_source = Location::new("b", "NorthAmerica");
        assert!(the_source.is_directory_marker("NorthAmerica/USA/", 0));
        assert!(the_source.is_directory_marker("NorthAmerica/", 0));
        assert!(!the_source.is_directory_marker("NorthAmerica/file4.log", 0));
    }

    #[test]
    fn the_one_where_handles_sort_byte_wise() {
        let mut the_handles = vec![
            ObjectHandle::new("file3.log", 1),
            ObjectHandle::new("File9.log", 1),
            ObjectHandle::new("file1.log", 1),
            ObjectHandle::new("NorthAmerica/file4.log", 1),
        ];
        the_handles.sort();
        let the_keys: Vec<_> = the_handles.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(
            the_keys,
            vec!["File9.log", "NorthAmerica/file4.log", "file1.log", "file3.log"]
        );
    }

    #[test]
    fn the_one_where_base_names_come_after_the_last_delimiter() {
        let the_source = Location::new("b", "");
        assert_eq!(the_source.base_name("a/b/c.log"), "c.log");
        assert_eq!(the_source.base_name("c.log"), "c.log");
    }
}
