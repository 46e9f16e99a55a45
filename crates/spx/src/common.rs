//! 📦 Records — what comes out the other end of a decoder.
//!
//! 🎬 COLD OPEN — INT. A BUCKET — SOME TIME AFTER MIDNIGHT
//!
//! A line of text, 11 bytes long, `Hello World`, has been sitting in `file1.log` since
//! Tuesday. Nobody asked how it was doing. Tonight, a decoder finds it, notes its byte
//! offset like a coroner noting a time of death, and sends it downstream in a batch.
//!
//! 🧠 Knowledge graph:
//! - `offset` is where the record STARTS. The cursor stores where the NEXT one starts.
//! - `fields` is only filled by structured decoders (NDJSON, Common Log).
//! - `truncated` is set when a line blew past the max line length and got cut.
//!
//! 🦆 The duck is not a record. The duck is a directory marker. We covered this.

use serde::Serialize;

/// 🎯 One decoded record, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// 🔑 Object key the record was read from.
    pub key: String,
    /// 📏 Byte offset of the first byte of this record inside the object.
    pub offset: u64,
    /// 📜 The record text, minus its line terminator. Invalid UTF-8 is replaced, not refused.
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl Record {
    pub fn new(key: impl Into<String>, offset: u64, body: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            offset,
            body: body.into(),
            fields: None,
            truncated: false,
        }
    }

    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = Some(fields);
        self
    }
}

/// 📦 A batch of records, handed to the caller in one `produce` cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordBatch {
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 📏 Sum of body lengths. Terminators are not counted.
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.body.len() as u64).sum()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }
}

impl From<Vec<Record>> for RecordBatch {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl IntoIterator for RecordBatch {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_batch_counts_its_bytes() {
        let the_batch = RecordBatch::new(vec![
            Record::new("file1.log", 0, "Hello World"),
            Record::new("file1.log", 12, "bye"),
        ]);
        assert_eq!(the_batch.len(), 2);
        assert_eq!(the_batch.total_bytes(), 14);
        assert!(!the_batch.is_empty());
    }

    #[test]
    fn the_one_where_plain_records_serialize_without_the_optional_noise() {
        let the_json = serde_json::to_string(&Record::new("k", 3, "x")).unwrap();
        assert_eq!(the_json, r#"{"key":"k","offset":3,"body":"x"}"#);

        let mut the_cut = Record::new("k", 0, "y").with_fields(serde_json::json!({"a": 1}));
        the_cut.truncated = true;
        let the_json = serde_json::to_string(&the_cut).unwrap();
        assert!(the_json.contains(r#""fields":{"a":1}"#));
        assert!(the_json.contains(r#""truncated":true"#));
    }
}
