//! 📦 NDJSON — one JSON value per line, parsed with `serde_json`.
//!
//! The raw line goes into `body`, the parsed value into `fields`. A line that does not
//! parse, or that got truncated (a cut JSON document is not a JSON document), is a
//! decode error. What happens next is the session's decode-error policy, not our problem.

use super::{LineDecoder, line_reader::Line};
use crate::common::Record;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct NdjsonDecoder;

impl LineDecoder for NdjsonDecoder {
    fn decode_line(&self, key: &str, line: Line) -> Result<Record, String> {
        if line.truncated {
            return Err(format!(
                "line at byte {} exceeds the maximum line length; refusing to parse half a document",
                line.offset
            ));
        }
        let the_value: serde_json::Value =
            serde_json::from_slice(&line.bytes).map_err(|e| format!("invalid JSON: {e}"))?;
        Ok(Record::new(key, line.offset, String::from_utf8_lossy(&line.bytes)).with_fields(the_value))
    }
}
