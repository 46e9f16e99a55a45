//! 🌐 Common Log Format — the access log lingua franca since NCSA httpd.
//!
//! `127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326`
//!
//! Parsed with one `regex`, timestamp normalized to RFC 3339 with `chrono`.
//! Combined Log Format lines (referer + user agent on the end) also match; the
//! extra quoted fields are picked up when present.

use chrono::DateTime;
use regex::Regex;
use serde_json::{Map, Value, json};

use super::{LineDecoder, line_reader::Line};
use crate::common::Record;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

const CLF_PATTERN: &str = r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "([^"]*)" (\d{3}) (\S+)(?: "([^"]*)" "([^"]*)")?"#;
const CLF_TIME_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

#[derive(Debug, Clone)]
pub struct CommonLogDecoder {
    pattern: Regex,
}

impl CommonLogDecoder {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(CLF_PATTERN)?,
        })
    }
}

/// 🕳️ CLF writes `-` for "not available".
fn dash_is_null(value: &str) -> Value {
    if value == "-" {
        Value::Null
    } else {
        Value::String(value.to_string())
    }
}

impl LineDecoder for CommonLogDecoder {
    fn decode_line(&self, key: &str, line: Line) -> Result<Record, String> {
        let the_text = String::from_utf8_lossy(&line.bytes);
        let the_captures = self
            .pattern
            .captures(&the_text)
            .ok_or_else(|| "line does not look like Common Log Format".to_string())?;
        let field = |i: usize| the_captures.get(i).map(|m| m.as_str()).unwrap_or("");

        let the_timestamp = DateTime::parse_from_str(field(4), CLF_TIME_FORMAT)
            .map_err(|e| format!("bad timestamp '{}': {e}", field(4)))?;
        let the_status: u16 = field(6)
            .parse()
            .map_err(|e| format!("bad status '{}': {e}", field(6)))?;
        let the_size = match field(7) {
            "-" => Value::Null,
            the_bytes => json!(
                the_bytes
                    .parse::<u64>()
                    .map_err(|e| format!("bad response size '{the_bytes}': {e}"))?
            ),
        };

        let mut the_fields = Map::new();
        the_fields.insert("host".into(), dash_is_null(field(1)));
        the_fields.insert("ident".into(), dash_is_null(field(2)));
        the_fields.insert("user".into(), dash_is_null(field(3)));
        the_fields.insert("timestamp".into(), json!(the_timestamp.to_rfc3339()));
        the_fields.insert("request".into(), json!(field(5)));
        // -- 🔪 "GET /path HTTP/1.0" → method, path, protocol. Malformed requests keep only `request`.
        let mut the_request_parts = field(5).splitn(3, ' ');
        if let (Some(the_method), Some(the_path)) = (the_request_parts.next(), the_request_parts.next()) {
            the_fields.insert("method".into(), json!(the_method));
            the_fields.insert("path".into(), json!(the_path));
            if let Some(the_protocol) = the_request_parts.next() {
                the_fields.insert("protocol".into(), json!(the_protocol));
            }
        }
        the_fields.insert("status".into(), json!(the_status));
        the_fields.insert("bytes".into(), the_size);
        if let Some(the_referer) = the_captures.get(8) {
            the_fields.insert("referer".into(), dash_is_null(the_referer.as_str()));
        }
        if let Some(the_agent) = the_captures.get(9) {
            the_fields.insert("user_agent".into(), dash_is_null(the_agent.as_str()));
        }

        let mut the_record = Record::new(key, line.offset, the_text.to_string())
            .with_fields(Value::Object(the_fields));
        the_record.truncated = line.truncated;
        Ok(the_record)
    }
}
