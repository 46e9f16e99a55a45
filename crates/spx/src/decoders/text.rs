//! 📜 Plain text lines. The decoder that cannot fail, only truncate.

use super::{LineDecoder, line_reader::Line};
use crate::common::Record;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

#[derive(Debug, Clone, Default)]
pub struct TextDecoder;

impl LineDecoder for TextDecoder {
    fn decode_line(&self, key: &str, line: Line) -> Result<Record, String> {
        let mut the_record = Record::new(key, line.offset, String::from_utf8_lossy(&line.bytes));
        the_record.truncated = line.truncated;
        Ok(the_record)
    }
}
