//! 📏 LineReader — newline framing with byte-exact offsets.
//!
//! Every decoder in this crate is line-oriented, so they all sit on top of this.
//! It reads from the async object body, finds `\n` with `memchr`, and remembers the
//! absolute byte offset of every line start. That offset is what the cursor stores.
//!
//! Lines longer than `max_len` are cut and flagged; the rest of the line is consumed
//! and thrown away, so the next line still starts where it should.
//! Blank lines (and bare `\r\n`) are skipped, but their bytes still advance the offset.

use std::io;

use memchr::memchr;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::stores::ObjectBody;

/// 📄 One framed line. Terminator (and a trailing `\r`) already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub offset: u64,
    pub bytes: Vec<u8>,
    pub truncated: bool,
    /// 📍 Offset of the first byte after this line's terminator.
    pub next_offset: u64,
}

pub struct LineReader {
    reader: BufReader<ObjectBody>,
    offset: u64,
    max_len: usize,
}

impl std::fmt::Debug for LineReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineReader")
            .field("offset", &self.offset)
            .field("max_len", &self.max_len)
            .finish()
    }
}

impl LineReader {
    /// `start_offset` is where `body` begins inside the object (ranged GET).
    pub fn new(body: ObjectBody, start_offset: u64, max_len: Option<usize>) -> Self {
        Self {
            reader: BufReader::new(body),
            offset: start_offset,
            max_len: max_len.filter(|m| *m > 0).unwrap_or(usize::MAX),
        }
    }

    /// 🔄 Next non-blank line, or `None` at end of object.
    pub async fn next_line(&mut self) -> io::Result<Option<Line>> {
        loop {
            let the_start = self.offset;
            let mut the_bytes = Vec::new();
            let mut the_truncation = false;
            let mut the_saw_anything = false;

            loop {
                let the_available = self.reader.fill_buf().await?;
                if the_available.is_empty() {
                    break;
                }
                the_saw_anything = true;

                let (the_consumed, the_found_newline) = match memchr(b'\n', the_available) {
                    Some(the_index) => (the_index + 1, true),
                    None => (the_available.len(), false),
                };
                let the_content = if the_found_newline {
                    &the_available[..the_consumed - 1]
                } else {
                    &the_available[..the_consumed]
                };

                let the_room = self.max_len.saturating_sub(the_bytes.len());
                if the_content.len() > the_room {
                    the_truncation = true;
                    the_bytes.extend_from_slice(&the_content[..the_room]);
                } else {
                    the_bytes.extend_from_slice(the_content);
                }

                self.reader.consume(the_consumed);
                self.offset += the_consumed as u64;
                if the_found_newline {
                    break;
                }
            }

            if !the_saw_anything {
                return Ok(None);
            }
            if !the_truncation && the_bytes.last() == Some(&b'\r') {
                the_bytes.pop();
            }
            if the_bytes.is_empty() && !the_truncation {
                continue;
            }
            return Ok(Some(Line {
                offset: the_start,
                bytes: the_bytes,
                truncated: the_truncation,
                next_offset: self.offset,
            }));
        }
    }
}
