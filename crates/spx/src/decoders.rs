//! 🧾 Decoders — object bytes in, records out.
//!
//! 🎬 *[an object body arrives as a raw byte stream. it does not know it is a log file.
//! it does not know where its lines end. it is about to find out.]*
//!
//! 🧠 Knowledge graph:
//! - Pattern: `LineDecoder` trait → concrete impls (`TextDecoder`, `NdjsonDecoder`,
//!   `CommonLogDecoder`) → `DecoderBackend` enum. Same shape as the stores.
//! - `DecoderBackend::open(object, body, start_offset)` → [`ObjectReader`], one per object.
//! - `ObjectReader::read_next` yields a record plus the offset right after it, or
//!   `EndOfObject`. That "offset right after" is what becomes the cursor.
//! - Resumption is a ranged GET from the stored offset. The reader never seeks.
//!
//! ⚠️ A decode error does NOT advance the reader's notion of "last good offset".
//! The session decides whether to abandon the object or abort the cycle.

use serde::Deserialize;
use thiserror::Error;
use tracing::trace;

use crate::common::Record;
use crate::location::ObjectHandle;
use crate::stores::ObjectBody;

pub mod common_log;
pub mod line_reader;
pub mod ndjson;
pub mod text;

pub use common_log::CommonLogDecoder;
pub use line_reader::{Line, LineReader};
pub use ndjson::NdjsonDecoder;
pub use text::TextDecoder;

/// 🔧 Which decoder, externally tagged: `[format.Text]`, `[format.Ndjson]`, `[format.CommonLog]`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum FormatConfig {
    Text {
        #[serde(default = "default_text_max_line_length")]
        max_line_length: usize,
    },
    Ndjson {
        #[serde(default = "default_ndjson_max_line_length")]
        max_line_length: usize,
    },
    CommonLog {
        #[serde(default = "default_common_log_max_line_length")]
        max_line_length: usize,
    },
}

fn default_text_max_line_length() -> usize {
    text::DEFAULT_MAX_LINE_LENGTH
}

fn default_ndjson_max_line_length() -> usize {
    ndjson::DEFAULT_MAX_LINE_LENGTH
}

fn default_common_log_max_line_length() -> usize {
    common_log::DEFAULT_MAX_LINE_LENGTH
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self::Text {
            max_line_length: default_text_max_line_length(),
        }
    }
}

impl FormatConfig {
    pub fn max_line_length(&self) -> usize {
        match self {
            Self::Text { max_line_length }
            | Self::Ndjson { max_line_length }
            | Self::CommonLog { max_line_length } => *max_line_length,
        }
    }
}

/// 📖 What one `read_next` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Record { record: Record, next_offset: u64 },
    EndOfObject,
}

/// 💀 Why `read_next` could not produce anything.
#[derive(Debug, Error)]
pub enum ReadError {
    /// 🧾 The bytes were there, they just were not a record.
    #[error("could not decode record at byte {offset}: {message}")]
    Decode { offset: u64, message: String },
    /// 📡 The body stream broke mid-read.
    #[error("object body stream failed")]
    Io(#[from] std::io::Error),
}

/// 🔤 Turns one framed line into a record.
pub trait LineDecoder: std::fmt::Debug + Send + Sync {
    fn decode_line(&self, key: &str, line: Line) -> Result<Record, String>;
}

/// 🎭 The decoder casting call. Dispatches via match.
#[derive(Debug, Clone)]
pub enum DecoderBackend {
    Text(TextDecoder),
    Ndjson(NdjsonDecoder),
    CommonLog(CommonLogDecoder),
}

impl LineDecoder for DecoderBackend {
    fn decode_line(&self, key: &str, line: Line) -> Result<Record, String> {
        match self {
            Self::Text(d) => d.decode_line(key, line),
            Self::Ndjson(d) => d.decode_line(key, line),
            Self::CommonLog(d) => d.decode_line(key, line),
        }
    }
}

impl DecoderBackend {
    pub fn from_config(config: &FormatConfig) -> anyhow::Result<Self> {
        Ok(match config {
            FormatConfig::Text { .. } => Self::Text(TextDecoder),
            FormatConfig::Ndjson { .. } => Self::Ndjson(NdjsonDecoder),
            FormatConfig::CommonLog { .. } => Self::CommonLog(CommonLogDecoder::new()?),
        })
    }

    /// 🚪 Start reading `object`. `body` must already begin at `start_offset`.
    pub fn open(
        &self,
        object: &ObjectHandle,
        body: ObjectBody,
        start_offset: u64,
        max_line_length: usize,
    ) -> ObjectReader {
        trace!("🚪 opening '{}' at byte {start_offset}", object.key);
        ObjectReader {
            key: object.key.clone(),
            lines: LineReader::new(body, start_offset, Some(max_line_length)),
            decoder: self.clone(),
        }
    }
}

/// 📖 A reader bound to one object. Dropped when the object is exhausted or abandoned.
#[derive(Debug)]
pub struct ObjectReader {
    key: String,
    lines: LineReader,
    decoder: DecoderBackend,
}

impl ObjectReader {
    pub async fn read_next(&mut self) -> Result<ReadOutcome, ReadError> {
        let Some(the_line) = self.lines.next_line().await? else {
            return Ok(ReadOutcome::EndOfObject);
        };
        let the_offset = the_line.offset;
        let the_next_offset = the_line.next_offset;
        let the_record = self
            .decoder
            .decode_line(&self.key, the_line)
            .map_err(|message| ReadError::Decode {
                offset: the_offset,
                message,
            })?;
        Ok(ReadOutcome::Record {
            record: the_record,
            next_offset: the_next_offset,
        })
    }
}

/// 🕳️ A body with nothing in it, for objects whose stored offset is already at the end.
pub fn empty_body() -> ObjectBody {
    Box::new(tokio::io::empty())
}
