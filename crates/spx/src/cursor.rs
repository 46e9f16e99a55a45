//! 🏷️ Cursor — the bookmark the calling runtime carries between cycles.
//!
//! Internally it is a boring struct: which key, where inside it, and a sequence number.
//! On the wire it is one string, `<key>::<offset>::<sequence>`, with `-1` standing in
//! for "this object is done, the next key is not known yet".
//!
//! 🧠 Knowledge graph:
//! - Only [`Cursor::encode`] and [`Cursor::decode`] ever touch the string form.
//! - Decoding splits from the right, so keys with `::` in them still round-trip.
//! - `None` / empty token = start of stream.

use std::fmt;

use crate::error::SpoolError;

const SEPARATOR: &str = "::";
const SENTINEL: &str = "-1";

/// 📍 Where inside an object the next read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Offset {
    /// 🏁 Fully consumed. Positioned to start the next object.
    Sentinel,
    /// 📏 Byte offset of the next unread record.
    At(u64),
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sentinel => f.write_str(SENTINEL),
            Self::At(the_offset) => write!(f, "{the_offset}"),
        }
    }
}

/// 🏷️ The structured resumption point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor {
    pub key: String,
    pub offset: Offset,
    pub sequence: u64,
}

impl Cursor {
    pub fn new(key: impl Into<String>, offset: Offset, sequence: u64) -> Self {
        Self {
            key: key.into(),
            offset,
            sequence,
        }
    }

    /// 📦 Serialize for the boundary. The runtime persists this verbatim.
    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.key, self.offset, self.sequence
        )
    }

    /// 🔍 Parse a token handed back by the runtime.
    ///
    /// `None` or an empty string means "start of stream" and decodes to `Ok(None)`.
    pub fn decode(token: Option<&str>) -> Result<Option<Self>, SpoolError> {
        let the_token = match token {
            None => return Ok(None),
            Some(t) if t.is_empty() => return Ok(None),
            Some(t) => t,
        };

        let malformed = |reason: &str| SpoolError::Cursor {
            token: the_token.to_string(),
            reason: reason.to_string(),
        };

        // -- 🔪 right to left: sequence, then offset, whatever is left is the key
        let mut the_parts = the_token.rsplitn(3, SEPARATOR);
        let the_sequence = the_parts
            .next()
            .ok_or_else(|| malformed("missing sequence"))?;
        let the_offset = the_parts
            .next()
            .ok_or_else(|| malformed("missing offset"))?;
        let the_key = the_parts.next().ok_or_else(|| malformed("missing key"))?;

        if the_key.is_empty() {
            return Err(malformed("empty object key"));
        }

        let sequence = the_sequence
            .parse::<u64>()
            .map_err(|e| malformed(&format!("sequence is not a number ({e})")))?;

        let offset = if the_offset == SENTINEL {
            Offset::Sentinel
        } else {
            Offset::At(
                the_offset
                    .parse::<u64>()
                    .map_err(|e| malformed(&format!("offset is not a number or -1 ({e})")))?,
            )
        };

        Ok(Some(Self {
            key: the_key.to_string(),
            offset,
            sequence,
        }))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
