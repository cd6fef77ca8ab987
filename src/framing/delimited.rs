//! Delimiter-separated framing

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{ImitarError, Result};
use crate::protocol::TextEncoding;
use super::{find, MessageParser};

/// Splits the stream on a fixed separator sequence
///
/// The segment after the last separator is never a frame, it stays in the
/// buffer (possibly empty). Adjacent separators produce empty frames.
#[derive(Debug, Clone)]
pub struct DelimitedParser {
    separator: Vec<u8>,
    encoding: Option<TextEncoding>,
}

impl DelimitedParser {
    pub fn new(separator: impl Into<Vec<u8>>, encoding: Option<TextEncoding>) -> Result<Self> {
        let separator = separator.into();
        if separator.is_empty() {
            return Err(ImitarError::Config("separator must not be empty".to_string()));
        }
        Ok(Self { separator, encoding })
    }

    /// Build from a text separator, encoded with `encoding`
    pub fn with_text_separator(separator: &str, encoding: TextEncoding) -> Result<Self> {
        Self::new(encoding.encode(separator)?, Some(encoding))
    }

    pub fn separator(&self) -> &[u8] {
        &self.separator
    }
}

impl MessageParser for DelimitedParser {
    fn process_buffer(&self, buffer: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();

        while let Some(pos) = find(buffer, &self.separator) {
            frames.push(buffer.split_to(pos).freeze());
            buffer.advance(self.separator.len());
        }

        frames
    }

    fn encoding(&self) -> Option<TextEncoding> {
        self.encoding
    }
}
