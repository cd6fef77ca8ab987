//! Framing Module
//!
//! Turns a raw byte stream into discrete protocol messages.
//!
//! ## Contract
//! A parser consumes complete frames from the front of the buffer and leaves
//! the unconsumed remainder in place. Parsing is a pure function of the
//! buffer contents: re-running it on a longer prefix of the same stream
//! yields exactly the frames a single pass over that prefix would, and an
//! incomplete trailing frame is kept verbatim.
//!
//! ## Variants
//! ```text
//! Delimited       MESSAGE ONE\r\nMESSAGE TWO\r\nMESS
//!                 └── frame ──┘  └── frame ──┘  └ leftover
//!
//! FixedLength     [garbage] HDR b b ... (frame_length bytes incl. HDR)
//!
//! VariableLength  [garbage] HDR .. LEN [payload: LEN + footer_length bytes]
//!                           └ length_field_offset ┘
//! ```

mod delimited;
mod fixed;
mod variable;

pub use delimited::DelimitedParser;
pub use fixed::FixedLengthParser;
pub use variable::VariableLengthParser;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{ImitarError, Result};
use crate::protocol::TextEncoding;

/// Splits an accumulated byte buffer into complete frames
pub trait MessageParser: Send + Sync {
    /// Remove every complete frame from the front of `buffer`
    ///
    /// Whatever is left in `buffer` afterwards is the unconsumed remainder.
    fn process_buffer(&self, buffer: &mut BytesMut) -> Vec<Bytes>;

    /// Encoding the parser wants applied to its frames, if any
    fn encoding(&self) -> Option<TextEncoding> {
        None
    }

    /// Parse a standalone slice, returning the frames and the leftover bytes
    fn parse(&self, input: &[u8]) -> (Vec<Bytes>, BytesMut) {
        let mut buffer = BytesMut::from(input);
        let frames = self.process_buffer(&mut buffer);
        (frames, buffer)
    }
}

/// Framing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// Frames end with `separator`
    Delimited {
        separator: Vec<u8>,
        encoding: Option<TextEncoding>,
    },

    /// Frames are `frame_length` bytes, optionally starting at `header`
    FixedLength {
        header: Option<Vec<u8>>,
        frame_length: usize,
    },

    /// A length byte at `length_field_offset` from the header gives the
    /// payload size, not counting `footer_length` trailing bytes
    VariableLength {
        header: Option<Vec<u8>>,
        length_field_offset: usize,
        footer_length: usize,
    },
}

impl Framing {
    /// CRLF-delimited ASCII lines, the most common control protocol shape
    pub fn crlf_ascii() -> Self {
        Framing::Delimited {
            separator: b"\r\n".to_vec(),
            encoding: Some(TextEncoding::Ascii),
        }
    }

    /// Build the parser described by this configuration
    pub fn build(&self) -> Result<Arc<dyn MessageParser>> {
        let parser: Arc<dyn MessageParser> = match self {
            Framing::Delimited { separator, encoding } => {
                Arc::new(DelimitedParser::new(separator.clone(), *encoding)?)
            }
            Framing::FixedLength { header, frame_length } => {
                Arc::new(FixedLengthParser::new(header.clone(), *frame_length)?)
            }
            Framing::VariableLength {
                header,
                length_field_offset,
                footer_length,
            } => Arc::new(VariableLengthParser::new(
                header.clone(),
                *length_field_offset,
                *footer_length,
            )?),
        };
        Ok(parser)
    }

    /// Bytes appended to outbound payloads when nothing else is configured
    pub fn default_terminator(&self) -> Vec<u8> {
        match self {
            Framing::Delimited { separator, .. } => separator.clone(),
            _ => Vec::new(),
        }
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::crlf_ascii()
    }
}

/// Position of the first occurrence of `needle` in `haystack`
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Reject empty header markers
pub(crate) fn check_header(header: &Option<Vec<u8>>) -> Result<()> {
    match header {
        Some(marker) if marker.is_empty() => Err(ImitarError::Config(
            "header marker must not be empty, use None instead".to_string(),
        )),
        _ => Ok(()),
    }
}
