//! Variable-length framing

use bytes::{Buf, Bytes, BytesMut};

use crate::error::Result;
use super::{check_header, find, MessageParser};

/// Frames carrying a one-byte length field after a header marker
///
/// Layout relative to the marker:
/// ```text
/// ┌────────┬─────┬──────────┬───────────────────────────────┐
/// │ marker │ ... │ LEN (1)  │ payload (LEN + footer_length) │
/// └────────┴─────┴──────────┴───────────────────────────────┘
/// 0                ^ length_field_offset
/// ```
/// Only the payload is emitted. Bytes preceding a marker are discarded.
#[derive(Debug, Clone)]
pub struct VariableLengthParser {
    header: Option<Vec<u8>>,
    length_field_offset: usize,
    footer_length: usize,
}

impl VariableLengthParser {
    pub fn new(
        header: Option<Vec<u8>>,
        length_field_offset: usize,
        footer_length: usize,
    ) -> Result<Self> {
        check_header(&header)?;
        Ok(Self {
            header,
            length_field_offset,
            footer_length,
        })
    }
}

impl MessageParser for VariableLengthParser {
    fn process_buffer(&self, buffer: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();

        loop {
            if let Some(marker) = &self.header {
                match find(buffer, marker) {
                    Some(start) => buffer.advance(start),
                    None => break,
                }
            }

            if self.length_field_offset >= buffer.len() {
                break;
            }

            let payload_length = buffer[self.length_field_offset] as usize + self.footer_length;
            let start = self.length_field_offset + 1;
            let end = start + payload_length;

            if end > buffer.len() {
                break;
            }

            let mut frame = buffer.split_to(end);
            frame.advance(start);
            frames.push(frame.freeze());
        }

        frames
    }
}
