//! Fixed-length framing

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{ImitarError, Result};
use super::{check_header, find, MessageParser};

/// Emits frames of exactly `frame_length` bytes
///
/// With a header marker, everything before the marker is discarded as
/// garbage before each frame is cut; the marker is part of the frame.
/// Without one, frames are cut back to back from the start of the buffer.
#[derive(Debug, Clone)]
pub struct FixedLengthParser {
    header: Option<Vec<u8>>,
    frame_length: usize,
}

impl FixedLengthParser {
    pub fn new(header: Option<Vec<u8>>, frame_length: usize) -> Result<Self> {
        if frame_length == 0 {
            return Err(ImitarError::Config("frame length must be positive".to_string()));
        }
        check_header(&header)?;
        if let Some(marker) = &header {
            if marker.len() > frame_length {
                return Err(ImitarError::Config(format!(
                    "header marker ({} bytes) is longer than the frame ({} bytes)",
                    marker.len(),
                    frame_length
                )));
            }
        }
        Ok(Self { header, frame_length })
    }

    pub fn frame_length(&self) -> usize {
        self.frame_length
    }
}

impl MessageParser for FixedLengthParser {
    fn process_buffer(&self, buffer: &mut BytesMut) -> Vec<Bytes> {
        let mut frames = Vec::new();

        // Garbage is only dropped once a whole frame's worth of bytes is buffered.
        while buffer.len() >= self.frame_length {
            if let Some(marker) = &self.header {
                match find(buffer, marker) {
                    Some(start) => buffer.advance(start),
                    None => break,
                }
            }

            if buffer.len() < self.frame_length {
                break;
            }

            frames.push(buffer.split_to(self.frame_length).freeze());
        }

        frames
    }
}
