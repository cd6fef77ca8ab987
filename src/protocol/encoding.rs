//! Text encodings
//!
//! Converts frames to text for line-oriented device protocols.

use std::fmt;
use std::str::FromStr;

use crate::error::{ImitarError, Result};

/// Character encoding applied to frames and text responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// 7-bit ASCII; any byte >= 0x80 is rejected
    Ascii,

    /// UTF-8
    Utf8,

    /// ISO-8859-1, every byte maps to the code point of the same value
    Latin1,
}

impl TextEncoding {
    /// Decode a frame into text
    pub fn decode(&self, bytes: &[u8]) -> Result<String> {
        match self {
            TextEncoding::Ascii => {
                if let Some(pos) = bytes.iter().position(|b| !b.is_ascii()) {
                    return Err(ImitarError::Encoding(format!(
                        "byte 0x{:02x} at offset {} is not ASCII",
                        bytes[pos], pos
                    )));
                }
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| ImitarError::Encoding(format!("invalid UTF-8: {}", e))),
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    /// Encode text for the wire
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            TextEncoding::Ascii => {
                if !text.is_ascii() {
                    return Err(ImitarError::Encoding(format!(
                        "{:?} contains non-ASCII characters",
                        text
                    )));
                }
                Ok(text.as_bytes().to_vec())
            }
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(u32::from(c)).map_err(|_| {
                        ImitarError::Encoding(format!("{:?} is outside ISO-8859-1", c))
                    })
                })
                .collect(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextEncoding::Ascii => "ascii",
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Latin1 => "latin-1",
        };
        f.write_str(name)
    }
}

impl FromStr for TextEncoding {
    type Err = ImitarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            "latin-1" | "latin1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(ImitarError::Config(format!("Unknown text encoding: {}", other))),
        }
    }
}
