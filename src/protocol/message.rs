//! Message definitions
//!
//! One decoded protocol unit.

use bytes::Bytes;

use crate::error::Result;
use super::TextEncoding;

/// A complete message, either decoded text or the raw frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    /// Turn a raw frame into a message, decoding it when an encoding is configured
    pub fn decode(frame: Bytes, encoding: Option<TextEncoding>) -> Result<Self> {
        match encoding {
            Some(encoding) => Ok(Message::Text(encoding.decode(&frame)?)),
            None => Ok(Message::Binary(frame)),
        }
    }

    /// Serialize for the wire; text without an encoding is sent as UTF-8
    pub fn encode(&self, encoding: Option<TextEncoding>) -> Result<Bytes> {
        match self {
            Message::Text(text) => match encoding {
                Some(encoding) => Ok(Bytes::from(encoding.encode(text)?)),
                None => Ok(Bytes::copy_from_slice(text.as_bytes())),
            },
            Message::Binary(bytes) => Ok(bytes.clone()),
        }
    }

    /// The text, if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }

    /// The raw bytes of the message
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(bytes) => bytes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Message::Binary(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Message {
    fn from(bytes: &[u8]) -> Self {
        Message::Binary(Bytes::copy_from_slice(bytes))
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Message::Binary(bytes)
    }
}
