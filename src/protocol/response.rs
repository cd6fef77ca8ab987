//! Response definitions
//!
//! Represents replies produced by a handler.

use super::Message;

/// A reply to the client that sent the message
///
/// The originator always receives the payload. With `broadcast` set it is
/// also fanned out to every other connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Payload, without the response terminator
    pub payload: Message,

    /// Whether other connected clients should see it too
    pub broadcast: bool,
}

impl Response {
    /// Create a response for the originator only
    pub fn reply(payload: impl Into<Message>) -> Self {
        Self {
            payload: payload.into(),
            broadcast: false,
        }
    }

    /// Create a response that is also sent to every other client
    pub fn broadcast(payload: impl Into<Message>) -> Self {
        Self {
            payload: payload.into(),
            broadcast: true,
        }
    }

    /// Create a response with an explicit broadcast flag
    pub fn new(payload: impl Into<Message>, broadcast: bool) -> Self {
        Self {
            payload: payload.into(),
            broadcast,
        }
    }
}
