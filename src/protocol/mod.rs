//! Protocol Module
//!
//! Types exchanged between the network core and device handlers.
//!
//! ## Flow
//! ```text
//! bytes ──► MessageParser ──► frame ──► Message::decode ──► MessageHandler
//!                                                                │
//!        socket ◄── encode + terminator ◄── Response ◄───────────┘
//! ```
//!
//! The wire format itself is decided by the framing configuration, not here.

mod encoding;
mod message;
mod response;
mod handler;

pub use encoding::TextEncoding;
pub use message::Message;
pub use response::Response;
pub use handler::MessageHandler;
