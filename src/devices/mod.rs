//! Devices Module
//!
//! Reference [`MessageHandler`](crate::protocol::MessageHandler)
//! implementations emulating real hardware.
//!
//! Each device keeps its state behind a single `parking_lot::Mutex`, since
//! workers call the handler concurrently. A device that pushes unsolicited
//! messages needs a [`ServerHandle`] attached after the server starts.

mod fake_tv;
mod extron;

pub use fake_tv::FakeTv;
pub use extron::ExtronMps601;

use parking_lot::Mutex;

use crate::error::{ImitarError, Result};
use crate::network::ServerHandle;
use crate::protocol::Message;

/// Late-bound server handle for unsolicited broadcasts
#[derive(Default)]
pub(crate) struct Transport {
    handle: Mutex<Option<ServerHandle>>,
}

impl Transport {
    pub fn attach(&self, handle: ServerHandle) {
        *self.handle.lock() = Some(handle);
    }

    pub fn broadcast(&self, message: impl Into<Message>) -> Result<()> {
        match self.handle.lock().as_ref() {
            Some(handle) => handle.broadcast(message),
            None => Err(ImitarError::Network(
                "device is not attached to a server".to_string(),
            )),
        }
    }

    pub fn close_all_clients(&self) {
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.close_all_clients();
        }
    }
}

/// Text of a message, lossily decoded when it arrived as bytes
pub(crate) fn message_text(message: &Message) -> String {
    match message {
        Message::Text(text) => text.clone(),
        Message::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}
