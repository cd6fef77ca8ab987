//! Message handler capability
//!
//! Implemented by device emulators, invoked by workers.

use crate::error::Result;
use super::{Message, Response};

/// Handles one decoded message and optionally produces a response
///
/// ## Concurrency contract
/// Workers call `handle_message` in parallel, one call per connection at a
/// time but many connections at once. The core provides no mutual exclusion,
/// so any state shared between calls must be synchronized by the
/// implementation (a single `Mutex` around the device state is enough).
///
/// Returning `Err` or panicking only affects the current message: the error
/// is logged and the worker keeps serving its connection.
pub trait MessageHandler: Send + Sync + 'static {
    fn handle_message(&self, message: Message) -> Result<Option<Response>>;
}

impl<F> MessageHandler for F
where
    F: Fn(Message) -> Result<Option<Response>> + Send + Sync + 'static,
{
    fn handle_message(&self, message: Message) -> Result<Option<Response>> {
        self(message)
    }
}
