//! Process stop signal
//!
//! The emulator binaries block on a [`StopSignal`] and shut the server down
//! once it fires, whether from SIGINT, SIGTERM or an operator `quit`.

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::Result;

/// One-shot stop request shared between a signal handler and `main`
#[derive(Clone)]
pub struct StopSignal {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(1);
        Self { sender, receiver }
    }

    /// Request a stop; extra requests collapse into the pending one
    pub fn trigger(&self) {
        let _ = self.sender.try_send(());
    }

    /// Block until a stop is requested
    pub fn wait(&self) {
        let _ = self.receiver.recv();
    }

    /// Whether a stop is pending, without consuming it
    pub fn is_triggered(&self) -> bool {
        !self.receiver.is_empty()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Stop signal raised on SIGINT or SIGTERM
///
/// Only one handler can be installed per process, so this succeeds once.
pub fn stop_signal() -> Result<StopSignal> {
    let stop = StopSignal::new();
    let handler = stop.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Termination signal received");
        handler.trigger();
    })?;
    Ok(stop)
}
