//! # Imitar
//!
//! Test doubles for networked AV hardware (switchers, displays) served over
//! TCP, so client drivers can be exercised without the real device:
//! - Fixed worker pool, one connection per worker
//! - Broadcast fan-out of state changes to every other client
//! - Pluggable framing: delimited, fixed-length, variable-length
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Acceptor (non-blocking poll)                │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ intake queue
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │              Worker pool (N threads, fixed)                  │
//! │      read ─► MessageParser ─► MessageHandler ─► outbound     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ broadcast queue
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │        Broadcast dispatcher (all workers but origin)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod framing;
pub mod protocol;
pub mod network;
pub mod devices;
pub mod signal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ImitarError, Result};
pub use config::ServerConfig;
pub use framing::{Framing, MessageParser};
pub use network::{Server, ServerHandle};
pub use protocol::{Message, MessageHandler, Response, TextEncoding};
pub use signal::{stop_signal, StopSignal};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Imitar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Logging
// =============================================================================

/// Install the tracing subscriber used by the emulator binaries
///
/// `RUST_LOG` wins when set; otherwise `debug` selects between debug and
/// info output.
pub fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_filter = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
