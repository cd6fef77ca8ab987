//! Error types for Imitar
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ImitarError
pub type Result<T> = std::result::Result<T, ImitarError>;

/// Unified error type for Imitar operations
#[derive(Debug, Error)]
pub enum ImitarError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Handler error: {0}")]
    Handler(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Process Errors
    // -------------------------------------------------------------------------
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),
}

impl ImitarError {
    /// Build a handler error from anything printable
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }
}
