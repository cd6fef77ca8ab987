//! Configuration for Imitar
//!
//! Centralized server configuration with sensible defaults.

use std::time::Duration;

use crate::error::{ImitarError, Result};
use crate::framing::Framing;
use crate::protocol::TextEncoding;

/// Configuration for an emulated device server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Listener Configuration
    // -------------------------------------------------------------------------
    /// Interface to bind
    pub bind_host: String,

    /// TCP port, 0 picks an ephemeral port
    pub port: u16,

    /// How often the accept loop re-checks for shutdown (milliseconds)
    pub accept_poll_ms: u64,

    /// Connections allowed to wait for a worker. `None` never rejects.
    pub intake_capacity: Option<usize>,

    // -------------------------------------------------------------------------
    // Worker Configuration
    // -------------------------------------------------------------------------
    /// Number of workers, which is also the maximum number of served clients
    pub worker_pool_size: usize,

    /// Client read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Client write timeout (milliseconds)
    pub write_timeout_ms: u64,

    /// Bytes requested from the socket per read
    pub read_chunk_size: usize,

    /// Unconsumed bytes tolerated before the buffer is dropped
    pub max_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Protocol Configuration
    // -------------------------------------------------------------------------
    /// How the inbound byte stream is cut into messages
    pub framing: Framing,

    /// Encoding for frames and text responses when the parser has none of its own
    pub text_encoding: Option<TextEncoding>,

    /// Appended to every outbound payload; `None` derives it from `framing`
    pub response_terminator: Option<Vec<u8>>,

    /// Sent to each client when a worker picks it up
    pub welcome_message: Option<String>,

    /// Verbose logging of buffers and connection lifecycle
    pub debug_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 4999,
            accept_poll_ms: 50,
            intake_capacity: None,
            worker_pool_size: 4,
            read_timeout_ms: 200,
            write_timeout_ms: 5000,
            read_chunk_size: 4096,
            max_buffer_size: 64 * 1024, // 64 KB
            framing: Framing::default(),
            text_encoding: None,
            response_terminator: None,
            welcome_message: None,
            debug_logging: false,
        }
    }
}

impl ServerConfig {
    /// Create a new config builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Check the values a server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            return Err(ImitarError::Config("worker pool size must be at least 1".to_string()));
        }
        // Workers poll their control channel between reads
        if self.read_timeout_ms == 0 {
            return Err(ImitarError::Config("read timeout must be positive".to_string()));
        }
        if self.read_chunk_size == 0 {
            return Err(ImitarError::Config("read chunk size must be positive".to_string()));
        }
        if self.max_buffer_size == 0 {
            return Err(ImitarError::Config("max buffer size must be positive".to_string()));
        }
        if self.intake_capacity == Some(0) {
            return Err(ImitarError::Config("intake capacity must be positive".to_string()));
        }
        Ok(())
    }

    /// Terminator appended to outbound payloads
    pub fn terminator(&self) -> Vec<u8> {
        self.response_terminator
            .clone()
            .unwrap_or_else(|| self.framing.default_terminator())
    }

    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }
}

/// Builder for ServerConfig
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the interface to bind
    pub fn bind_host(mut self, host: impl Into<String>) -> Self {
        self.config.bind_host = host.into();
        self
    }

    /// Set the TCP port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the accept poll interval (in milliseconds)
    pub fn accept_poll_ms(mut self, ms: u64) -> Self {
        self.config.accept_poll_ms = ms;
        self
    }

    /// Bound the intake queue
    pub fn intake_capacity(mut self, capacity: usize) -> Self {
        self.config.intake_capacity = Some(capacity);
        self
    }

    /// Set the number of workers
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size;
        self
    }

    /// Set the cap on unconsumed buffered bytes
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.config.max_buffer_size = size;
        self
    }

    /// Set the framing
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set or clear the text encoding
    pub fn text_encoding(mut self, encoding: Option<TextEncoding>) -> Self {
        self.config.text_encoding = encoding;
        self
    }

    /// Override the bytes appended to outbound payloads
    pub fn response_terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        self.config.response_terminator = Some(terminator.into());
        self
    }

    /// Set the welcome message
    pub fn welcome_message(mut self, message: impl Into<String>) -> Self {
        self.config.welcome_message = Some(message.into());
        self
    }

    /// Enable debug logging
    pub fn debug_logging(mut self, enabled: bool) -> Self {
        self.config.debug_logging = enabled;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
