//! Connection
//!
//! A client socket owned by at most one worker at a time.

use std::io::{self, BufWriter, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// An accepted client connection
pub struct Connection {
    /// TCP stream used for reads
    reader: TcpStream,

    /// TCP stream writer (buffered so a drained queue goes out in one flush)
    writer: BufWriter<TcpStream>,

    /// Peer address for logging
    peer_addr: SocketAddr,
}

impl Connection {
    /// Wrap an accepted stream
    ///
    /// The listener is non-blocking, and some platforms let accepted sockets
    /// inherit that, so blocking mode is restored here.
    pub fn new(stream: TcpStream, peer_addr: SocketAddr) -> Result<Self> {
        stream.set_nonblocking(false)?;

        // Disable Nagle's algorithm, device replies are small
        stream.set_nodelay(true)?;

        let write_stream = stream.try_clone()?;

        Ok(Self {
            reader: stream,
            writer: BufWriter::new(write_stream),
            peer_addr,
        })
    }

    /// Configure connection timeouts
    pub fn set_timeouts(&self, read: Duration, write: Duration) -> Result<()> {
        if !read.is_zero() {
            self.reader.set_read_timeout(Some(read))?;
        }
        if !write.is_zero() {
            self.writer.get_ref().set_write_timeout(Some(write))?;
        }
        Ok(())
    }

    /// Read whatever is available, `Ok(0)` means the peer closed
    pub fn read(&mut self, chunk: &mut [u8]) -> io::Result<usize> {
        self.reader.read(chunk)
    }

    /// Queue bytes for sending
    pub fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        self.writer.write_all(payload)
    }

    /// Push queued bytes onto the socket
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Shut the socket down in both directions and drop it
    pub fn close(self) {
        // Anything still buffered belonged to a failed write; drop it instead of retrying.
        let (_write_stream, unsent) = self.writer.into_parts();
        if let Ok(unsent) = unsent {
            if !unsent.is_empty() {
                tracing::trace!("Discarding {} unsent bytes for {}", unsent.len(), self.peer_addr);
            }
        }
        if let Err(e) = self.reader.shutdown(Shutdown::Both) {
            tracing::trace!("Shutdown of {} failed: {}", self.peer_addr, e);
        }
    }

    /// Get the peer address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

/// Read errors that just mean nothing arrived within the timeout
pub(crate) fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        // Windows reports TimedOut instead of WouldBlock
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Errors after which the peer is definitely gone
pub(crate) fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
    )
}
