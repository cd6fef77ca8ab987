//! Client Worker
//!
//! Long-lived thread that serves one connection at a time.
//!
//! ## States
//! ```text
//!            intake queue
//!   ┌──────┐ ───────────► ┌──────────┐
//!   │ Idle │              │ Assigned │ ── read ─► parse ─► handle ─► outbound
//!   └──────┘ ◄─────────── └──────────┘
//!            peer closed / CloseConnection
//! ```
//!
//! The only state other threads see is the [`WorkerSlot`]: the current
//! session id and the two channel ends used to reach the worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};

use crate::framing::MessageParser;
use crate::protocol::{Message, MessageHandler, Response, TextEncoding};
use super::connection::{is_disconnect, is_timeout, Connection};

/// Requests the server sends to a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    /// Drop the connection of this session, keep running
    CloseConnection(u64),

    /// Release the connection and exit
    Stop,
}

/// A framed payload waiting for fan-out
#[derive(Debug, Clone)]
pub(crate) struct Broadcast {
    pub payload: Bytes,

    /// Worker that produced it; `None` for server-initiated broadcasts
    pub origin: Option<usize>,
}

/// Payload queued for one specific connection
#[derive(Debug)]
struct Outbound {
    session: u64,
    payload: Bytes,
}

/// Setup shared by every worker of a server
pub(crate) struct WorkerContext {
    pub parser: Arc<dyn MessageParser>,
    pub handler: Arc<dyn MessageHandler>,
    pub encoding: Option<TextEncoding>,
    pub terminator: Bytes,

    /// Already encoded and terminated
    pub welcome: Option<Bytes>,
    pub read_chunk_size: usize,
    pub max_buffer_size: usize,
    pub debug_logging: bool,
}

impl WorkerContext {
    /// Encode a handler payload and append the terminator
    pub fn frame(&self, message: &Message) -> crate::Result<Bytes> {
        let body = message.encode(self.encoding)?;
        Ok(frame_payload(&body, &self.terminator))
    }
}

/// Append the response terminator to an encoded payload
pub(crate) fn frame_payload(body: &[u8], terminator: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(body.len() + terminator.len());
    framed.extend_from_slice(body);
    framed.extend_from_slice(terminator);
    framed.freeze()
}

/// Handle the server keeps for each worker
pub(crate) struct WorkerSlot {
    pub id: usize,

    /// 0 while idle, otherwise the id of the connection being served
    session: AtomicU64,
    outbound: Sender<Outbound>,
    control: Sender<Control>,
}

impl WorkerSlot {
    pub fn is_assigned(&self) -> bool {
        self.session.load(Ordering::Acquire) != 0
    }

    /// Queue a payload for the current connection; idle workers get nothing
    pub fn deliver(&self, payload: Bytes) {
        let session = self.session.load(Ordering::Acquire);
        if session == 0 {
            return;
        }
        // A connection released in the meantime discards it on drain.
        let _ = self.outbound.send(Outbound { session, payload });
    }

    /// Ask the worker to drop the connection it is serving right now
    ///
    /// The request names the current session, so it cannot hit a connection
    /// assigned after it was sent.
    pub fn close_connection(&self) {
        let session = self.session.load(Ordering::Acquire);
        if session == 0 {
            return;
        }
        let _ = self.control.send(Control::CloseConnection(session));
    }

    pub fn stop(&self) {
        let _ = self.control.send(Control::Stop);
    }
}

/// What woke an idle worker up
enum Wakeup {
    Connection(Connection),
    Ignored,
    Exit,
}

/// Serves one connection at a time
pub(crate) struct Worker {
    slot: Arc<WorkerSlot>,
    ctx: Arc<WorkerContext>,
    intake: Receiver<Connection>,
    control: Receiver<Control>,
    outbound: Receiver<Outbound>,
    broadcasts: Sender<Broadcast>,

    connection: Option<Connection>,
    session: u64,
    sessions_served: u64,

    /// Bytes not yet resolved into a message
    buffer: BytesMut,
    chunk: Vec<u8>,
}

impl Worker {
    /// Create a worker and the slot the server uses to reach it
    pub fn new(
        id: usize,
        ctx: Arc<WorkerContext>,
        intake: Receiver<Connection>,
        broadcasts: Sender<Broadcast>,
    ) -> (Self, Arc<WorkerSlot>) {
        let (outbound_tx, outbound_rx) = channel::unbounded();
        let (control_tx, control_rx) = channel::unbounded();

        let slot = Arc::new(WorkerSlot {
            id,
            session: AtomicU64::new(0),
            outbound: outbound_tx,
            control: control_tx,
        });

        let chunk = vec![0u8; ctx.read_chunk_size];
        let worker = Self {
            slot: Arc::clone(&slot),
            ctx,
            intake,
            control: control_rx,
            outbound: outbound_rx,
            broadcasts,
            connection: None,
            session: 0,
            sessions_served: 0,
            buffer: BytesMut::new(),
            chunk,
        };

        (worker, slot)
    }

    /// Run until stopped or until the server goes away
    pub fn run(mut self) {
        tracing::debug!("Worker {} started", self.slot.id);

        loop {
            if self.connection.is_none() {
                match self.wait_for_connection() {
                    Wakeup::Connection(connection) => self.assign(connection),
                    Wakeup::Ignored => {}
                    Wakeup::Exit => break,
                }
                continue;
            }

            match self.control.try_recv() {
                Ok(Control::CloseConnection(session)) if session == self.session => {
                    self.release();
                    continue;
                }
                Ok(Control::CloseConnection(session)) => {
                    tracing::trace!("Worker {} ignoring close for old session {:#x}", self.slot.id, session);
                }
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            self.receive();
            self.send_pending();
        }

        self.release();
        tracing::debug!("Worker {} stopped", self.slot.id);
    }

    fn wait_for_connection(&self) -> Wakeup {
        if self.stop_requested() {
            return Wakeup::Exit;
        }

        crossbeam::select! {
            recv(self.intake) -> connection => match connection {
                // select! picks at random when both are ready
                Ok(connection) if self.stop_requested() => {
                    connection.close();
                    Wakeup::Exit
                }
                Ok(connection) => Wakeup::Connection(connection),
                Err(_) => Wakeup::Exit,
            },
            recv(self.control) -> control => match control {
                Ok(Control::CloseConnection(_)) => Wakeup::Ignored,
                Ok(Control::Stop) | Err(_) => Wakeup::Exit,
            },
        }
    }

    /// Drain control requests while idle, reporting whether a stop is pending
    ///
    /// Close requests seen here are stale, there is no connection to close.
    fn stop_requested(&self) -> bool {
        loop {
            match self.control.try_recv() {
                Ok(Control::CloseConnection(_)) => continue,
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => return true,
                Err(TryRecvError::Empty) => return false,
            }
        }
    }

    fn assign(&mut self, mut connection: Connection) {
        let peer = connection.peer_addr();
        tracing::debug!("Worker {} serving {}", self.slot.id, peer);

        self.sessions_served += 1;
        self.session = ((self.slot.id as u64) << 32) | (self.sessions_served & 0xffff_ffff);
        self.buffer.clear();
        self.slot.session.store(self.session, Ordering::Release);

        if let Some(welcome) = &self.ctx.welcome {
            if let Err(e) = connection.send(welcome).and_then(|_| connection.flush()) {
                tracing::warn!("Failed to send welcome message to {}: {}", peer, e);
            }
        }

        self.connection = Some(connection);
    }

    /// Drop the connection and everything tied to it
    fn release(&mut self) {
        if let Some(connection) = self.connection.take() {
            tracing::debug!("{} disconnected, cleaning up", connection.peer_addr());
            connection.close();
        }

        self.slot.session.store(0, Ordering::Release);
        self.session = 0;
        self.buffer.clear();
        while self.outbound.try_recv().is_ok() {}
    }

    /// One read attempt, followed by parsing and dispatch
    fn receive(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let peer = connection.peer_addr();

        match connection.read(&mut self.chunk) {
            Ok(0) => self.release(),
            Ok(n) => {
                self.buffer.extend_from_slice(&self.chunk[..n]);
                self.dispatch(peer);
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) if is_disconnect(&e) => {
                tracing::debug!("Connection to {} lost: {}", peer, e);
                self.release();
            }
            Err(e) => tracing::warn!("Error reading from {}: {}", peer, e),
        }
    }

    fn dispatch(&mut self, peer: std::net::SocketAddr) {
        if self.ctx.debug_logging {
            tracing::debug!("buffer from {}: {:?}", peer, self.buffer);
        } else {
            tracing::trace!("buffer from {}: {:?}", peer, self.buffer);
        }

        let frames = self.ctx.parser.process_buffer(&mut self.buffer);

        for frame in frames {
            if frame.is_empty() {
                continue;
            }

            let message = match Message::decode(frame, self.ctx.encoding) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("Dropping undecodable message from {}: {}", peer, e);
                    continue;
                }
            };

            if let Some(response) = self.invoke_handler(message, peer) {
                self.queue_response(response, peer);
            }
        }

        if self.buffer.len() > self.ctx.max_buffer_size {
            tracing::warn!(
                "Buffer for {} grew to {} bytes without a complete message, dropping it",
                peer,
                self.buffer.len()
            );
            self.buffer.clear();
        }
    }

    /// Call the handler, containing errors and panics to this message
    fn invoke_handler(&self, message: Message, peer: std::net::SocketAddr) -> Option<Response> {
        let handler = &self.ctx.handler;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle_message(message))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!("Handler failed for message from {}: {}", peer, e);
                None
            }
            Err(payload) => {
                tracing::error!(
                    "Handler panicked on worker {} ({}): {}",
                    self.slot.id,
                    peer,
                    panic_message(payload.as_ref())
                );
                None
            }
        }
    }

    fn queue_response(&self, response: Response, peer: std::net::SocketAddr) {
        let payload = match self.ctx.frame(&response.payload) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Cannot encode response for {}: {}", peer, e);
                return;
            }
        };

        let _ = self.slot.outbound.send(Outbound {
            session: self.session,
            payload: payload.clone(),
        });

        if response.broadcast {
            let broadcast = Broadcast {
                payload,
                origin: Some(self.slot.id),
            };
            if self.broadcasts.send(broadcast).is_err() {
                tracing::debug!("Broadcast queue closed, not fanning out");
            }
        }
    }

    /// Write out everything queued for the current connection
    fn send_pending(&mut self) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };
        let peer = connection.peer_addr();

        let mut wrote = false;
        let mut result = Ok(());
        while let Ok(outbound) = self.outbound.try_recv() {
            if outbound.session != self.session {
                continue;
            }
            result = connection.send(&outbound.payload);
            if result.is_err() {
                break;
            }
            wrote = true;
        }
        if result.is_ok() && wrote {
            result = connection.flush();
        }

        match result {
            Ok(()) => {}
            Err(e) if is_disconnect(&e) => {
                tracing::debug!("{} went away while sending: {}", peer, e);
                self.release();
            }
            Err(e) => tracing::warn!("Error writing to {}: {}", peer, e),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
