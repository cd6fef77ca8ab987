//! TCP Server
//!
//! Accepts connections and hands them to a fixed pool of workers.
//!
//! ## Threads
//! - one acceptor polling a non-blocking listener
//! - one broadcast dispatcher fanning payloads out to workers
//! - `worker_pool_size` workers, each serving one connection at a time
//!
//! Connections beyond the number of idle workers wait in the intake queue,
//! unserved, until a worker frees up.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError, TrySendError};

use crate::config::ServerConfig;
use crate::error::{ImitarError, Result};
use crate::framing::MessageParser;
use crate::protocol::{Message, MessageHandler, TextEncoding};
use super::connection::Connection;
use super::worker::{frame_payload, Broadcast, Worker, WorkerContext, WorkerSlot};

/// State reachable from every [`ServerHandle`]
struct Shared {
    workers: Vec<Arc<WorkerSlot>>,
    broadcasts: Sender<Broadcast>,
    shutting_down: AtomicBool,
    encoding: Option<TextEncoding>,
    terminator: Bytes,
}

impl Shared {
    /// Deliver to every assigned worker except the originator
    fn fan_out(&self, broadcast: Broadcast) {
        for slot in &self.workers {
            if Some(slot.id) == broadcast.origin {
                continue;
            }
            slot.deliver(broadcast.payload.clone());
        }
    }
}

/// Cloneable control handle for a running server
///
/// Device emulators keep one to push unsolicited messages and to simulate
/// mass disconnects.
#[derive(Clone)]
pub struct ServerHandle {
    inner: Arc<Shared>,
}

impl ServerHandle {
    /// Send a message to every connected client
    ///
    /// The payload is written as-is plus the response terminator, bypassing
    /// the framing layer.
    pub fn broadcast(&self, message: impl Into<Message>) -> Result<()> {
        if self.is_shutting_down() {
            return Err(ImitarError::Network("server is shutting down".to_string()));
        }

        let body = message.into().encode(self.inner.encoding)?;
        let broadcast = Broadcast {
            payload: frame_payload(&body, &self.inner.terminator),
            origin: None,
        };

        self.inner
            .broadcasts
            .send(broadcast)
            .map_err(|_| ImitarError::Network("broadcast queue closed".to_string()))
    }

    /// Make every worker drop its connection, without stopping the workers
    pub fn close_all_clients(&self) {
        tracing::debug!("Closing all client connections");
        for slot in &self.inner.workers {
            slot.close_connection();
        }
    }

    /// Number of workers currently serving a connection
    pub fn connected_clients(&self) -> usize {
        self.inner
            .workers
            .iter()
            .filter(|slot| slot.is_assigned())
            .count()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }
}

/// TCP server emulating a networked device
pub struct Server {
    local_addr: SocketAddr,
    handle: ServerHandle,

    /// Dropped on shutdown; receivers see the disconnect immediately
    shutdown_signal: Option<Sender<()>>,

    accept_thread: Option<JoinHandle<()>>,
    broadcast_thread: Option<JoinHandle<()>>,
    worker_threads: Vec<JoinHandle<()>>,
}

impl Server {
    /// Bind and start serving, with the parser described by `config.framing`
    pub fn start<H: MessageHandler>(config: ServerConfig, handler: Arc<H>) -> Result<Self> {
        let parser = config.framing.build()?;
        Self::with_parser(config, parser, handler)
    }

    /// Bind and start serving with a custom parser
    pub fn with_parser<H: MessageHandler>(
        config: ServerConfig,
        parser: Arc<dyn MessageParser>,
        handler: Arc<H>,
    ) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_addr())?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let encoding = parser.encoding().or(config.text_encoding);
        let terminator = Bytes::from(config.terminator());
        let welcome = match &config.welcome_message {
            Some(text) => {
                let body = Message::from(text.as_str()).encode(encoding)?;
                Some(frame_payload(&body, &terminator))
            }
            None => None,
        };

        let handler: Arc<dyn MessageHandler> = handler;
        let ctx = Arc::new(WorkerContext {
            parser,
            handler,
            encoding,
            terminator: terminator.clone(),
            welcome,
            read_chunk_size: config.read_chunk_size,
            max_buffer_size: config.max_buffer_size,
            debug_logging: config.debug_logging,
        });

        let (intake_tx, intake_rx) = match config.intake_capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        let (broadcast_tx, broadcast_rx) = channel::unbounded();
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);

        let mut slots = Vec::with_capacity(config.worker_pool_size);
        let mut worker_threads = Vec::with_capacity(config.worker_pool_size);
        for id in 0..config.worker_pool_size {
            let (worker, slot) = Worker::new(
                id,
                Arc::clone(&ctx),
                intake_rx.clone(),
                broadcast_tx.clone(),
            );
            let thread = thread::Builder::new()
                .name(format!("imitar-worker-{}", id))
                .spawn(move || worker.run())?;
            slots.push(slot);
            worker_threads.push(thread);
        }
        drop(intake_rx);

        let shared = Arc::new(Shared {
            workers: slots,
            broadcasts: broadcast_tx,
            shutting_down: AtomicBool::new(false),
            encoding,
            terminator,
        });

        let broadcast_thread = {
            let shared = Arc::clone(&shared);
            let shutdown = shutdown_rx.clone();
            thread::Builder::new()
                .name("imitar-broadcast".to_string())
                .spawn(move || broadcast_loop(shared, broadcast_rx, shutdown))?
        };

        let settings = AcceptSettings {
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            poll: config.accept_poll(),
        };
        let accept_thread = thread::Builder::new()
            .name("imitar-accept".to_string())
            .spawn(move || accept_loop(listener, intake_tx, shutdown_rx, settings))?;

        tracing::info!(
            "Listening on {} with {} workers",
            local_addr,
            config.worker_pool_size
        );

        Ok(Self {
            local_addr,
            handle: ServerHandle { inner: shared },
            shutdown_signal: Some(shutdown_tx),
            accept_thread: Some(accept_thread),
            broadcast_thread: Some(broadcast_thread),
            worker_threads,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get a control handle
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// See [`ServerHandle::broadcast`]
    pub fn broadcast(&self, message: impl Into<Message>) -> Result<()> {
        self.handle.broadcast(message)
    }

    /// See [`ServerHandle::close_all_clients`]
    pub fn close_all_clients(&self) {
        self.handle.close_all_clients();
    }

    /// See [`ServerHandle::connected_clients`]
    pub fn connected_clients(&self) -> usize {
        self.handle.connected_clients()
    }

    /// Stop every thread and close the listener
    ///
    /// Order: stop taking new work, stop the workers, then close the
    /// listening socket. Returns once all threads have exited. Calling it
    /// again is a no-op.
    pub fn shutdown(&mut self) {
        if self.handle.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("Shutting down server on {}", self.local_addr);

        // Acceptor and broadcast dispatcher stop taking new work
        drop(self.shutdown_signal.take());

        tracing::debug!("Stopping workers");
        for slot in &self.handle.inner.workers {
            slot.stop();
        }

        // The acceptor owns the listener; it is closed when the thread exits
        if let Some(thread) = self.accept_thread.take() {
            join(thread);
        }
        if let Some(thread) = self.broadcast_thread.take() {
            join(thread);
        }
        for thread in self.worker_threads.drain(..) {
            join(thread);
        }

        tracing::info!("Server on {} stopped", self.local_addr);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn join(thread: JoinHandle<()>) {
    let name = thread.thread().name().unwrap_or("unnamed").to_string();
    if thread.join().is_err() {
        tracing::error!("Thread {} panicked", name);
    }
}

/// Per-connection socket settings applied by the acceptor
struct AcceptSettings {
    read_timeout: Duration,
    write_timeout: Duration,
    poll: Duration,
}

fn accept_loop(
    listener: TcpListener,
    intake: Sender<Connection>,
    shutdown: Receiver<()>,
    settings: AcceptSettings,
) {
    loop {
        if let Err(TryRecvError::Disconnected) = shutdown.try_recv() {
            break;
        }

        match listener.accept() {
            Ok((stream, addr)) => {
                accept_client(stream, addr, &intake, &settings);
                continue;
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => tracing::error!("Error accepting a client socket: {}", e),
        }

        crossbeam::select! {
            recv(shutdown) -> _ => break,
            default(settings.poll) => {}
        }
    }

    match listener.local_addr() {
        Ok(addr) => tracing::debug!("Listener on {} closed", addr),
        Err(e) => tracing::debug!("Listener closed ({})", e),
    }
}

fn accept_client(
    stream: TcpStream,
    addr: SocketAddr,
    intake: &Sender<Connection>,
    settings: &AcceptSettings,
) {
    tracing::debug!("Accepting connection from {}", addr);

    let connection = match Connection::new(stream, addr).and_then(|connection| {
        connection.set_timeouts(settings.read_timeout, settings.write_timeout)?;
        Ok(connection)
    }) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!("Failed to set up connection from {}: {}", addr, e);
            return;
        }
    };

    match intake.try_send(connection) {
        Ok(()) => {}
        Err(TrySendError::Full(connection)) => {
            tracing::warn!("Intake queue full, rejecting {}", addr);
            connection.close();
        }
        Err(TrySendError::Disconnected(connection)) => connection.close(),
    }
}

fn broadcast_loop(shared: Arc<Shared>, broadcasts: Receiver<Broadcast>, shutdown: Receiver<()>) {
    loop {
        crossbeam::select! {
            recv(shutdown) -> _ => break,
            recv(broadcasts) -> broadcast => match broadcast {
                Ok(broadcast) => shared.fan_out(broadcast),
                Err(_) => break,
            },
        }
    }
    tracing::debug!("Broadcast loop stopped");
}
