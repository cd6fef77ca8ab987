//! Server Tests
//!
//! Tests verify, over real loopback connections:
//! - Welcome message and unicast replies
//! - Broadcast fan-out skipping the originator and idle workers
//! - Fixed pool capacity, with waiting clients served once a worker frees
//! - Buffer cleanup between connections on the same worker
//! - Mass disconnect, handler failure isolation, bounded intake
//! - Shutdown completeness

use std::io::{self, BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use imitar::config::ServerConfigBuilder;
use imitar::{
    Framing, ImitarError, Message, MessageParser, Response, Result, Server, ServerConfig,
    TextEncoding,
};

// =============================================================================
// Helper Functions
// =============================================================================

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

fn test_config() -> ServerConfigBuilder {
    ServerConfig::builder()
        .bind_host("127.0.0.1")
        .port(0)
        .read_timeout_ms(20)
        .accept_poll_ms(10)
        .welcome_message("HI")
}

/// Echo handler; `B:<text>` broadcasts `<text>` instead
fn echo(message: Message) -> Result<Option<Response>> {
    let text = message.as_text().unwrap_or_default().to_string();
    match text.strip_prefix("B:") {
        Some(rest) => Ok(Some(Response::broadcast(rest))),
        None => Ok(Some(Response::reply(text))),
    }
}

fn start(builder: ServerConfigBuilder) -> Server {
    Server::start(builder.build(), Arc::new(echo)).unwrap()
}

struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(WAIT)).unwrap();
        Self {
            reader: BufReader::new(stream.try_clone().unwrap()),
            writer: stream,
        }
    }

    /// Connect and wait for the welcome, so a worker is known to own us
    fn connect_served(addr: SocketAddr) -> Self {
        let mut client = Self::connect(addr);
        assert_eq!(client.read_line(), "HI");
        client
    }

    fn send(&mut self, data: &[u8]) {
        self.writer.write_all(data).unwrap();
    }

    fn send_line(&mut self, line: &str) {
        self.send(format!("{}\r\n", line).as_bytes());
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = self
            .reader
            .read_line(&mut line)
            .expect("timed out waiting for a line");
        assert!(n > 0, "connection closed while waiting for a line");
        line.trim_end_matches("\r\n").to_string()
    }

    fn assert_silent(&mut self) {
        self.writer.set_read_timeout(Some(QUIET)).unwrap();
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            other => panic!("expected silence, got {:?} {:?}", other, line),
        }
        self.writer.set_read_timeout(Some(WAIT)).unwrap();
    }

    fn assert_closed(&mut self) {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => {}
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => {}
            other => panic!("expected the server to close, got {:?} {:?}", other, line),
        }
    }
}

// =============================================================================
// Messaging Tests
// =============================================================================

#[test]
fn test_welcome_and_reply() {
    let server = start(test_config().worker_pool_size(2));
    let mut client = Client::connect_served(server.local_addr());

    client.send_line("POWR ?");
    assert_eq!(client.read_line(), "POWR ?");
}

#[test]
fn test_reply_goes_to_originator_only() {
    let server = start(test_config().worker_pool_size(2));
    let mut a = Client::connect_served(server.local_addr());
    let mut b = Client::connect_served(server.local_addr());

    a.send_line("ping");

    assert_eq!(a.read_line(), "ping");
    b.assert_silent();
}

#[test]
fn test_messages_split_across_writes() {
    let server = start(test_config());
    let mut client = Client::connect_served(server.local_addr());

    client.send(b"VOL");
    thread::sleep(Duration::from_millis(50));
    client.send(b"M 5\r\nMUTE 1\r");
    thread::sleep(Duration::from_millis(50));
    client.send(b"\n");

    assert_eq!(client.read_line(), "VOLM 5");
    assert_eq!(client.read_line(), "MUTE 1");
}

#[test]
fn test_empty_lines_are_not_dispatched() {
    let server = start(test_config());
    let mut client = Client::connect_served(server.local_addr());

    client.send(b"\r\n\r\nping\r\n");

    assert_eq!(client.read_line(), "ping");
    client.assert_silent();
}

// =============================================================================
// Broadcast Tests
// =============================================================================

#[test]
fn test_broadcast_reaches_every_other_client() {
    let server = start(test_config().worker_pool_size(3));
    let mut a = Client::connect_served(server.local_addr());
    let mut b = Client::connect_served(server.local_addr());
    let mut c = Client::connect_served(server.local_addr());

    a.send_line("B:VOLM 5");

    assert_eq!(b.read_line(), "VOLM 5");
    assert_eq!(c.read_line(), "VOLM 5");

    // The originator gets its own reply once, not an extra broadcast copy
    assert_eq!(a.read_line(), "VOLM 5");
    a.assert_silent();
}

#[test]
fn test_broadcast_skips_idle_workers() {
    let server = start(test_config().worker_pool_size(3));
    let mut a = Client::connect_served(server.local_addr());
    let mut b = Client::connect_served(server.local_addr());

    a.send_line("B:INPT VGA");
    assert_eq!(b.read_line(), "INPT VGA");
    assert_eq!(a.read_line(), "INPT VGA");

    // A client arriving afterwards sees nothing left over
    let mut late = Client::connect_served(server.local_addr());
    late.assert_silent();
}

#[test]
fn test_server_broadcast_reaches_all_clients() {
    let server = start(test_config().worker_pool_size(2));
    let mut a = Client::connect_served(server.local_addr());
    let mut b = Client::connect_served(server.local_addr());

    server.broadcast("POWR 1").unwrap();

    assert_eq!(a.read_line(), "POWR 1");
    assert_eq!(b.read_line(), "POWR 1");
}

// =============================================================================
// Pool and Connection Lifecycle Tests
// =============================================================================

#[test]
fn test_extra_client_waits_for_a_free_worker() {
    let server = start(test_config().worker_pool_size(1));
    let a = Client::connect_served(server.local_addr());

    let mut b = Client::connect(server.local_addr());
    b.send_line("ping");
    b.assert_silent();
    assert_eq!(server.connected_clients(), 1);

    drop(a);

    assert_eq!(b.read_line(), "HI");
    assert_eq!(b.read_line(), "ping");
}

#[test]
fn test_disconnect_clears_buffer() {
    let server = start(test_config().worker_pool_size(1));

    let mut a = Client::connect_served(server.local_addr());
    a.send(b"PARTIAL");
    thread::sleep(Duration::from_millis(100));
    drop(a);

    let mut b = Client::connect_served(server.local_addr());
    b.send_line("HELLO");
    assert_eq!(b.read_line(), "HELLO");
}

#[test]
fn test_close_all_clients_keeps_workers_running() {
    let server = start(test_config().worker_pool_size(2));
    let mut a = Client::connect_served(server.local_addr());
    let mut b = Client::connect_served(server.local_addr());

    server.close_all_clients();

    a.assert_closed();
    b.assert_closed();

    let mut c = Client::connect_served(server.local_addr());
    c.send_line("still here");
    assert_eq!(c.read_line(), "still here");
}

#[test]
fn test_repeated_close_all_spares_the_next_client() {
    let server = start(test_config().worker_pool_size(1));
    let mut a = Client::connect_served(server.local_addr());

    // Accepted but waiting in the intake queue
    let mut b = Client::connect(server.local_addr());
    b.assert_silent();

    server.close_all_clients();
    server.close_all_clients();

    a.assert_closed();
    assert_eq!(b.read_line(), "HI");
    b.send_line("still served");
    assert_eq!(b.read_line(), "still served");
    assert_eq!(server.connected_clients(), 1);
}

#[test]
fn test_bounded_intake_rejects_overflow() {
    let server = start(test_config().worker_pool_size(1).intake_capacity(1));
    let _a = Client::connect_served(server.local_addr());

    let mut waiting = Client::connect(server.local_addr());
    thread::sleep(Duration::from_millis(200));

    let mut rejected = Client::connect(server.local_addr());
    rejected.assert_closed();
    waiting.assert_silent();
}

#[test]
fn test_oversized_buffer_is_dropped() {
    let server = start(test_config().max_buffer_size(16));
    let mut client = Client::connect_served(server.local_addr());

    client.send(&[b'X'; 32]);
    thread::sleep(Duration::from_millis(100));
    client.send(b"\r\nok\r\n");

    assert_eq!(client.read_line(), "ok");
}

// =============================================================================
// Handler Isolation Tests
// =============================================================================

fn fragile(message: Message) -> Result<Option<Response>> {
    match message.as_text() {
        Some("panic") => panic!("handler blew up"),
        Some("fail") => Err(ImitarError::handler("refused")),
        Some("quiet") => Ok(None),
        _ => Ok(Some(Response::reply(message.clone()))),
    }
}

#[test]
fn test_handler_failures_do_not_kill_the_worker() {
    let server = Server::start(test_config().worker_pool_size(1).build(), Arc::new(fragile)).unwrap();
    let mut client = Client::connect_served(server.local_addr());

    client.send(b"panic\r\nfail\r\nquiet\r\nok\r\n");
    assert_eq!(client.read_line(), "ok");

    client.send_line("again");
    assert_eq!(client.read_line(), "again");
}

#[test]
fn test_undecodable_message_is_skipped() {
    let server = start(test_config());
    let mut client = Client::connect_served(server.local_addr());

    client.send(&[0xff, 0xfe, b'\r', b'\n']);
    client.send_line("ascii");

    assert_eq!(client.read_line(), "ascii");
}

// =============================================================================
// Binary Framing Tests
// =============================================================================

fn ack(message: Message) -> Result<Option<Response>> {
    let mut reply = vec![0xaa, 0xff, 0x00, message.as_bytes().len() as u8];
    reply.extend_from_slice(message.as_bytes());
    Ok(Some(Response::reply(Bytes::from(reply))))
}

#[test]
fn test_variable_length_framing_end_to_end() {
    let config = ServerConfig::builder()
        .bind_host("127.0.0.1")
        .port(0)
        .read_timeout_ms(20)
        .framing(Framing::VariableLength {
            header: Some(vec![0xaa]),
            length_field_offset: 3,
            footer_length: 1,
        })
        .build();
    let server = Server::start(config, Arc::new(ack)).unwrap();
    let mut client = Client::connect(server.local_addr());

    client.send(&[0x00, 0xaa, 0xff, 0x00]);
    thread::sleep(Duration::from_millis(50));
    client.send(&[0x03, 0x41, 0x12, 0x32, 0x00, 0xaa]);

    let mut reply = [0u8; 8];
    client.reader.read_exact(&mut reply).unwrap();
    assert_eq!(reply, [0xaa, 0xff, 0x00, 0x04, 0x41, 0x12, 0x32, 0x00]);
}

/// Treats every byte as a message of its own
struct SingleByteParser;

impl MessageParser for SingleByteParser {
    fn process_buffer(&self, buffer: &mut BytesMut) -> Vec<Bytes> {
        let frames = buffer
            .iter()
            .map(|&byte| Bytes::copy_from_slice(&[byte]))
            .collect();
        buffer.clear();
        frames
    }

    fn encoding(&self) -> Option<TextEncoding> {
        Some(TextEncoding::Ascii)
    }
}

#[test]
fn test_custom_parser_end_to_end() {
    let config = test_config().response_terminator(b"\r\n".to_vec()).build();
    let server = Server::with_parser(config, Arc::new(SingleByteParser), Arc::new(echo)).unwrap();
    let mut client = Client::connect_served(server.local_addr());

    client.send(b"ab");
    assert_eq!(client.read_line(), "a");
    assert_eq!(client.read_line(), "b");
}

// =============================================================================
// Configuration and Shutdown Tests
// =============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let result = Server::start(test_config().worker_pool_size(0).build(), Arc::new(echo));
    assert!(matches!(result, Err(ImitarError::Config(_))));

    let result = Server::start(
        test_config()
            .framing(Framing::Delimited {
                separator: Vec::new(),
                encoding: None,
            })
            .build(),
        Arc::new(echo),
    );
    assert!(matches!(result, Err(ImitarError::Config(_))));
}

#[test]
fn test_shutdown_stops_everything() {
    let mut server = start(test_config().worker_pool_size(2));
    let addr = server.local_addr();
    let handle = server.handle();
    let mut a = Client::connect_served(addr);

    let started = Instant::now();
    server.shutdown();
    assert!(started.elapsed() < WAIT, "shutdown took {:?}", started.elapsed());

    a.assert_closed();
    assert!(handle.is_shutting_down());
    assert_eq!(handle.connected_clients(), 0);
    assert!(handle.broadcast("late").is_err());

    let refused = TcpStream::connect_timeout(&addr, Duration::from_millis(500));
    assert!(refused.is_err(), "listener still accepting after shutdown");

    // Second call is a no-op
    server.shutdown();
}

#[test]
fn test_drop_shuts_down() {
    let addr = {
        let server = start(test_config());
        server.local_addr()
    };

    let refused: io::Result<TcpStream> = TcpStream::connect_timeout(&addr, Duration::from_millis(500));
    assert!(refused.is_err());
}
