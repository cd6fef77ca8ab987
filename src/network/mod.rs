//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread feeding an intake queue
//! - Fixed pool of worker threads, one connection each
//! - Broadcast dispatcher fanning responses out to the other workers

mod server;
mod connection;
mod worker;

pub use server::{Server, ServerHandle};
pub(crate) use connection::Connection;
