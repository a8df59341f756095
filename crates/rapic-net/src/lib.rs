//! rapic-net: Connection management for the rapic radar protocol.
//!
//! Rapic connections are long-lived: a client connects to a radar server,
//! subscribes with a semi-permanent connection message and a set of
//! product filters, then receives scan traffic indefinitely, sending
//! periodic keepalives. This crate provides:
//!
//! - [`Client`] -- the connection manager driving the handshake,
//!   keepalives, non-blocking socket traffic and message framing;
//! - [`Server`] -- an accept-only listening socket that hands each new
//!   connection to a fresh [`Client`];
//! - [`resolve`] -- host and `/etc/services` name resolution.
//!
//! All operations on one client or server must come from a single task;
//! there is no internal locking or background task.

pub mod client;
pub mod resolve;
pub mod server;

pub use client::{Client, ClientOptions};
pub use server::Server;
