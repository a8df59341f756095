//! rapic-protocol: Wire codec for the rapic radar protocol.
//!
//! This crate turns the raw byte stream of a rapic connection into typed
//! messages and back. It is independent of any socket: bytes go into a
//! [`Buffer`], the framer locates complete messages
//! ([`Buffer::read_detect`]), and the [`Message`] implementations decode
//! and encode the seven message kinds.
//!
//! The heart of the crate is the [`Scan`] codec, which expands the
//! protocol's compact ray encodings (ASCII run-length/delta and 256-level
//! binary run-length) into an addressable `rays x bins` level array.
//!
//! # Example
//!
//! ```
//! use rapic_core::MessageType;
//! use rapic_protocol::{Buffer, Message, Status};
//!
//! let mut buf = Buffer::new(1024, 10 * 1024 * 1024);
//! buf.write_all(b"RDRSTAT:\n").unwrap();
//!
//! let (kind, len) = buf.read_detect().unwrap().expect("complete message");
//! assert_eq!(kind, MessageType::Status);
//!
//! let mut msg = Status::default();
//! msg.decode(&buf).unwrap();
//! assert_eq!(msg.text, "");
//! buf.read_advance(len);
//! ```

pub mod buffer;
pub mod framer;
pub mod lookup;
pub mod message;
pub mod scan;
mod wire;

pub use buffer::Buffer;
pub use lookup::{RayCode, LOOKUP};
pub use message::{Comment, Filter, Message, Mssg, PermConn, Query, Status};
pub use scan::{Header, RayHeader, Scan};
