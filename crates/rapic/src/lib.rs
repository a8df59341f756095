//! # rapic -- Rapic Radar Protocol for Rust
//!
//! `rapic` is a client/server library for the rapic protocol, the
//! line-oriented transport used by weather radar transmitters to ship
//! polar volume scan data to consumers. It manages long-lived TCP
//! connections with subscription filters and keepalives, frames the mixed
//! binary/ASCII message stream without ever stalling on a partial
//! message, and decodes radar scans from their compact wire encodings
//! into an addressable ray/bin level array.
//!
//! ## Quick Start
//!
//! ```no_run
//! use rapic::net::Client;
//! use rapic::protocol::Scan;
//! use rapic::MessageType;
//!
//! #[tokio::main]
//! async fn main() -> rapic::Result<()> {
//!     let mut client = Client::new();
//!     client.add_filter(-1, "ANY", &[])?;
//!     client.connect("radar.example.com", "15555").await?;
//!
//!     while client.connected() {
//!         client.poll().await?;
//!         loop {
//!             let more = client.process_traffic()?;
//!             while let Some(kind) = client.dequeue()? {
//!                 if kind == MessageType::Scan {
//!                     let mut scan = Scan::new();
//!                     client.decode(&mut scan)?;
//!                     println!("scan: stn {} {} rays", scan.station_id(), scan.rays());
//!                 }
//!             }
//!             if !more {
//!                 break;
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized as a workspace of focused crates:
//!
//! | Crate                | Purpose                                      |
//! |----------------------|----------------------------------------------|
//! | `rapic-core`         | Error taxonomy, message/scan/query type enums |
//! | `rapic-protocol`     | Buffer, framer, message codecs, scan codec   |
//! | `rapic-net`          | Client connection manager and listen server  |
//! | `rapic-odim`         | Polar volume sink contract and assembly      |
//! | **`rapic`**          | This facade crate -- re-exports everything   |
//!
//! ## Processing model
//!
//! A [`net::Client`] is single-task cooperative: non-blocking socket
//! traffic is pumped with `process_traffic`, complete messages are framed
//! with `dequeue` and decoded on demand, and `poll` is the only blocking
//! call. Decode failures never tear down a connection; the stream simply
//! advances past the malformed message.

pub use rapic_core::*;

/// Wire codec: buffer, framer, message kinds and the scan codec.
pub mod protocol {
    pub use rapic_protocol::*;
}

/// Connection management: client, server, and name resolution.
pub mod net {
    pub use rapic_net::*;
}

/// Polar volume sink contract and volume assembly helpers.
pub mod odim {
    pub use rapic_odim::*;
}
