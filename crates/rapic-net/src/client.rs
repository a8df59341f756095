//! Rapic protocol connection manager.
//!
//! [`Client`] owns one connection to a rapic server (or to a peer accepted
//! by a [`Server`](crate::server::Server)): it issues the subscription
//! handshake, sends periodic keepalives, and frames the inbound byte
//! stream into messages.
//!
//! The client is single-task cooperative. It spawns no background tasks
//! and takes no locks; reads and writes are non-blocking, and the only
//! suspension points are [`connect`](Client::connect) and
//! [`poll`](Client::poll). The basic processing loop is:
//!
//! ```no_run
//! use rapic_core::MessageType;
//! use rapic_net::Client;
//! use rapic_protocol::Scan;
//!
//! # async fn example() -> rapic_core::Result<()> {
//! let mut client = Client::new();
//! client.add_filter(-1, "ANY", &[])?;
//! client.connect("radar.example.com", "15555").await?;
//!
//! while client.connected() {
//!     // wait for data to arrive
//!     client.poll().await?;
//!
//!     // process socket traffic and drain messages until the socket runs dry
//!     loop {
//!         let more = client.process_traffic()?;
//!         while let Some(kind) = client.dequeue()? {
//!             if kind == MessageType::Scan {
//!                 let mut scan = Scan::new();
//!                 client.decode(&mut scan)?;
//!                 // ...
//!             }
//!         }
//!         if !more {
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use rapic_core::{Error, MessageType, Result};
use rapic_protocol::{Buffer, Message};
use tokio::io::Interest;
use tokio::net::TcpStream;

use crate::resolve::resolve_endpoint;

/// Semi-permanent connection greeting sent on every connect.
const MSG_CONNECT: &[u8] = b"RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS=0\n";

/// Keepalive message sent every keepalive period.
const MSG_KEEPALIVE: &[u8] = b"RDRSTAT:\n";

/// Write space requested from the read buffer per receive call. In
/// practice far more is normally returned.
const MIN_READ_SPACE: usize = 256;

/// Default initial size of the read buffer (1 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default maximum size of the read buffer (10 MiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 10 * 1024 * 1024;

/// Default period between keepalive transmissions (40 s).
pub const DEFAULT_KEEPALIVE_PERIOD: Duration = Duration::from_secs(40);

/// Default timeout for [`Client::poll`] (10 s).
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for [`Client::connect`] (10 s).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for configuring a rapic client connection.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Initial size of the read buffer.
    pub buffer_size: usize,
    /// Maximum size the read buffer may grow to. Bounds the largest
    /// message that can be framed.
    pub max_buffer_size: usize,
    /// Time between keepalive transmissions.
    pub keepalive_period: Duration,
    /// Maximum time to wait for a connection to be established.
    pub connect_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            keepalive_period: DEFAULT_KEEPALIVE_PERIOD,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Rapic protocol connection manager.
///
/// The socket is exclusively owned by the client and closed on
/// [`disconnect`](Client::disconnect) or drop. Filters survive a
/// disconnect; buffered bytes do not.
#[derive(Debug)]
pub struct Client {
    options: ClientOptions,
    address: String,
    service: String,
    filters: Vec<String>,
    socket: Option<TcpStream>,
    last_keepalive: Option<Instant>,
    rbuf: Buffer,
    pending: BytesMut,
    current: Option<(MessageType, usize)>,
}

impl Default for Client {
    fn default() -> Self {
        Client::new()
    }
}

impl Client {
    /// Construct a new, disconnected connection manager with default
    /// options.
    pub fn new() -> Client {
        Client::with_options(ClientOptions::default())
    }

    /// Construct a new, disconnected connection manager.
    pub fn with_options(options: ClientOptions) -> Client {
        let rbuf = Buffer::new(options.buffer_size, options.max_buffer_size);
        Client {
            options,
            address: String::new(),
            service: String::new(),
            filters: Vec::new(),
            socket: None,
            last_keepalive: None,
            rbuf,
            pending: BytesMut::new(),
            current: None,
        }
    }

    /// Add a product filter for radar products.
    ///
    /// Filters only take effect at the next call to
    /// [`connect`](Client::connect) and may only be added while
    /// disconnected. Pass station `-1` for all stations and an empty
    /// moment list for all available moments.
    pub fn add_filter(&mut self, station: i32, product: &str, moments: &[&str]) -> Result<()> {
        if self.socket.is_some() {
            return Err(Error::InvalidState("add_filter called while connected"));
        }

        // RPFILTER
        // :station number (-1 = all)
        // :product type (ANY, PPI, RHI, COMPPPI, IMAGE, VOLUME, RHI_SET, MERGE, SCAN_ERROR)
        // :video format (-1 = whatever is available)
        // :data source (unused, always -1)
        // :moments to retrieve (omitted for all available)
        let mut filter = format!("RPFILTER:{station}:{product}:-1:-1");
        for (i, moment) in moments.iter().enumerate() {
            filter.push(if i == 0 { ':' } else { ',' });
            filter.push_str(moment);
        }
        filter.push('\n');
        self.filters.push(filter);
        Ok(())
    }

    /// Connect to a remote server.
    ///
    /// Resolves the host and service (only the first resolved address is
    /// tried), establishes the connection, then writes the semi-permanent
    /// connection greeting followed by each queued filter in insertion
    /// order.
    pub async fn connect(&mut self, address: &str, service: &str) -> Result<()> {
        if self.socket.is_some() {
            return Err(Error::InvalidState("connect called while already connected"));
        }

        let addr = resolve_endpoint(address, service).await?;
        tracing::debug!(addr = %addr, "connecting to rapic server");

        let stream = tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::Connect {
                addr: addr.to_string(),
                source: std::io::Error::new(ErrorKind::TimedOut, "connection timed out"),
            })?
            .map_err(|source| Error::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let _ = stream.set_nodelay(true);

        self.address = address.to_string();
        self.service = service.to_string();
        self.install(stream);

        // activate the semi-permanent connection, then each of our filters
        self.send_bytes(MSG_CONNECT)?;
        for i in 0..self.filters.len() {
            let filter = self.filters[i].clone();
            self.send_bytes(filter.as_bytes())?;
        }

        tracing::info!(addr = %addr, "rapic connection established");
        Ok(())
    }

    /// Take ownership of a connection accepted by a listening socket.
    ///
    /// The socket is placed in non-blocking mode. Accepted connections
    /// never send the greeting or filters, but keepalives are sent as
    /// usual.
    pub fn accept(
        &mut self,
        stream: std::net::TcpStream,
        address: String,
        service: String,
    ) -> Result<()> {
        if self.socket.is_some() {
            return Err(Error::InvalidState("accept called while already connected"));
        }

        stream
            .set_nonblocking(true)
            .map_err(|source| Error::Socket {
                op: "configure",
                source,
            })?;
        let stream = TcpStream::from_std(stream).map_err(|source| Error::Socket {
            op: "register",
            source,
        })?;

        tracing::debug!(address = %address, service = %service, "accepted rapic connection");
        self.address = address;
        self.service = service;
        self.install(stream);
        Ok(())
    }

    fn install(&mut self, stream: TcpStream) {
        self.socket = Some(stream);
        self.last_keepalive = None;
        self.rbuf = Buffer::new(self.options.buffer_size, self.options.max_buffer_size);
        self.pending.clear();
        self.current = None;
    }

    /// Disconnect from the server.
    ///
    /// Immediate: the socket is closed and the write queue and
    /// framed-message cursor are dropped. Messages already buffered stay
    /// dequeueable until the next connect; filters are kept for the next
    /// connect too.
    pub fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            tracing::debug!(address = %self.address, "rapic connection closed");
        }
        self.pending.clear();
        self.current = None;
    }

    /// Whether a connection is currently active.
    pub fn connected(&self) -> bool {
        self.socket.is_some()
    }

    /// Get the hostname or address of the remote server.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Get the service or port name for the connection.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Get the socket file descriptor for multiplexed polling, or `None`
    /// while disconnected.
    ///
    /// Together with [`poll_read`](Client::poll_read) and
    /// [`poll_write`](Client::poll_write) this allows waiting on many
    /// connections at once from an external event loop.
    #[cfg(unix)]
    pub fn pollable_fd(&self) -> Option<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;
        self.socket.as_ref().map(|s| s.as_raw_fd())
    }

    /// Whether the socket should be monitored for read availability.
    pub fn poll_read(&self) -> bool {
        self.socket.is_some()
    }

    /// Whether the socket should be monitored for write availability.
    pub fn poll_write(&self) -> bool {
        self.socket.is_some() && !self.pending.is_empty()
    }

    /// Wait until traffic arrives for processing, or the default timeout
    /// elapses.
    pub async fn poll(&self) -> Result<()> {
        self.poll_with_timeout(DEFAULT_POLL_TIMEOUT).await
    }

    /// Wait until traffic arrives for processing, or `timeout` elapses.
    pub async fn poll_with_timeout(&self, timeout: Duration) -> Result<()> {
        let Some(socket) = self.socket.as_ref() else {
            return Err(Error::InvalidState("poll attempted while disconnected"));
        };
        let interest = if self.pending.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        let _ = tokio::time::timeout(timeout, socket.ready(interest)).await;
        Ok(())
    }

    /// Process traffic on the socket, possibly making new messages
    /// available for dequeue.
    ///
    /// Flushes queued writes, sends a keepalive when one is due, then
    /// reads until the socket runs dry. Returns `false` when there is no
    /// more data currently available (or the connection closed), `true`
    /// when more data may still be waiting: either the last receive
    /// filled everything that was asked for, or the read buffer is at its
    /// maximum size and the caller should drain messages before reading
    /// on.
    pub fn process_traffic(&mut self) -> Result<bool> {
        if self.socket.is_none() {
            return Ok(false);
        }

        self.flush_pending()?;

        // keepalive due? (RDRSTAT)
        if self.keepalive_due() {
            tracing::trace!(address = %self.address, "sending keepalive");
            self.send_bytes(MSG_KEEPALIVE)?;
            self.last_keepalive = Some(Instant::now());
        }

        loop {
            let headroom = self
                .options
                .max_buffer_size
                .saturating_sub(self.rbuf.unread());
            let min_space = MIN_READ_SPACE.min(headroom);
            if min_space == 0 {
                // the buffer cannot grow further: let the caller drain
                return Ok(true);
            }

            let space = self.rbuf.write_acquire(min_space)?;
            let requested = space.len();
            let Some(socket) = self.socket.as_ref() else {
                return Ok(false);
            };
            match socket.try_read(space) {
                Ok(0) => {
                    // connection has been closed
                    tracing::debug!(address = %self.address, "connection closed by remote");
                    self.disconnect();
                    return Ok(false);
                }
                Ok(n) => {
                    self.rbuf.write_advance(n);
                    // if we read as much as we asked for there may be more
                    // still waiting
                    if n == requested {
                        return Ok(true);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.disconnect();
                    return Err(Error::Recv(e));
                }
            }
        }
    }

    /// Encode and send a message to the remote server.
    ///
    /// Writes synchronously when the socket allows it; otherwise the
    /// bytes join the write queue flushed by
    /// [`process_traffic`](Client::process_traffic).
    pub fn enqueue(&mut self, msg: &dyn Message) -> Result<()> {
        if self.socket.is_none() {
            return Err(Error::InvalidState("enqueue attempted while disconnected"));
        }
        let mut out = Buffer::new(256, usize::MAX);
        msg.encode(&mut out)?;
        let wire = out.read_acquire().to_vec();
        self.send_bytes(&wire)
    }

    /// Dequeue the next available message and return its type.
    ///
    /// Each call advances the stream past the previously dequeued message,
    /// whether or not it was decoded; there is no need to decode messages
    /// of no interest. Returns `Ok(None)` when no complete message is
    /// buffered.
    pub fn dequeue(&mut self) -> Result<Option<MessageType>> {
        // move past the previous message if needed
        if let Some((_, len)) = self.current.take() {
            self.rbuf.read_advance(len);
        }

        match self.rbuf.read_detect()? {
            Some((kind, len)) => {
                self.current = Some((kind, len));
                Ok(Some(kind))
            }
            None => Ok(None),
        }
    }

    /// Decode the currently dequeued message into `msg`.
    ///
    /// The concrete type of `msg` must match the type returned by the most
    /// recent [`dequeue`](Client::dequeue), otherwise
    /// [`Error::InvalidState`] is raised and nothing changes. The stream
    /// advances past the message even when decoding fails, so one corrupt
    /// message cannot stall the connection.
    pub fn decode(&mut self, msg: &mut dyn Message) -> Result<()> {
        let Some((kind, len)) = self.current else {
            return Err(Error::InvalidState("no message dequeued for decoding"));
        };
        if msg.message_type() != kind {
            return Err(Error::InvalidState(
                "message type does not match the dequeued message",
            ));
        }

        let result = msg.decode(&self.rbuf);
        self.rbuf.read_advance(len);
        self.current = None;
        result
    }

    fn keepalive_due(&self) -> bool {
        match self.last_keepalive {
            None => true,
            Some(at) => at.elapsed() > self.options.keepalive_period,
        }
    }

    /// Write bytes to the socket, queueing whatever the socket will not
    /// immediately take.
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        // earlier bytes are still queued: preserve ordering
        if !self.pending.is_empty() {
            self.pending.extend_from_slice(bytes);
            return Ok(());
        }

        let mut offset = 0;
        while offset < bytes.len() {
            let Some(socket) = self.socket.as_ref() else {
                return Err(Error::InvalidState("send attempted while disconnected"));
            };
            match socket.try_write(&bytes[offset..]) {
                Ok(n) => offset += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.pending.extend_from_slice(&bytes[offset..]);
                    return Ok(());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.disconnect();
                    return Err(Error::Send(e));
                }
            }
        }
        Ok(())
    }

    /// Flush the write queue as far as the socket allows.
    fn flush_pending(&mut self) -> Result<()> {
        while !self.pending.is_empty() {
            let Some(socket) = self.socket.as_ref() else {
                return Ok(());
            };
            match socket.try_write(&self.pending) {
                Ok(n) => self.pending.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.disconnect();
                    return Err(Error::Send(e));
                }
            }
        }
        Ok(())
    }
}
