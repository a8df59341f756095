//! Rapic protocol listen socket manager.
//!
//! [`Server`] owns a passive, non-blocking listening socket. Pending
//! connections are drained with
//! [`accept_pending_connections`](Server::accept_pending_connections),
//! which wraps each accepted socket in a [`Client`] that becomes its sole
//! owner. The server itself never reads or writes connection traffic.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener};

use rapic_core::{Error, Result};
use socket2::{Domain, Socket, Type};

use crate::client::{Client, ClientOptions};
use crate::resolve::resolve_service;

/// Backlog passed to `listen`.
const LISTEN_BACKLOG: i32 = 128;

/// Rapic protocol listen socket manager.
#[derive(Debug, Default)]
pub struct Server {
    listener: Option<TcpListener>,
}

impl Server {
    /// Construct a server that is not yet listening.
    pub fn new() -> Server {
        Server { listener: None }
    }

    /// Start listening for new clients on the given service or port.
    ///
    /// The service name is resolved through `/etc/services` with a numeric
    /// fallback. With `ipv6` the socket is dual-stack: IPv4 clients are
    /// accepted on the same port.
    pub fn listen(&mut self, service: &str, ipv6: bool) -> Result<()> {
        if self.listener.is_some() {
            return Err(Error::InvalidState("listen called while already listening"));
        }

        let port = resolve_service(service)?;

        let domain = if ipv6 { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, None).map_err(|source| Error::Socket {
            op: "creation",
            source,
        })?;

        // allow immediate reuse of the port after restart
        socket
            .set_reuse_address(true)
            .map_err(|source| Error::Socket {
                op: "reuse address",
                source,
            })?;

        let addr: SocketAddr = if ipv6 {
            // accept ipv4 clients on the ipv6 socket as well
            socket.set_only_v6(false).map_err(|source| Error::Socket {
                op: "dual stack",
                source,
            })?;
            (Ipv6Addr::UNSPECIFIED, port).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, port).into()
        };

        socket
            .bind(&addr.into())
            .map_err(|source| Error::Socket { op: "bind", source })?;
        socket
            .listen(LISTEN_BACKLOG)
            .map_err(|source| Error::Socket {
                op: "listen",
                source,
            })?;
        socket
            .set_nonblocking(true)
            .map_err(|source| Error::Socket {
                op: "configure",
                source,
            })?;

        tracing::info!(port = port, ipv6 = ipv6, "listening for rapic connections");
        self.listener = Some(socket.into());
        Ok(())
    }

    /// Cease listening for new clients and release the port.
    pub fn release(&mut self) {
        if self.listener.take().is_some() {
            tracing::debug!("released rapic listen socket");
        }
    }

    /// Whether the server is currently listening.
    pub fn listening(&self) -> bool {
        self.listener.is_some()
    }

    /// Accept any pending connections and return connection managers for
    /// them.
    ///
    /// Drains the accept queue without blocking; an empty list means no
    /// connections were pending. Each accepted socket is placed in
    /// non-blocking mode and handed to a new [`Client`] carrying the
    /// peer's numeric host and service names.
    pub fn accept_pending_connections(&self, options: &ClientOptions) -> Result<Vec<Client>> {
        let Some(listener) = self.listener.as_ref() else {
            return Err(Error::InvalidState("accept attempted while not listening"));
        };

        let mut clients = Vec::new();
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let mut client = Client::with_options(options.clone());
                    client.accept(stream, peer.ip().to_string(), peer.port().to_string())?;
                    clients.push(client);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(Error::Socket {
                        op: "accept",
                        source,
                    })
                }
            }
        }
        Ok(clients)
    }

    /// Get the listen socket file descriptor for multiplexed polling, or
    /// `None` while not listening.
    #[cfg(unix)]
    pub fn pollable_fd(&self) -> Option<std::os::fd::RawFd> {
        use std::os::fd::AsRawFd;
        self.listener.as_ref().map(|l| l.as_raw_fd())
    }

    /// Whether the listen socket should be monitored for read
    /// availability.
    pub fn poll_read(&self) -> bool {
        self.listener.is_some()
    }

    /// Whether the listen socket should be monitored for write
    /// availability. Always false; a listen socket is never written.
    pub fn poll_write(&self) -> bool {
        false
    }
}
