//! Mock radar transmitter for protocol-level testing.
//!
//! [`MockRadar`] is a lightweight TCP listener pre-loaded with a script of
//! wire chunks to transmit and client lines to expect, enabling
//! deterministic testing of the rapic client against realistic traffic
//! without a real radar server.
//!
//! # Example
//!
//! ```
//! use rapic_test_harness::MockRadar;
//!
//! # async fn example() -> rapic_core::Result<()> {
//! let mut radar = MockRadar::new().await?;
//!
//! // expect the subscription greeting, then transmit a keepalive
//! radar.expect_line("RPQUERY: SEMIPERMANENT CONNECTION - SEND ALL DATA TXCOMPLETESCANS=0");
//! radar.send(b"RDRSTAT:\n");
//! radar.start();
//!
//! // connect a client to radar.host()/radar.service() ...
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

use rapic_core::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One step of the scripted exchange.
#[derive(Debug, Clone)]
enum Action {
    /// Transmit these bytes to the client.
    Send(Vec<u8>),
    /// Read one line from the client and require it to match.
    ExpectLine(String),
}

/// A scripted radar transmitter listening on a random loopback port.
///
/// Script actions run in order once [`start`](MockRadar::start) is called
/// and a single client has connected. [`wait`](MockRadar::wait) joins the
/// exchange and reports the first mismatch, if any.
pub struct MockRadar {
    listener: Option<TcpListener>,
    addr: SocketAddr,
    script: Vec<Action>,
    handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl MockRadar {
    /// Bind a mock radar to a random loopback port.
    pub async fn new() -> Result<MockRadar> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|source| Error::Socket { op: "bind", source })?;
        let addr = listener.local_addr().map_err(|source| Error::Socket {
            op: "local address",
            source,
        })?;
        Ok(MockRadar {
            listener: Some(listener),
            addr,
            script: Vec::new(),
            handle: None,
        })
    }

    /// Get the host the radar is listening on.
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    /// Get the service (port) the radar is listening on.
    pub fn service(&self) -> String {
        self.addr.port().to_string()
    }

    /// Queue bytes to transmit to the client.
    pub fn send(&mut self, bytes: &[u8]) {
        self.script.push(Action::Send(bytes.to_vec()));
    }

    /// Queue an expectation for one line from the client (line ending
    /// excluded).
    pub fn expect_line(&mut self, line: &str) {
        self.script.push(Action::ExpectLine(line.to_string()));
    }

    /// Start the radar: accept a single client and run the script.
    ///
    /// The connection closes once the script completes; any bytes queued
    /// with [`send`](MockRadar::send) are delivered before the close.
    pub fn start(&mut self) {
        let listener = self.listener.take().expect("mock radar already started");
        let script: Vec<Action> = self.script.drain(..).collect();

        let handle = tokio::spawn(async move {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| format!("failed to accept connection: {e}"))?;
            let mut reader = BufReader::new(stream);

            for (i, action) in script.iter().enumerate() {
                match action {
                    Action::Send(bytes) => {
                        reader
                            .get_mut()
                            .write_all(bytes)
                            .await
                            .map_err(|e| format!("step {i}: write error: {e}"))?;
                        reader
                            .get_mut()
                            .flush()
                            .await
                            .map_err(|e| format!("step {i}: flush error: {e}"))?;
                    }
                    Action::ExpectLine(want) => {
                        let mut line = String::new();
                        let n = reader
                            .read_line(&mut line)
                            .await
                            .map_err(|e| format!("step {i}: read error: {e}"))?;
                        if n == 0 {
                            return Err(format!(
                                "step {i}: client disconnected, expected {want:?}"
                            ));
                        }
                        let got = line.trim_end_matches(['\n', '\r']);
                        if got != want {
                            return Err(format!(
                                "step {i}: line mismatch: expected {want:?}, got {got:?}"
                            ));
                        }
                    }
                }
            }

            // let the client drain whatever we sent before the close lands
            reader
                .get_mut()
                .shutdown()
                .await
                .map_err(|e| format!("shutdown error: {e}"))?;
            Ok(())
        });

        self.handle = Some(handle);
    }

    /// Join the exchange, reporting the first script mismatch.
    pub async fn wait(self) -> std::result::Result<(), String> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| format!("mock radar task panicked: {e}"))?,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn scripted_exchange() {
        let mut radar = MockRadar::new().await.unwrap();
        radar.expect_line("HELLO");
        radar.send(b"RDRSTAT:\n");
        radar.start();

        let port: u16 = radar.service().parse().unwrap();
        let mut stream = TcpStream::connect((radar.host(), port)).await.unwrap();
        stream.write_all(b"HELLO\n").await.unwrap();

        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"RDRSTAT:\n");

        radar.wait().await.unwrap();
    }

    #[tokio::test]
    async fn mismatched_line_is_reported() {
        let mut radar = MockRadar::new().await.unwrap();
        radar.expect_line("HELLO");
        radar.start();

        let port: u16 = radar.service().parse().unwrap();
        let mut stream = TcpStream::connect((radar.host(), port)).await.unwrap();
        stream.write_all(b"GOODBYE\n").await.unwrap();

        let err = radar.wait().await.unwrap_err();
        assert!(err.contains("line mismatch"), "unexpected report: {err}");
    }

    #[tokio::test]
    async fn early_disconnect_is_reported() {
        let mut radar = MockRadar::new().await.unwrap();
        radar.expect_line("HELLO");
        radar.start();

        let port: u16 = radar.service().parse().unwrap();
        let stream = TcpStream::connect((radar.host(), port)).await.unwrap();
        drop(stream);

        let err = radar.wait().await.unwrap_err();
        assert!(err.contains("disconnected"), "unexpected report: {err}");
    }
}
