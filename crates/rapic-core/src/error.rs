//! Error types for the rapic library.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Socket-layer failures carry the
//! underlying [`std::io::Error`] (and through it the errno), while message
//! decoding failures carry a [`DecodeError`] whose causes form an owned
//! chain that can be rendered with [`format_error_chain`].
//!
//! Socket errors are fatal to their connection: the file descriptor is
//! closed before the error propagates. Decode errors are not: the stream is
//! advanced past the offending message so traffic can continue.

use std::fmt;

/// The error type for all rapic operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host or service name resolution failed.
    #[error("unable to resolve address for {0}")]
    Resolve(String),

    /// A socket-level system call failed (socket/bind/listen/accept/...).
    #[error("socket {op} failed")]
    Socket {
        /// The operation that failed.
        op: &'static str,
        /// The underlying I/O error, carrying the errno.
        #[source]
        source: std::io::Error,
    },

    /// Establishing a connection to the remote server failed.
    #[error("failed to establish connection to {addr}")]
    Connect {
        /// The address that was being connected to.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Receiving data from the connection failed.
    #[error("failed to read from connection")]
    Recv(#[source] std::io::Error),

    /// Sending data to the connection failed.
    #[error("failed to write to connection")]
    Send(#[source] std::io::Error),

    /// A message could not be framed before the read buffer reached its
    /// maximum size.
    ///
    /// This error is fatal to the stream: the only remedy is a larger
    /// buffer cap.
    #[error("message would exceed maximum buffer size")]
    BufferOverflow,

    /// A framed message failed to decode.
    ///
    /// The connection remains usable; the stream has already been advanced
    /// past the malformed message.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The operation is not valid in the current state.
    ///
    /// Raised synchronously on API misuse (connect while connected, decode
    /// without a dequeued message, ...). The object's state is unchanged.
    #[error("invalid operation: {0}")]
    InvalidState(&'static str),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to decode a rapic message from its wire encoding.
///
/// Decode errors form an owned chain: a low-level cause (say, a ray
/// overflowing its bin count) is wrapped by higher-level context (the scan's
/// identifying headers). The chain is exposed through
/// [`std::error::Error::source`] and can be rendered in one string with
/// [`format_error_chain`].
#[derive(Debug)]
pub struct DecodeError {
    message: String,
    source: Option<Box<DecodeError>>,
}

impl DecodeError {
    /// Create a new decode error with no underlying cause.
    pub fn new(message: impl Into<String>) -> Self {
        DecodeError {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an existing decode error with additional context.
    pub fn context(message: impl Into<String>, cause: DecodeError) -> Self {
        DecodeError {
            message: message.into(),
            source: Some(Box::new(cause)),
        }
    }

    /// Get the underlying cause, if any.
    pub fn cause(&self) -> Option<&DecodeError> {
        self.source.as_deref()
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Render an error and its cause chain as an `->` indented string.
///
/// # Example
///
/// ```
/// use rapic_core::{format_error_chain, DecodeError};
///
/// let inner = DecodeError::new("scan data overflow");
/// let outer = DecodeError::context("failed to decode scan stnid: 2", inner);
/// assert_eq!(
///     format_error_chain(&outer),
///     "failed to decode scan stnid: 2\n -> scan data overflow"
/// );
/// ```
pub fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\n -> ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
