//! rapic-core: Core types and error definitions for the rapic library.
//!
//! This crate defines the protocol-agnostic building blocks that the codec,
//! connection, and sink crates share. Applications normally depend on the
//! `rapic` facade crate rather than on this crate directly.
//!
//! # Key types
//!
//! - [`MessageType`] -- taxonomy of framed rapic messages
//! - [`ScanType`] / [`QueryType`] -- wire tokens for queries and filters
//! - [`Error`] / [`Result`] -- error handling
//! - [`DecodeError`] / [`format_error_chain`] -- chained decode diagnostics

pub mod error;
pub mod types;

pub use error::{format_error_chain, DecodeError, Error, Result};
pub use types::{parse_data_types, parse_station_id, MessageType, QueryType, ScanType};
