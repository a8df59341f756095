//! rapic-test-harness: Deterministic test doubles for the rapic library.
//!
//! Provides [`MockRadar`], a scripted TCP radar transmitter for testing
//! protocol clients without real radar infrastructure.

pub mod mock_radar;

pub use mock_radar::MockRadar;
