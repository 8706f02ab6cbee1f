//! scaffold-test-harness: Test utilities for the Scaffold driver.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing of
//! the bus engine, registers and signal matrix without a board attached.

pub mod mock_serial;

pub use mock_serial::MockTransport;
