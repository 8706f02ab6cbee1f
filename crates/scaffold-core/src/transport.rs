//! Transport trait for board communication.
//!
//! The [`Transport`] trait abstracts over the physical link to a Scaffold
//! board. The bus engine in the `scaffold` crate operates on a `Transport`
//! rather than directly on a serial port, so the same engine drives real
//! hardware through `SerialTransport` and deterministic unit tests through
//! `MockTransport` from the `scaffold-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous, ordered, point-to-point byte channel to a board.
///
/// The register-access protocol carries no correlation identifier, so
/// implementations must deliver bytes in order in both directions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the board.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying link.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the board into the provided buffer.
    ///
    /// Returns the number of bytes actually read, which may be less than
    /// `buf.len()`. Waits up to `timeout` for data to arrive; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives
    /// within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
