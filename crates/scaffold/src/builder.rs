//! ScaffoldBuilder -- fluent builder for connected [`Scaffold`] sessions.
//!
//! Separates configuration from construction so that callers can set up
//! serial port parameters, the link response timeout and the reset policy
//! before establishing the transport connection.
//!
//! # Example
//!
//! ```no_run
//! use scaffold::builder::ScaffoldBuilder;
//! use std::time::Duration;
//!
//! # async fn example() -> scaffold_core::Result<()> {
//! let board = ScaffoldBuilder::new()
//!     .serial_port("/dev/scaffold")
//!     .response_timeout(Some(Duration::from_secs(2)))
//!     .build()
//!     .await?;
//! println!("connected to {}", board.version()?);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use scaffold_core::error::{Error, Result};
use scaffold_core::transport::Transport;
use scaffold_transport::{SerialConfig, SerialTransport, DEFAULT_BAUD_RATE};

use crate::board::Scaffold;

/// Fluent builder for [`Scaffold`].
pub struct ScaffoldBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    response_timeout: Option<Duration>,
    reset_defaults: bool,
}

impl ScaffoldBuilder {
    pub fn new() -> Self {
        ScaffoldBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            response_timeout: None,
            reset_defaults: true,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the link baud rate (default: 2 000 000).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// How long to wait for the board to answer a datagram. `None`
    /// (default) waits indefinitely.
    pub fn response_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Whether to restore the default peripheral configuration after the
    /// version check (default: true). The polling timeout is cleared
    /// either way.
    pub fn reset_defaults(mut self, enabled: bool) -> Self {
        self.reset_defaults = enabled;
        self
    }

    /// Build a session over a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `scaffold-test-harness`).
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Scaffold> {
        let board = Scaffold::new(self.response_timeout)?;
        board.connect(transport, self.reset_defaults).await?;
        Ok(board)
    }

    /// Build a session over a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<Scaffold> {
        let port = self
            .serial_port
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("serial_port is required for build()".into()))?;
        let config = SerialConfig::with_baud_rate(self.baud_rate);
        let transport = SerialTransport::open_with_config(port, config).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for ScaffoldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datagram::encode_read;
    use scaffold_test_harness::MockTransport;

    fn version_dump(version: &str) -> Vec<u8> {
        let mut raw = b"ld-0.2\0".to_vec();
        while raw.len() < 66 {
            raw.extend_from_slice(version.as_bytes());
            raw.push(0);
        }
        raw.truncate(66);
        raw.push(66);
        raw
    }

    #[tokio::test]
    async fn builder_without_reset_only_clears_timeout() {
        let mock = MockTransport::new();
        mock.expect(&encode_read(0x0100, 66, None).unwrap(), &version_dump("scaffold-0.2"));
        mock.expect(&[0x08, 0x00, 0x00, 0x00, 0x00], &[]);

        let board = ScaffoldBuilder::new()
            .reset_defaults(false)
            .response_timeout(Some(Duration::from_millis(20)))
            .build_with_transport(Box::new(mock.clone()))
            .await
            .unwrap();

        assert_eq!(board.version().unwrap(), "scaffold-0.2");
        assert!(board.is_connected());
        assert_eq!(board.timeouts().units().unwrap(), 0);
        assert_eq!(mock.send_count(), 2);
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn builder_rejects_wrong_version() {
        let mock = MockTransport::new();
        mock.expect(&encode_read(0x0100, 66, None).unwrap(), &version_dump("scaffold-0.1"));

        let result = ScaffoldBuilder::new()
            .response_timeout(Some(Duration::from_millis(20)))
            .build_with_transport(Box::new(mock.clone()))
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(err.to_string().contains("scaffold-0.1"));
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn builder_serial_port_required_for_build() {
        let result = ScaffoldBuilder::new().build().await;
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn builder_missing_port_fails_to_open() {
        let result = ScaffoldBuilder::new()
            .serial_port("/dev/does-not-exist-scaffold")
            .baud_rate(115_200)
            .build()
            .await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
