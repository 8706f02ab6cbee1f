//! Transport implementations for the Scaffold driver.
//!
//! This crate provides the concrete [`Transport`](scaffold_core::Transport)
//! used to reach real hardware:
//!
//! - [`SerialTransport`]: the board's USB virtual COM port
//!
//! # Example
//!
//! ```no_run
//! use scaffold_transport::{SerialConfig, SerialTransport};
//!
//! # async fn example() -> scaffold_core::Result<()> {
//! let transport =
//!     SerialTransport::open_with_config("/dev/ttyUSB0", SerialConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{
    DataBits, FlowControl, Parity, SerialConfig, SerialTransport, StopBits, DEFAULT_BAUD_RATE,
};
