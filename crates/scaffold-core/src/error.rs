//! Error types for the Scaffold host driver.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer and
//! register-level errors are all captured here, including the device-side
//! polling timeouts that carry partially transferred data.

use std::fmt;

/// Bytes actually processed by the board before its polling timeout expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartialTransfer {
    /// A write was cut short. `written` counts the bytes the board accepted.
    Write { written: usize },
    /// A read was cut short. `data` holds every byte received before the
    /// timeout, across all chunks of the transfer.
    Read { data: Vec<u8> },
}

impl PartialTransfer {
    /// Number of bytes successfully transferred.
    pub fn size(&self) -> usize {
        match self {
            PartialTransfer::Write { written } => *written,
            PartialTransfer::Read { data } => data.len(),
        }
    }
}

impl fmt::Display for PartialTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialTransfer::Write { written } => {
                write!(f, "write timeout: only {written} bytes written")
            }
            PartialTransfer::Read { data } if data.is_empty() => {
                write!(f, "read timeout: no data received")
            }
            PartialTransfer::Read { data } => {
                write!(f, "read timeout: partially received {} bytes ", data.len())?;
                for b in data {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// The error type for all Scaffold operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open or configuration failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// The board sent something the protocol does not allow, or the
    /// connect handshake failed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The link stayed silent past the configured response timeout.
    ///
    /// The board always answers a datagram eventually, so this indicates a
    /// broken link rather than a device-side polling timeout.
    #[error("timeout waiting for response")]
    Timeout,

    /// The board acknowledged fewer bytes than requested because a polling
    /// condition was not met before the device timeout expired.
    #[error("{0}")]
    ProtocolTimeout(PartialTransfer),

    /// An out-of-range address, value, size or poll parameter, or an
    /// unknown register or signal name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The register access mode does not permit the operation.
    #[error("capability error: {0}")]
    Capability(String),

    /// The API was used out of order (unbalanced lazy sections, reads
    /// inside a lazy section, popping an empty timeout stack).
    #[error("usage error: {0}")]
    Usage(String),

    /// A peripheral transaction byte was not acknowledged by the target.
    #[error("byte of index {index} NACKed during transaction")]
    Nack { index: usize },

    /// No transport has been attached to the bus.
    #[error("not connected")]
    NotConnected,

    /// The connection to the board was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The partial transfer carried by a [`Error::ProtocolTimeout`], if any.
    pub fn partial(&self) -> Option<&PartialTransfer> {
        match self {
            Error::ProtocolTimeout(p) => Some(p),
            _ => None,
        }
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
