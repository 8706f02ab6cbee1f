//! scaffold-core: Core trait and error definitions for the Scaffold driver.
//!
//! This crate defines the abstractions shared by every other crate in the
//! workspace. Peripheral layers and applications depend on these types
//! without pulling in a concrete transport.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the board
//! - [`Error`] / [`Result`] -- error handling
//! - [`PartialTransfer`] -- data carried by device-side polling timeouts

pub mod error;
pub mod transport;

pub use error::{Error, PartialTransfer, Result};
pub use transport::Transport;
