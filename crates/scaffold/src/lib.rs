//! Host-side driver for the Scaffold hardware test board.
//!
//! The board exposes 16-bit addressed registers over a serial byte stream
//! using a small binary protocol with device-side polling. This crate
//! provides:
//!
//! - **Datagram codec** ([`datagram`]) -- encode request datagrams and split
//!   read responses.
//! - **Bus engine** ([`bus`]) -- chunked transfers, acknowledgment checking
//!   and lazy (batched) acknowledgment sections.
//! - **Registers** ([`register`]) -- capability-checked, bounds-checked,
//!   cached views of single addresses.
//! - **Signal matrix** ([`matrix`]) -- routing between board IOs and
//!   peripherals through the two FPGA crossbars.
//! - **Timeouts** ([`timeout`]) -- the device polling timeout and its
//!   push/pop stack.
//! - **Register map** ([`map`]) -- every register of the `scaffold-0.2`
//!   hardware and its default configuration.
//! - **Scaffold** ([`board`]) and **ScaffoldBuilder** ([`builder`]) -- a
//!   connected session tying all of the above to a
//!   [`Transport`](scaffold_core::Transport).
//!
//! # Example
//!
//! ```
//! use scaffold::datagram::{encode_read, encode_write, Poll};
//!
//! // Set the LED brightness register (0x0201) to 20.
//! assert_eq!(encode_write(0x0201, &[20], None).unwrap(), vec![0x01, 0x02, 0x01, 0x14]);
//!
//! // Read two bytes from uart0.data once uart0.status bit 2 is clear.
//! let poll = Poll::until_clear(0x0400, 0x04);
//! assert_eq!(
//!     encode_read(0x0404, 2, Some(&poll)).unwrap(),
//!     vec![0x06, 0x04, 0x04, 0x04, 0x00, 0x04, 0x00, 0x02]
//! );
//! ```

pub mod board;
pub mod builder;
pub mod bus;
pub mod datagram;
pub mod map;
pub mod matrix;
pub mod register;
pub mod timeout;

pub use board::Scaffold;
pub use builder::ScaffoldBuilder;
pub use bus::{BusEngine, LazySection, SharedBus};
pub use datagram::Poll;
pub use register::{AccessMode, Register};
pub use matrix::SignalMatrix;
pub use timeout::TimeoutController;
