//! Signal routing through the board's two crossbars.
//!
//! The FPGA routes internal signals through two fixed crossbars:
//!
//! - the **left** crossbar feeds peripheral inputs (`/uart0/rx`,
//!   `/pgen1/start`, ...) from board IOs or the constants `0` and `1`;
//! - the **right** crossbar drives board IOs (`/io/a0`, `/io/d7`, ...) from
//!   peripheral outputs, the constants, or high impedance (`z`).
//!
//! Each crossbar output has one register at `base + output_index`; writing
//! an input index to it selects that input. A connection is therefore a
//! single one-byte bus write.

use tracing::debug;

use scaffold_core::error::{Error, Result};

use crate::bus::SharedBus;
use crate::map::{
    I2C_COUNT, IO_D_COUNT, MATRIX_LEFT_BASE, MATRIX_RIGHT_BASE, PGEN_COUNT, UART_COUNT,
};

/// Logic low.
pub const ZERO: &str = "0";
/// Logic high.
pub const ONE: &str = "1";
/// High impedance. Only the right crossbar accepts it.
pub const HIGH_Z: &str = "z";

/// One crossbar: a base address, its selectable inputs and its outputs, in
/// hardware index order.
#[derive(Debug, Clone)]
pub struct Crossbar {
    base: u16,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl Crossbar {
    pub fn new(base: u16, inputs: Vec<String>, outputs: Vec<String>) -> Self {
        Crossbar {
            base,
            inputs,
            outputs,
        }
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|s| s == name)
    }

    fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|s| s == name)
    }
}

fn board_ios() -> Vec<String> {
    ["/io/a0", "/io/a1", "/io/b0", "/io/b1", "/io/c0", "/io/c1"]
        .into_iter()
        .map(String::from)
        .chain((0..IO_D_COUNT).map(|i| format!("/io/d{i}")))
        .collect()
}

/// Left crossbar of the `scaffold-0.2` hardware.
pub fn left_crossbar() -> Crossbar {
    let mut inputs = vec![ZERO.to_string(), ONE.to_string()];
    inputs.extend(board_ios());

    let mut outputs: Vec<String> = (0..UART_COUNT).map(|i| format!("/uart{i}/rx")).collect();
    outputs.push("/iso7816/io_in".into());
    outputs.extend((0..PGEN_COUNT).map(|i| format!("/pgen{i}/start")));
    for i in 0..I2C_COUNT {
        outputs.push(format!("/i2c{i}/sda_in"));
        outputs.push(format!("/i2c{i}/scl_in"));
    }

    Crossbar::new(MATRIX_LEFT_BASE, inputs, outputs)
}

/// Right crossbar of the `scaffold-0.2` hardware.
pub fn right_crossbar() -> Crossbar {
    let mut inputs: Vec<String> = [
        HIGH_Z,
        ZERO,
        ONE,
        "/power/dut_trigger",
        "/power/platform_trigger",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    for i in 0..UART_COUNT {
        inputs.push(format!("/uart{i}/tx"));
        inputs.push(format!("/uart{i}/trigger"));
    }
    inputs.extend(
        ["/iso7816/io_out", "/iso7816/clk", "/iso7816/trigger"]
            .into_iter()
            .map(String::from),
    );
    inputs.extend((0..PGEN_COUNT).map(|i| format!("/pgen{i}/out")));
    for i in 0..I2C_COUNT {
        inputs.push(format!("/i2c{i}/sda_out"));
        inputs.push(format!("/i2c{i}/scl_out"));
        inputs.push(format!("/i2c{i}/trigger"));
    }

    Crossbar::new(MATRIX_RIGHT_BASE, inputs, board_ios())
}

/// Both crossbars, bound to a bus.
pub struct SignalMatrix {
    bus: SharedBus,
    left: Crossbar,
    right: Crossbar,
}

impl SignalMatrix {
    pub fn new(bus: SharedBus, left: Crossbar, right: Crossbar) -> Self {
        SignalMatrix { bus, left, right }
    }

    /// Matrix with the tables of the `scaffold-0.2` hardware.
    pub fn board(bus: SharedBus) -> Self {
        Self::new(bus, left_crossbar(), right_crossbar())
    }

    pub fn left(&self) -> &Crossbar {
        &self.left
    }

    pub fn right(&self) -> &Crossbar {
        &self.right
    }

    /// Every connectable destination: board IOs first, then peripheral
    /// inputs.
    pub fn destinations(&self) -> impl Iterator<Item = &str> {
        self.right
            .outputs
            .iter()
            .chain(self.left.outputs.iter())
            .map(String::as_str)
    }

    /// Sources that may feed `destination`, or `None` if it is not a
    /// crossbar output.
    pub fn sources_for(&self, destination: &str) -> Option<&[String]> {
        self.resolve(destination).map(|(crossbar, _)| crossbar.inputs())
    }

    /// Route `source` to `destination`.
    ///
    /// The destination is looked up in the right crossbar first, then the
    /// left one; the source must be an input of the same crossbar. Unknown
    /// names are rejected before anything is sent.
    pub async fn connect(&self, destination: &str, source: &str) -> Result<()> {
        let (crossbar, dst_index) = self.resolve(destination).ok_or_else(|| {
            Error::InvalidArgument(format!("no such destination '{destination}'"))
        })?;
        let src_index = crossbar.input_index(source).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no such source '{source}' for destination '{destination}'"
            ))
        })?;

        let value = u8::try_from(src_index).map_err(|_| {
            Error::InvalidArgument(format!("source index {src_index} does not fit a byte"))
        })?;
        let address = u16::try_from(dst_index)
            .ok()
            .and_then(|i| crossbar.base.checked_add(i))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("destination index {dst_index} out of range"))
            })?;

        debug!(destination, source, address, value, "connecting signal");
        self.bus.write(address, &[value], None).await
    }

    fn resolve(&self, destination: &str) -> Option<(&Crossbar, usize)> {
        if let Some(index) = self.right.output_index(destination) {
            return Some((&self.right, index));
        }
        self.left
            .output_index(destination)
            .map(|index| (&self.left, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEngine;
    use scaffold_test_harness::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    async fn matrix(mock: &MockTransport) -> SignalMatrix {
        let bus = Arc::new(BusEngine::new(Some(Duration::from_millis(20))));
        bus.attach(Box::new(mock.clone())).await;
        SignalMatrix::board(bus)
    }

    #[test]
    fn board_tables() {
        let left = left_crossbar();
        assert_eq!(left.inputs().len(), 24);
        assert_eq!(left.inputs()[2], "/io/a0");
        assert_eq!(left.inputs()[23], "/io/d15");
        assert_eq!(
            left.outputs(),
            [
                "/uart0/rx",
                "/uart1/rx",
                "/iso7816/io_in",
                "/pgen0/start",
                "/pgen1/start",
                "/pgen2/start",
                "/pgen3/start",
                "/i2c0/sda_in",
                "/i2c0/scl_in",
            ]
        );

        let right = right_crossbar();
        assert_eq!(right.inputs().len(), 19);
        assert_eq!(right.inputs()[5], "/uart0/tx");
        assert_eq!(right.inputs()[9], "/iso7816/io_out");
        assert_eq!(right.inputs()[18], "/i2c0/trigger");
        assert_eq!(right.outputs().len(), 22);
    }

    #[tokio::test]
    async fn connect_peripheral_input_uses_left_crossbar() {
        let mock = MockTransport::new();
        mock.expect(&[0x01, 0xF0, 0x00, 0x02], &[0x01]);
        let m = matrix(&mock).await;

        m.connect("/uart0/rx", "/io/a0").await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn connect_board_io_uses_right_crossbar() {
        let mock = MockTransport::new();
        mock.expect(&[0x01, 0xF1, 0x00, 0x05], &[0x01]);
        mock.expect(&[0x01, 0xF1, 0x15, 0x00], &[0x01]);
        mock.expect(&[0x01, 0xF1, 0x06, 0x02], &[0x01]);
        let m = matrix(&mock).await;

        m.connect("/io/a0", "/uart0/tx").await.unwrap();
        m.connect("/io/d15", HIGH_Z).await.unwrap();
        m.connect("/io/d0", ONE).await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn unknown_names_fail_before_io() {
        let mock = MockTransport::new();
        let m = matrix(&mock).await;

        let err = m.connect("/io/z9", "/uart0/tx").await.unwrap_err();
        assert!(err.to_string().contains("no such destination"));
        let err = m.connect("/uart0/rx", "/uart0/tx").await.unwrap_err();
        assert!(err.to_string().contains("no such source"));
        // A board IO is an input of the left crossbar only.
        assert!(matches!(
            m.connect("/io/a0", "/io/a1").await,
            Err(Error::InvalidArgument(_))
        ));
        // High impedance cannot feed a peripheral input.
        assert!(matches!(
            m.connect("/uart1/rx", HIGH_Z).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(mock.send_count(), 0);
    }

    #[tokio::test]
    async fn destinations_and_sources() {
        let mock = MockTransport::new();
        let m = matrix(&mock).await;

        let destinations: Vec<_> = m.destinations().collect();
        assert_eq!(destinations.len(), 22 + 9);
        assert_eq!(destinations[0], "/io/a0");
        assert!(destinations.contains(&"/i2c0/scl_in"));

        assert_eq!(m.sources_for("/pgen2/start").unwrap()[0], ZERO);
        assert_eq!(m.sources_for("/io/b1").unwrap()[0], HIGH_Z);
        assert!(m.sources_for("/power/dut_trigger").is_none());
    }

    #[tokio::test]
    async fn custom_crossbar_index_overflow_is_rejected() {
        let mock = MockTransport::new();
        let bus = Arc::new(BusEngine::new(Some(Duration::from_millis(20))));
        bus.attach(Box::new(mock.clone())).await;
        let left = Crossbar::new(0xFFFF, vec!["a".into()], vec!["x".into(), "y".into()]);
        let m = SignalMatrix::new(bus, left, Crossbar::new(0x0000, vec![], vec![]));

        assert!(matches!(
            m.connect("y", "a").await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(mock.send_count(), 0);
    }
}
