//! Device polling timeout.
//!
//! Polled reads and writes give up once the board's timeout expires. The
//! timeout cannot be read back from the hardware, so the last value sent is
//! cached here. [`TimeoutController::push`] and [`TimeoutController::pop`]
//! let a caller change it temporarily and restore the previous setting.
//!
//! Saved settings are kept as device units rather than seconds so a
//! push/pop cycle restores exactly what was sent.

use parking_lot::Mutex;
use tracing::debug;

use scaffold_core::error::{Error, Result};

use crate::bus::SharedBus;
use crate::map::TIMEOUT_UNIT;

#[derive(Debug, Default)]
struct TimeoutState {
    current: Option<u32>,
    stack: Vec<u32>,
}

/// Cached device timeout plus a stack of saved settings.
pub struct TimeoutController {
    bus: SharedBus,
    state: Mutex<TimeoutState>,
}

/// Convert seconds to device units, rounding down.
pub fn seconds_to_units(seconds: f64) -> Result<u32> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "invalid timeout {seconds} s"
        )));
    }
    let units = (seconds / TIMEOUT_UNIT).floor();
    if units > f64::from(u32::MAX) {
        return Err(Error::InvalidArgument(format!(
            "timeout {seconds} s too long"
        )));
    }
    Ok(units as u32)
}

pub fn units_to_seconds(units: u32) -> f64 {
    f64::from(units) * TIMEOUT_UNIT
}

impl TimeoutController {
    pub fn new(bus: SharedBus) -> Self {
        TimeoutController {
            bus,
            state: Mutex::new(TimeoutState::default()),
        }
    }

    /// Set the timeout in seconds. Zero disables it.
    pub async fn set(&self, seconds: f64) -> Result<()> {
        let units = seconds_to_units(seconds)?;
        self.set_units(units).await
    }

    /// Set the timeout in device units.
    pub async fn set_units(&self, units: u32) -> Result<()> {
        self.bus.set_timeout(units).await?;
        self.state.lock().current = Some(units);
        Ok(())
    }

    /// Effective timeout in seconds, after rounding to device units.
    pub fn get(&self) -> Result<f64> {
        self.units().map(units_to_seconds)
    }

    /// Last value sent, in device units.
    pub fn units(&self) -> Result<u32> {
        self.state
            .lock()
            .current
            .ok_or_else(|| Error::Usage("timeout not set yet".into()))
    }

    /// Save the current setting and set a new timeout.
    pub async fn push(&self, seconds: f64) -> Result<()> {
        let units = seconds_to_units(seconds)?;
        let previous = self.units()?;
        self.set_units(units).await?;
        let mut state = self.state.lock();
        state.stack.push(previous);
        debug!(depth = state.stack.len(), units, "timeout pushed");
        Ok(())
    }

    /// Restore the most recently saved setting.
    pub async fn pop(&self) -> Result<()> {
        let previous = self
            .state
            .lock()
            .stack
            .last()
            .copied()
            .ok_or_else(|| Error::Usage("timeout setting stack is empty".into()))?;
        self.set_units(previous).await?;
        self.state.lock().stack.pop();
        debug!(units = previous, "timeout popped");
        Ok(())
    }

    /// Number of saved settings.
    pub fn depth(&self) -> usize {
        self.state.lock().stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::BusEngine;
    use scaffold_test_harness::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    async fn controller(mock: &MockTransport) -> TimeoutController {
        let bus = Arc::new(BusEngine::new(Some(Duration::from_millis(20))));
        bus.attach(Box::new(mock.clone())).await;
        TimeoutController::new(bus)
    }

    fn expect_units(mock: &MockTransport, units: u32) {
        let mut datagram = vec![0x08];
        datagram.extend_from_slice(&units.to_be_bytes());
        mock.expect(&datagram, &[]);
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(seconds_to_units(0.0).unwrap(), 0);
        assert_eq!(seconds_to_units(1.0).unwrap(), 33_333_333);
        assert_eq!(seconds_to_units(59e-9).unwrap(), 1);
        assert!(seconds_to_units(-1.0).is_err());
        assert!(seconds_to_units(f64::NAN).is_err());
        assert!(seconds_to_units(f64::INFINITY).is_err());
        assert!(seconds_to_units(200.0).is_err());
    }

    #[tokio::test]
    async fn get_before_set_is_usage_error() {
        let mock = MockTransport::new();
        let timeouts = controller(&mock).await;
        assert!(matches!(timeouts.get(), Err(Error::Usage(_))));
        assert!(matches!(timeouts.push(1.0).await, Err(Error::Usage(_))));
        assert_eq!(mock.send_count(), 0);
    }

    #[tokio::test]
    async fn set_caches_after_send() {
        let mock = MockTransport::new();
        expect_units(&mock, 33_333_333);
        let timeouts = controller(&mock).await;

        timeouts.set(1.0).await.unwrap();
        assert_eq!(timeouts.units().unwrap(), 33_333_333);
        assert!((timeouts.get().unwrap() - 0.99999999).abs() < 1e-9);
    }

    #[tokio::test]
    async fn failed_send_keeps_previous_value() {
        let mock = MockTransport::new();
        expect_units(&mock, 0);
        let timeouts = controller(&mock).await;
        timeouts.set(0.0).await.unwrap();

        mock.set_connected(false);
        assert!(timeouts.set(1.0).await.is_err());
        assert_eq!(timeouts.units().unwrap(), 0);
    }

    #[tokio::test]
    async fn push_push_pop_pop_pop() {
        let mock = MockTransport::new();
        expect_units(&mock, 33_333_333); // set 1 s
        expect_units(&mock, 66_666_666); // push 2 s
        expect_units(&mock, 100_000_000); // push 3 s
        expect_units(&mock, 66_666_666); // pop
        expect_units(&mock, 33_333_333); // pop
        let timeouts = controller(&mock).await;

        timeouts.set(1.0).await.unwrap();
        timeouts.push(2.0).await.unwrap();
        timeouts.push(3.0).await.unwrap();
        assert_eq!(timeouts.depth(), 2);

        timeouts.pop().await.unwrap();
        assert_eq!(timeouts.units().unwrap(), 66_666_666);
        timeouts.pop().await.unwrap();
        assert_eq!(timeouts.units().unwrap(), 33_333_333);
        assert!(matches!(timeouts.pop().await, Err(Error::Usage(_))));
        assert_eq!(mock.remaining_expectations(), 0);
    }
}
