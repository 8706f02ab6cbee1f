//! Scaffold session -- the engine, every register, the signal matrix and
//! the timeout controller of one board.
//!
//! A [`Scaffold`] is created unconnected. [`Scaffold::connect`] binds a
//! transport, checks the hardware version, clears the polling timeout and
//! optionally resets the peripherals to their default configuration.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use scaffold_core::error::{Error, Result};
use scaffold_core::transport::Transport;

use crate::bus::{BusEngine, LazySection, SharedBus};
use crate::map::{
    self, DEFAULTS, HARDWARE_VERSION, REGISTERS, VERSION_ADDRESS, VERSION_READ_SIZE,
};
use crate::matrix::SignalMatrix;
use crate::register::Register;
use crate::timeout::TimeoutController;

/// Extract the version string from a version register dump.
///
/// The register streams the NUL-terminated identifier over and over, so a
/// read may start mid-string. The identifier is the text between the first
/// and second NUL bytes.
pub fn parse_version(raw: &[u8]) -> Result<String> {
    let mut fields = raw.split(|&b| b == 0);
    let missing = || Error::Protocol("no NUL terminator in version register data".into());
    fields.next().ok_or_else(missing)?;
    let version = fields.next().ok_or_else(missing)?;
    // The identifier must itself be terminated.
    fields.next().ok_or_else(missing)?;
    Ok(version.iter().map(|&b| char::from(b)).collect())
}

/// A connection to one Scaffold board.
pub struct Scaffold {
    bus: SharedBus,
    registers: BTreeMap<&'static str, Register>,
    matrix: SignalMatrix,
    timeouts: TimeoutController,
    version: Mutex<Option<String>>,
}

impl Scaffold {
    /// Create an unconnected session.
    ///
    /// See [`BusEngine::new`] for the meaning of `response_timeout`.
    pub fn new(response_timeout: Option<Duration>) -> Result<Self> {
        let bus: SharedBus = Arc::new(BusEngine::new(response_timeout));

        let mut registers = BTreeMap::new();
        for spec in REGISTERS {
            let register = Register::new(
                bus.clone(),
                spec.mode,
                spec.address,
                spec.wideness,
                spec.min,
                None,
            )?;
            registers.insert(spec.name, register);
        }

        Ok(Scaffold {
            matrix: SignalMatrix::board(bus.clone()),
            timeouts: TimeoutController::new(bus.clone()),
            registers,
            bus,
            version: Mutex::new(None),
        })
    }

    /// Bind `transport` and check the hardware version.
    ///
    /// On a version mismatch the transport is closed again. The polling
    /// timeout is always cleared, so [`TimeoutController::push`] works
    /// right after connecting. With `reset`, every peripheral is also put
    /// back in its default configuration.
    pub async fn connect(&self, transport: Box<dyn Transport>, reset: bool) -> Result<()> {
        self.bus.attach(transport).await;
        for register in self.registers.values() {
            register.invalidate();
        }

        let version = match self.read_version().await {
            Ok(version) => version,
            Err(e) => {
                self.detach().await;
                return Err(e);
            }
        };
        if version != HARDWARE_VERSION {
            self.detach().await;
            return Err(Error::Protocol(format!(
                "invalid hardware version '{version}'"
            )));
        }
        info!(version = %version, "connected to board");
        *self.version.lock() = Some(version);

        self.timeouts.set_units(0).await?;
        if reset {
            self.apply_defaults().await?;
        }
        Ok(())
    }

    /// Clear the polling timeout and apply the default register values.
    ///
    /// The values are written in one batch. If the batch fails, none of
    /// them stays cached.
    pub async fn reset_defaults(&self) -> Result<()> {
        self.timeouts.set_units(0).await?;
        self.apply_defaults().await
    }

    async fn apply_defaults(&self) -> Result<()> {
        debug!("resetting board to default configuration");
        let section = self.bus.lazy_section();
        for setting in DEFAULTS {
            self.register(setting.register)?
                .set(setting.value, None)
                .await?;
        }
        section.finish().await
    }

    /// Version string read during [`connect`](Self::connect).
    pub fn version(&self) -> Result<String> {
        self.version.lock().clone().ok_or(Error::NotConnected)
    }

    /// Register by dotted name, e.g. `"uart0.divisor"`.
    pub fn register(&self, name: &str) -> Result<&Register> {
        self.registers
            .get(name)
            .ok_or_else(|| Error::InvalidArgument(format!("no such register '{name}'")))
    }

    /// Every register, in name order.
    pub fn registers(&self) -> impl Iterator<Item = (&'static str, &Register)> {
        self.registers.iter().map(|(name, reg)| (*name, reg))
    }

    pub fn matrix(&self) -> &SignalMatrix {
        &self.matrix
    }

    pub fn timeouts(&self) -> &TimeoutController {
        &self.timeouts
    }

    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    /// Open a lazy section on the bus. See [`BusEngine::lazy_section`].
    pub fn lazy_section(&self) -> LazySection<'_> {
        self.bus.lazy_section()
    }

    pub fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    /// Close the transport. The session can be connected again afterwards.
    pub async fn close(&self) -> Result<()> {
        *self.version.lock() = None;
        self.bus.close().await
    }

    async fn read_version(&self) -> Result<String> {
        let raw = self.bus.read(VERSION_ADDRESS, VERSION_READ_SIZE, None).await?;
        parse_version(&raw)
    }

    async fn detach(&self) {
        if let Err(e) = self.bus.close().await {
            warn!(error = %e, "failed to close transport after handshake failure");
        }
    }
}

impl std::fmt::Debug for Scaffold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scaffold")
            .field("version", &*self.version.lock())
            .field("connected", &self.is_connected())
            .field("registers", &map::REGISTERS.len())
            .finish()
    }
}
