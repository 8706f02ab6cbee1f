//! Typed view of one board register.
//!
//! A [`Register`] wraps a 16-bit address with an [`AccessMode`], a width in
//! bytes and inclusive value bounds. Non-volatile registers cache their last
//! confirmed value (from a read, or from a successful `set`), so repeated
//! `get` calls cost no bus traffic. A `set` inside a lazy section caches
//! its value right away; the bus drops it again if the batch fails.
//!
//! The read-modify-write helpers ([`Register::set_bit`],
//! [`Register::set_mask`], [`Register::or_set`]) issue two independent
//! transactions and are not atomic with respect to the hardware.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::Mutex;
use tracing::trace;

use scaffold_core::error::{Error, Result};

use crate::bus::{CacheSlot, SharedBus};
use crate::datagram::Poll;

bitflags! {
    /// Capabilities of a register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u8 {
        /// The register can be read.
        const READABLE = 0b001;
        /// The register can be written.
        const WRITABLE = 0b010;
        /// The hardware may change the value at any time; never cached.
        const VOLATILE = 0b100;
    }
}

impl AccessMode {
    pub fn is_readable(self) -> bool {
        self.contains(AccessMode::READABLE)
    }

    pub fn is_writable(self) -> bool {
        self.contains(AccessMode::WRITABLE)
    }

    pub fn is_volatile(self) -> bool {
        self.contains(AccessMode::VOLATILE)
    }
}

/// Parses mode strings such as `"r"`, `"w"`, `"rv"` or `"rwv"`.
impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut mode = AccessMode::empty();
        for c in s.chars() {
            mode |= match c {
                'r' => AccessMode::READABLE,
                'w' => AccessMode::WRITABLE,
                'v' => AccessMode::VOLATILE,
                other => {
                    return Err(Error::InvalidArgument(format!(
                        "invalid access mode character '{other}' in \"{s}\""
                    )))
                }
            };
        }
        Ok(mode)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_readable() {
            f.write_str("r")?;
        }
        if self.is_writable() {
            f.write_str("w")?;
        }
        if self.is_volatile() {
            f.write_str("v")?;
        }
        Ok(())
    }
}

/// Largest value a register of `wideness` bytes can hold.
fn full_scale(wideness: usize) -> u64 {
    u64::MAX >> (64 - 8 * wideness)
}

/// One addressable board register.
pub struct Register {
    bus: SharedBus,
    address: u16,
    mode: AccessMode,
    wideness: usize,
    min: u64,
    max: u64,
    cache: CacheSlot,
}

impl fmt::Debug for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Register")
            .field("address", &format_args!("{:#06x}", self.address))
            .field("mode", &self.mode)
            .field("wideness", &self.wideness)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("cached", &self.cached())
            .finish()
    }
}

impl Register {
    /// Declare a register.
    ///
    /// `wideness` is the width in bytes (1..=8); wide registers cannot be
    /// readable. `min` and `max` default to the full range of the width.
    pub fn new(
        bus: SharedBus,
        mode: AccessMode,
        address: u16,
        wideness: usize,
        min: Option<u64>,
        max: Option<u64>,
    ) -> Result<Self> {
        if !(1..=8).contains(&wideness) {
            return Err(Error::InvalidArgument(format!(
                "invalid register wideness {wideness}"
            )));
        }
        if wideness > 1 && mode.is_readable() {
            return Err(Error::InvalidArgument(
                "wideness must be 1 if register can be read".into(),
            ));
        }

        let limit = full_scale(wideness);
        let min = min.unwrap_or(0);
        let max = max.unwrap_or(limit);
        if min > limit {
            return Err(Error::InvalidArgument(format!(
                "invalid register minimum value {min}"
            )));
        }
        if max > limit {
            return Err(Error::InvalidArgument(format!(
                "invalid register maximum value {max}"
            )));
        }
        if min > max {
            return Err(Error::InvalidArgument(
                "register minimum value must be lower or equal to maximum value".into(),
            ));
        }

        Ok(Register {
            bus,
            address,
            mode,
            wideness,
            min,
            max,
            cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn wideness(&self) -> usize {
        self.wideness
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    /// Cached value, if any. Always `None` for volatile registers.
    pub fn cached(&self) -> Option<u64> {
        *self.cache.lock()
    }

    /// Forget the cached value; the next `get` reads the board again.
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    /// A poll condition on this register, with mask `0xff` and expected
    /// value `0x00`.
    pub fn poll_on(&self) -> Poll {
        Poll::on(self.address)
    }

    /// Write a new value, big-endian over `wideness` bytes.
    ///
    /// With a poll condition, the board applies it to every byte of the
    /// register.
    pub async fn set(&self, value: u64, poll: Option<&Poll>) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(Error::Capability(format!(
                "register {:#06x} cannot be written",
                self.address
            )));
        }
        if value < self.min {
            return Err(Error::InvalidArgument(format!(
                "value {value} too low for register {:#06x} (min {})",
                self.address, self.min
            )));
        }
        if value > self.max {
            return Err(Error::InvalidArgument(format!(
                "value {value} too high for register {:#06x} (max {})",
                self.address, self.max
            )));
        }

        let bytes = value.to_be_bytes();
        trace!(address = self.address, value, "register set");
        let data = &bytes[8 - self.wideness..];
        if self.mode.is_volatile() {
            return self.bus.write(self.address, data, poll).await;
        }
        match self.bus.write_cached(self.address, data, poll, &self.cache).await {
            Ok(()) => {
                *self.cache.lock() = Some(value);
                Ok(())
            }
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    /// Current value.
    ///
    /// Volatile registers are read from the board every time. Other
    /// registers answer from the cache when it is populated.
    pub async fn get(&self) -> Result<u64> {
        if self.mode.is_volatile() {
            self.require_readable()?;
            return self.fetch().await;
        }

        let cached = self.cached();
        if let Some(value) = cached {
            return Ok(value);
        }
        self.require_readable()?;
        let value = self.fetch().await?;
        *self.cache.lock() = Some(value);
        Ok(value)
    }

    /// Value of bit `index`.
    pub async fn get_bit(&self, index: u32) -> Result<bool> {
        self.check_bit(index)?;
        Ok((self.get().await? >> index) & 1 == 1)
    }

    /// Set or clear bit `index`, leaving the other bits unchanged.
    pub async fn set_bit(&self, index: u32, value: bool, poll: Option<&Poll>) -> Result<()> {
        self.check_bit(index)?;
        let current = self.get().await?;
        let updated = (current & !(1 << index)) | (u64::from(value) << index);
        self.set(updated, poll).await
    }

    /// Replace the bits selected by `mask` with those of `value`.
    pub async fn set_mask(&self, value: u64, mask: u64, poll: Option<&Poll>) -> Result<()> {
        let current = self.get().await?;
        self.set((current & !mask) | (value & mask), poll).await
    }

    /// Set every bit of `value` to 1.
    pub async fn or_set(&self, value: u64) -> Result<()> {
        let current = self.get().await?;
        self.set(current | value, None).await
    }

    /// Raw write, bypassing bounds and the cache.
    pub async fn write(&self, data: &[u8], poll: Option<&Poll>) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(Error::Capability(format!(
                "register {:#06x} cannot be written",
                self.address
            )));
        }
        self.bus.write(self.address, data, poll).await
    }

    /// Raw read of `size` bytes, bypassing the cache.
    pub async fn read(&self, size: usize, poll: Option<&Poll>) -> Result<Vec<u8>> {
        self.require_readable()?;
        self.bus.read(self.address, size, poll).await
    }

    fn require_readable(&self) -> Result<()> {
        if self.mode.is_readable() {
            Ok(())
        } else {
            Err(Error::Capability(format!(
                "register {:#06x} cannot be read",
                self.address
            )))
        }
    }

    fn check_bit(&self, index: u32) -> Result<()> {
        if (index as usize) < 8 * self.wideness {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "bit index {index} outside {}-bit register",
                8 * self.wideness
            )))
        }
    }

    async fn fetch(&self) -> Result<u64> {
        let bytes = self.bus.read(self.address, self.wideness, None).await?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }
}
