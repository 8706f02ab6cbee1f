//! Register map of the `scaffold-0.2` hardware.
//!
//! Every register the board exposes is declared once in [`REGISTERS`]. The
//! session builds one [`Register`](crate::register::Register) per entry and
//! looks them up by dotted name (`"uart0.divisor"`, `"io1.event"`).
//!
//! | Block      | Base               | Registers                                              |
//! |------------|--------------------|--------------------------------------------------------|
//! | version    | `0x0100`           | `data`                                                 |
//! | leds       | `0x0200`           | `control`, `brightness`, `leds_0..2`, `mode`           |
//! | pgen0..3   | `0x0300 + 0x10*i`  | `status`, `control`, `config`, `delay`, `interval`, `width`, `count` |
//! | uart0..1   | `0x0400 + 0x10*i`  | `status`, `control`, `config`, `divisor`, `data`       |
//! | iso7816    | `0x0500`           | `status`, `control`, `config`, `divisor`, `etu`, `data` |
//! | power      | `0x0600`           | `control`                                              |
//! | i2c0       | `0x0700`           | `status`, `control`, `config`, `divisor`, `data`, `size_h`, `size_l` |
//! | io0..2     | `0xE000 + 0x10*g`  | `value`, `event`                                       |
//!
//! The two signal crossbars live at `0xF000` (left) and `0xF100` (right);
//! see [`matrix`](crate::matrix).

use crate::register::AccessMode;

/// Identifier the board reports from its version register.
pub const HARDWARE_VERSION: &str = "scaffold-0.2";

/// Address of the version string register.
pub const VERSION_ADDRESS: u16 = 0x0100;

/// Bytes read from the version register during the handshake: a leading
/// NUL-terminated field, the version string, and its terminator.
pub const VERSION_READ_SIZE: usize = 32 + 1 + 32 + 1;

pub const UART_COUNT: usize = 2;
pub const PGEN_COUNT: usize = 4;
pub const I2C_COUNT: usize = 1;
pub const IO_D_COUNT: usize = 16;

/// Base address of the left crossbar (module inputs).
pub const MATRIX_LEFT_BASE: u16 = 0xF000;

/// Base address of the right crossbar (board outputs).
pub const MATRIX_RIGHT_BASE: u16 = 0xF100;

/// Board system clock, in Hz.
pub const SYS_FREQ: f64 = 100e6;

/// Duration of one device timeout unit, in seconds.
pub const TIMEOUT_UNIT: f64 = 3.0 / SYS_FREQ;

const R: AccessMode = AccessMode::READABLE;
const W: AccessMode = AccessMode::WRITABLE;
const RV: AccessMode = AccessMode::READABLE.union(AccessMode::VOLATILE);
const WV: AccessMode = AccessMode::WRITABLE.union(AccessMode::VOLATILE);
const RWV: AccessMode = AccessMode::READABLE
    .union(AccessMode::WRITABLE)
    .union(AccessMode::VOLATILE);

/// Static description of one board register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub name: &'static str,
    pub mode: AccessMode,
    pub address: u16,
    pub wideness: usize,
    pub min: Option<u64>,
}

const fn reg(name: &'static str, mode: AccessMode, address: u16) -> RegisterSpec {
    RegisterSpec {
        name,
        mode,
        address,
        wideness: 1,
        min: None,
    }
}

const fn wide(
    name: &'static str,
    mode: AccessMode,
    address: u16,
    wideness: usize,
) -> RegisterSpec {
    RegisterSpec {
        name,
        mode,
        address,
        wideness,
        min: None,
    }
}

const fn divisor(name: &'static str, address: u16) -> RegisterSpec {
    RegisterSpec {
        name,
        mode: W,
        address,
        wideness: 2,
        min: Some(1),
    }
}

/// Every register of the board.
pub static REGISTERS: &[RegisterSpec] = &[
    reg("version.data", R, 0x0100),
    // LEDs
    reg("leds.control", W, 0x0200),
    reg("leds.brightness", W, 0x0201),
    reg("leds.leds_0", W, 0x0202),
    reg("leds.leds_1", W, 0x0203),
    reg("leds.leds_2", W, 0x0204),
    wide("leds.mode", W, 0x0205, 3),
    // Pulse generators
    reg("pgen0.status", RV, 0x0300),
    reg("pgen0.control", WV, 0x0301),
    reg("pgen0.config", W, 0x0302),
    wide("pgen0.delay", W, 0x0303, 3),
    wide("pgen0.interval", W, 0x0304, 3),
    wide("pgen0.width", W, 0x0305, 3),
    wide("pgen0.count", W, 0x0306, 2),
    reg("pgen1.status", RV, 0x0310),
    reg("pgen1.control", WV, 0x0311),
    reg("pgen1.config", W, 0x0312),
    wide("pgen1.delay", W, 0x0313, 3),
    wide("pgen1.interval", W, 0x0314, 3),
    wide("pgen1.width", W, 0x0315, 3),
    wide("pgen1.count", W, 0x0316, 2),
    reg("pgen2.status", RV, 0x0320),
    reg("pgen2.control", WV, 0x0321),
    reg("pgen2.config", W, 0x0322),
    wide("pgen2.delay", W, 0x0323, 3),
    wide("pgen2.interval", W, 0x0324, 3),
    wide("pgen2.width", W, 0x0325, 3),
    wide("pgen2.count", W, 0x0326, 2),
    reg("pgen3.status", RV, 0x0330),
    reg("pgen3.control", WV, 0x0331),
    reg("pgen3.config", W, 0x0332),
    wide("pgen3.delay", W, 0x0333, 3),
    wide("pgen3.interval", W, 0x0334, 3),
    wide("pgen3.width", W, 0x0335, 3),
    wide("pgen3.count", W, 0x0336, 2),
    // UARTs
    reg("uart0.status", RV, 0x0400),
    reg("uart0.control", W, 0x0401),
    reg("uart0.config", W, 0x0402),
    divisor("uart0.divisor", 0x0403),
    reg("uart0.data", RWV, 0x0404),
    reg("uart1.status", RV, 0x0410),
    reg("uart1.control", W, 0x0411),
    reg("uart1.config", W, 0x0412),
    divisor("uart1.divisor", 0x0413),
    reg("uart1.data", RWV, 0x0414),
    // ISO7816
    reg("iso7816.status", RV, 0x0500),
    reg("iso7816.control", W, 0x0501),
    reg("iso7816.config", W, 0x0502),
    reg("iso7816.divisor", W, 0x0503),
    wide("iso7816.etu", W, 0x0504, 2),
    reg("iso7816.data", RWV, 0x0505),
    // Power
    reg("power.control", RWV, 0x0600),
    // I2C
    reg("i2c0.status", RV, 0x0700),
    reg("i2c0.control", W, 0x0701),
    reg("i2c0.config", W, 0x0702),
    divisor("i2c0.divisor", 0x0703),
    reg("i2c0.data", RWV, 0x0704),
    reg("i2c0.size_h", RWV, 0x0705),
    reg("i2c0.size_l", RWV, 0x0706),
    // IO groups of eight pins
    reg("io0.value", RV, 0xE000),
    reg("io0.event", RWV, 0xE001),
    reg("io1.value", RV, 0xE010),
    reg("io1.event", RWV, 0xE011),
    reg("io2.value", RV, 0xE020),
    reg("io2.event", RWV, 0xE021),
];

/// Look up a register description by name.
pub fn find(name: &str) -> Option<&'static RegisterSpec> {
    REGISTERS.iter().find(|spec| spec.name == name)
}

/// One register write of the default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultSetting {
    pub register: &'static str,
    pub value: u64,
}

const fn setting(register: &'static str, value: u64) -> DefaultSetting {
    DefaultSetting { register, value }
}

/// Register values applied after connecting, in order. The polling
/// timeout is cleared first, separately.
///
/// UARTs: 9600 bps, no parity, one stop bit, trigger disabled.
/// ISO7816: ETU 372, 1 MHz clock. I2C: clock stretching and trigger on
/// start enabled.
pub static DEFAULTS: &[DefaultSetting] = &[
    setting("uart0.config", 0),
    setting("uart0.control", 0),
    setting("uart0.divisor", 10416),
    setting("uart1.config", 0),
    setting("uart1.control", 0),
    setting("uart1.divisor", 10416),
    setting("leds.control", 0),
    setting("leds.brightness", 20),
    setting("leds.mode", 0),
    setting("iso7816.config", 0),
    setting("iso7816.etu", 371),
    setting("iso7816.divisor", 49),
    setting("i2c0.divisor", 1),
    setting("i2c0.size_h", 0),
    setting("i2c0.size_l", 0),
    setting("i2c0.config", 0b101),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_and_addresses_are_unique() {
        let names: HashSet<_> = REGISTERS.iter().map(|r| r.name).collect();
        let addresses: HashSet<_> = REGISTERS.iter().map(|r| r.address).collect();
        assert_eq!(names.len(), REGISTERS.len());
        assert_eq!(addresses.len(), REGISTERS.len());
    }

    #[test]
    fn wide_registers_are_write_only() {
        for spec in REGISTERS.iter().filter(|r| r.wideness > 1) {
            assert!(!spec.mode.is_readable(), "{} is wide and readable", spec.name);
        }
    }

    #[test]
    fn defaults_target_known_writable_registers() {
        for setting in DEFAULTS {
            let spec = find(setting.register).unwrap();
            assert!(spec.mode.is_writable(), "{}", setting.register);
        }
    }

    #[test]
    fn timeout_unit_is_30ns() {
        assert!((TIMEOUT_UNIT - 30e-9).abs() < 1e-15);
    }

    #[test]
    fn lookup() {
        let spec = find("uart1.divisor").unwrap();
        assert_eq!(spec.address, 0x0413);
        assert_eq!(spec.wideness, 2);
        assert_eq!(spec.min, Some(1));
        assert!(find("uart2.divisor").is_none());
    }
}
