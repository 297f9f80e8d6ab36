//! Single-cycle IO block: CPUID and the bank-0 GPIO registers.

use super::{Peripheral, PeripheralError};
use crate::memory::map::GPIO_PINS;

/// Processor core number of the requesting core.
pub const SIO_CPUID: u32 = 0x000;
/// Input value of GPIO pins.
pub const SIO_GPIO_IN: u32 = 0x004;
/// Input value of the QSPI pins (always zero here).
pub const SIO_GPIO_HI_IN: u32 = 0x008;
/// GPIO output value.
pub const SIO_GPIO_OUT: u32 = 0x010;
/// GPIO output value set.
pub const SIO_GPIO_OUT_SET: u32 = 0x014;
/// GPIO output value clear.
pub const SIO_GPIO_OUT_CLR: u32 = 0x018;
/// GPIO output value XOR.
pub const SIO_GPIO_OUT_XOR: u32 = 0x01c;
/// GPIO output enable.
pub const SIO_GPIO_OE: u32 = 0x020;
/// GPIO output enable set.
pub const SIO_GPIO_OE_SET: u32 = 0x024;
/// GPIO output enable clear.
pub const SIO_GPIO_OE_CLR: u32 = 0x028;
/// GPIO output enable XOR.
pub const SIO_GPIO_OE_XOR: u32 = 0x02c;

const PIN_MASK: u32 = (1 << GPIO_PINS) - 1;

/// SIO register state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sio {
    cpuid: u32,
    out: u32,
    oe: u32,
    input: u32,
}

impl Sio {
    /// Selects the core whose accesses follow (drives `CPUID`).
    pub fn set_requesting_core(&mut self, core: usize) {
        self.cpuid = u32::try_from(core).unwrap_or(u32::MAX);
    }

    /// Drives an external level onto `pin`. Pins beyond the bank are ignored.
    pub fn set_input(&mut self, pin: u8, high: bool) {
        if pin >= GPIO_PINS {
            return;
        }
        let bit = 1 << pin;
        if high {
            self.input |= bit;
        } else {
            self.input &= !bit;
        }
    }

    /// Observed pad level: the output latch when output-enabled, else the
    /// externally driven input.
    #[must_use]
    pub const fn level(&self, pin: u8) -> bool {
        pin < GPIO_PINS && (self.pad_levels() >> pin) & 1 == 1
    }

    /// Output latch.
    #[must_use]
    pub const fn output(&self) -> u32 {
        self.out
    }

    /// Output-enable mask.
    #[must_use]
    pub const fn output_enable(&self) -> u32 {
        self.oe
    }

    const fn pad_levels(&self) -> u32 {
        ((self.out & self.oe) | (self.input & !self.oe)) & PIN_MASK
    }
}

impl Peripheral for Sio {
    fn name(&self) -> &'static str {
        "sio"
    }

    fn read32(&mut self, offset: u32) -> Result<u32, PeripheralError> {
        match offset {
            SIO_CPUID => Ok(self.cpuid),
            SIO_GPIO_IN => Ok(self.pad_levels()),
            SIO_GPIO_HI_IN => Ok(0),
            SIO_GPIO_OUT | SIO_GPIO_OUT_SET | SIO_GPIO_OUT_CLR | SIO_GPIO_OUT_XOR => Ok(self.out),
            SIO_GPIO_OE | SIO_GPIO_OE_SET | SIO_GPIO_OE_CLR | SIO_GPIO_OE_XOR => Ok(self.oe),
            _ => Err(PeripheralError::NoSuchRegister),
        }
    }

    fn write32(&mut self, offset: u32, value: u32) -> Result<(), PeripheralError> {
        let value = value & PIN_MASK;
        match offset {
            SIO_CPUID | SIO_GPIO_IN | SIO_GPIO_HI_IN => return Err(PeripheralError::ReadOnly),
            SIO_GPIO_OUT => self.out = value,
            SIO_GPIO_OUT_SET => self.out |= value,
            SIO_GPIO_OUT_CLR => self.out &= !value,
            SIO_GPIO_OUT_XOR => self.out ^= value,
            SIO_GPIO_OE => self.oe = value,
            SIO_GPIO_OE_SET => self.oe |= value,
            SIO_GPIO_OE_CLR => self.oe &= !value,
            SIO_GPIO_OE_XOR => self.oe ^= value,
            _ => return Err(PeripheralError::NoSuchRegister),
        }
        Ok(())
    }

    fn has_register(&self, offset: u32) -> bool {
        matches!(offset, SIO_CPUID..=SIO_GPIO_HI_IN | SIO_GPIO_OUT..=SIO_GPIO_OE_XOR)
            && offset % 4 == 0
    }

    fn reset(&mut self) {
        *self = Self {
            cpuid: self.cpuid,
            input: self.input,
            ..Self::default()
        };
    }
}
