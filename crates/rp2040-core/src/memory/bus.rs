//! System bus: routes transfers to SRAM, SIO and the UARTs by address.

use crate::api::Bus;
use crate::fault::{AllocationError, BusFault};
use crate::memory::access::{
    sram_offset, validate_alignment, validate_region_access, AccessKind, AccessWidth,
};
use crate::memory::map::{PERIPHERAL_BLOCK_SIZE, SIO_BASE, UART0_BASE, UART1_BASE};
use crate::peripherals::{Peripheral, PeripheralError, Sio, Sram, Uart};

/// Number of UART instances.
pub const UART_COUNT: usize = 2;

const UART_BASES: [u32; UART_COUNT] = [UART0_BASE, UART1_BASE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Sram(usize),
    Sio(u32),
    Uart(usize, u32),
}

/// Bus shared by every core of a system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemBus {
    sram_size: u32,
    sram: Sram,
    sio: Sio,
    uarts: [Uart; UART_COUNT],
}

impl SystemBus {
    /// Builds a bus with `sram_size` bytes of SRAM at [`crate::SRAM_BASE`].
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::OutOfMemory`] when SRAM cannot be allocated.
    pub fn new(sram_size: u32) -> Result<Self, AllocationError> {
        Ok(Self {
            sram_size,
            sram: Sram::new(sram_size)?,
            sio: Sio::default(),
            uarts: [Uart::default(), Uart::default()],
        })
    }

    /// Configured SRAM size in bytes.
    #[must_use]
    pub const fn sram_size(&self) -> u32 {
        self.sram_size
    }

    /// SRAM backing store.
    #[must_use]
    pub const fn sram(&self) -> &Sram {
        &self.sram
    }

    /// Copies `data` into SRAM at `addr`. Returns `false` without writing when
    /// the span leaves the configured SRAM.
    pub fn load_sram(&mut self, addr: u32, data: &[u8]) -> bool {
        sram_offset(addr, data.len(), self.sram_size)
            .is_some_and(|offset| self.sram.load(offset, data))
    }

    /// SIO block (GPIO).
    #[must_use]
    pub const fn sio(&self) -> &Sio {
        &self.sio
    }

    /// Mutable SIO block.
    pub fn sio_mut(&mut self) -> &mut Sio {
        &mut self.sio
    }

    /// UART `index`, if it exists.
    #[must_use]
    pub fn uart(&self, index: usize) -> Option<&Uart> {
        self.uarts.get(index)
    }

    /// Mutable UART `index`, if it exists.
    pub fn uart_mut(&mut self, index: usize) -> Option<&mut Uart> {
        self.uarts.get_mut(index)
    }

    /// Records which core issues the following transfers.
    pub fn set_active_core(&mut self, core: usize) {
        self.sio.set_requesting_core(core);
    }

    /// Clears SRAM and restores peripheral reset values.
    pub fn reset(&mut self) {
        self.sram.clear();
        self.sio.reset();
        for uart in &mut self.uarts {
            uart.reset();
        }
    }

    fn route(&self, addr: u32, width: AccessWidth, kind: AccessKind) -> Result<Target, BusFault> {
        validate_alignment(addr, width)?;
        validate_region_access(addr, kind)?;

        if let Some(offset) = sram_offset(addr, width.bytes() as usize, self.sram_size) {
            return Ok(Target::Sram(offset));
        }

        let unmapped = BusFault::Unmapped { addr };
        if let Some(offset) = addr.checked_sub(SIO_BASE) {
            if offset < PERIPHERAL_BLOCK_SIZE && self.sio.has_register(offset & !3) {
                return Ok(Target::Sio(offset));
            }
        }
        for (index, base) in UART_BASES.iter().enumerate() {
            if let Some(offset) = addr.checked_sub(*base) {
                if offset < PERIPHERAL_BLOCK_SIZE && self.uarts[index].has_register(offset & !3) {
                    return Ok(Target::Uart(index, offset));
                }
            }
        }
        Err(unmapped)
    }

    fn peripheral(&mut self, target: Target) -> Option<(&mut dyn Peripheral, u32)> {
        match target {
            Target::Sram(_) => None,
            Target::Sio(offset) => Some((&mut self.sio, offset)),
            Target::Uart(index, offset) => Some((&mut self.uarts[index], offset)),
        }
    }

    fn load(&mut self, addr: u32, width: AccessWidth) -> Result<u32, BusFault> {
        let target = self.route(addr, width, AccessKind::Read)?;
        if let Target::Sram(offset) = target {
            let value = match width {
                AccessWidth::Byte => self.sram.read::<1>(offset).map(|b| u32::from(b[0])),
                AccessWidth::Halfword => self
                    .sram
                    .read::<2>(offset)
                    .map(|b| u32::from(u16::from_le_bytes(b))),
                AccessWidth::Word => self.sram.read::<4>(offset).map(u32::from_le_bytes),
            };
            return value.ok_or(BusFault::Unmapped { addr });
        }

        let Some((device, offset)) = self.peripheral(target) else {
            return Err(BusFault::Unmapped { addr });
        };
        let word = device
            .read32(offset & !3)
            .map_err(|err| peripheral_fault(addr, err))?;
        let lane = (offset & 3) * 8;
        Ok(match width {
            AccessWidth::Byte => (word >> lane) & 0xFF,
            AccessWidth::Halfword => (word >> lane) & 0xFFFF,
            AccessWidth::Word => word,
        })
    }

    fn store(&mut self, addr: u32, width: AccessWidth, value: u32) -> Result<(), BusFault> {
        let target = self.route(addr, width, AccessKind::Write)?;
        if let Target::Sram(offset) = target {
            let bytes = value.to_le_bytes();
            let written = match width {
                AccessWidth::Byte => self.sram.write(offset, [bytes[0]]),
                AccessWidth::Halfword => self.sram.write(offset, [bytes[0], bytes[1]]),
                AccessWidth::Word => self.sram.write(offset, bytes),
            };
            return if written {
                Ok(())
            } else {
                Err(BusFault::Unmapped { addr })
            };
        }

        let Some((device, offset)) = self.peripheral(target) else {
            return Err(BusFault::Unmapped { addr });
        };
        // Narrow writes are replicated across byte lanes, as on the APB bridge.
        let replicated = match width {
            AccessWidth::Byte => (value & 0xFF) * 0x0101_0101,
            AccessWidth::Halfword => (value & 0xFFFF) * 0x0001_0001,
            AccessWidth::Word => value,
        };
        device
            .write32(offset & !3, replicated)
            .map_err(|err| peripheral_fault(addr, err))
    }
}

const fn peripheral_fault(addr: u32, err: PeripheralError) -> BusFault {
    match err {
        PeripheralError::NoSuchRegister => BusFault::Unmapped { addr },
        PeripheralError::ReadOnly => BusFault::ReadOnly { addr },
    }
}

impl Bus for SystemBus {
    fn read_byte(&mut self, addr: u32) -> Result<u8, BusFault> {
        self.load(addr, AccessWidth::Byte)
            .map(|value| value.to_le_bytes()[0])
    }

    fn read_halfword(&mut self, addr: u32) -> Result<u16, BusFault> {
        self.load(addr, AccessWidth::Halfword).map(|value| {
            let bytes = value.to_le_bytes();
            u16::from_le_bytes([bytes[0], bytes[1]])
        })
    }

    fn read_word(&mut self, addr: u32) -> Result<u32, BusFault> {
        self.load(addr, AccessWidth::Word)
    }

    fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), BusFault> {
        self.store(addr, AccessWidth::Byte, u32::from(value))
    }

    fn write_halfword(&mut self, addr: u32, value: u16) -> Result<(), BusFault> {
        self.store(addr, AccessWidth::Halfword, u32::from(value))
    }

    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), BusFault> {
        self.store(addr, AccessWidth::Word, value)
    }

    fn probe(&self, addr: u32, width: AccessWidth, kind: AccessKind) -> Result<(), BusFault> {
        self.route(addr, width, kind).map(|_| ())
    }
}
