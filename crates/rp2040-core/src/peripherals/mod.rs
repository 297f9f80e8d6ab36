//! Peripheral backends reachable through the system bus.

/// SIO GPIO bank.
pub mod gpio;
/// Contiguous SRAM backing store.
pub mod sram;
/// PL011-style UART.
pub mod uart;

pub use gpio::Sio;
pub use sram::Sram;
pub use uart::{Uart, UART_FIFO_DEPTH};

/// Register-level failure reported by a peripheral backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeripheralError {
    /// No register decodes at the offset.
    NoSuchRegister,
    /// The register ignores writes.
    ReadOnly,
}

/// Offset-addressed 32-bit register block.
///
/// Offsets are relative to the block base and word aligned; the bus handles
/// byte-lane selection for narrow accesses.
pub trait Peripheral {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Reads the register at `offset`. Reads may have side effects (FIFO pops).
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::NoSuchRegister`] when no register decodes.
    fn read32(&mut self, offset: u32) -> Result<u32, PeripheralError>;

    /// Writes the register at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`PeripheralError::NoSuchRegister`] when no register decodes and
    /// [`PeripheralError::ReadOnly`] for read-only registers.
    fn write32(&mut self, offset: u32, value: u32) -> Result<(), PeripheralError>;

    /// Returns `true` when a register decodes at `offset`, without side effects.
    fn has_register(&self, offset: u32) -> bool;

    /// Restores power-on register values.
    fn reset(&mut self);
}
