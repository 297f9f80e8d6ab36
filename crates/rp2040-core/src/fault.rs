//! Fault taxonomy for decode, bus, execution, allocation and program-load failures.

use std::path::PathBuf;

use thiserror::Error;

use crate::decoder::Instruction;
use crate::memory::AccessWidth;

/// Fault classes used for logging and policy decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultClass {
    /// Decoder rejected an instruction encoding.
    Decode,
    /// The bus rejected a fetch or data access.
    Bus,
    /// The core has no execution engine for its architecture.
    Architecture,
}

/// Unrecognized instruction bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[error("unrecognized {length}-byte instruction encoding {raw:#010x}")]
pub struct DecodeError {
    /// Raw instruction word (second halfword in the high bits for 32-bit forms).
    pub raw: u32,
    /// Encoding length in bytes as requested by the caller.
    pub length: u8,
}

impl DecodeError {
    /// Creates a decode error for `raw` decoded as `length` bytes.
    #[must_use]
    pub const fn new(raw: u32, length: u8) -> Self {
        Self { raw, length }
    }

    /// Returns the `INVALID` instruction that stands in for the rejected word.
    #[must_use]
    pub const fn instruction(self) -> Instruction {
        Instruction::invalid(self.raw, self.length)
    }
}

/// Fault raised by the bus for a rejected access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusFault {
    /// No region or peripheral register decodes at the address.
    #[error("access to unmapped address {addr:#010x}")]
    Unmapped {
        /// Faulting address.
        addr: u32,
    },
    /// Halfword or word access at an address not aligned to its width.
    #[error("misaligned {width} access at {addr:#010x}")]
    Misaligned {
        /// Faulting address.
        addr: u32,
        /// Width of the rejected access.
        width: AccessWidth,
    },
    /// Write to a read-only region or register.
    #[error("write to read-only address {addr:#010x}")]
    ReadOnly {
        /// Faulting address.
        addr: u32,
    },
    /// Instruction fetch from a region that is not executable.
    #[error("instruction fetch from non-executable address {addr:#010x}")]
    NotExecutable {
        /// Faulting address.
        addr: u32,
    },
}

impl BusFault {
    /// Returns the faulting address.
    #[must_use]
    pub const fn addr(self) -> u32 {
        match self {
            Self::Unmapped { addr }
            | Self::Misaligned { addr, .. }
            | Self::ReadOnly { addr }
            | Self::NotExecutable { addr } => addr,
        }
    }
}

/// Per-step execution fault reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExecutionFault {
    /// The fetched word did not decode.
    #[error("decode fault at pc {pc:#010x}: {source}")]
    Decode {
        /// Address of the faulting instruction.
        pc: u32,
        /// Underlying decode error.
        source: DecodeError,
    },
    /// A fetch, load, store or stacking access was rejected by the bus.
    #[error("bus fault at pc {pc:#010x}: {source}")]
    Bus {
        /// Address of the faulting instruction.
        pc: u32,
        /// Underlying bus fault.
        source: BusFault,
    },
    /// The core's architecture has no decoder/executor in this crate.
    #[error("core {core} has no execution engine for its architecture")]
    UnsupportedArchitecture {
        /// Index of the core that was stepped.
        core: usize,
    },
}

impl ExecutionFault {
    /// Returns the fault class for logging and policy decisions.
    #[must_use]
    pub const fn class(self) -> FaultClass {
        match self {
            Self::Decode { .. } => FaultClass::Decode,
            Self::Bus { .. } => FaultClass::Bus,
            Self::UnsupportedArchitecture { .. } => FaultClass::Architecture,
        }
    }

    /// Program counter of the faulting instruction, when one was fetched.
    #[must_use]
    pub const fn pc(self) -> Option<u32> {
        match self {
            Self::Decode { pc, .. } | Self::Bus { pc, .. } => Some(pc),
            Self::UnsupportedArchitecture { .. } => None,
        }
    }
}

/// Resource exhaustion or invalid sizing while creating a system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    /// Requested core count is zero or above the supported maximum.
    #[error("core count {requested} outside supported range 1..={max}")]
    InvalidCoreCount {
        /// Requested core count.
        requested: usize,
        /// Largest supported core count.
        max: usize,
    },
    /// Requested SRAM size is zero, not word-sized or larger than the SRAM window.
    #[error("sram size {requested:#x} must be a nonzero multiple of 4 up to {max:#x}")]
    InvalidSramSize {
        /// Requested size in bytes.
        requested: u32,
        /// Size of the SRAM window in bytes.
        max: u32,
    },
    /// The allocator refused a backing store.
    #[error("failed to allocate {bytes} bytes for {what}")]
    OutOfMemory {
        /// Resource that could not be allocated.
        what: &'static str,
        /// Requested allocation size in bytes.
        bytes: usize,
    },
}

/// Failure while loading a program image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// Part of the image falls outside the configured SRAM window.
    #[error("load of {len} bytes at {addr:#010x} falls outside sram")]
    OutOfRange {
        /// Requested load address.
        addr: u32,
        /// Number of bytes requested.
        len: usize,
    },
    /// The program file could not be opened or read.
    #[error("failed to read program {}: {message}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Rendered I/O error.
        message: String,
    },
}

/// Breakpoint set rejected an insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BreakpointError {
    /// Every slot is in use.
    #[error("breakpoint set is full ({capacity} entries)")]
    Full {
        /// Fixed capacity of the set.
        capacity: usize,
    },
}

/// Errors surfaced by the system orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EmulationError {
    /// Core index is outside the system.
    #[error("core {core} does not exist (system has {count})")]
    InvalidCore {
        /// Requested core index.
        core: usize,
        /// Number of cores in the system.
        count: usize,
    },
    /// Register index is not addressable on the core.
    #[error("register index {index} is not addressable")]
    InvalidRegister {
        /// Requested register index.
        index: u8,
    },
    /// GPIO pin is outside the bank.
    #[error("gpio pin {pin} does not exist")]
    InvalidPin {
        /// Requested pin.
        pin: u8,
    },
    /// UART index is outside the system.
    #[error("uart {uart} does not exist")]
    InvalidUart {
        /// Requested UART index.
        uart: usize,
    },
    /// A core faulted and the fault policy halted the system.
    #[error("core {core} faulted: {fault}")]
    Fault {
        /// Index of the faulting core.
        core: usize,
        /// The execution fault.
        #[source]
        fault: ExecutionFault,
    },
    /// A debug memory access was rejected by the bus.
    #[error(transparent)]
    Bus(#[from] BusFault),
}

#[cfg(test)]
mod tests {
    use super::{BusFault, DecodeError, ExecutionFault, FaultClass, LoadError};
    use crate::encoding::OpcodeKind;
    use crate::memory::AccessWidth;

    #[test]
    fn decode_error_yields_invalid_instruction_for_the_word() {
        let err = DecodeError::new(0xDE00, 2);
        let instr = err.instruction();
        assert_eq!(instr.kind, OpcodeKind::Invalid);
        assert_eq!(instr.raw, 0xDE00);
        assert_eq!(instr.length, 2);
    }

    #[test]
    fn bus_fault_reports_its_address() {
        assert_eq!(BusFault::Unmapped { addr: 4 }.addr(), 4);
        assert_eq!(
            BusFault::Misaligned {
                addr: 0x2000_0001,
                width: AccessWidth::Word
            }
            .addr(),
            0x2000_0001
        );
        assert_eq!(BusFault::ReadOnly { addr: 8 }.addr(), 8);
    }

    #[test]
    fn class_mapping_matches_fault_taxonomy() {
        let decode = ExecutionFault::Decode {
            pc: 0x2000_0000,
            source: DecodeError::new(0, 2),
        };
        let bus = ExecutionFault::Bus {
            pc: 0x2000_0000,
            source: BusFault::Unmapped { addr: 0 },
        };
        let arch = ExecutionFault::UnsupportedArchitecture { core: 1 };

        assert_eq!(decode.class(), FaultClass::Decode);
        assert_eq!(bus.class(), FaultClass::Bus);
        assert_eq!(arch.class(), FaultClass::Architecture);
        assert_eq!(decode.pc(), Some(0x2000_0000));
        assert_eq!(arch.pc(), None);
    }

    #[test]
    fn messages_render_addresses_in_hex() {
        let err = LoadError::OutOfRange {
            addr: 0x1000_0000,
            len: 4,
        };
        assert_eq!(
            err.to_string(),
            "load of 4 bytes at 0x10000000 falls outside sram"
        );
        assert_eq!(
            BusFault::Misaligned {
                addr: 0x2000_0002,
                width: AccessWidth::Word
            }
            .to_string(),
            "misaligned word access at 0x20000002"
        );
    }
}
