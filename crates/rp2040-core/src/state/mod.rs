//! Per-core architectural state.

/// ARM register file, PSR layout and special registers.
pub mod registers;
/// RISC-V register file.
pub mod riscv;
/// Scheduling state.
pub mod run_state;

pub use registers::{
    sysm, ArmCoreState, Register, GENERAL_REGISTER_COUNT, PSR_APSR_MASK, PSR_C, PSR_IPSR_MASK,
    PSR_N, PSR_PRESERVED_MASK, PSR_Q, PSR_T, PSR_V, PSR_Z,
};
pub use riscv::{RiscvCoreState, RISCV_MSTATUS_INDEX, RISCV_PC_INDEX};
pub use run_state::RunState;

/// Instruction-set architecture of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CoreArchitecture {
    /// Cortex-M0+ (ARMv6-M Thumb).
    #[default]
    Arm,
    /// Hazard3 (RV32IMAC).
    RiscV,
}

/// Architectural state of one core, tagged by architecture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CoreState {
    /// ARM core.
    Arm(ArmCoreState),
    /// RISC-V core.
    RiscV(RiscvCoreState),
}

impl CoreState {
    /// Creates a reset core of `architecture` with its stack at `sram_top`.
    #[must_use]
    pub const fn new(architecture: CoreArchitecture, sram_top: u32) -> Self {
        match architecture {
            CoreArchitecture::Arm => Self::Arm(ArmCoreState::new(sram_top)),
            CoreArchitecture::RiscV => Self::RiscV(RiscvCoreState::new(sram_top)),
        }
    }

    /// Architecture of this core.
    #[must_use]
    pub const fn architecture(&self) -> CoreArchitecture {
        match self {
            Self::Arm(_) => CoreArchitecture::Arm,
            Self::RiscV(_) => CoreArchitecture::RiscV,
        }
    }

    /// Restores the reset state.
    pub const fn reset(&mut self, sram_top: u32) {
        match self {
            Self::Arm(core) => core.reset(sram_top),
            Self::RiscV(core) => core.reset(sram_top),
        }
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        match self {
            Self::Arm(core) => core.pc(),
            Self::RiscV(core) => core.pc(),
        }
    }

    /// Sets the program counter, clearing bit 0.
    pub const fn set_pc(&mut self, value: u32) {
        match self {
            Self::Arm(core) => core.set_pc(value),
            Self::RiscV(core) => core.set_pc(value),
        }
    }

    /// Sets the stack pointer (`sp` or `x2`).
    pub const fn set_sp(&mut self, value: u32) {
        match self {
            Self::Arm(core) => core.set_sp(value),
            Self::RiscV(core) => {
                core.set_register(2, value);
            }
        }
    }

    /// Reads a register by debug index.
    #[must_use]
    pub const fn register(&self, index: u8) -> Option<u32> {
        match self {
            Self::Arm(core) => match Register::from_index(index) {
                Some(reg) => Some(core.register(reg)),
                None => None,
            },
            Self::RiscV(core) => core.register(index),
        }
    }

    /// Writes a register by debug index. Returns `false` for unknown indices.
    pub const fn set_register(&mut self, index: u8, value: u32) -> bool {
        match self {
            Self::Arm(core) => match Register::from_index(index) {
                Some(reg) => {
                    core.set_register(reg, value);
                    true
                }
                None => false,
            },
            Self::RiscV(core) => core.set_register(index, value),
        }
    }

    /// ARM view, when this is an ARM core.
    #[must_use]
    pub const fn as_arm(&self) -> Option<&ArmCoreState> {
        match self {
            Self::Arm(core) => Some(core),
            Self::RiscV(_) => None,
        }
    }

    /// Mutable ARM view, when this is an ARM core.
    pub const fn as_arm_mut(&mut self) -> Option<&mut ArmCoreState> {
        match self {
            Self::Arm(core) => Some(core),
            Self::RiscV(_) => None,
        }
    }

    /// RISC-V view, when this is a RISC-V core.
    #[must_use]
    pub const fn as_riscv(&self) -> Option<&RiscvCoreState> {
        match self {
            Self::RiscV(core) => Some(core),
            Self::Arm(_) => None,
        }
    }
}
