//! RISC-V (Hazard3) register state. Held, reset and debug-addressable; there
//! is no RISC-V execution engine.

/// Debug index of the program counter.
pub const RISCV_PC_INDEX: u8 = 32;
/// Debug index of `mstatus`.
pub const RISCV_MSTATUS_INDEX: u8 = 33;
/// `mstatus` after reset (`MPP = M`).
pub const MSTATUS_RESET: u32 = 0x1800;

const STACK_POINTER: usize = 2;

/// Register file and machine-mode CSRs of one RISC-V core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RiscvCoreState {
    x: [u32; 32],
    pc: u32,
    /// Machine status.
    pub mstatus: u32,
    /// Machine interrupt enable.
    pub mie: u32,
    /// Machine trap vector.
    pub mtvec: u32,
    /// Machine scratch.
    pub mscratch: u32,
    /// Machine exception PC.
    pub mepc: u32,
    /// Machine trap cause.
    pub mcause: u32,
    /// Machine trap value.
    pub mtval: u32,
    /// Machine interrupt pending.
    pub mip: u32,
    /// Cycle counter.
    pub cycle: u64,
    /// Retired-instruction counter.
    pub instret: u64,
    /// Next fetch is a compressed (16-bit) instruction.
    pub compressed_next: bool,
    /// Inside a trap handler.
    pub in_exception: bool,
}

impl RiscvCoreState {
    /// Creates a core in its reset state with `x2 = sram_top`.
    #[must_use]
    pub const fn new(sram_top: u32) -> Self {
        let mut x = [0; 32];
        x[STACK_POINTER] = sram_top;
        Self {
            x,
            pc: 0,
            mstatus: MSTATUS_RESET,
            mie: 0,
            mtvec: 0,
            mscratch: 0,
            mepc: 0,
            mcause: 0,
            mtval: 0,
            mip: 0,
            cycle: 0,
            instret: 0,
            compressed_next: false,
            in_exception: false,
        }
    }

    /// Restores the reset state.
    pub const fn reset(&mut self, sram_top: u32) {
        *self = Self::new(sram_top);
    }

    /// Program counter.
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.pc
    }

    /// Sets the program counter, clearing bit 0.
    pub const fn set_pc(&mut self, value: u32) {
        self.pc = value & !1;
    }

    /// Reads debug index `0..=31` (x registers), 32 (pc) or 33 (mstatus).
    #[must_use]
    pub const fn register(&self, index: u8) -> Option<u32> {
        match index {
            0..=31 => Some(self.x[index as usize]),
            RISCV_PC_INDEX => Some(self.pc),
            RISCV_MSTATUS_INDEX => Some(self.mstatus),
            _ => None,
        }
    }

    /// Writes a debug index. `x0` ignores writes. Returns `false` for
    /// indices that do not exist.
    pub const fn set_register(&mut self, index: u8, value: u32) -> bool {
        match index {
            0 => true,
            1..=31 => {
                self.x[index as usize] = value;
                true
            }
            RISCV_PC_INDEX => {
                self.set_pc(value);
                true
            }
            RISCV_MSTATUS_INDEX => {
                self.mstatus = value;
                true
            }
            _ => false,
        }
    }
}
