/// Number of general-purpose registers below the stack pointer (`R0..R12`).
pub const GENERAL_REGISTER_COUNT: usize = 13;
/// `PSR` negative flag.
pub const PSR_N: u32 = 1 << 31;
/// `PSR` zero flag.
pub const PSR_Z: u32 = 1 << 30;
/// `PSR` carry flag.
pub const PSR_C: u32 = 1 << 29;
/// `PSR` overflow flag.
pub const PSR_V: u32 = 1 << 28;
/// `PSR` saturation flag.
pub const PSR_Q: u32 = 1 << 27;
/// `PSR` Thumb execution-state bit.
pub const PSR_T: u32 = 1 << 24;
/// Exception number field of `IPSR`.
pub const PSR_IPSR_MASK: u32 = 0xFF;
/// `APSR` bits writable by `MSR` (`NZCVQ`).
pub const PSR_APSR_MASK: u32 = PSR_N | PSR_Z | PSR_C | PSR_V | PSR_Q;
/// Top byte preserved by whole-register `PSR` writes through the debug path.
pub const PSR_PRESERVED_MASK: u32 = 0xFF00_0000;

/// `SYSm` encodings for `MRS`/`MSR`.
pub mod sysm {
    /// Application PSR.
    pub const APSR: u8 = 0;
    /// `APSR` combined with `IPSR`.
    pub const IAPSR: u8 = 1;
    /// `APSR` combined with `EPSR`.
    pub const EAPSR: u8 = 2;
    /// All three PSR views.
    pub const XPSR: u8 = 3;
    /// Interrupt PSR.
    pub const IPSR: u8 = 5;
    /// Execution PSR.
    pub const EPSR: u8 = 6;
    /// `IPSR` combined with `EPSR`.
    pub const IEPSR: u8 = 7;
    /// Main stack pointer.
    pub const MSP: u8 = 8;
    /// Process stack pointer.
    pub const PSP: u8 = 9;
    /// Priority mask.
    pub const PRIMASK: u8 = 16;
    /// Base priority.
    pub const BASEPRI: u8 = 17;
    /// Base priority, raise-only write.
    pub const BASEPRI_MAX: u8 = 18;
    /// Fault mask.
    pub const FAULTMASK: u8 = 19;
    /// Control register.
    pub const CONTROL: u8 = 20;
}

/// Debug-addressable ARM register: indices `0..=16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    Sp = 13,
    Lr = 14,
    Pc = 15,
    Psr = 16,
}

impl Register {
    /// Every addressable register in index order.
    pub const ALL: [Self; 17] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
        Self::R8,
        Self::R9,
        Self::R10,
        Self::R11,
        Self::R12,
        Self::Sp,
        Self::Lr,
        Self::Pc,
        Self::Psr,
    ];

    /// Debug index of this register.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Maps a debug index (`0..=16`) to a register.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if (index as usize) < Self::ALL.len() {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Decodes a 4-bit instruction register field (`R0..PC`).
    #[must_use]
    pub const fn from_u4(bits: u8) -> Self {
        Self::ALL[(bits & 0xF) as usize]
    }

    /// Assembler name (`r0`..`r12`, `sp`, `lr`, `pc`, `psr`).
    #[must_use]
    pub const fn name(self) -> &'static str {
        const NAMES: [&str; 17] = [
            "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp",
            "lr", "pc", "psr",
        ];
        NAMES[self as usize]
    }
}

/// Register file, special registers and mode of one Cortex-M0+ core.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ArmCoreState {
    r: [u32; GENERAL_REGISTER_COUNT],
    sp: u32,
    lr: u32,
    pc: u32,
    psr: u32,
    /// Exception priority mask (bit 0).
    pub primask: u32,
    /// Base priority mask.
    pub basepri: u32,
    /// Fault mask (bit 0).
    pub faultmask: u32,
    /// `CONTROL` (nPRIV, SPSEL).
    pub control: u32,
    /// Main stack limit.
    pub msplim: u32,
    /// Process stack limit.
    pub psplim: u32,
    /// Floating-point status and control.
    pub fpscr: u32,
    /// Banked process stack pointer.
    pub psp: u32,
    /// Vector table offset.
    pub vtor: u32,
    /// Always `true` on this core.
    pub thumb_mode: bool,
    /// Handler mode.
    pub in_exception: bool,
    /// Exception nesting depth.
    pub exception_level: u8,
}

impl Default for ArmCoreState {
    fn default() -> Self {
        Self::new(crate::memory::SRAM_BASE + crate::memory::SRAM_SIZE)
    }
}

impl ArmCoreState {
    /// Creates a core in its reset state with `sp = sram_top`.
    #[must_use]
    pub const fn new(sram_top: u32) -> Self {
        Self {
            r: [0; GENERAL_REGISTER_COUNT],
            sp: sram_top,
            lr: 0,
            pc: 0,
            psr: PSR_T,
            primask: 0,
            basepri: 0,
            faultmask: 0,
            control: 0,
            msplim: 0,
            psplim: 0,
            fpscr: 0,
            psp: 0,
            vtor: 0,
            thumb_mode: true,
            in_exception: false,
            exception_level: 0,
        }
    }

    /// Zeroes every register, sets `PSR = T`, `SP = sram_top`, `PC = 0` and
    /// thread mode.
    pub const fn reset(&mut self, sram_top: u32) {
        *self = Self::new(sram_top);
    }

    /// Reads a register; `PC` reads return the stored value, not `pc + 4`.
    #[must_use]
    pub const fn register(&self, reg: Register) -> u32 {
        match reg {
            Register::Sp => self.sp,
            Register::Lr => self.lr,
            Register::Pc => self.pc,
            Register::Psr => self.psr,
            gpr => self.r[gpr as usize],
        }
    }

    /// Writes a register. `PC` writes clear bit 0; `PSR` writes keep the
    /// top byte and replace the low 24 bits.
    pub const fn set_register(&mut self, reg: Register, value: u32) {
        match reg {
            Register::Sp => self.sp = value,
            Register::Lr => self.lr = value,
            Register::Pc => self.pc = value & !1,
            Register::Psr => {
                self.psr = (self.psr & PSR_PRESERVED_MASK) | (value & !PSR_PRESERVED_MASK);
            }
            gpr => self.r[gpr as usize] = value,
        }
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

    /// Active stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u32 {
        self.sp
    }

    /// Sets the active stack pointer.
    pub const fn set_sp(&mut self, value: u32) {
        self.sp = value;
    }

    /// Link register.
    #[must_use]
    pub const fn lr(&self) -> u32 {
        self.lr
    }

    /// Packed program status register.
    #[must_use]
    pub const fn psr(&self) -> u32 {
        self.psr
    }

    /// Replaces the whole PSR, flags included. Used by exception return.
    pub const fn restore_psr(&mut self, value: u32) {
        self.psr = value;
    }

    /// Returns `true` when every bit of `mask` is set in the PSR.
    #[must_use]
    pub const fn flag(&self, mask: u32) -> bool {
        self.psr & mask == mask
    }

    /// Sets or clears `mask` in the PSR.
    pub const fn set_flag(&mut self, mask: u32, on: bool) {
        if on {
            self.psr |= mask;
        } else {
            self.psr &= !mask;
        }
    }

    /// Replaces the four condition flags.
    pub const fn set_nzcv(&mut self, n: bool, z: bool, c: bool, v: bool) {
        self.set_flag(PSR_N, n);
        self.set_flag(PSR_Z, z);
        self.set_flag(PSR_C, c);
        self.set_flag(PSR_V, v);
    }

    /// Current exception number.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn ipsr(&self) -> u8 {
        (self.psr & PSR_IPSR_MASK) as u8
    }

    /// Sets the exception number.
    pub const fn set_ipsr(&mut self, exception: u8) {
        self.psr = (self.psr & !PSR_IPSR_MASK) | exception as u32;
    }

    /// Reads a special register by `SYSm`. Unknown encodings read as zero.
    #[must_use]
    pub const fn read_special(&self, encoding: u8) -> u32 {
        match encoding {
            0..=7 => {
                let mut value = 0;
                if encoding & 1 != 0 {
                    value |= self.psr & PSR_IPSR_MASK;
                }
                if encoding & 4 == 0 {
                    value |= self.psr & PSR_APSR_MASK;
                }
                value
            }
            sysm::MSP => self.sp,
            sysm::PSP => self.psp,
            sysm::PRIMASK => self.primask,
            sysm::BASEPRI | sysm::BASEPRI_MAX => self.basepri,
            sysm::FAULTMASK => self.faultmask,
            sysm::CONTROL => self.control,
            _ => 0,
        }
    }

    /// Writes a special register by `SYSm`. Read-only views and unknown
    /// encodings ignore the write.
    pub const fn write_special(&mut self, encoding: u8, value: u32) {
        match encoding {
            0..=3 => self.psr = (self.psr & !PSR_APSR_MASK) | (value & PSR_APSR_MASK),
            sysm::MSP => self.sp = value & !3,
            sysm::PSP => self.psp = value & !3,
            sysm::PRIMASK => self.primask = value & 1,
            sysm::BASEPRI => self.basepri = value & 0xFF,
            sysm::BASEPRI_MAX => {
                let value = value & 0xFF;
                if value != 0 && (self.basepri == 0 || value < self.basepri) {
                    self.basepri = value;
                }
            }
            sysm::FAULTMASK => self.faultmask = value & 1,
            sysm::CONTROL => self.control = value & 0x3,
            _ => {}
        }
    }
}
