//! Condition-flag updates staged by instruction execution.

use crate::state::{ArmCoreState, PSR_C, PSR_N, PSR_V, PSR_Z};

/// Describes how NZCV change when an instruction commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagsUpdate {
    /// No change to the flags.
    #[default]
    None,
    /// Logical result: N, Z and the shifter carry-out. V is unchanged.
    Nzc {
        /// Negative flag.
        negative: bool,
        /// Zero flag.
        zero: bool,
        /// Carry flag.
        carry: bool,
    },
    /// Arithmetic result: all four flags.
    Nzcv {
        /// Negative flag.
        negative: bool,
        /// Zero flag.
        zero: bool,
        /// Carry flag.
        carry: bool,
        /// Overflow flag.
        overflow: bool,
    },
}

impl FlagsUpdate {
    /// Flags for a logical or move result with shifter carry-out `carry`.
    #[must_use]
    pub const fn logical(result: u32, carry: bool) -> Self {
        Self::Nzc {
            negative: result >> 31 == 1,
            zero: result == 0,
            carry,
        }
    }

    /// Flags for an add-with-carry result.
    #[must_use]
    pub const fn arithmetic(result: u32, carry: bool, overflow: bool) -> Self {
        Self::Nzcv {
            negative: result >> 31 == 1,
            zero: result == 0,
            carry,
            overflow,
        }
    }

    /// Writes the update into the core's PSR.
    pub const fn apply(self, core: &mut ArmCoreState) {
        match self {
            Self::None => {}
            Self::Nzc {
                negative,
                zero,
                carry,
            } => {
                core.set_flag(PSR_N, negative);
                core.set_flag(PSR_Z, zero);
                core.set_flag(PSR_C, carry);
            }
            Self::Nzcv {
                negative,
                zero,
                carry,
                overflow,
            } => core.set_nzcv(negative, zero, carry, overflow),
        }
    }
}
