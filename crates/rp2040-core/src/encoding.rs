/// Closed set of operation kinds the engine executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum OpcodeKind {
    Add,
    Sub,
    Mov,
    Ldr,
    Str,
    B,
    Bl,
    And,
    Orr,
    Xor,
    Ldm,
    Stm,
    Cmp,
    Tst,
    Bx,
    Blx,
    Mrs,
    Msr,
    Push,
    Pop,
    Nop,
    Wfi,
    Svc,
    Invalid,
}

impl OpcodeKind {
    /// Base assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mov => "mov",
            Self::Ldr => "ldr",
            Self::Str => "str",
            Self::B => "b",
            Self::Bl => "bl",
            Self::And => "and",
            Self::Orr => "orr",
            Self::Xor => "eor",
            Self::Ldm => "ldm",
            Self::Stm => "stm",
            Self::Cmp => "cmp",
            Self::Tst => "tst",
            Self::Bx => "bx",
            Self::Blx => "blx",
            Self::Mrs => "mrs",
            Self::Msr => "msr",
            Self::Push => "push",
            Self::Pop => "pop",
            Self::Nop => "nop",
            Self::Wfi => "wfi",
            Self::Svc => "svc",
            Self::Invalid => "udf",
        }
    }
}

/// ARM condition field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Condition {
    Eq = 0x0,
    Ne = 0x1,
    Cs = 0x2,
    Cc = 0x3,
    Mi = 0x4,
    Pl = 0x5,
    Vs = 0x6,
    Vc = 0x7,
    Hi = 0x8,
    Ls = 0x9,
    Ge = 0xA,
    Lt = 0xB,
    Gt = 0xC,
    Le = 0xD,
    #[default]
    Al = 0xE,
    /// `0b1111`; treated as always.
    Always = 0xF,
}

impl Condition {
    /// Decodes the low four bits of `bits`.
    #[must_use]
    pub const fn from_u4(bits: u8) -> Self {
        match bits & 0xF {
            0x0 => Self::Eq,
            0x1 => Self::Ne,
            0x2 => Self::Cs,
            0x3 => Self::Cc,
            0x4 => Self::Mi,
            0x5 => Self::Pl,
            0x6 => Self::Vs,
            0x7 => Self::Vc,
            0x8 => Self::Hi,
            0x9 => Self::Ls,
            0xA => Self::Ge,
            0xB => Self::Lt,
            0xC => Self::Gt,
            0xD => Self::Le,
            0xE => Self::Al,
            _ => Self::Always,
        }
    }

    /// Four-bit encoding.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Returns `true` for the two always-true encodings.
    #[must_use]
    pub const fn is_always(self) -> bool {
        matches!(self, Self::Al | Self::Always)
    }

    /// Mnemonic suffix; empty for always.
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Cs => "cs",
            Self::Cc => "cc",
            Self::Mi => "mi",
            Self::Pl => "pl",
            Self::Vs => "vs",
            Self::Vc => "vc",
            Self::Hi => "hi",
            Self::Ls => "ls",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Gt => "gt",
            Self::Le => "le",
            Self::Al | Self::Always => "",
        }
    }
}

/// Barrel-shifter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[allow(missing_docs)]
pub enum ShiftType {
    #[default]
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftType {
    /// Decodes the low two bits of `bits`.
    #[must_use]
    pub const fn from_u2(bits: u8) -> Self {
        match bits & 0x3 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }

    /// Assembler mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Ror => "ror",
        }
    }
}

/// 16-bit Thumb encoding groups, keyed by their fixed high bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Thumb16Format {
    ShiftImmediate,
    AddSubtract,
    MoveCompareImmediate,
    DataProcessing,
    HiRegisterOrBranchExchange,
    LoadLiteral,
    LoadStoreRegister,
    LoadStoreWordImmediate,
    LoadStoreByteImmediate,
    LoadStoreHalfwordImmediate,
    LoadStoreSpRelative,
    AddressGeneration,
    Miscellaneous,
    LoadStoreMultiple,
    ConditionalBranchOrSvc,
    UnconditionalBranch,
}

/// Single source of truth for 16-bit format classification, first match wins.
///
/// Halfwords matching no entry are 32-bit prefixes.
pub const THUMB16_FORMAT_TABLE: &[(u16, u16, Thumb16Format)] = &[
    (0xF800, 0x1800, Thumb16Format::AddSubtract),
    (0xE000, 0x0000, Thumb16Format::ShiftImmediate),
    (0xE000, 0x2000, Thumb16Format::MoveCompareImmediate),
    (0xFC00, 0x4000, Thumb16Format::DataProcessing),
    (0xFC00, 0x4400, Thumb16Format::HiRegisterOrBranchExchange),
    (0xF800, 0x4800, Thumb16Format::LoadLiteral),
    (0xF000, 0x5000, Thumb16Format::LoadStoreRegister),
    (0xF000, 0x6000, Thumb16Format::LoadStoreWordImmediate),
    (0xF000, 0x7000, Thumb16Format::LoadStoreByteImmediate),
    (0xF000, 0x8000, Thumb16Format::LoadStoreHalfwordImmediate),
    (0xF000, 0x9000, Thumb16Format::LoadStoreSpRelative),
    (0xF000, 0xA000, Thumb16Format::AddressGeneration),
    (0xF000, 0xB000, Thumb16Format::Miscellaneous),
    (0xF000, 0xC000, Thumb16Format::LoadStoreMultiple),
    (0xF000, 0xD000, Thumb16Format::ConditionalBranchOrSvc),
    (0xF800, 0xE000, Thumb16Format::UnconditionalBranch),
];

/// Classifies a 16-bit halfword. `None` means it starts a 32-bit encoding.
#[must_use]
pub fn classify_thumb16(hw: u16) -> Option<Thumb16Format> {
    THUMB16_FORMAT_TABLE
        .iter()
        .find_map(|(mask, value, format)| (hw & mask == *value).then_some(*format))
}

/// 32-bit Thumb-2 encoding groups modeled by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Thumb32Format {
    BranchWithLink,
    MoveToSpecial,
    MoveFromSpecial,
    Barrier,
    DataProcessingModifiedImmediate,
    LoadStoreWordImmediate12,
}

/// 32-bit format table over `(hw2 << 16) | hw1`, first match wins.
pub const THUMB32_FORMAT_TABLE: &[(u32, u32, Thumb32Format)] = &[
    (0xD000_F800, 0xD000_F000, Thumb32Format::BranchWithLink),
    (0xFF00_FFFF, 0x8F00_F3BF, Thumb32Format::Barrier),
    (0xFF00_FFF0, 0x8800_F380, Thumb32Format::MoveToSpecial),
    (0xF000_FFFF, 0x8000_F3EF, Thumb32Format::MoveFromSpecial),
    (0x8000_FA00, 0x0000_F000, Thumb32Format::DataProcessingModifiedImmediate),
    (0x0000_FFE0, 0x0000_F8C0, Thumb32Format::LoadStoreWordImmediate12),
];

/// Classifies a combined 32-bit word. `None` means unsupported.
#[must_use]
pub fn classify_thumb32(word: u32) -> Option<Thumb32Format> {
    THUMB32_FORMAT_TABLE
        .iter()
        .find_map(|(mask, value, format)| (word & mask == *value).then_some(*format))
}

/// Returns `true` when `hw` is the first halfword of a 32-bit encoding.
#[must_use]
pub const fn is_thumb32_prefix(hw: u16) -> bool {
    hw & 0xE000 == 0xE000 && hw & 0x1800 != 0
}

/// Expands a Thumb-2 modified immediate (`i:imm3:imm8`).
#[must_use]
pub const fn decode_imm12(imm12: u16) -> u32 {
    let imm8 = (imm12 & 0xFF) as u32;
    if imm12 & 0x0C00 == 0 {
        match (imm12 >> 8) & 0x3 {
            0 => imm8,
            1 => imm8 | (imm8 << 16),
            2 => (imm8 << 8) | (imm8 << 24),
            _ => imm8 | (imm8 << 8) | (imm8 << 16) | (imm8 << 24),
        }
    } else {
        let unrotated = 0x80 | (imm12 & 0x7F) as u32;
        unrotated.rotate_right(((imm12 >> 7) & 0x1F) as u32)
    }
}

/// Returns the rotation a modified immediate applies, zero for the
/// replicated forms. Drives the shifter carry-out.
#[must_use]
pub const fn imm12_rotation(imm12: u16) -> u32 {
    if imm12 & 0x0C00 == 0 {
        0
    } else {
        ((imm12 >> 7) & 0x1F) as u32
    }
}

/// Expands an A32 rotated immediate: `imm8` rotated right by `2 * rotate`.
#[must_use]
pub const fn decode_imm8_rotated(imm8: u8, rotate: u8) -> u32 {
    (imm8 as u32).rotate_right(2 * (rotate & 0xF) as u32)
}

/// Sign-extends the low `bits` bits of `value`.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub const fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}
