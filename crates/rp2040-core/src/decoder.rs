//! Thumb / Thumb-2 instruction decoder for the Cortex-M0+ subset.
//!
//! Decoding is pure: a raw word and its length go in, a typed
//! [`Instruction`] or a [`DecodeError`] comes out. Format classification is
//! table driven (see [`crate::encoding`]); this module extracts operand
//! fields per format.

use crate::encoding::{
    classify_thumb16, classify_thumb32, decode_imm12, imm12_rotation, sign_extend, Condition,
    OpcodeKind, ShiftType, Thumb16Format, Thumb32Format,
};
use crate::fault::DecodeError;
use crate::memory::AccessWidth;
use crate::state::{sysm, ArmCoreState, PSR_C, PSR_N, PSR_V, PSR_Z};

pub use crate::encoding::is_thumb32_prefix;

const SP: u8 = 13;
const PC: u8 = 15;

/// Decoded instruction with every operand field extracted.
///
/// Register fields hold 4-bit register numbers. For loads and stores `rd`
/// is the transfer register. For register-shifted moves `rm` is the value
/// and `rs` the shift amount register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Instruction {
    /// Operation kind.
    pub kind: OpcodeKind,
    /// Raw word; for 32-bit forms the second halfword is in the high bits.
    pub raw: u32,
    /// Encoding length in bytes (2 or 4).
    pub length: u8,
    /// Condition; always-true for everything but conditional branches.
    pub condition: Condition,
    /// Destination register.
    pub rd: Option<u8>,
    /// Shift-amount register.
    pub rs: Option<u8>,
    /// Second operand register.
    pub rm: Option<u8>,
    /// First operand or base register.
    pub rn: Option<u8>,
    /// Immediate operand, offset or branch displacement.
    pub immediate: i32,
    /// Updates condition flags.
    pub setflags: bool,
    /// Immediate shift amount. For modified immediates, the rotation that
    /// produced `immediate` (drives the shifter carry-out).
    pub shift_amount: u32,
    /// Shift applied to `rm`.
    pub shift_type: ShiftType,
    /// Load/store transfer width.
    pub width: AccessWidth,
    /// Sign-extending load.
    pub signed: bool,
    /// Register bitmap for `LDM`/`STM`/`PUSH`/`POP` (bit 14 = LR, bit 15 = PC).
    pub register_list: u16,
    /// Special-register selector for `MRS`/`MSR`.
    pub sysm: u8,
    /// Base register writeback for `LDM`/`STM`.
    pub writeback: bool,
}

impl Instruction {
    const fn new(kind: OpcodeKind, raw: u32, length: u8) -> Self {
        Self {
            kind,
            raw,
            length,
            condition: Condition::Al,
            rd: None,
            rs: None,
            rm: None,
            rn: None,
            immediate: 0,
            setflags: false,
            shift_amount: 0,
            shift_type: ShiftType::Lsl,
            width: AccessWidth::Word,
            signed: false,
            register_list: 0,
            sysm: 0,
            writeback: false,
        }
    }

    /// The `INVALID` instruction standing in for an undecodable word.
    #[must_use]
    pub const fn invalid(raw: u32, length: u8) -> Self {
        Self::new(OpcodeKind::Invalid, raw, length)
    }

    /// Returns `true` when execution depends on the condition flags.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        !self.condition.is_always()
    }

    /// Number of registers transferred by a multi-register instruction.
    #[must_use]
    pub const fn transfer_count(&self) -> u32 {
        self.register_list.count_ones()
    }
}

/// Stateless Thumb decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder;

impl Decoder {
    /// Decodes `word` as a `length`-byte Thumb instruction.
    ///
    /// For 4-byte forms `word` is `(hw2 << 16) | hw1`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for lengths other than 2 or 4, for a 2-byte
    /// decode of a 32-bit prefix, and for every encoding outside the
    /// modeled subset.
    pub fn decode(word: u32, length: u8) -> Result<Instruction, DecodeError> {
        let decoded = match length {
            2 if word <= 0xFFFF => decode16(word),
            4 => decode32(word),
            _ => None,
        };
        decoded.ok_or(DecodeError::new(word, length))
    }
}

/// Evaluates `condition` against the core's NZCV flags.
#[must_use]
pub const fn check_condition(core: &ArmCoreState, condition: Condition) -> bool {
    let n = core.flag(PSR_N);
    let z = core.flag(PSR_Z);
    let c = core.flag(PSR_C);
    let v = core.flag(PSR_V);
    match condition {
        Condition::Eq => z,
        Condition::Ne => !z,
        Condition::Cs => c,
        Condition::Cc => !c,
        Condition::Mi => n,
        Condition::Pl => !n,
        Condition::Vs => v,
        Condition::Vc => !v,
        Condition::Hi => c && !z,
        Condition::Ls => !c || z,
        Condition::Ge => n == v,
        Condition::Lt => n != v,
        Condition::Gt => !z && n == v,
        Condition::Le => z || n != v,
        Condition::Al | Condition::Always => true,
    }
}

const fn bits(word: u32, lsb: u32, width: u32) -> u32 {
    (word >> lsb) & ((1 << width) - 1)
}

const fn bit(word: u32, lsb: u32) -> bool {
    (word >> lsb) & 1 == 1
}

#[allow(clippy::cast_possible_truncation)]
const fn reg(word: u32, lsb: u32, width: u32) -> u8 {
    bits(word, lsb, width) as u8
}

#[allow(clippy::cast_possible_wrap)]
const fn imm(value: u32) -> i32 {
    value as i32
}

#[allow(clippy::cast_possible_truncation)]
fn decode16(hw: u32) -> Option<Instruction> {
    let format = classify_thumb16(hw as u16)?;
    let base = |kind| Instruction::new(kind, hw, 2);

    let instruction = match format {
        Thumb16Format::ShiftImmediate => {
            let shift_type = ShiftType::from_u2(reg(hw, 11, 2));
            let imm5 = bits(hw, 6, 5);
            let shift_amount = if imm5 == 0 && !matches!(shift_type, ShiftType::Lsl) {
                32
            } else {
                imm5
            };
            Instruction {
                rd: Some(reg(hw, 0, 3)),
                rm: Some(reg(hw, 3, 3)),
                shift_type,
                shift_amount,
                setflags: true,
                ..base(OpcodeKind::Mov)
            }
        }
        Thumb16Format::AddSubtract => {
            let kind = if bit(hw, 9) {
                OpcodeKind::Sub
            } else {
                OpcodeKind::Add
            };
            let (rm, immediate) = if bit(hw, 10) {
                (None, imm(bits(hw, 6, 3)))
            } else {
                (Some(reg(hw, 6, 3)), 0)
            };
            Instruction {
                rd: Some(reg(hw, 0, 3)),
                rn: Some(reg(hw, 3, 3)),
                rm,
                immediate,
                setflags: true,
                ..base(kind)
            }
        }
        Thumb16Format::MoveCompareImmediate => {
            let rdn = Some(reg(hw, 8, 3));
            let immediate = imm(bits(hw, 0, 8));
            let with_imm = |kind| Instruction {
                immediate,
                setflags: true,
                ..base(kind)
            };
            match bits(hw, 11, 2) {
                0 => Instruction {
                    rd: rdn,
                    ..with_imm(OpcodeKind::Mov)
                },
                1 => Instruction {
                    rn: rdn,
                    ..with_imm(OpcodeKind::Cmp)
                },
                2 => Instruction {
                    rd: rdn,
                    rn: rdn,
                    ..with_imm(OpcodeKind::Add)
                },
                _ => Instruction {
                    rd: rdn,
                    rn: rdn,
                    ..with_imm(OpcodeKind::Sub)
                },
            }
        }
        Thumb16Format::DataProcessing => decode_data_processing(hw)?,
        Thumb16Format::HiRegisterOrBranchExchange => {
            let rdn = (reg(hw, 7, 1) << 3) | reg(hw, 0, 3);
            let rm = Some(reg(hw, 3, 4));
            match bits(hw, 8, 2) {
                0 => Instruction {
                    rd: Some(rdn),
                    rn: Some(rdn),
                    rm,
                    ..base(OpcodeKind::Add)
                },
                1 => Instruction {
                    rn: Some(rdn),
                    rm,
                    setflags: true,
                    ..base(OpcodeKind::Cmp)
                },
                2 => Instruction {
                    rd: Some(rdn),
                    rm,
                    ..base(OpcodeKind::Mov)
                },
                _ if bits(hw, 0, 3) != 0 => return None,
                _ if bit(hw, 7) => Instruction {
                    rm,
                    ..base(OpcodeKind::Blx)
                },
                _ => Instruction {
                    rm,
                    ..base(OpcodeKind::Bx)
                },
            }
        }
        Thumb16Format::LoadLiteral => Instruction {
            rd: Some(reg(hw, 8, 3)),
            rn: Some(PC),
            immediate: imm(bits(hw, 0, 8) * 4),
            ..base(OpcodeKind::Ldr)
        },
        Thumb16Format::LoadStoreRegister => {
            let (kind, width, signed) = match bits(hw, 9, 3) {
                0 => (OpcodeKind::Str, AccessWidth::Word, false),
                1 => (OpcodeKind::Str, AccessWidth::Halfword, false),
                2 => (OpcodeKind::Str, AccessWidth::Byte, false),
                3 => (OpcodeKind::Ldr, AccessWidth::Byte, true),
                4 => (OpcodeKind::Ldr, AccessWidth::Word, false),
                5 => (OpcodeKind::Ldr, AccessWidth::Halfword, false),
                6 => (OpcodeKind::Ldr, AccessWidth::Byte, false),
                _ => (OpcodeKind::Ldr, AccessWidth::Halfword, true),
            };
            Instruction {
                rd: Some(reg(hw, 0, 3)),
                rn: Some(reg(hw, 3, 3)),
                rm: Some(reg(hw, 6, 3)),
                width,
                signed,
                ..base(kind)
            }
        }
        Thumb16Format::LoadStoreWordImmediate => load_store_imm5(hw, AccessWidth::Word),
        Thumb16Format::LoadStoreByteImmediate => load_store_imm5(hw, AccessWidth::Byte),
        Thumb16Format::LoadStoreHalfwordImmediate => load_store_imm5(hw, AccessWidth::Halfword),
        Thumb16Format::LoadStoreSpRelative => Instruction {
            rd: Some(reg(hw, 8, 3)),
            rn: Some(SP),
            immediate: imm(bits(hw, 0, 8) * 4),
            ..base(load_or_store(hw))
        },
        Thumb16Format::AddressGeneration => Instruction {
            rd: Some(reg(hw, 8, 3)),
            rn: Some(if bit(hw, 11) { SP } else { PC }),
            immediate: imm(bits(hw, 0, 8) * 4),
            ..base(OpcodeKind::Add)
        },
        Thumb16Format::Miscellaneous => decode_miscellaneous(hw)?,
        Thumb16Format::LoadStoreMultiple => {
            let rn = reg(hw, 8, 3);
            let register_list = bits(hw, 0, 8) as u16;
            if register_list == 0 {
                return None;
            }
            let kind = load_or_store_multiple(hw);
            let writeback =
                matches!(kind, OpcodeKind::Stm) || register_list & (1 << rn) == 0;
            Instruction {
                rn: Some(rn),
                register_list,
                writeback,
                ..base(kind)
            }
        }
        Thumb16Format::ConditionalBranchOrSvc => match bits(hw, 8, 4) {
            0xE => return None,
            0xF => Instruction {
                immediate: imm(bits(hw, 0, 8)),
                ..base(OpcodeKind::Svc)
            },
            cond => Instruction {
                condition: Condition::from_u4(cond as u8),
                immediate: sign_extend(bits(hw, 0, 8) << 1, 9),
                ..base(OpcodeKind::B)
            },
        },
        Thumb16Format::UnconditionalBranch => Instruction {
            immediate: sign_extend(bits(hw, 0, 11) << 1, 12),
            ..base(OpcodeKind::B)
        },
    };
    Some(instruction)
}

const fn load_or_store(hw: u32) -> OpcodeKind {
    if bit(hw, 11) {
        OpcodeKind::Ldr
    } else {
        OpcodeKind::Str
    }
}

const fn load_or_store_multiple(hw: u32) -> OpcodeKind {
    if bit(hw, 11) {
        OpcodeKind::Ldm
    } else {
        OpcodeKind::Stm
    }
}

fn load_store_imm5(hw: u32, width: AccessWidth) -> Instruction {
    Instruction {
        rd: Some(reg(hw, 0, 3)),
        rn: Some(reg(hw, 3, 3)),
        immediate: imm(bits(hw, 6, 5) * width.bytes()),
        width,
        ..Instruction::new(load_or_store(hw), hw, 2)
    }
}

fn decode_data_processing(hw: u32) -> Option<Instruction> {
    let rdn = Some(reg(hw, 0, 3));
    let rm = Some(reg(hw, 3, 3));
    let base = Instruction {
        setflags: true,
        ..Instruction::new(OpcodeKind::Invalid, hw, 2)
    };
    let logical = |kind| Instruction {
        kind,
        rd: rdn,
        rn: rdn,
        rm,
        ..base
    };
    let shift_by_register = |shift_type| Instruction {
        kind: OpcodeKind::Mov,
        rd: rdn,
        rm: rdn,
        rs: rm,
        shift_type,
        ..base
    };
    let compare = |kind| Instruction {
        kind,
        rn: rdn,
        rm,
        ..base
    };

    Some(match bits(hw, 6, 4) {
        0x0 => logical(OpcodeKind::And),
        0x1 => logical(OpcodeKind::Xor),
        0x2 => shift_by_register(ShiftType::Lsl),
        0x3 => shift_by_register(ShiftType::Lsr),
        0x4 => shift_by_register(ShiftType::Asr),
        0x7 => shift_by_register(ShiftType::Ror),
        0x8 => compare(OpcodeKind::Tst),
        0xA => compare(OpcodeKind::Cmp),
        0xC => logical(OpcodeKind::Orr),
        // ADC, SBC, RSB, CMN, MUL, BIC, MVN
        _ => return None,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn decode_miscellaneous(hw: u32) -> Option<Instruction> {
    let base = |kind| Instruction::new(kind, hw, 2);

    if hw & 0xFF00 == 0xB000 {
        let kind = if bit(hw, 7) {
            OpcodeKind::Sub
        } else {
            OpcodeKind::Add
        };
        return Some(Instruction {
            rd: Some(SP),
            rn: Some(SP),
            immediate: imm(bits(hw, 0, 7) * 4),
            ..base(kind)
        });
    }

    if hw & 0xF600 == 0xB400 {
        let pop = bit(hw, 11);
        let extra = if pop { 1 << 15 } else { 1 << 14 };
        let mut register_list = bits(hw, 0, 8) as u16;
        if bit(hw, 8) {
            register_list |= extra;
        }
        if register_list == 0 {
            return None;
        }
        let kind = if pop { OpcodeKind::Pop } else { OpcodeKind::Push };
        return Some(Instruction {
            rn: Some(SP),
            register_list,
            ..base(kind)
        });
    }

    if hw & 0xFFEF == 0xB662 {
        return Some(Instruction {
            sysm: sysm::PRIMASK,
            immediate: i32::from(bit(hw, 4)),
            ..base(OpcodeKind::Msr)
        });
    }

    if hw & 0xFF0F == 0xBF00 {
        return match bits(hw, 4, 4) {
            0x0 | 0x1 | 0x4 => Some(base(OpcodeKind::Nop)),
            0x2 | 0x3 => Some(base(OpcodeKind::Wfi)),
            _ => None,
        };
    }

    None
}

fn decode32(word: u32) -> Option<Instruction> {
    let hw1 = word & 0xFFFF;
    let hw2 = word >> 16;
    let base = |kind| Instruction::new(kind, word, 4);

    let instruction = match classify_thumb32(word)? {
        Thumb32Format::BranchWithLink => {
            let s = bits(hw1, 10, 1);
            let i1 = !(bits(hw2, 13, 1) ^ s) & 1;
            let i2 = !(bits(hw2, 11, 1) ^ s) & 1;
            let offset = (s << 24)
                | (i1 << 23)
                | (i2 << 22)
                | (bits(hw1, 0, 10) << 12)
                | (bits(hw2, 0, 11) << 1);
            Instruction {
                immediate: sign_extend(offset, 25),
                ..base(OpcodeKind::Bl)
            }
        }
        Thumb32Format::MoveToSpecial => Instruction {
            rn: Some(reg(hw1, 0, 4)),
            sysm: reg(hw2, 0, 8),
            ..base(OpcodeKind::Msr)
        },
        Thumb32Format::MoveFromSpecial => Instruction {
            rd: Some(reg(hw2, 8, 4)),
            sysm: reg(hw2, 0, 8),
            ..base(OpcodeKind::Mrs)
        },
        // DSB, DMB, ISB
        Thumb32Format::Barrier => match bits(hw2, 4, 4) {
            0x4..=0x6 => base(OpcodeKind::Nop),
            _ => return None,
        },
        Thumb32Format::DataProcessingModifiedImmediate => decode_modified_immediate(word)?,
        Thumb32Format::LoadStoreWordImmediate12 => {
            let load = bit(hw1, 4);
            let rn = reg(hw1, 0, 4);
            if !load && rn == PC {
                return None;
            }
            Instruction {
                rd: Some(reg(hw2, 12, 4)),
                rn: Some(rn),
                immediate: imm(bits(hw2, 0, 12)),
                ..base(if load { OpcodeKind::Ldr } else { OpcodeKind::Str })
            }
        }
    };
    Some(instruction)
}

#[allow(clippy::cast_possible_truncation)]
fn decode_modified_immediate(word: u32) -> Option<Instruction> {
    let hw1 = word & 0xFFFF;
    let hw2 = word >> 16;
    let imm12 = ((bits(hw1, 10, 1) << 11) | (bits(hw2, 12, 3) << 8) | bits(hw2, 0, 8)) as u16;
    let rn = reg(hw1, 0, 4);
    let rd = reg(hw2, 8, 4);
    let setflags = bit(hw1, 4);
    let compare_form = rd == PC && setflags;

    let operand = |kind| Instruction {
        immediate: imm(decode_imm12(imm12)),
        shift_type: ShiftType::Ror,
        shift_amount: imm12_rotation(imm12),
        setflags,
        ..Instruction::new(kind, word, 4)
    };
    let binary = |kind| Instruction {
        rd: Some(rd),
        rn: Some(rn),
        ..operand(kind)
    };
    let test = |kind| Instruction {
        rn: Some(rn),
        ..operand(kind)
    };

    Some(match bits(hw1, 5, 4) {
        0x0 if compare_form => test(OpcodeKind::Tst),
        0x0 => binary(OpcodeKind::And),
        0x2 if rn == PC => Instruction {
            rd: Some(rd),
            ..operand(OpcodeKind::Mov)
        },
        0x2 => binary(OpcodeKind::Orr),
        0x4 if !compare_form => binary(OpcodeKind::Xor),
        0x8 if !compare_form => binary(OpcodeKind::Add),
        0xD if compare_form => test(OpcodeKind::Cmp),
        0xD => binary(OpcodeKind::Sub),
        // BIC, ORN, MVN, TEQ, CMN, ADC, SBC, RSB
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::{check_condition, Decoder, Instruction};
    use crate::encoding::{is_thumb32_prefix, Condition, OpcodeKind, ShiftType};
    use crate::fault::DecodeError;
    use crate::memory::AccessWidth;
    use crate::state::{sysm, ArmCoreState, PSR_C, PSR_N, PSR_V, PSR_Z};

    fn decode16(hw: u16) -> Instruction {
        Decoder::decode(u32::from(hw), 2)
            .unwrap_or_else(|err| panic!("{hw:#06x} should decode: {err}"))
    }

    fn decode32(hw1: u16, hw2: u16) -> Instruction {
        let word = (u32::from(hw2) << 16) | u32::from(hw1);
        Decoder::decode(word, 4).unwrap_or_else(|err| panic!("{word:#010x} should decode: {err}"))
    }

    #[test]
    fn bx_lr_decodes_with_rm_fourteen() {
        let instr = decode16(0x4770);
        assert_eq!(instr.kind, OpcodeKind::Bx);
        assert_eq!(instr.rm, Some(14));
        assert_eq!(instr.length, 2);
        assert_eq!(instr.condition, Condition::Al);
    }

    #[rstest]
    #[case(0x2000, OpcodeKind::Mov, Some(0), None, None, 0)]
    #[case(0x2A05, OpcodeKind::Cmp, None, Some(2), None, 5)]
    #[case(0x3107, OpcodeKind::Add, Some(1), Some(1), None, 7)]
    #[case(0x3B01, OpcodeKind::Sub, Some(3), Some(3), None, 1)]
    #[case(0x1888, OpcodeKind::Add, Some(0), Some(1), Some(2), 0)]
    #[case(0x1E48, OpcodeKind::Sub, Some(0), Some(1), None, 1)]
    #[case(0x4008, OpcodeKind::And, Some(0), Some(0), Some(1), 0)]
    #[case(0x4048, OpcodeKind::Xor, Some(0), Some(0), Some(1), 0)]
    #[case(0x4308, OpcodeKind::Orr, Some(0), Some(0), Some(1), 0)]
    #[case(0x4208, OpcodeKind::Tst, None, Some(0), Some(1), 0)]
    #[case(0x4288, OpcodeKind::Cmp, None, Some(0), Some(1), 0)]
    #[case(0x4485, OpcodeKind::Add, Some(13), Some(13), Some(0), 0)]
    #[case(0x46F7, OpcodeKind::Mov, Some(15), None, Some(14), 0)]
    #[case(0x4780, OpcodeKind::Blx, None, None, Some(0), 0)]
    #[case(0x4902, OpcodeKind::Ldr, Some(1), Some(15), None, 8)]
    #[case(0x6848, OpcodeKind::Ldr, Some(0), Some(1), None, 4)]
    #[case(0x6008, OpcodeKind::Str, Some(0), Some(1), None, 0)]
    #[case(0x9001, OpcodeKind::Str, Some(0), Some(13), None, 4)]
    #[case(0x9F02, OpcodeKind::Ldr, Some(7), Some(13), None, 8)]
    #[case(0xA001, OpcodeKind::Add, Some(0), Some(15), None, 4)]
    #[case(0xA902, OpcodeKind::Add, Some(1), Some(13), None, 8)]
    #[case(0xB082, OpcodeKind::Sub, Some(13), Some(13), None, 8)]
    #[case(0xB002, OpcodeKind::Add, Some(13), Some(13), None, 8)]
    #[case(0xDF05, OpcodeKind::Svc, None, None, None, 5)]
    fn sixteen_bit_encodings_extract_operands(
        #[case] hw: u16,
        #[case] kind: OpcodeKind,
        #[case] rd: Option<u8>,
        #[case] rn: Option<u8>,
        #[case] rm: Option<u8>,
        #[case] immediate: i32,
    ) {
        let instr = decode16(hw);
        assert_eq!(instr.kind, kind, "{hw:#06x}");
        assert_eq!(instr.rd, rd, "{hw:#06x} rd");
        assert_eq!(instr.rn, rn, "{hw:#06x} rn");
        assert_eq!(instr.rm, rm, "{hw:#06x} rm");
        assert_eq!(instr.immediate, immediate, "{hw:#06x} imm");
    }

    #[rstest]
    #[case(0x0088, ShiftType::Lsl, 2)]
    #[case(0x0848, ShiftType::Lsr, 1)]
    #[case(0x0808, ShiftType::Lsr, 32)]
    #[case(0x1008, ShiftType::Asr, 32)]
    fn immediate_shifts_decode_as_flag_setting_moves(
        #[case] hw: u16,
        #[case] shift_type: ShiftType,
        #[case] amount: u32,
    ) {
        let instr = decode16(hw);
        assert_eq!(instr.kind, OpcodeKind::Mov);
        assert_eq!(instr.shift_type, shift_type);
        assert_eq!(instr.shift_amount, amount);
        assert!(instr.setflags);
        assert_eq!(instr.rs, None);
    }

    #[test]
    fn register_shifts_use_rs_for_the_amount() {
        let instr = decode16(0x40C8);
        assert_eq!(instr.kind, OpcodeKind::Mov);
        assert_eq!(instr.shift_type, ShiftType::Lsr);
        assert_eq!(instr.rd, Some(0));
        assert_eq!(instr.rm, Some(0));
        assert_eq!(instr.rs, Some(1));

        assert_eq!(decode16(0x41C8).shift_type, ShiftType::Ror);
    }

    #[test]
    fn hi_register_forms_leave_flags_alone_except_compare() {
        assert!(!decode16(0x4485).setflags);
        assert!(!decode16(0x46F7).setflags);
        assert!(decode16(0x45F0).setflags);
    }

    #[rstest]
    #[case(0x5888, OpcodeKind::Ldr, AccessWidth::Word, false)]
    #[case(0x5A88, OpcodeKind::Ldr, AccessWidth::Halfword, false)]
    #[case(0x5C88, OpcodeKind::Ldr, AccessWidth::Byte, false)]
    #[case(0x5688, OpcodeKind::Ldr, AccessWidth::Byte, true)]
    #[case(0x5E88, OpcodeKind::Ldr, AccessWidth::Halfword, true)]
    #[case(0x5088, OpcodeKind::Str, AccessWidth::Word, false)]
    #[case(0x5288, OpcodeKind::Str, AccessWidth::Halfword, false)]
    #[case(0x5488, OpcodeKind::Str, AccessWidth::Byte, false)]
    #[case(0x7848, OpcodeKind::Ldr, AccessWidth::Byte, false)]
    #[case(0x8848, OpcodeKind::Ldr, AccessWidth::Halfword, false)]
    #[case(0x7048, OpcodeKind::Str, AccessWidth::Byte, false)]
    fn load_store_widths_and_signedness(
        #[case] hw: u16,
        #[case] kind: OpcodeKind,
        #[case] width: AccessWidth,
        #[case] signed: bool,
    ) {
        let instr = decode16(hw);
        assert_eq!(instr.kind, kind);
        assert_eq!(instr.width, width);
        assert_eq!(instr.signed, signed);
    }

    #[test]
    fn immediate_offsets_scale_with_width() {
        assert_eq!(decode16(0x7848).immediate, 1);
        assert_eq!(decode16(0x8848).immediate, 2);
        assert_eq!(decode16(0x6848).immediate, 4);
    }

    #[test]
    fn push_and_pop_fold_lr_and_pc_into_the_list() {
        let push = decode16(0xB510);
        assert_eq!(push.kind, OpcodeKind::Push);
        assert_eq!(push.register_list, (1 << 4) | (1 << 14));

        let pop = decode16(0xBD10);
        assert_eq!(pop.kind, OpcodeKind::Pop);
        assert_eq!(pop.register_list, (1 << 4) | (1 << 15));
        assert_eq!(pop.transfer_count(), 2);
    }

    #[test]
    fn multiple_transfers_decide_writeback_from_the_list() {
        let stm = decode16(0xC103);
        assert_eq!(stm.kind, OpcodeKind::Stm);
        assert_eq!(stm.rn, Some(1));
        assert!(stm.writeback);

        let ldm_with_base = decode16(0xC906);
        assert_eq!(ldm_with_base.kind, OpcodeKind::Ldm);
        assert!(!ldm_with_base.writeback);

        assert!(decode16(0xC905).writeback);
    }

    #[test]
    fn empty_register_lists_are_rejected() {
        for hw in [0xB400_u16, 0xBC00, 0xC000, 0xC800] {
            assert_eq!(
                Decoder::decode(u32::from(hw), 2),
                Err(DecodeError::new(u32::from(hw), 2))
            );
        }
    }

    #[test]
    fn hints_collapse_to_nop_or_wfi() {
        assert_eq!(decode16(0xBF00).kind, OpcodeKind::Nop);
        assert_eq!(decode16(0xBF10).kind, OpcodeKind::Nop);
        assert_eq!(decode16(0xBF40).kind, OpcodeKind::Nop);
        assert_eq!(decode16(0xBF20).kind, OpcodeKind::Wfi);
        assert_eq!(decode16(0xBF30).kind, OpcodeKind::Wfi);
        assert!(Decoder::decode(0xBF08, 2).is_err());
    }

    #[test]
    fn cps_decodes_to_primask_writes() {
        let disable = decode16(0xB672);
        assert_eq!(disable.kind, OpcodeKind::Msr);
        assert_eq!(disable.sysm, sysm::PRIMASK);
        assert_eq!(disable.rn, None);
        assert_eq!(disable.immediate, 1);
        assert_eq!(decode16(0xB662).immediate, 0);
    }

    #[test]
    fn conditional_branches_carry_condition_and_signed_offset() {
        let beq_back = decode16(0xD0FE);
        assert_eq!(beq_back.kind, OpcodeKind::B);
        assert_eq!(beq_back.condition, Condition::Eq);
        assert_eq!(beq_back.immediate, -4);
        assert!(beq_back.is_conditional());

        let bne_forward = decode16(0xD102);
        assert_eq!(bne_forward.condition, Condition::Ne);
        assert_eq!(bne_forward.immediate, 4);

        let b_self = decode16(0xE7FE);
        assert_eq!(b_self.immediate, -4);
        assert!(!b_self.is_conditional());
    }

    #[test]
    fn bl_offset_combines_both_halves() {
        let forward = decode32(0xF000, 0xF802);
        assert_eq!(forward.kind, OpcodeKind::Bl);
        assert_eq!(forward.length, 4);
        assert_eq!(forward.immediate, 4);

        let backward = decode32(0xF7FF, 0xFFFE);
        assert_eq!(backward.immediate, -4);
    }

    #[test]
    fn special_register_moves_and_barriers() {
        let msr = decode32(0xF380, 0x8810);
        assert_eq!(msr.kind, OpcodeKind::Msr);
        assert_eq!(msr.rn, Some(0));
        assert_eq!(msr.sysm, sysm::PRIMASK);

        let mrs = decode32(0xF3EF, 0x8308);
        assert_eq!(mrs.kind, OpcodeKind::Mrs);
        assert_eq!(mrs.rd, Some(3));
        assert_eq!(mrs.sysm, sysm::MSP);

        for hw2 in [0x8F4F_u16, 0x8F5F, 0x8F6F] {
            assert_eq!(decode32(0xF3BF, hw2).kind, OpcodeKind::Nop);
        }
    }

    #[rstest]
    #[case(0xF000, 0x01FF, OpcodeKind::And, Some(1), Some(0), 0xFF)]
    #[case(0xF010, 0x0F01, OpcodeKind::Tst, None, Some(0), 1)]
    #[case(0xF04F, 0x4080, OpcodeKind::Mov, Some(0), None, 0x4000_0000)]
    #[case(0xF041, 0x1203, OpcodeKind::Orr, Some(2), Some(1), 0x0003_0003)]
    #[case(0xF081, 0x0201, OpcodeKind::Xor, Some(2), Some(1), 1)]
    #[case(0xF101, 0x0204, OpcodeKind::Add, Some(2), Some(1), 4)]
    #[case(0xF1B0, 0x0F10, OpcodeKind::Cmp, None, Some(0), 0x10)]
    #[case(0xF1A1, 0x0201, OpcodeKind::Sub, Some(2), Some(1), 1)]
    #[allow(clippy::cast_sign_loss)]
    fn modified_immediate_data_processing(
        #[case] hw1: u16,
        #[case] hw2: u16,
        #[case] kind: OpcodeKind,
        #[case] rd: Option<u8>,
        #[case] rn: Option<u8>,
        #[case] value: u32,
    ) {
        let instr = decode32(hw1, hw2);
        assert_eq!(instr.kind, kind);
        assert_eq!(instr.rd, rd);
        assert_eq!(instr.rn, rn);
        assert_eq!(instr.immediate as u32, value);
    }

    #[test]
    fn wide_word_loads_and_stores() {
        let ldr = decode32(0xF8D1, 0x0FFC);
        assert_eq!(ldr.kind, OpcodeKind::Ldr);
        assert_eq!(ldr.rd, Some(0));
        assert_eq!(ldr.rn, Some(1));
        assert_eq!(ldr.immediate, 0xFFC);

        let str_w = decode32(0xF8C2, 0x3004);
        assert_eq!(str_w.kind, OpcodeKind::Str);
        assert_eq!(str_w.rd, Some(3));
        assert_eq!(str_w.rn, Some(2));

        assert!(Decoder::decode(0x3004_F8CF, 4).is_err());
    }

    #[rstest]
    #[case(0xDE00, 2)]
    #[case(0x4140, 2)]
    #[case(0x4340, 2)]
    #[case(0xBA00, 2)]
    #[case(0xBE00, 2)]
    #[case(0xBF18, 2)]
    #[case(0xF000, 2)]
    #[case(0x4770, 3)]
    #[case(0x1_4770, 2)]
    #[case(0x0000_E800, 4)]
    fn unsupported_encodings_return_decode_errors(#[case] raw: u32, #[case] length: u8) {
        let err = Decoder::decode(raw, length).expect_err("must not decode");
        assert_eq!(err, DecodeError::new(raw, length));
        assert_eq!(err.instruction().kind, OpcodeKind::Invalid);
    }

    #[test]
    fn exhaustive_sixteen_bit_decode_respects_prefix_rule() {
        for hw in 0..=u16::MAX {
            match Decoder::decode(u32::from(hw), 2) {
                Ok(instr) => {
                    assert!(!is_thumb32_prefix(hw), "{hw:#06x}");
                    assert_eq!(instr.length, 2);
                    assert_ne!(instr.kind, OpcodeKind::Invalid);
                }
                Err(err) => assert_eq!(err.raw, u32::from(hw)),
            }
        }
    }

    #[rstest]
    #[case(Condition::Eq, PSR_Z, true)]
    #[case(Condition::Ne, PSR_Z, false)]
    #[case(Condition::Cs, PSR_C, true)]
    #[case(Condition::Cc, 0, true)]
    #[case(Condition::Mi, PSR_N, true)]
    #[case(Condition::Pl, PSR_N, false)]
    #[case(Condition::Vs, PSR_V, true)]
    #[case(Condition::Vc, PSR_V, false)]
    #[case(Condition::Hi, PSR_C, true)]
    #[case(Condition::Hi, PSR_C | PSR_Z, false)]
    #[case(Condition::Ls, PSR_Z, true)]
    #[case(Condition::Ge, PSR_N | PSR_V, true)]
    #[case(Condition::Lt, PSR_N, true)]
    #[case(Condition::Gt, 0, true)]
    #[case(Condition::Gt, PSR_Z, false)]
    #[case(Condition::Le, PSR_V, true)]
    #[case(Condition::Al, 0, true)]
    #[case(Condition::Always, PSR_N | PSR_Z | PSR_C | PSR_V, true)]
    fn condition_table_matches_arm_semantics(
        #[case] condition: Condition,
        #[case] flags: u32,
        #[case] expected: bool,
    ) {
        let mut core = ArmCoreState::default();
        core.set_nzcv(
            flags & PSR_N != 0,
            flags & PSR_Z != 0,
            flags & PSR_C != 0,
            flags & PSR_V != 0,
        );
        assert_eq!(check_condition(&core, condition), expected);
    }

    proptest! {
        #[test]
        fn decode_never_panics_on_any_word(word in any::<u32>(), length in 0_u8..8) {
            let _ = Decoder::decode(word, length);
        }

        #[test]
        fn inverse_conditions_disagree(bits in 0_u8..14, flags in 0_u32..16) {
            let mut core = ArmCoreState::default();
            core.set_nzcv(flags & 8 != 0, flags & 4 != 0, flags & 2 != 0, flags & 1 != 0);
            let even = Condition::from_u4(bits & !1);
            let odd = Condition::from_u4(bits | 1);
            prop_assert_ne!(check_condition(&core, even), check_condition(&core, odd));
        }
    }
}
