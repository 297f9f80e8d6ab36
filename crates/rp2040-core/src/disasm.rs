//! Thumb disassembly for trace output and the debug API.
//!
//! Rows are produced from decoded [`Instruction`]s, so the text always
//! agrees with what the engine executes. Words that do not decode are shown
//! as `.inst` rows.

use std::fmt::{self, Write as _};

use crate::api::Bus;
use crate::decoder::{is_thumb32_prefix, Decoder, Instruction};
use crate::encoding::{OpcodeKind, ShiftType};
use crate::memory::AccessWidth;
use crate::state::{sysm, Register};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisassemblyRow {
    /// Address of the instruction.
    pub addr: u32,
    /// Length in bytes (2 or 4).
    pub length: u8,
    /// Raw word; second halfword in the high bits for 32-bit forms.
    pub raw: u32,
    /// Mnemonic including condition and flag suffixes.
    pub mnemonic: String,
    /// Formatted operands.
    pub operands: String,
    /// The word did not decode.
    pub is_invalid: bool,
}

impl fmt::Display for DisassemblyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = if self.length == 4 {
            format!("{:04x} {:04x}", self.raw & 0xFFFF, self.raw >> 16)
        } else {
            format!("{:04x}     ", self.raw)
        };
        write!(f, "{:08x}:  {raw}  {}", self.addr, self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands)?;
        }
        Ok(())
    }
}

/// Renders `instr`, located at `pc`, as `mnemonic operands`.
#[must_use]
pub fn disassemble(instr: &Instruction, pc: u32) -> String {
    let row = disassemble_instruction(instr, pc);
    if row.operands.is_empty() {
        row.mnemonic
    } else {
        format!("{} {}", row.mnemonic, row.operands)
    }
}

/// Builds the row for a decoded instruction at `pc`.
#[must_use]
pub fn disassemble_instruction(instr: &Instruction, pc: u32) -> DisassemblyRow {
    DisassemblyRow {
        addr: pc,
        length: instr.length,
        raw: instr.raw,
        mnemonic: format_mnemonic(instr),
        operands: format_operands(instr, pc),
        is_invalid: instr.kind == OpcodeKind::Invalid,
    }
}

/// Disassembles up to `count` consecutive instructions starting at `start`.
///
/// Memory is read through instruction fetches, so peripheral registers are
/// never touched. The listing stops early at the first rejected fetch.
pub fn disassemble_range(bus: &mut dyn Bus, start: u32, count: usize) -> Vec<DisassemblyRow> {
    let mut rows = Vec::new();
    let mut pc = start & !1;
    for _ in 0..count {
        let Ok(hw1) = bus.fetch_halfword(pc) else {
            break;
        };
        let (word, length) = if is_thumb32_prefix(hw1) {
            let Ok(hw2) = bus.fetch_halfword(pc.wrapping_add(2)) else {
                break;
            };
            ((u32::from(hw2) << 16) | u32::from(hw1), 4)
        } else {
            (u32::from(hw1), 2)
        };
        let instr = Decoder::decode(word, length).unwrap_or_else(|err| err.instruction());
        rows.push(disassemble_instruction(&instr, pc));
        pc = pc.wrapping_add(u32::from(length));
    }
    rows
}

fn format_mnemonic(instr: &Instruction) -> String {
    let s = if instr.setflags { "s" } else { "" };
    match instr.kind {
        OpcodeKind::Invalid => ".inst".to_string(),
        OpcodeKind::Mov if instr.rs.is_some() || has_immediate_shift(instr) => {
            format!("{}{s}", instr.shift_type.mnemonic())
        }
        OpcodeKind::Add | OpcodeKind::Sub | OpcodeKind::Mov => {
            format!("{}{s}", instr.kind.mnemonic())
        }
        OpcodeKind::And | OpcodeKind::Orr | OpcodeKind::Xor => {
            format!("{}{s}", instr.kind.mnemonic())
        }
        OpcodeKind::B => format!("b{}", instr.condition.suffix()),
        OpcodeKind::Ldr | OpcodeKind::Str => {
            let signed = if instr.signed { "s" } else { "" };
            let width = match instr.width {
                AccessWidth::Byte => "b",
                AccessWidth::Halfword => "h",
                AccessWidth::Word => "",
            };
            format!("{}{signed}{width}", instr.kind.mnemonic())
        }
        OpcodeKind::Msr if instr.rn.is_none() => {
            if instr.immediate == 0 {
                "cpsie".to_string()
            } else {
                "cpsid".to_string()
            }
        }
        kind => kind.mnemonic().to_string(),
    }
}

// Register-to-register moves carry `rm`; an immediate LSL #0 is a plain move.
fn has_immediate_shift(instr: &Instruction) -> bool {
    instr.rm.is_some() && (instr.shift_amount != 0 || instr.shift_type != ShiftType::Lsl)
}

fn reg_name(reg: u8) -> &'static str {
    Register::from_u4(reg).name()
}

fn special_name(sysm_value: u8) -> &'static str {
    match sysm_value {
        sysm::APSR => "apsr",
        sysm::IAPSR => "iapsr",
        sysm::EAPSR => "eapsr",
        sysm::XPSR => "xpsr",
        sysm::IPSR => "ipsr",
        sysm::EPSR => "epsr",
        sysm::IEPSR => "iepsr",
        sysm::MSP => "msp",
        sysm::PSP => "psp",
        sysm::PRIMASK => "primask",
        sysm::BASEPRI => "basepri",
        sysm::BASEPRI_MAX => "basepri_max",
        sysm::FAULTMASK => "faultmask",
        sysm::CONTROL => "control",
        _ => "unknown",
    }
}

fn register_list(list: u16) -> String {
    let names: Vec<&str> = (0..16_u8)
        .filter(|&reg| list & (1 << reg) != 0)
        .map(reg_name)
        .collect();
    format!("{{{}}}", names.join(", "))
}

fn branch_target(pc: u32, offset: i32) -> u32 {
    pc.wrapping_add(4).wrapping_add_signed(offset)
}

fn format_operands(instr: &Instruction, pc: u32) -> String {
    let rd = instr.rd.map(reg_name);
    let rn = instr.rn.map(reg_name);
    let rm = instr.rm.map(reg_name);
    let imm = instr.immediate;

    match instr.kind {
        OpcodeKind::Invalid => {
            if instr.length == 4 {
                format!("0x{:08x}", instr.raw)
            } else {
                format!("0x{:04x}", instr.raw)
            }
        }
        OpcodeKind::Nop | OpcodeKind::Wfi => String::new(),
        OpcodeKind::Svc => format!("#{imm}"),
        OpcodeKind::B | OpcodeKind::Bl => format!("0x{:08x}", branch_target(pc, imm)),
        OpcodeKind::Bx | OpcodeKind::Blx => rm.unwrap_or_default().to_string(),
        OpcodeKind::Mov => format_move(instr),
        OpcodeKind::Cmp | OpcodeKind::Tst => {
            let mut text = rn.unwrap_or_default().to_string();
            match rm {
                Some(rm) => {
                    let _ = write!(text, ", {rm}");
                }
                None => {
                    let _ = write!(text, ", #{imm}");
                }
            }
            text
        }
        OpcodeKind::Add
        | OpcodeKind::Sub
        | OpcodeKind::And
        | OpcodeKind::Orr
        | OpcodeKind::Xor => {
            let mut text = rd.unwrap_or_default().to_string();
            if instr.rn != instr.rd {
                if let Some(rn) = rn {
                    let _ = write!(text, ", {rn}");
                }
            }
            match rm {
                Some(rm) => {
                    let _ = write!(text, ", {rm}");
                }
                None => {
                    let _ = write!(text, ", #{imm}");
                }
            }
            text
        }
        OpcodeKind::Ldr | OpcodeKind::Str => {
            let rt = rd.unwrap_or_default();
            let base = rn.unwrap_or_default();
            match rm {
                Some(rm) => format!("{rt}, [{base}, {rm}]"),
                None if imm == 0 => format!("{rt}, [{base}]"),
                None => format!("{rt}, [{base}, #{imm}]"),
            }
        }
        OpcodeKind::Ldm | OpcodeKind::Stm => {
            let bang = if instr.writeback { "!" } else { "" };
            format!(
                "{}{bang}, {}",
                rn.unwrap_or_default(),
                register_list(instr.register_list)
            )
        }
        OpcodeKind::Push | OpcodeKind::Pop => register_list(instr.register_list),
        OpcodeKind::Mrs => format!("{}, {}", rd.unwrap_or_default(), special_name(instr.sysm)),
        OpcodeKind::Msr => match rn {
            Some(rn) => format!("{}, {rn}", special_name(instr.sysm)),
            None => "i".to_string(),
        },
    }
}

fn format_move(instr: &Instruction) -> String {
    let rd = instr.rd.map(reg_name).unwrap_or_default();
    match (instr.rm.map(reg_name), instr.rs.map(reg_name)) {
        (Some(rm), Some(rs)) => format!("{rd}, {rm}, {rs}"),
        (Some(rm), None) if has_immediate_shift(instr) => {
            format!("{rd}, {rm}, #{}", instr.shift_amount)
        }
        (Some(rm), None) => format!("{rd}, {rm}"),
        (None, _) => format!("{rd}, #{}", instr.immediate),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{disassemble, disassemble_range};
    use crate::api::Bus;
    use crate::decoder::Decoder;
    use crate::memory::{SystemBus, SRAM_BASE, UART0_BASE};

    fn text16(hw: u16, pc: u32) -> String {
        let instr = Decoder::decode(u32::from(hw), 2).expect("decodes");
        disassemble(&instr, pc)
    }

    #[rstest]
    #[case(0x2041, "movs r0, #65")]
    #[case(0x0048, "lsls r0, r1, #1")]
    #[case(0x0008, "movs r0, r1")]
    #[case(0x4088, "lsls r0, r0, r1")]
    #[case(0x1888, "adds r0, r1, r2")]
    #[case(0x3107, "adds r1, #7")]
    #[case(0x4288, "cmp r0, r1")]
    #[case(0x4770, "bx lr")]
    #[case(0x46F7, "mov pc, lr")]
    #[case(0x4902, "ldr r1, [pc, #8]")]
    #[case(0x6008, "str r0, [r1]")]
    #[case(0x5C88, "ldrb r0, [r1, r2]")]
    #[case(0x5E88, "ldrsh r0, [r1, r2]")]
    #[case(0xB510, "push {r4, lr}")]
    #[case(0xBD10, "pop {r4, pc}")]
    #[case(0xC806, "ldm r0!, {r1, r2}")]
    #[case(0xC901, "ldm r1!, {r0}")]
    #[case(0xDF05, "svc #5")]
    #[case(0xBF30, "wfi")]
    #[case(0xBF00, "nop")]
    #[case(0xB672, "cpsid i")]
    #[case(0xB662, "cpsie i")]
    fn sixteen_bit_forms_render_in_unified_syntax(#[case] hw: u16, #[case] text: &str) {
        assert_eq!(text16(hw, SRAM_BASE), text);
    }

    #[test]
    fn branches_render_absolute_targets() {
        assert_eq!(text16(0xE7FE, SRAM_BASE + 8), "b 0x20000008");
        assert_eq!(text16(0xD001, SRAM_BASE), "beq 0x20000006");

        let bl = Decoder::decode(0xF800_F000, 4).expect("bl");
        assert_eq!(disassemble(&bl, SRAM_BASE), "bl 0x20000004");
    }

    #[test]
    fn special_register_moves_name_the_register() {
        let mrs = Decoder::decode(0x8010_F3EF, 4).expect("mrs");
        assert_eq!(disassemble(&mrs, 0), "mrs r0, primask");
        let msr = Decoder::decode(0x8810_F380, 4).expect("msr");
        assert_eq!(disassemble(&msr, 0), "msr primask, r0");
    }

    #[test]
    fn range_listing_marks_invalid_words_and_stops_at_faults() {
        let mut bus = SystemBus::new(0x1000).expect("bus");
        let code: [u16; 3] = [0x2041, 0xDE00, 0xF000];
        for (i, hw) in code.iter().enumerate() {
            bus.write_halfword(SRAM_BASE + 2 * i as u32, *hw).expect("write");
        }
        bus.write_halfword(SRAM_BASE + 6, 0xF800).expect("write");

        let rows = disassemble_range(&mut bus, SRAM_BASE, 3);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].mnemonic, "movs");
        assert!(rows[1].is_invalid);
        assert_eq!(rows[1].mnemonic, ".inst");
        assert_eq!(rows[1].operands, "0xde00");
        assert_eq!(rows[2].addr, SRAM_BASE + 4);
        assert_eq!(rows[2].length, 4);
        assert_eq!(rows[2].mnemonic, "bl");
        assert_eq!(
            rows[0].to_string(),
            "20000000:  2041       movs r0, #65"
        );

        assert!(disassemble_range(&mut bus, UART0_BASE, 4).is_empty());
    }

    #[test]
    fn unbounded_count_ends_at_the_sram_edge() {
        let mut bus = SystemBus::new(0x100).expect("bus");
        let rows = disassemble_range(&mut bus, SRAM_BASE + 0xF0, usize::MAX);
        assert_eq!(rows.len(), 8);
        assert!(disassemble_range(&mut bus, 0, usize::MAX).is_empty());
    }
}
