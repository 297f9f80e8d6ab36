//! Instruction execution pipeline for ARM cores.
//!
//! One step runs the breakpoint check, fetch, decode, condition check,
//! execute and commit. Execution stages register and PSR effects in an
//! [`ExecuteState`]; nothing reaches the core until every bus transfer of the
//! instruction has succeeded. Multi-word stores probe every address before the
//! first write, so a faulting instruction leaves no partial side effects.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

mod flags;
mod helpers;

pub use flags::FlagsUpdate;
pub use helpers::{add_with_carry, align, shift_with_carry, sign_extend_load};

use log::debug;

use crate::api::Bus;
use crate::breakpoints::BreakpointSet;
use crate::decoder::{check_condition, is_thumb32_prefix, Decoder, Instruction};
use crate::encoding::OpcodeKind;
use crate::fault::{BusFault, DecodeError, ExecutionFault};
use crate::memory::{AccessKind, AccessWidth};
use crate::state::{ArmCoreState, Register, PSR_C};

/// Exception number of `SVCall`.
pub const SVCALL_EXCEPTION: u8 = 11;
/// `EXC_RETURN` for a return to thread mode on the main stack.
pub const EXC_RETURN_THREAD: u32 = 0xFFFF_FFF9;
/// `EXC_RETURN` for a return to handler mode.
pub const EXC_RETURN_HANDLER: u32 = 0xFFFF_FFF1;
/// Stacked xPSR bit recording that the frame was realigned to 8 bytes.
pub const FRAME_REALIGNED: u32 = 1 << 9;

const EXCEPTION_FRAME_WORDS: usize = 8;
const SP_INDEX: u8 = 13;
const LR_INDEX: u8 = 14;
const PC_INDEX: u8 = 15;

/// Outcome of stepping one ARM core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Instruction retired.
    Retired {
        /// Address of the instruction.
        pc: u32,
        /// The executed instruction.
        instruction: Instruction,
    },
    /// Condition failed; only the PC advanced.
    ConditionFailed {
        /// Address of the instruction.
        pc: u32,
        /// The skipped instruction.
        instruction: Instruction,
    },
    /// `WFI`/`WFE` retired; the core should sleep.
    Sleep {
        /// Address of the instruction.
        pc: u32,
        /// The executed instruction.
        instruction: Instruction,
    },
    /// The PC is on a breakpoint; nothing was fetched.
    BreakpointHit {
        /// Breakpoint address.
        pc: u32,
    },
}

/// Exception-model change committed with an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionTransition {
    /// Entered the handler for `number`.
    Enter {
        /// Exception number written to IPSR.
        number: u8,
    },
    /// Returned through an `EXC_RETURN` value.
    Return,
}

/// Side effects accumulated while executing one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteState {
    /// Staged writes to r0..r12, sp and lr, by register index.
    pub register_writes: [Option<u32>; 15],
    /// PC after commit.
    pub next_pc: u32,
    /// Condition flag update.
    pub flags_update: FlagsUpdate,
    /// Whole-PSR restore (exception return).
    pub psr: Option<u32>,
    /// `MSR` write as `(SYSm, value)`.
    pub special_write: Option<(u8, u32)>,
    /// Exception entry or return.
    pub exception: Option<ExceptionTransition>,
    /// Core should sleep after commit.
    pub sleep: bool,
}

impl ExecuteState {
    /// Creates an empty state that falls through to `next_pc`.
    #[must_use]
    pub const fn new(next_pc: u32) -> Self {
        Self {
            register_writes: [None; 15],
            next_pc,
            flags_update: FlagsUpdate::None,
            psr: None,
            special_write: None,
            exception: None,
            sleep: false,
        }
    }

    /// Stages a register write. Writing r15 is a branch.
    pub fn stage(&mut self, index: u8, value: u32) {
        match self.register_writes.get_mut(usize::from(index)) {
            Some(slot) => *slot = Some(value),
            None => self.next_pc = value & !1,
        }
    }
}

/// Steps one ARM core through the full pipeline.
///
/// `skip_breakpoint` lets the instruction at that address execute once even
/// though it is a breakpoint.
///
/// # Errors
///
/// Returns [`ExecutionFault`] for fetch, decode and data-access faults. The
/// core is left exactly as it was before the step.
pub fn step_core(
    core: &mut ArmCoreState,
    bus: &mut dyn Bus,
    breakpoints: &BreakpointSet,
    skip_breakpoint: Option<u32>,
) -> Result<ExecuteOutcome, ExecutionFault> {
    let pc = core.pc();
    if skip_breakpoint != Some(pc) && breakpoints.contains(pc) {
        return Ok(ExecuteOutcome::BreakpointHit { pc });
    }

    let instruction = fetch_and_decode(bus, pc)?;
    if !check_condition(core, instruction.condition) {
        core.set_pc(pc.wrapping_add(u32::from(instruction.length)));
        return Ok(ExecuteOutcome::ConditionFailed { pc, instruction });
    }

    let exec = execute_instruction(&instruction, core, bus, pc)?;
    commit_execution(core, &exec);
    Ok(if exec.sleep {
        ExecuteOutcome::Sleep { pc, instruction }
    } else {
        ExecuteOutcome::Retired { pc, instruction }
    })
}

/// Fetches the instruction at `pc` (one or two halfwords) and decodes it.
///
/// # Errors
///
/// Returns [`ExecutionFault::Bus`] when a fetch is rejected and
/// [`ExecutionFault::Decode`] for unsupported encodings.
pub fn fetch_and_decode(bus: &mut dyn Bus, pc: u32) -> Result<Instruction, ExecutionFault> {
    let bus_fault = |source| ExecutionFault::Bus { pc, source };
    let hw1 = bus.fetch_halfword(pc).map_err(bus_fault)?;
    let (word, length) = if is_thumb32_prefix(hw1) {
        let hw2 = bus.fetch_halfword(pc.wrapping_add(2)).map_err(bus_fault)?;
        ((u32::from(hw2) << 16) | u32::from(hw1), 4)
    } else {
        (u32::from(hw1), 2)
    };
    Decoder::decode(word, length).map_err(|source| ExecutionFault::Decode { pc, source })
}

/// Executes `instr` located at `pc` against a read-only view of the core.
///
/// Loads and stores reach the bus here; everything else is staged in the
/// returned [`ExecuteState`] for [`commit_execution`].
///
/// # Errors
///
/// Returns [`ExecutionFault::Bus`] when a transfer is rejected and
/// [`ExecutionFault::Decode`] for the `INVALID` kind.
pub fn execute_instruction(
    instr: &Instruction,
    core: &ArmCoreState,
    bus: &mut dyn Bus,
    pc: u32,
) -> Result<ExecuteState, ExecutionFault> {
    let mut exec = ExecuteState::new(pc.wrapping_add(u32::from(instr.length)));
    let ops = Operands { instr, core, pc };

    let result = match instr.kind {
        OpcodeKind::Invalid => {
            return Err(ExecutionFault::Decode {
                pc,
                source: DecodeError::new(instr.raw, instr.length),
            })
        }
        OpcodeKind::Mov => {
            execute_mov(&ops, &mut exec);
            Ok(())
        }
        OpcodeKind::Add => {
            execute_arithmetic(&ops, &mut exec, false, true);
            Ok(())
        }
        OpcodeKind::Sub => {
            execute_arithmetic(&ops, &mut exec, true, true);
            Ok(())
        }
        OpcodeKind::Cmp => {
            execute_arithmetic(&ops, &mut exec, true, false);
            Ok(())
        }
        OpcodeKind::And => {
            execute_logical(&ops, &mut exec, |a, b| a & b, true);
            Ok(())
        }
        OpcodeKind::Orr => {
            execute_logical(&ops, &mut exec, |a, b| a | b, true);
            Ok(())
        }
        OpcodeKind::Xor => {
            execute_logical(&ops, &mut exec, |a, b| a ^ b, true);
            Ok(())
        }
        OpcodeKind::Tst => {
            execute_logical(&ops, &mut exec, |a, b| a & b, false);
            Ok(())
        }
        OpcodeKind::B => {
            exec.next_pc = branch_target(pc, instr.immediate);
            Ok(())
        }
        OpcodeKind::Bl => {
            exec.stage(LR_INDEX, pc.wrapping_add(4) | 1);
            exec.next_pc = branch_target(pc, instr.immediate);
            Ok(())
        }
        OpcodeKind::Bx => {
            let target = instr.rm.map_or(0, |rm| ops.reg(rm));
            branch_exchange(core, bus, &mut exec, target, core.sp())
        }
        OpcodeKind::Blx => {
            let target = instr.rm.map_or(0, |rm| ops.reg(rm));
            exec.stage(LR_INDEX, pc.wrapping_add(2) | 1);
            exec.next_pc = target & !1;
            Ok(())
        }
        OpcodeKind::Ldr => execute_load(&ops, bus, &mut exec),
        OpcodeKind::Str => {
            let value = instr.rd.map_or(0, |rt| ops.reg(rt));
            bus.write(ops.address(), instr.width, value)
        }
        OpcodeKind::Ldm => execute_load_multiple(&ops, bus, &mut exec),
        OpcodeKind::Stm => execute_store_multiple(&ops, bus, &mut exec),
        OpcodeKind::Push => execute_push(&ops, bus, &mut exec),
        OpcodeKind::Pop => execute_pop(&ops, bus, &mut exec),
        OpcodeKind::Mrs => {
            if let Some(rd) = instr.rd {
                exec.stage(rd, core.read_special(instr.sysm));
            }
            Ok(())
        }
        OpcodeKind::Msr => {
            let value = instr.rn.map_or(instr.immediate as u32, |rn| ops.reg(rn));
            exec.special_write = Some((instr.sysm, value));
            Ok(())
        }
        OpcodeKind::Nop => Ok(()),
        OpcodeKind::Wfi => {
            exec.sleep = true;
            Ok(())
        }
        OpcodeKind::Svc => {
            let return_address = exec.next_pc;
            enter_exception(core, bus, &mut exec, SVCALL_EXCEPTION, return_address)
        }
    };

    result.map_err(|source| ExecutionFault::Bus { pc, source })?;
    Ok(exec)
}

/// Applies staged effects to the core.
pub fn commit_execution(core: &mut ArmCoreState, exec: &ExecuteState) {
    for (index, value) in exec.register_writes.iter().enumerate() {
        if let Some(value) = *value {
            core.set_register(Register::from_u4(index as u8), value);
        }
    }
    if let Some(psr) = exec.psr {
        core.restore_psr(psr);
    }
    exec.flags_update.apply(core);
    if let Some((sysm, value)) = exec.special_write {
        core.write_special(sysm, value);
    }
    match exec.exception {
        Some(ExceptionTransition::Enter { number }) => {
            core.set_ipsr(number);
            core.in_exception = true;
            core.exception_level = core.exception_level.saturating_add(1);
        }
        Some(ExceptionTransition::Return) => {
            core.exception_level = core.exception_level.saturating_sub(1);
            core.in_exception = core.exception_level > 0;
        }
        None => {}
    }
    core.set_pc(exec.next_pc);
}

/// Returns `true` for the `EXC_RETURN` range.
#[must_use]
pub const fn is_exc_return(value: u32) -> bool {
    value & 0xF000_0000 == 0xF000_0000
}

struct Operands<'a> {
    instr: &'a Instruction,
    core: &'a ArmCoreState,
    pc: u32,
}

impl Operands<'_> {
    /// Register read as an operand; the PC reads as `pc + 4`.
    fn reg(&self, index: u8) -> u32 {
        if index == PC_INDEX {
            self.pc.wrapping_add(4)
        } else {
            self.core.register(Register::from_u4(index))
        }
    }

    /// First operand. PC-relative immediates (ADR, literal loads) use the
    /// word-aligned PC.
    fn base(&self) -> u32 {
        match self.instr.rn {
            Some(PC_INDEX) if self.instr.rm.is_none() => align(self.pc.wrapping_add(4), 4),
            Some(rn) => self.reg(rn),
            None => 0,
        }
    }

    /// Second operand after shifting, with the shifter carry-out.
    fn shifter(&self) -> (u32, bool) {
        let carry_in = self.core.flag(PSR_C);
        let instr = self.instr;
        match instr.rm {
            Some(rm) => {
                let amount = instr
                    .rs
                    .map_or(instr.shift_amount, |rs| self.reg(rs) & 0xFF);
                shift_with_carry(self.reg(rm), instr.shift_type, amount, carry_in)
            }
            None => {
                let value = instr.immediate as u32;
                let carry = if instr.shift_amount == 0 {
                    carry_in
                } else {
                    value >> 31 == 1
                };
                (value, carry)
            }
        }
    }

    fn address(&self) -> u32 {
        let offset = self
            .instr
            .rm
            .map_or(self.instr.immediate as u32, |rm| self.reg(rm));
        self.base().wrapping_add(offset)
    }
}

const fn branch_target(pc: u32, offset: i32) -> u32 {
    pc.wrapping_add(4).wrapping_add_signed(offset)
}

fn execute_mov(ops: &Operands<'_>, exec: &mut ExecuteState) {
    let (value, carry) = ops.shifter();
    if ops.instr.setflags {
        exec.flags_update = FlagsUpdate::logical(value, carry);
    }
    if let Some(rd) = ops.instr.rd {
        exec.stage(rd, value);
    }
}

fn execute_arithmetic(ops: &Operands<'_>, exec: &mut ExecuteState, subtract: bool, write: bool) {
    let a = ops.base();
    let (b, _) = ops.shifter();
    let (result, carry, overflow) = if subtract {
        add_with_carry(a, !b, true)
    } else {
        add_with_carry(a, b, false)
    };
    if ops.instr.setflags {
        exec.flags_update = FlagsUpdate::arithmetic(result, carry, overflow);
    }
    if let (true, Some(rd)) = (write, ops.instr.rd) {
        exec.stage(rd, result);
    }
}

fn execute_logical(
    ops: &Operands<'_>,
    exec: &mut ExecuteState,
    op: impl Fn(u32, u32) -> u32,
    write: bool,
) {
    let (b, carry) = ops.shifter();
    let result = op(ops.base(), b);
    if ops.instr.setflags {
        exec.flags_update = FlagsUpdate::logical(result, carry);
    }
    if let (true, Some(rd)) = (write, ops.instr.rd) {
        exec.stage(rd, result);
    }
}

fn execute_load(
    ops: &Operands<'_>,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
) -> Result<(), BusFault> {
    let Some(rt) = ops.instr.rd else {
        return Ok(());
    };
    let raw = bus.read(ops.address(), ops.instr.width)?;
    let value = if ops.instr.signed {
        sign_extend_load(raw, ops.instr.width.bytes())
    } else {
        raw
    };
    if rt == PC_INDEX {
        branch_exchange(ops.core, bus, exec, value, ops.core.sp())
    } else {
        exec.stage(rt, value);
        Ok(())
    }
}

fn listed_registers(list: u16) -> impl Iterator<Item = u8> {
    (0..16).filter(move |bit| list & (1 << bit) != 0)
}

fn execute_load_multiple(
    ops: &Operands<'_>,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
) -> Result<(), BusFault> {
    let Some(rn) = ops.instr.rn else {
        return Ok(());
    };
    let mut addr = ops.reg(rn);
    for reg in listed_registers(ops.instr.register_list) {
        exec.stage(reg, bus.read_word(addr)?);
        addr = addr.wrapping_add(4);
    }
    if ops.instr.writeback {
        exec.stage(rn, addr);
    }
    Ok(())
}

fn execute_store_multiple(
    ops: &Operands<'_>,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
) -> Result<(), BusFault> {
    let Some(rn) = ops.instr.rn else {
        return Ok(());
    };
    let base = ops.reg(rn);
    let end = store_registers(ops, bus, base)?;
    if ops.instr.writeback {
        exec.stage(rn, end);
    }
    Ok(())
}

fn execute_push(
    ops: &Operands<'_>,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
) -> Result<(), BusFault> {
    let start = ops
        .core
        .sp()
        .wrapping_sub(4 * ops.instr.transfer_count());
    store_registers(ops, bus, start)?;
    exec.stage(SP_INDEX, start);
    Ok(())
}

fn execute_pop(
    ops: &Operands<'_>,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
) -> Result<(), BusFault> {
    let mut addr = ops.core.sp();
    let mut target = None;
    for reg in listed_registers(ops.instr.register_list) {
        let value = bus.read_word(addr)?;
        addr = addr.wrapping_add(4);
        if reg == PC_INDEX {
            target = Some(value);
        } else {
            exec.stage(reg, value);
        }
    }
    exec.stage(SP_INDEX, addr);
    match target {
        Some(target) => branch_exchange(ops.core, bus, exec, target, addr),
        None => Ok(()),
    }
}

/// Stores the listed registers in ascending order from `start` and returns
/// the address after the last word.
fn store_registers(ops: &Operands<'_>, bus: &mut dyn Bus, start: u32) -> Result<u32, BusFault> {
    let mut values = [0; 16];
    let mut count = 0;
    for reg in listed_registers(ops.instr.register_list) {
        values[count] = ops.reg(reg);
        count += 1;
    }
    store_words(bus, start, &values[..count])
}

fn store_words(bus: &mut dyn Bus, start: u32, values: &[u32]) -> Result<u32, BusFault> {
    let addr_of = |index: usize| start.wrapping_add(4 * index as u32);
    for index in 0..values.len() {
        bus.probe(addr_of(index), AccessWidth::Word, AccessKind::Write)?;
    }
    for (index, value) in values.iter().enumerate() {
        bus.write_word(addr_of(index), *value)?;
    }
    Ok(addr_of(values.len()))
}

/// Interworking branch: an `EXC_RETURN` target inside a handler returns from
/// the exception using the frame at `frame_sp`.
fn branch_exchange(
    core: &ArmCoreState,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
    target: u32,
    frame_sp: u32,
) -> Result<(), BusFault> {
    if core.in_exception && is_exc_return(target) {
        return exception_return(bus, exec, frame_sp);
    }
    exec.next_pc = target & !1;
    Ok(())
}

fn enter_exception(
    core: &ArmCoreState,
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
    number: u8,
    return_address: u32,
) -> Result<(), BusFault> {
    let sp = core.sp();
    let realigned = sp & 4 != 0;
    let frame = sp.wrapping_sub(4 * EXCEPTION_FRAME_WORDS as u32) & !4;
    let xpsr = if realigned {
        core.psr() | FRAME_REALIGNED
    } else {
        core.psr()
    };
    let reg = |r| core.register(r);
    let words: [u32; EXCEPTION_FRAME_WORDS] = [
        reg(Register::R0),
        reg(Register::R1),
        reg(Register::R2),
        reg(Register::R3),
        reg(Register::R12),
        core.lr(),
        return_address,
        xpsr,
    ];

    for index in 0..EXCEPTION_FRAME_WORDS {
        bus.probe(
            frame.wrapping_add(4 * index as u32),
            AccessWidth::Word,
            AccessKind::Write,
        )?;
    }
    let handler = bus.read_word(core.vtor.wrapping_add(4 * u32::from(number)))?;
    store_words(bus, frame, &words)?;

    debug!("exception {number} entry: frame {frame:#010x}, handler {handler:#010x}");
    exec.stage(SP_INDEX, frame);
    exec.stage(
        LR_INDEX,
        if core.in_exception {
            EXC_RETURN_HANDLER
        } else {
            EXC_RETURN_THREAD
        },
    );
    exec.next_pc = handler & !1;
    exec.exception = Some(ExceptionTransition::Enter { number });
    Ok(())
}

fn exception_return(
    bus: &mut dyn Bus,
    exec: &mut ExecuteState,
    frame: u32,
) -> Result<(), BusFault> {
    let mut words = [0; EXCEPTION_FRAME_WORDS];
    for (index, word) in words.iter_mut().enumerate() {
        *word = bus.read_word(frame.wrapping_add(4 * index as u32))?;
    }
    for (reg, value) in [0, 1, 2, 3, 12, LR_INDEX].into_iter().zip(words) {
        exec.stage(reg, value);
    }
    let xpsr = words[7];
    let mut sp = frame.wrapping_add(4 * EXCEPTION_FRAME_WORDS as u32);
    if xpsr & FRAME_REALIGNED != 0 {
        sp |= 4;
    }
    debug!("exception return to {:#010x}", words[6]);
    exec.stage(SP_INDEX, sp);
    exec.next_pc = words[6] & !1;
    exec.psr = Some(xpsr & !FRAME_REALIGNED);
    exec.exception = Some(ExceptionTransition::Return);
    Ok(())
}
