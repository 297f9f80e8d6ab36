//! Host-facing contracts: the bus trait, system configuration, step/run
//! outcomes and trace hooks.

use crate::decoder::Instruction;
use crate::fault::{BusFault, ExecutionFault};
use crate::memory::{AccessKind, AccessWidth, NUM_CORES, SRAM_BASE, SRAM_SIZE};
use crate::state::{CoreArchitecture, RunState};

/// Largest core count a system accepts.
pub const MAX_CORES: usize = 4;

/// Byte/halfword/word transfer contract consumed by the execution engine.
pub trait Bus {
    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the address is unmapped.
    fn read_byte(&mut self, addr: u32) -> Result<u8, BusFault>;

    /// Reads one halfword.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the address is unmapped or misaligned.
    fn read_halfword(&mut self, addr: u32) -> Result<u16, BusFault>;

    /// Reads one word.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the address is unmapped or misaligned.
    fn read_word(&mut self, addr: u32) -> Result<u32, BusFault>;

    /// Writes one byte.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the address is unmapped or read-only.
    fn write_byte(&mut self, addr: u32, value: u8) -> Result<(), BusFault>;

    /// Writes one halfword.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the address is unmapped, misaligned or read-only.
    fn write_halfword(&mut self, addr: u32, value: u16) -> Result<(), BusFault>;

    /// Writes one word.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the address is unmapped, misaligned or read-only.
    fn write_word(&mut self, addr: u32, value: u32) -> Result<(), BusFault>;

    /// Checks that an access would be accepted, without side effects.
    ///
    /// # Errors
    ///
    /// Returns the [`BusFault`] the access would raise.
    fn probe(&self, addr: u32, width: AccessWidth, kind: AccessKind) -> Result<(), BusFault>;

    /// Fetches one instruction halfword, rejecting non-executable regions.
    ///
    /// # Errors
    ///
    /// Returns a [`BusFault`] when the fetch is not permitted.
    fn fetch_halfword(&mut self, addr: u32) -> Result<u16, BusFault> {
        self.probe(addr, AccessWidth::Halfword, AccessKind::Fetch)?;
        self.read_halfword(addr)
    }

    /// Reads `width` bytes, zero-extended.
    ///
    /// # Errors
    ///
    /// Propagates the underlying transfer fault.
    fn read(&mut self, addr: u32, width: AccessWidth) -> Result<u32, BusFault> {
        match width {
            AccessWidth::Byte => self.read_byte(addr).map(u32::from),
            AccessWidth::Halfword => self.read_halfword(addr).map(u32::from),
            AccessWidth::Word => self.read_word(addr),
        }
    }

    /// Writes the low `width` bytes of `value`.
    ///
    /// # Errors
    ///
    /// Propagates the underlying transfer fault.
    fn write(&mut self, addr: u32, width: AccessWidth, value: u32) -> Result<(), BusFault> {
        let bytes = value.to_le_bytes();
        match width {
            AccessWidth::Byte => self.write_byte(addr, bytes[0]),
            AccessWidth::Halfword => self.write_halfword(addr, u16::from_le_bytes([bytes[0], bytes[1]])),
            AccessWidth::Word => self.write_word(addr, value),
        }
    }
}

/// What a system does when a core faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FaultPolicy {
    /// Halt the whole system and return the fault from the step.
    #[default]
    HaltSystem,
    /// Park the faulting core and keep stepping the others.
    ParkCore,
}

/// Top-level configuration for a system instance.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SystemConfig {
    /// Number of cores, `1..=MAX_CORES`.
    pub core_count: usize,
    /// SRAM size in bytes, `1..=SRAM_SIZE`.
    pub sram_size: u32,
    /// Architecture every core is created with.
    pub architecture: CoreArchitecture,
    /// Reaction to execution faults.
    pub fault_policy: FaultPolicy,
    /// Initial `VTOR` of every ARM core.
    pub vector_table: u32,
    /// Enables trace-sink dispatch.
    pub tracing_enabled: bool,
    /// Secondary cores start `Dormant` until launched.
    pub secondary_cores_dormant: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            core_count: NUM_CORES,
            sram_size: SRAM_SIZE,
            architecture: CoreArchitecture::Arm,
            fault_policy: FaultPolicy::HaltSystem,
            vector_table: SRAM_BASE,
            tracing_enabled: false,
            secondary_cores_dormant: true,
        }
    }
}

impl SystemConfig {
    /// Configuration with a single core and otherwise default settings.
    #[must_use]
    pub fn single_core() -> Self {
        Self {
            core_count: 1,
            ..Self::default()
        }
    }

    /// Address one past the last configured SRAM byte; the reset stack pointer.
    #[must_use]
    pub const fn sram_top(&self) -> u32 {
        SRAM_BASE.wrapping_add(self.sram_size)
    }
}

/// Result of stepping one core once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepOutcome {
    /// Instruction executed and consumed one cycle.
    Executed {
        /// Core that was stepped.
        core: usize,
        /// Address of the executed instruction.
        pc: u32,
        /// Encoding length in bytes.
        length: u8,
    },
    /// Conditional instruction skipped; still consumes one cycle.
    ConditionFailed {
        /// Core that was stepped.
        core: usize,
        /// Address of the skipped instruction.
        pc: u32,
        /// Encoding length in bytes.
        length: u8,
    },
    /// Core sits on a breakpoint; nothing was fetched.
    BreakpointHit {
        /// Core that was stepped.
        core: usize,
        /// Breakpoint address.
        pc: u32,
    },
    /// Core is dormant, sleeping or parked.
    Idle {
        /// Core that was stepped.
        core: usize,
        /// Its run state.
        state: RunState,
    },
    /// Core faulted and was parked under [`FaultPolicy::ParkCore`].
    Faulted {
        /// Core that faulted.
        core: usize,
        /// The fault.
        fault: ExecutionFault,
    },
}

impl StepOutcome {
    /// Core the outcome refers to.
    #[must_use]
    pub const fn core(&self) -> usize {
        match *self {
            Self::Executed { core, .. }
            | Self::ConditionFailed { core, .. }
            | Self::BreakpointHit { core, .. }
            | Self::Idle { core, .. }
            | Self::Faulted { core, .. } => core,
        }
    }

    /// Returns `true` when the step advanced the cycle counter.
    #[must_use]
    pub const fn consumed_cycle(&self) -> bool {
        matches!(self, Self::Executed { .. } | Self::ConditionFailed { .. })
    }
}

/// Why a run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum StopReason {
    /// The system is halted.
    Halted,
    /// A breakpoint was hit.
    Breakpoint,
    /// The requested cycle budget was consumed.
    CycleBudget,
}

/// Aggregated outcome of a run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunOutcome {
    /// Number of `step` calls made.
    pub steps: u64,
    /// Cycles consumed during this run.
    pub cycles: u64,
    /// Why the loop stopped.
    pub reason: StopReason,
}

/// Trace events dispatched to a [`TraceSink`] when tracing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// An instruction executed (or was skipped by its condition).
    InstructionExecuted {
        /// Core that executed it.
        core: usize,
        /// Its address.
        pc: u32,
        /// Decoded form; carries the raw word and length.
        instruction: Instruction,
        /// `false` when the condition check failed.
        condition_passed: bool,
    },
    /// A core stopped on a breakpoint.
    BreakpointHit {
        /// Core that hit it.
        core: usize,
        /// Breakpoint address.
        pc: u32,
    },
    /// A core faulted.
    Fault {
        /// Core that faulted.
        core: usize,
        /// The fault.
        fault: ExecutionFault,
    },
    /// A core changed run state.
    RunStateChanged {
        /// Affected core.
        core: usize,
        /// New state.
        state: RunState,
    },
}

/// Sink for trace events.
pub trait TraceSink {
    /// Records an event in execution order.
    fn on_event(&mut self, event: TraceEvent);
}

#[cfg(test)]
mod tests {
    use super::{FaultPolicy, StepOutcome, SystemConfig, MAX_CORES};
    use crate::fault::{DecodeError, ExecutionFault};
    use crate::memory::{NUM_CORES, SRAM_BASE, SRAM_SIZE};
    use crate::state::{CoreArchitecture, RunState};

    #[test]
    fn default_config_describes_an_rp2040() {
        let config = SystemConfig::default();
        assert_eq!(config.core_count, NUM_CORES);
        assert_eq!(config.sram_size, SRAM_SIZE);
        assert_eq!(config.architecture, CoreArchitecture::Arm);
        assert_eq!(config.fault_policy, FaultPolicy::HaltSystem);
        assert_eq!(config.vector_table, SRAM_BASE);
        assert!(!config.tracing_enabled);
        assert!(config.secondary_cores_dormant);
        assert_eq!(config.sram_top(), SRAM_BASE + SRAM_SIZE);
        assert!(NUM_CORES <= MAX_CORES);
    }

    #[test]
    fn only_executed_and_skipped_steps_consume_cycles() {
        let fault = ExecutionFault::Decode {
            pc: 0,
            source: DecodeError::new(0, 2),
        };
        let outcomes = [
            (StepOutcome::Executed { core: 0, pc: 0, length: 2 }, true),
            (StepOutcome::ConditionFailed { core: 1, pc: 0, length: 2 }, true),
            (StepOutcome::BreakpointHit { core: 0, pc: 0 }, false),
            (StepOutcome::Idle { core: 1, state: RunState::Dormant }, false),
            (StepOutcome::Faulted { core: 0, fault }, false),
        ];
        for (outcome, consumes) in outcomes {
            assert_eq!(outcome.consumed_cycle(), consumes, "{outcome:?}");
        }
        assert_eq!(outcomes[1].0.core(), 1);
    }
}
