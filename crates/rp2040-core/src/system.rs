//! System orchestrator: cores, shared bus, breakpoints and the cycle counter.
//!
//! Cores are stepped one instruction at a time in strict round-robin order.
//! Everything is single-threaded; one step completes fully before the next
//! begins, so the bus needs no locking.

use std::fmt;
use std::path::Path;

use log::{debug, info, trace, warn};

use crate::api::{
    Bus, FaultPolicy, RunOutcome, StepOutcome, StopReason, SystemConfig, TraceEvent, TraceSink,
    MAX_CORES,
};
use crate::breakpoints::BreakpointSet;
use crate::decoder::Instruction;
use crate::disasm::{disassemble, disassemble_range, DisassemblyRow};
use crate::execute::{self, ExecuteOutcome};
use crate::fault::{
    AllocationError, BreakpointError, EmulationError, ExecutionFault, LoadError,
};
use crate::loader::{read_program, FlatBinaryLoader, LoadedImage, ProgramLoader};
use crate::memory::{sram_offset, SystemBus, CLOCK_HZ, GPIO_PINS, SRAM_SIZE};
use crate::state::{CoreState, RunState};

/// One core and its scheduling state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreSlot {
    /// Architectural state.
    pub state: CoreState,
    /// Scheduling state.
    pub run_state: RunState,
    skip_breakpoint: Option<u32>,
}

impl CoreSlot {
    fn new(state: CoreState, run_state: RunState) -> Self {
        Self {
            state,
            run_state,
            skip_breakpoint: None,
        }
    }
}

/// A complete emulated system.
pub struct System {
    config: SystemConfig,
    cores: Vec<CoreSlot>,
    bus: SystemBus,
    breakpoints: BreakpointSet,
    cycle_count: u64,
    halted: bool,
    breakpoint_triggered: bool,
    next_core: usize,
    trace_sink: Option<Box<dyn TraceSink>>,
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("config", &self.config)
            .field("cores", &self.cores)
            .field("cycle_count", &self.cycle_count)
            .field("halted", &self.halted)
            .field("breakpoint_triggered", &self.breakpoint_triggered)
            .field("next_core", &self.next_core)
            .field("breakpoints", &self.breakpoints.as_slice())
            .field("trace_sink", &self.trace_sink.is_some())
            .finish_non_exhaustive()
    }
}

impl System {
    /// Builds a system from `config`, with every core reset.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError`] for a core count outside `1..=MAX_CORES`,
    /// an SRAM size outside `1..=SRAM_SIZE` or not a whole number of words,
    /// or when allocation fails.
    pub fn new(config: SystemConfig) -> Result<Self, AllocationError> {
        if config.core_count == 0 || config.core_count > MAX_CORES {
            return Err(AllocationError::InvalidCoreCount {
                requested: config.core_count,
                max: MAX_CORES,
            });
        }
        if config.sram_size == 0 || config.sram_size > SRAM_SIZE || config.sram_size & 3 != 0 {
            return Err(AllocationError::InvalidSramSize {
                requested: config.sram_size,
                max: SRAM_SIZE,
            });
        }

        let bus = SystemBus::new(config.sram_size)?;
        let mut cores = Vec::new();
        cores
            .try_reserve_exact(config.core_count)
            .map_err(|_| AllocationError::OutOfMemory {
                what: "cores",
                bytes: config.core_count * std::mem::size_of::<CoreSlot>(),
            })?;
        for index in 0..config.core_count {
            cores.push(CoreSlot::new(
                Self::fresh_core(&config),
                Self::initial_run_state(&config, index),
            ));
        }

        info!(
            "created system: {} core(s), {:#x} bytes sram, {:?} policy",
            config.core_count, config.sram_size, config.fault_policy
        );
        Ok(Self {
            config,
            cores,
            bus,
            breakpoints: BreakpointSet::new(),
            cycle_count: 0,
            halted: false,
            breakpoint_triggered: false,
            next_core: 0,
            trace_sink: None,
        })
    }

    /// A default RP2040: two ARM cores, full SRAM, core 1 dormant.
    ///
    /// # Errors
    ///
    /// Returns [`AllocationError::OutOfMemory`] when SRAM cannot be allocated.
    pub fn rp2040() -> Result<Self, AllocationError> {
        Self::new(SystemConfig::default())
    }

    fn fresh_core(config: &SystemConfig) -> CoreState {
        let mut state = CoreState::new(config.architecture, config.sram_top());
        if let Some(arm) = state.as_arm_mut() {
            arm.vtor = config.vector_table;
        }
        state
    }

    const fn initial_run_state(config: &SystemConfig, index: usize) -> RunState {
        if index > 0 && config.secondary_cores_dormant {
            RunState::Dormant
        } else {
            RunState::Running
        }
    }

    /// Configuration the system was built with.
    #[must_use]
    pub const fn config(&self) -> &SystemConfig {
        &self.config
    }

    /// Shared bus.
    #[must_use]
    pub const fn bus(&self) -> &SystemBus {
        &self.bus
    }

    /// Mutable shared bus.
    pub fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    /// Number of cores.
    #[must_use]
    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Cycles consumed since creation. Never decreases.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Emulated wall time at [`CLOCK_HZ`], in nanoseconds.
    #[must_use]
    pub fn emulated_nanos(&self) -> u128 {
        u128::from(self.cycle_count) * 1_000_000_000 / u128::from(CLOCK_HZ)
    }

    /// Returns `true` when the system is halted.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns `true` after a breakpoint stopped a run.
    #[must_use]
    pub const fn breakpoint_triggered(&self) -> bool {
        self.breakpoint_triggered
    }

    /// Index of the core the next [`System::step`] visits.
    #[must_use]
    pub const fn next_core(&self) -> usize {
        self.next_core
    }

    fn slot(&self, core: usize) -> Result<&CoreSlot, EmulationError> {
        self.cores.get(core).ok_or(EmulationError::InvalidCore {
            core,
            count: self.cores.len(),
        })
    }

    fn slot_mut(&mut self, core: usize) -> Result<&mut CoreSlot, EmulationError> {
        let count = self.cores.len();
        self.cores
            .get_mut(core)
            .ok_or(EmulationError::InvalidCore { core, count })
    }

    /// Architectural state of `core`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidCore`] for an unknown core.
    pub fn core_state(&self, core: usize) -> Result<&CoreState, EmulationError> {
        self.slot(core).map(|slot| &slot.state)
    }

    /// Scheduling state of `core`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidCore`] for an unknown core.
    pub fn run_state(&self, core: usize) -> Result<RunState, EmulationError> {
        self.slot(core).map(|slot| slot.run_state)
    }

    /// Installs the sink that receives trace events when tracing is enabled.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.trace_sink = Some(sink);
    }

    /// Enables or disables trace dispatch.
    pub const fn set_tracing(&mut self, enabled: bool) {
        self.config.tracing_enabled = enabled;
    }

    fn emit(&mut self, event: TraceEvent) {
        if !self.config.tracing_enabled {
            return;
        }
        if let Some(sink) = self.trace_sink.as_mut() {
            sink.on_event(event);
        }
    }

    fn set_run_state(&mut self, core: usize, state: RunState) {
        let Some(slot) = self.cores.get_mut(core) else {
            return;
        };
        if slot.run_state == state {
            return;
        }
        slot.run_state = state;
        debug!("core {core} is now {state:?}");
        self.emit(TraceEvent::RunStateChanged { core, state });
    }

    // Program loading

    /// Copies `data` into SRAM at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::OutOfRange`] without writing anything when the
    /// span leaves the configured SRAM.
    pub fn load_binary(&mut self, addr: u32, data: &[u8]) -> Result<(), LoadError> {
        let out_of_range = LoadError::OutOfRange {
            addr,
            len: data.len(),
        };
        if sram_offset(addr, data.len(), self.bus.sram_size()).is_none() {
            return Err(out_of_range);
        }
        if self.bus.load_sram(addr, data) {
            Ok(())
        } else {
            Err(out_of_range)
        }
    }

    /// Places every segment of `image` and points core 0 at its entry.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::OutOfRange`] when a segment does not fit.
    /// Segments are validated before any is written.
    pub fn load_image(&mut self, image: &LoadedImage) -> Result<(), LoadError> {
        let sram_size = self.bus.sram_size();
        if let Some(segment) = image
            .segments
            .iter()
            .find(|segment| sram_offset(segment.addr, segment.data.len(), sram_size).is_none())
        {
            return Err(LoadError::OutOfRange {
                addr: segment.addr,
                len: segment.data.len(),
            });
        }
        for segment in &image.segments {
            self.load_binary(segment.addr, &segment.data)?;
        }
        if let Some(slot) = self.cores.first_mut() {
            slot.state.set_pc(image.entry);
        }
        info!(
            "loaded {} byte(s) in {} segment(s), entry {:#010x}",
            image.len(),
            image.segments.len(),
            image.entry
        );
        Ok(())
    }

    /// Loads a flat binary from `path` at [`crate::memory::SRAM_BASE`] and points core 0 at it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the file cannot be read or does not fit.
    pub fn load_program(&mut self, path: &Path) -> Result<(), LoadError> {
        self.load_program_with(path, &FlatBinaryLoader::default())
    }

    /// Loads `path` through `loader`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] when the file cannot be read, parsed or placed.
    pub fn load_program_with(
        &mut self,
        path: &Path,
        loader: &dyn ProgramLoader,
    ) -> Result<(), LoadError> {
        let bytes = read_program(path)?;
        let image = loader.load(&bytes)?;
        info!("loading program {}", path.display());
        self.load_image(&image)
    }

    // Stepping

    /// Steps the core under the round-robin cursor, then advances the cursor.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Fault`] when the core faults under
    /// [`FaultPolicy::HaltSystem`].
    pub fn step(&mut self) -> Result<StepOutcome, EmulationError> {
        let core = self.next_core;
        self.next_core = (self.next_core + 1) % self.cores.len();
        self.step_core(core)
    }

    /// Steps `core` once, outside the round-robin order.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidCore`] for an unknown core and
    /// [`EmulationError::Fault`] when the core faults under
    /// [`FaultPolicy::HaltSystem`].
    pub fn step_core(&mut self, core: usize) -> Result<StepOutcome, EmulationError> {
        let slot = self.slot(core)?;
        if !slot.run_state.is_runnable() {
            let state = slot.run_state;
            self.update_halted();
            return Ok(StepOutcome::Idle { core, state });
        }

        self.bus.set_active_core(core);
        let slot = &mut self.cores[core];
        let skip = slot.skip_breakpoint.take();
        let result = match slot.state.as_arm_mut() {
            Some(arm) => execute::step_core(arm, &mut self.bus, &self.breakpoints, skip),
            None => Err(ExecutionFault::UnsupportedArchitecture { core }),
        };

        let outcome = match result {
            Ok(ExecuteOutcome::BreakpointHit { pc }) => {
                self.breakpoint_triggered = true;
                debug!("core {core} hit breakpoint at {pc:#010x}");
                self.emit(TraceEvent::BreakpointHit { core, pc });
                StepOutcome::BreakpointHit { core, pc }
            }
            Ok(ExecuteOutcome::ConditionFailed { pc, instruction }) => {
                self.retire(core, pc, instruction, false);
                StepOutcome::ConditionFailed {
                    core,
                    pc,
                    length: instruction.length,
                }
            }
            Ok(ExecuteOutcome::Retired { pc, instruction }) => {
                self.retire(core, pc, instruction, true);
                StepOutcome::Executed {
                    core,
                    pc,
                    length: instruction.length,
                }
            }
            Ok(ExecuteOutcome::Sleep { pc, instruction }) => {
                self.retire(core, pc, instruction, true);
                self.set_run_state(core, RunState::WaitingForInterrupt);
                StepOutcome::Executed {
                    core,
                    pc,
                    length: instruction.length,
                }
            }
            Err(fault) => return self.handle_fault(core, fault),
        };
        self.update_halted();
        Ok(outcome)
    }

    fn handle_fault(
        &mut self,
        core: usize,
        fault: ExecutionFault,
    ) -> Result<StepOutcome, EmulationError> {
        warn!("core {core} faulted: {fault}");
        self.emit(TraceEvent::Fault { core, fault });
        match self.config.fault_policy {
            FaultPolicy::HaltSystem => {
                self.halted = true;
                Err(EmulationError::Fault { core, fault })
            }
            FaultPolicy::ParkCore => {
                self.set_run_state(core, RunState::Faulted(fault));
                self.update_halted();
                Ok(StepOutcome::Faulted { core, fault })
            }
        }
    }

    fn retire(&mut self, core: usize, pc: u32, instruction: Instruction, condition_passed: bool) {
        self.cycle_count += 1;
        trace!("core {core} {pc:#010x}: {}", disassemble(&instruction, pc));
        self.emit(TraceEvent::InstructionExecuted {
            core,
            pc,
            instruction,
            condition_passed,
        });
    }

    fn update_halted(&mut self) {
        if !self.cores.iter().any(|slot| slot.run_state.is_runnable()) && !self.halted {
            debug!("no runnable core left; halting");
            self.halted = true;
        }
    }

    /// Steps until the system halts or a breakpoint is hit.
    ///
    /// # Errors
    ///
    /// Propagates the first step error.
    pub fn run_until_halt(&mut self) -> Result<RunOutcome, EmulationError> {
        let start = self.cycle_count;
        let mut steps = 0;
        while !self.halted && !self.breakpoint_triggered {
            self.step()?;
            steps += 1;
        }
        Ok(RunOutcome {
            steps,
            cycles: self.cycle_count - start,
            reason: self.stop_reason(),
        })
    }

    /// Steps until `cycles` more cycles have been consumed, or the system
    /// halts or hits a breakpoint.
    ///
    /// # Errors
    ///
    /// Propagates the first step error.
    pub fn run_cycles(&mut self, cycles: u64) -> Result<RunOutcome, EmulationError> {
        let start = self.cycle_count;
        let target = start.saturating_add(cycles);
        let mut steps = 0;
        while self.cycle_count < target && !self.halted && !self.breakpoint_triggered {
            self.step()?;
            steps += 1;
        }
        let reason = if self.cycle_count >= target {
            StopReason::CycleBudget
        } else {
            self.stop_reason()
        };
        Ok(RunOutcome {
            steps,
            cycles: self.cycle_count - start,
            reason,
        })
    }

    const fn stop_reason(&self) -> StopReason {
        if self.breakpoint_triggered {
            StopReason::Breakpoint
        } else {
            StopReason::Halted
        }
    }

    // Run control

    /// Requests a halt; run loops stop before their next step.
    pub fn halt(&mut self) {
        debug!("halt requested");
        self.halted = true;
    }

    /// Clears the halt and breakpoint flags. Cores sitting on a breakpoint
    /// execute that instruction once on their next step.
    pub fn resume(&mut self) {
        self.halted = false;
        self.breakpoint_triggered = false;
        for slot in &mut self.cores {
            let pc = slot.state.pc();
            if self.breakpoints.contains(pc) {
                slot.skip_breakpoint = Some(pc);
            }
        }
        debug!("resumed at cycle {}", self.cycle_count);
    }

    /// Power-on reset: cores, run states, SRAM and peripherals. The cycle
    /// counter and breakpoints are kept.
    pub fn reset(&mut self) {
        for index in 0..self.cores.len() {
            let slot = &mut self.cores[index];
            slot.state = Self::fresh_core(&self.config);
            slot.skip_breakpoint = None;
            let state = Self::initial_run_state(&self.config, index);
            self.set_run_state(index, state);
        }
        self.bus.reset();
        self.halted = false;
        self.breakpoint_triggered = false;
        self.next_core = 0;
        info!("system reset");
    }

    /// Starts `core` at `pc` with stack pointer `sp`, the way the boot ROM
    /// launches core 1.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidCore`] for an unknown core.
    pub fn launch_core(&mut self, core: usize, pc: u32, sp: u32) -> Result<(), EmulationError> {
        let slot = self.slot_mut(core)?;
        slot.state.set_pc(pc);
        slot.state.set_sp(sp);
        info!("launching core {core} at {pc:#010x}, sp {sp:#010x}");
        self.set_run_state(core, RunState::Running);
        Ok(())
    }

    /// Wakes a sleeping core. Dormant and parked cores are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidCore`] for an unknown core.
    pub fn wake_core(&mut self, core: usize) -> Result<(), EmulationError> {
        if self.slot(core)?.run_state == RunState::WaitingForInterrupt {
            self.set_run_state(core, RunState::Running);
        }
        Ok(())
    }

    // Breakpoints

    /// Adds a breakpoint.
    ///
    /// # Errors
    ///
    /// Returns [`BreakpointError::Full`] when the set is at capacity.
    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), BreakpointError> {
        self.breakpoints.add(addr)?;
        debug!("breakpoint set at {addr:#010x}");
        Ok(())
    }

    /// Removes a breakpoint; returns whether it existed.
    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        self.breakpoints.remove(addr)
    }

    /// Removes every breakpoint.
    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    /// Active breakpoints.
    #[must_use]
    pub fn breakpoints(&self) -> &[u32] {
        self.breakpoints.as_slice()
    }

    // Debug access

    /// Reads register `index` of `core`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError`] for an unknown core or register.
    pub fn get_register(&self, core: usize, index: u8) -> Result<u32, EmulationError> {
        self.slot(core)?
            .state
            .register(index)
            .ok_or(EmulationError::InvalidRegister { index })
    }

    /// Writes register `index` of `core`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError`] for an unknown core or register.
    pub fn set_register(&mut self, core: usize, index: u8, value: u32) -> Result<(), EmulationError> {
        if self.slot_mut(core)?.state.set_register(index, value) {
            Ok(())
        } else {
            Err(EmulationError::InvalidRegister { index })
        }
    }

    /// Reads a word through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Bus`] when the bus rejects the access.
    pub fn read_memory(&mut self, addr: u32) -> Result<u32, EmulationError> {
        Ok(self.bus.read_word(addr)?)
    }

    /// Writes a word through the bus.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Bus`] when the bus rejects the access.
    pub fn write_memory(&mut self, addr: u32, value: u32) -> Result<(), EmulationError> {
        Ok(self.bus.write_word(addr, value)?)
    }

    /// Reads `len` bytes starting at `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Bus`] at the first rejected byte.
    pub fn read_bytes(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, EmulationError> {
        let mut bytes = Vec::new();
        let mut cursor = addr;
        for _ in 0..len {
            bytes.push(self.bus.read_byte(cursor)?);
            cursor = cursor.wrapping_add(1);
        }
        Ok(bytes)
    }

    /// Lists `count` instructions starting at `addr`.
    pub fn disassemble(&mut self, addr: u32, count: usize) -> Vec<DisassemblyRow> {
        disassemble_range(&mut self.bus, addr, count)
    }

    /// Drives the external input level of GPIO `pin`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidPin`] for pins outside the bank.
    pub fn gpio_set(&mut self, pin: u8, high: bool) -> Result<(), EmulationError> {
        if pin >= GPIO_PINS {
            return Err(EmulationError::InvalidPin { pin });
        }
        self.bus.sio_mut().set_input(pin, high);
        Ok(())
    }

    /// Level of GPIO `pin`: the driven output when enabled, else the input.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidPin`] for pins outside the bank.
    pub fn gpio_get(&self, pin: u8) -> Result<bool, EmulationError> {
        if pin >= GPIO_PINS {
            return Err(EmulationError::InvalidPin { pin });
        }
        Ok(self.bus.sio().level(pin))
    }

    /// Queues host bytes into UART `uart`'s receive FIFO; returns how many fit.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidUart`] for an unknown UART.
    pub fn uart_write(&mut self, uart: usize, data: &[u8]) -> Result<usize, EmulationError> {
        self.bus
            .uart_mut(uart)
            .map(|device| device.host_write(data))
            .ok_or(EmulationError::InvalidUart { uart })
    }

    /// Drains bytes the program transmitted on UART `uart` into `buf`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::InvalidUart`] for an unknown UART.
    pub fn uart_read(&mut self, uart: usize, buf: &mut [u8]) -> Result<usize, EmulationError> {
        self.bus
            .uart_mut(uart)
            .map(|device| device.host_read(buf))
            .ok_or(EmulationError::InvalidUart { uart })
    }
}
