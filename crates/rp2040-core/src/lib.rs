//! Core emulator crate for RP2040-class dual Cortex-M0+ systems.

/// Memory map, access validation and the routed system bus.
pub mod memory;
pub use memory::{
    decode_memory_region, sram_offset, AccessKind, AccessWidth, MemoryRegion, RegionDescriptor,
    SystemBus, CLOCK_HZ, FIXED_MEMORY_REGIONS, GPIO_PINS, NUM_CORES, SIO_BASE, SRAM_BASE,
    SRAM_SIZE, UART0_BASE, UART1_BASE,
};

/// SRAM, SIO GPIO and UART device models.
pub mod peripherals;
pub use peripherals::{Sio, Sram, Uart, UART_FIFO_DEPTH};

/// Public host-facing API contract and integration types.
pub mod api;
pub use api::{
    Bus, FaultPolicy, RunOutcome, StepOutcome, StopReason, SystemConfig, TraceEvent, TraceSink,
    MAX_CORES,
};

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{
    ArmCoreState, CoreArchitecture, CoreState, Register, RiscvCoreState, RunState,
    GENERAL_REGISTER_COUNT, PSR_C, PSR_N, PSR_T, PSR_V, PSR_Z,
};

/// Thumb encoding classification tables and immediate helpers.
pub mod encoding;
pub use encoding::{is_thumb32_prefix, Condition, OpcodeKind, ShiftType};

/// Instruction decode with field extraction.
pub mod decoder;
pub use decoder::{check_condition, Decoder, Instruction};

/// Fault taxonomy for decode, bus, execution, allocation and load failures.
pub mod fault;
pub use fault::{
    AllocationError, BreakpointError, BusFault, DecodeError, EmulationError, ExecutionFault,
    FaultClass, LoadError,
};

/// Instruction execution pipeline.
pub mod execute;
pub use execute::{
    commit_execution, execute_instruction, ExceptionTransition, ExecuteOutcome, ExecuteState,
    FlagsUpdate,
};

/// Fixed-capacity breakpoint set.
pub mod breakpoints;
pub use breakpoints::{BreakpointSet, BREAKPOINT_CAPACITY};

/// Program loaders.
pub mod loader;
pub use loader::{FlatBinaryLoader, LoadedImage, ProgramLoader, Segment};

/// Thumb disassembly.
pub mod disasm;
pub use disasm::{disassemble, disassemble_range, DisassemblyRow};

/// System orchestrator.
pub mod system;
pub use system::{CoreSlot, System};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
#[cfg(test)]
use tempfile as _;
