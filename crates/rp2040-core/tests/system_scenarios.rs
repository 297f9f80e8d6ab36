//! End-to-end scenarios: whole programs run through the system orchestrator.

#![allow(clippy::pedantic, clippy::nursery)]

use std::io::Write;

use log as _;
use proptest as _;
use rstest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use rp2040_core::{
    BreakpointError, BusFault, EmulationError, FlatBinaryLoader, LoadError, ProgramLoader,
    RunOutcome, RunState, StopReason, System, SystemConfig, BREAKPOINT_CAPACITY, SIO_BASE,
    SRAM_BASE, UART0_BASE, UART_FIFO_DEPTH,
};

fn program(halfwords: &[u16]) -> Vec<u8> {
    halfwords.iter().flat_map(|hw| hw.to_le_bytes()).collect()
}

fn with_literal(halfwords: &[u16], literals: &[u32]) -> Vec<u8> {
    let mut bytes = program(halfwords);
    assert_eq!(bytes.len() % 4, 0, "literal pool must be word aligned");
    bytes.extend(literals.iter().flat_map(|word| word.to_le_bytes()));
    bytes
}

fn small_system(core_count: usize) -> System {
    System::new(SystemConfig {
        core_count,
        sram_size: 0x1000,
        ..SystemConfig::default()
    })
    .expect("system")
}

// ldr r1, =UART0_BASE; movs r0, #'A'; str r0, [r1]; wfi; b .
fn uart_hello() -> Vec<u8> {
    with_literal(&[0x4902, 0x2041, 0x6008, 0xBF30, 0xE7FE, 0x0000], &[UART0_BASE])
}

// ldr r1, =SIO_BASE; ldr r0, =(1 << 25); str r0, [r1, #0x24]; str r0, [r1, #0x14]; wfi; b .
fn gpio_led_on() -> Vec<u8> {
    with_literal(
        &[0x4902, 0x4803, 0x6248, 0x6148, 0xBF30, 0xE7FE],
        &[SIO_BASE, 1 << 25],
    )
}

#[test]
fn two_cycle_program_runs_without_fault() {
    let mut system = System::new(SystemConfig::single_core()).expect("system");
    system
        .load_binary(SRAM_BASE, &[0x00, 0x20, 0x70, 0x47])
        .expect("load");
    system.set_register(0, 15, SRAM_BASE).expect("pc");

    let run = system.run_cycles(2).expect("no fault");
    assert_eq!(system.cycle_count(), 2);
    assert_eq!(run.reason, StopReason::CycleBudget);
    assert_eq!(system.get_register(0, 0), Ok(0));
    assert_eq!(system.get_register(0, 15), Ok(0));
}

#[test]
fn breakpoint_at_entry_stops_before_any_cycle() {
    let mut system = System::new(SystemConfig::single_core()).expect("system");
    system
        .load_binary(SRAM_BASE, &[0x00, 0x20, 0x70, 0x47])
        .expect("load");
    system.set_register(0, 15, SRAM_BASE).expect("pc");
    system.add_breakpoint(SRAM_BASE).expect("breakpoint");

    let run = system.run_until_halt().expect("run");
    assert_eq!(
        run,
        RunOutcome {
            steps: 1,
            cycles: 0,
            reason: StopReason::Breakpoint
        }
    );
    assert!(system.breakpoint_triggered());
    assert_eq!(system.cycle_count(), 0);
    assert_eq!(system.get_register(0, 15), Ok(SRAM_BASE));
}

#[test]
fn uart_program_transmits_to_the_host() {
    let mut system = small_system(1);
    let image = FlatBinaryLoader::default()
        .load(&uart_hello())
        .expect("image");
    system.load_image(&image).expect("load");

    let run = system.run_until_halt().expect("run");
    assert_eq!(run.cycles, 4);
    assert_eq!(run.reason, StopReason::Halted);
    assert_eq!(system.run_state(0), Ok(RunState::WaitingForInterrupt));

    let mut buf = [0_u8; 8];
    let n = system.uart_read(0, &mut buf).expect("uart 0");
    assert_eq!(&buf[..n], b"A");
}

#[test]
fn gpio_program_drives_the_pin() {
    let mut system = small_system(1);
    let image = FlatBinaryLoader::default()
        .load(&gpio_led_on())
        .expect("image");
    system.load_image(&image).expect("load");

    assert_eq!(system.gpio_get(25), Ok(false));
    system.run_until_halt().expect("run");
    assert_eq!(system.cycle_count(), 5);
    assert_eq!(system.gpio_get(25), Ok(true));
    assert_eq!(system.bus().sio().output(), 1 << 25);
    assert_eq!(system.bus().sio().output_enable(), 1 << 25);
}

#[test]
fn svc_handler_return_value_survives_exception_return() {
    let handler = SRAM_BASE + 0x30;
    let mut code = vec![0_u16; 27];
    code[0] = 0xDF05; // svc #5
    code[1] = 0x2107; // movs r1, #7
    code[2] = 0xBF30; // wfi
    code[3] = 0xE7FE; // b .
    let vector = (handler | 1).to_le_bytes();
    code[22] = u16::from_le_bytes([vector[0], vector[1]]);
    code[23] = u16::from_le_bytes([vector[2], vector[3]]);
    code[24] = 0x2063; // movs r0, #99
    code[25] = 0x9000; // str r0, [sp]
    code[26] = 0x4770; // bx lr

    let mut system = small_system(1);
    let image = FlatBinaryLoader::default()
        .load(&program(&code))
        .expect("image");
    system.load_image(&image).expect("load");
    let top = system.get_register(0, 13).expect("sp");

    system.step().expect("svc");
    assert_eq!(system.get_register(0, 15), Ok(handler));
    assert_eq!(system.get_register(0, 14), Ok(0xFFFF_FFF9));
    let arm = system.core_state(0).expect("core").as_arm().expect("arm");
    assert!(arm.in_exception);
    assert_eq!(arm.ipsr(), 11);

    let run = system.run_until_halt().expect("run");
    assert_eq!(run.cycles, 5);
    assert_eq!(system.get_register(0, 0), Ok(99));
    assert_eq!(system.get_register(0, 1), Ok(7));
    assert_eq!(system.get_register(0, 13), Ok(top));
    let arm = system.core_state(0).expect("core").as_arm().expect("arm");
    assert!(!arm.in_exception);
    assert_eq!(arm.ipsr(), 0);
}

#[test]
fn both_cores_interleave_on_the_shared_bus() {
    let mut system = small_system(2);
    system.load_binary(SRAM_BASE, &uart_hello()).expect("core 0 code");
    system
        .load_binary(SRAM_BASE + 0x40, &gpio_led_on())
        .expect("core 1 code");
    system.set_register(0, 15, SRAM_BASE).expect("pc");
    system
        .launch_core(1, SRAM_BASE + 0x40, SRAM_BASE + 0x800)
        .expect("launch");

    let mut order = Vec::new();
    for _ in 0..4 {
        order.push(system.step().expect("step").core());
    }
    assert_eq!(order, [0, 1, 0, 1]);

    system.run_until_halt().expect("run");
    assert!(system.is_halted());
    assert_eq!(system.cycle_count(), 9);
    assert_eq!(system.gpio_get(25), Ok(true));
    let mut buf = [0_u8; 4];
    assert_eq!(system.uart_read(0, &mut buf), Ok(1));
    assert_eq!(buf[0], b'A');
}

#[test]
fn halt_request_stops_a_running_loop() {
    let mut system = small_system(1);
    system.load_binary(SRAM_BASE, &program(&[0xE7FE])).expect("load");
    system.set_register(0, 15, SRAM_BASE).expect("pc");
    system.run_cycles(10).expect("run");

    system.halt();
    let run = system.run_until_halt().expect("run");
    assert_eq!(run.steps, 0);
    assert_eq!(system.cycle_count(), 10);

    system.resume();
    let run = system.run_cycles(5).expect("run");
    assert_eq!(run.cycles, 5);
}

#[test]
fn fault_inside_a_run_propagates() {
    let mut system = small_system(1);
    // movs r0, #1; udf
    system
        .load_binary(SRAM_BASE, &program(&[0x2001, 0xDE00]))
        .expect("load");
    system.set_register(0, 15, SRAM_BASE).expect("pc");

    let err = system.run_until_halt().expect_err("udf faults");
    assert!(matches!(err, EmulationError::Fault { core: 0, .. }));
    assert!(system.is_halted());
    assert_eq!(system.cycle_count(), 1);
}

#[test]
fn program_file_loads_at_sram_base() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    file.write_all(&uart_hello()).expect("write");

    let mut system = small_system(1);
    system.load_program(file.path()).expect("load");
    assert_eq!(system.get_register(0, 15), Ok(SRAM_BASE));
    assert_eq!(system.read_memory(SRAM_BASE + 12), Ok(UART0_BASE));

    system.run_until_halt().expect("run");
    assert_eq!(system.bus().uart(0).map(|uart| uart.pending_tx()), Some(1));
}

#[test]
fn missing_and_oversized_programs_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut system = small_system(1);
    let missing = dir.path().join("absent.bin");
    assert!(matches!(
        system.load_program(&missing),
        Err(LoadError::Io { .. })
    ));

    let big = dir.path().join("big.bin");
    std::fs::write(&big, vec![0_u8; 0x1001]).expect("write");
    assert_eq!(
        system.load_program(&big),
        Err(LoadError::OutOfRange {
            addr: SRAM_BASE,
            len: 0x1001
        })
    );
    assert_eq!(system.read_memory(SRAM_BASE), Ok(0));
}

#[test]
fn empty_program_file_is_a_zero_byte_load() {
    let file = tempfile::NamedTempFile::new().expect("tempfile");
    let mut system = small_system(1);
    system.set_register(0, 15, SRAM_BASE + 0x40).expect("pc");

    system.load_program(file.path()).expect("empty load");
    assert_eq!(system.get_register(0, 15), Ok(SRAM_BASE));
    assert_eq!(system.read_memory(SRAM_BASE), Ok(0));
}

#[test]
fn full_breakpoint_set_accepts_an_address_only_after_a_removal() {
    let mut system = small_system(1);
    for slot in 0..BREAKPOINT_CAPACITY as u32 {
        system
            .add_breakpoint(SRAM_BASE + 2 * slot)
            .expect("within capacity");
    }
    let extra = SRAM_BASE + 0x800;
    assert_eq!(
        system.add_breakpoint(extra),
        Err(BreakpointError::Full {
            capacity: BREAKPOINT_CAPACITY
        })
    );
    assert_eq!(system.breakpoints().len(), BREAKPOINT_CAPACITY);

    assert!(system.remove_breakpoint(SRAM_BASE));
    system.add_breakpoint(extra).expect("slot was freed");
    assert_eq!(system.breakpoints().len(), BREAKPOINT_CAPACITY);
    assert!(system.breakpoints().contains(&extra));
    assert!(!system.breakpoints().contains(&SRAM_BASE));
}

#[test]
fn oversized_debug_reads_stop_at_the_end_of_sram() {
    let mut system = small_system(1);
    assert_eq!(
        system.read_bytes(SRAM_BASE, usize::MAX),
        Err(EmulationError::Bus(BusFault::Unmapped {
            addr: SRAM_BASE + 0x1000
        }))
    );
    assert_eq!(system.read_bytes(SRAM_BASE + 0xFFC, 4), Ok(vec![0; 4]));
}

#[test]
fn oversized_listings_stop_at_the_first_rejected_fetch() {
    let mut system = small_system(1);
    assert!(system.disassemble(0, usize::MAX).is_empty());

    let rows = system.disassemble(SRAM_BASE, usize::MAX);
    assert_eq!(rows.len(), 0x1000 / 2);
    assert_eq!(rows.last().map(|row| row.addr), Some(SRAM_BASE + 0xFFE));
}

#[test]
fn transmit_fifo_fills_when_the_host_does_not_drain() {
    // ldr r1, =UART0_BASE; movs r0, #'x'; loop: str r0, [r1]; b loop
    let mut system = small_system(1);
    let image = with_literal(&[0x4901, 0x2078, 0x6008, 0xE7FD], &[UART0_BASE]);
    system.load_binary(SRAM_BASE, &image).expect("load");
    system.set_register(0, 15, SRAM_BASE).expect("pc");

    system.run_cycles(20_000).expect("no fault");
    assert_eq!(
        system.bus().uart(0).map(|uart| uart.pending_tx()),
        Some(UART_FIFO_DEPTH)
    );

    let mut buf = [0_u8; 64];
    assert_eq!(system.uart_read(0, &mut buf), Ok(UART_FIFO_DEPTH));
    assert!(buf[..UART_FIFO_DEPTH].iter().all(|&byte| byte == b'x'));
}
