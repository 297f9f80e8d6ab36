//! Command-line runner: loads a flat binary into SRAM and runs it on the
//! emulated RP2040.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use log::{debug, info, warn};
use rp2040_core::{
    disassemble, EmulationError, Register, StopReason, System, SystemConfig, TraceEvent,
    TraceSink, NUM_CORES, UART0_BASE, UART_FIFO_DEPTH,
};

#[cfg(test)]
use tempfile as _;

/// Cycles run between two drains of the UART0 transmit FIFO. One cycle
/// retires at most one store, so the FIFO cannot overflow within a slice.
const SLICE_CYCLES: u64 = UART_FIFO_DEPTH as u64;

/// Run an RP2040 program image on the instruction-level emulator.
#[derive(Debug, Parser, PartialEq, Eq)]
#[command(name = "rp2040-emu", version, about)]
struct Cli {
    /// Flat binary loaded at the start of SRAM.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: PathBuf,

    /// Cycle budget for the run.
    #[arg(short = 'c', long = "cycles", value_name = "N", default_value_t = 1_000_000)]
    cycles: u64,

    /// Log every executed instruction at debug level.
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Reserved for a GDB remote stub; accepted and ignored.
    #[arg(short = 'g', long = "gdb", value_name = "PORT")]
    gdb: Option<u16>,

    /// Number of emulated cores.
    #[arg(long = "cores", value_name = "N", default_value_t = NUM_CORES)]
    cores: usize,
}

/// Renders instruction trace events through `log`.
struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn on_event(&mut self, event: TraceEvent) {
        match event {
            TraceEvent::InstructionExecuted {
                core,
                pc,
                instruction,
                condition_passed,
            } => {
                let skipped = if condition_passed { "" } else { "  (skipped)" };
                debug!(
                    "core{core} {pc:08x}: {}{skipped}",
                    disassemble(&instruction, pc)
                );
            }
            other => debug!("{other:?}"),
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn build_system(cli: &Cli) -> Result<System> {
    let config = SystemConfig {
        core_count: cli.cores,
        tracing_enabled: cli.verbose,
        ..SystemConfig::default()
    };
    let mut system = System::new(config).context("failed to create system")?;
    if cli.verbose {
        system.set_trace_sink(Box::new(LogTraceSink));
    }
    system
        .load_program(&cli.file)
        .with_context(|| format!("failed to load {}", cli.file.display()))?;
    Ok(system)
}

fn drain_uart(system: &mut System, out: &mut impl Write) -> Result<()> {
    let mut buf = [0_u8; UART_FIFO_DEPTH];
    let n = system.uart_read(0, &mut buf)?;
    if n > 0 {
        out.write_all(&buf[..n])?;
        out.flush()?;
    }
    Ok(())
}

/// Runs up to `budget` cycles, echoing UART0 output between slices.
fn run_for(system: &mut System, budget: u64, out: &mut impl Write) -> Result<StopReason> {
    let mut remaining = budget;
    loop {
        let slice = remaining.min(SLICE_CYCLES);
        let run = system.run_cycles(slice);
        drain_uart(system, out)?;
        let run = run?;
        remaining -= run.cycles;
        if run.reason != StopReason::CycleBudget || remaining == 0 {
            return Ok(run.reason);
        }
    }
}

fn report(system: &System, reason: Option<StopReason>) {
    println!();
    println!("cycles: {}", system.cycle_count());
    match reason {
        Some(reason) => println!("stop reason: {reason:?}"),
        None => println!("stop reason: fault"),
    }
    for row in Register::ALL.chunks(4) {
        let cells: Vec<String> = row
            .iter()
            .map(|reg| {
                let value = system.get_register(0, reg.index()).unwrap_or_default();
                format!("{:>4}={value:08x}", reg.name())
            })
            .collect();
        println!("core0 {}", cells.join(" "));
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(port) = cli.gdb {
        warn!("gdb server is not implemented; ignoring port {port}");
    }

    let mut system = build_system(cli)?;
    info!(
        "loaded {} ({} cores, uart0 at {UART0_BASE:#010x})",
        cli.file.display(),
        system.core_count()
    );

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match run_for(&mut system, cli.cycles, &mut out) {
        Ok(reason) => {
            report(&system, Some(reason));
            Ok(())
        }
        Err(err) => {
            if matches!(
                err.downcast_ref::<EmulationError>(),
                Some(EmulationError::Fault { .. })
            ) {
                report(&system, None);
            }
            Err(err.context("emulation stopped"))
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_logging(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
