//! Assembles and runs a tape machine program.
//!
//! # Usage
//! ```text
//! tapevm <FILE> [OPTIONS]
//! ```
//!
//! # Arguments
//! - `FILE`: Assembly source file to run
//!
//! # Options
//! - `--logs <PATH>`: Write the execution trace to `PATH` when the run ends
//! - `--memory <N>`: Number of value cells (env `TAPEVM_MEMORY`)
//! - `--instructions <N>`: Number of instruction cells (env `TAPEVM_INSTRUCTIONS`)
//! - `--max-cycles <N>`: Fail once more than `N` instructions have run
//! - `--listing`: Print the assembled program before running it
//! - `--stats`: Print executed instructions per category after the run
//! - `-q, --quiet` / `-v, --verbose`: Only warnings and errors / debug output
//! - `--no-timestamp`: Omit timestamps from log lines
//!
//! Program output goes to stdout; everything else goes to stderr.

use clap::{ArgAction, Parser};
use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tapevm::utils::log::{Level, SHOW_TIMESTAMP, set_min_level};
use tapevm::utils::trace_log::TraceLog;
use tapevm::virtual_machine::assembler::{
    assemble_source, read_source, render_assembly_diagnostic,
};
use tapevm::virtual_machine::errors::{RuntimeError, VMError};
use tapevm::virtual_machine::program::Program;
use tapevm::virtual_machine::vm::{
    CycleProfile, DEFAULT_INSTRUCTION_CAPACITY, DEFAULT_VALUE_CAPACITY, Halt, MachineConfig,
    NullSink, StdHost, TraceSink, VM,
};
use tapevm::{debug, error, info};

const INPUT_PROMPT: &str = "Input: ";

#[derive(Parser, Debug)]
#[command(
    name = "tapevm",
    version,
    about = "Assemble and run a tape machine program"
)]
struct Cli {
    /// Assembly source file to run
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Write the execution trace to PATH when the run ends
    #[arg(long, value_name = "PATH")]
    logs: Option<PathBuf>,
    /// Number of value cells
    #[arg(
        long,
        value_name = "N",
        env = "TAPEVM_MEMORY",
        default_value_t = DEFAULT_VALUE_CAPACITY
    )]
    memory: usize,
    /// Number of instruction cells
    #[arg(
        long,
        value_name = "N",
        env = "TAPEVM_INSTRUCTIONS",
        default_value_t = DEFAULT_INSTRUCTION_CAPACITY
    )]
    instructions: usize,
    /// Fail once more than N instructions have been executed
    #[arg(long, value_name = "N")]
    max_cycles: Option<u64>,
    /// Print the assembled program before running it
    #[arg(long, action = ArgAction::SetTrue)]
    listing: bool,
    /// Print executed instructions per category after the run
    #[arg(long, action = ArgAction::SetTrue)]
    stats: bool,
    /// Only log warnings and errors
    #[arg(short, long, action = ArgAction::SetTrue, conflicts_with = "verbose")]
    quiet: bool,
    /// Also log debug messages
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
    /// Omit timestamps from log lines
    #[arg(long, action = ArgAction::SetTrue)]
    no_timestamp: bool,
}

impl Cli {
    fn machine_config(&self) -> MachineConfig {
        let config = MachineConfig::default()
            .with_value_capacity(self.memory)
            .with_instruction_capacity(self.instructions);
        match self.max_cycles {
            Some(limit) => config.with_cycle_limit(limit),
            None => config,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    SHOW_TIMESTAMP.store(!cli.no_timestamp, Ordering::Relaxed);
    set_min_level(if cli.quiet {
        Level::Warn
    } else if cli.verbose {
        Level::Debug
    } else {
        Level::Info
    });

    match run_file(&cli) {
        Ok(Halt::Terminated) => debug!("Program terminated"),
        Ok(Halt::EndOfProgram) => debug!("Program ran past its last instruction"),
        Ok(Halt::Faulted) => process::exit(1),
        Err(VMError::Assembly(err)) => {
            eprint!(
                "{}",
                render_assembly_diagnostic(&cli.file.display().to_string(), &err)
            );
            process::exit(1);
        }
        Err(err) => fail(err),
    }
}

/// Assembles and runs the file named on the command line.
fn run_file(cli: &Cli) -> Result<Halt, VMError> {
    let source = read_source(&cli.file)?;

    let started = Instant::now();
    let program = assemble_source(&source)?;
    info!(
        "Compiled {} in {}μs ({} instructions)",
        cli.file.display(),
        started.elapsed().as_micros(),
        program.len()
    );

    if cli.listing {
        eprint!("{program}");
    }

    let config = cli.machine_config();
    let outcome = match &cli.logs {
        Some(path) => {
            let (outcome, mut log) =
                execute(program, config, TraceLog::new(source.as_str()), cli.stats)?;
            if let Err(err) = &outcome {
                log.note(format!("error: {err}"));
            }
            log.write_to(path).map_err(|error| VMError::Io {
                path: path.display().to_string(),
                error,
            })?;
            info!("Trace written to {} ({} entries)", path.display(), log.len());
            outcome
        }
        None => execute(program, config, NullSink, cli.stats)?.0,
    };
    Ok(outcome?)
}

/// Loads and runs the program on the console, returning the run's outcome and
/// the trace sink.
fn execute<T: TraceSink>(
    program: Program,
    config: MachineConfig,
    sink: T,
    stats: bool,
) -> Result<(Result<Halt, RuntimeError>, T), RuntimeError> {
    let mut vm = VM::with_trace(program, config, sink)?;
    let mut host = if io::stdin().is_terminal() {
        StdHost::with_prompt(INPUT_PROMPT)
    } else {
        StdHost::new()
    };

    let started = Instant::now();
    let outcome = vm.run(&mut host);
    debug!(
        "Executed {} instructions in {}μs",
        vm.cycles(),
        started.elapsed().as_micros()
    );

    if stats {
        print_profile(vm.profile());
    }
    Ok((outcome, vm.into_trace()))
}

fn fail(err: impl Display) -> ! {
    error!("{err}");
    process::exit(1)
}

fn print_profile(profile: &CycleProfile) {
    let total_u = profile.total();
    let total = total_u as f64;

    let cat_w = 2 + profile
        .iter()
        .map(|(c, _)| c.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max("total".chars().count());

    let amt_w = profile
        .iter()
        .map(|(_, a)| format_with_commas(a).chars().count())
        .max()
        .unwrap_or(0)
        .max(format_with_commas(total_u).chars().count());

    let dash_w = cat_w + 1 + amt_w + 2 + "( 100.0%)".len();

    eprintln!("Cycle Profile:");
    eprintln!("{}", "-".repeat(dash_w));

    for (category, amount) in profile.iter() {
        if amount == 0 {
            continue;
        }
        let percent = if total > 0.0 {
            (amount as f64 / total) * 100.0
        } else {
            0.0
        };
        eprintln!(
            "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
            category.as_str(),
            format_with_commas(amount),
            percent,
        );
    }

    eprintln!("{}", "-".repeat(dash_w));
    eprintln!(
        "{:<cat_w$} {:>amt_w$} ({:>5.1}%)",
        "total",
        format_with_commas(total_u),
        100.0,
    );
}

fn format_with_commas(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
