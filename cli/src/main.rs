//! x86 out-of-order simulator CLI.
//!
//! A thin front end: load a [`Config`], build a [`Simulator`] against a
//! trace-file feeder, run it to completion (or a bounded cycle count),
//! and print a stats report. It owns no simulation logic of its own.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use x86sim_core::common::SimError;
use x86sim_core::config::Config;
use x86sim_core::feeder::{Feeder, TraceFeeder};
use x86sim_core::Simulator;

/// Cycle-accurate, execution-driven out-of-order x86 simulator.
#[derive(Parser, Debug)]
#[command(name = "x86sim", author, version, about)]
struct Cli {
    /// Path to the JSON configuration file (§6's external-interface
    /// config surface). Every option has a default, so a config file
    /// only needs to name what it overrides.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Trace file to feed the simulated instruction stream from, one
    /// `<hex pc> <hex bytes> [reg=value ...]` record per line.
    #[arg(short = 't', long = "trace")]
    trace: PathBuf,

    /// Stop after this many uncore cycles even if the trace has not
    /// drained, instead of running unbounded.
    #[arg(long = "max-cycles")]
    max_cycles: Option<u64>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default()),
    };
    let config = config.unwrap_or_else(|err| fail(&err));

    let feeder = TraceFeeder::from_trace_file(&cli.trace).unwrap_or_else(|err| fail(&err));

    let simulator = Simulator::new(config, Box::new(feeder) as Box<dyn Feeder>).unwrap_or_else(|err| fail(&err));

    match simulator.run(cli.max_cycles) {
        Ok(stats) => {
            stats.print_report();
            process::exit(0);
        }
        Err(err) => fail(&err),
    }
}

/// Reports a fatal [`SimError`] to stderr and exits non-zero, per §6's
/// "exit codes: 0 on clean completion; non-zero on assertion failure".
fn fail(err: &SimError) -> ! {
    tracing::error!("{err}");
    eprintln!("x86sim: {err}");
    process::exit(1);
}
