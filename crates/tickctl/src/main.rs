//! tickctl - periodic waiter demonstration driver
//!
//! Runs a fixed-period loop with simulated work, printing one line of
//! running cycle-time statistics per cycle and a summary at exit.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod error;
mod output;
mod settings;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use periodic_waiter::{PeriodicWaiter, Resolution, RtSetup, StrategySelection, WaiterError};

use crate::error::CliError;
use crate::output::CycleRow;
use crate::settings::Overrides;

#[derive(Parser, Debug)]
#[command(name = "tickctl")]
#[command(about = "Run a fixed-period loop and report cycle timing statistics")]
#[command(version)]
#[command(long_about = "
tickctl drives a periodic waiter with simulated per-cycle work and prints the
running statistics of every cycle as CSV (n,dt,min,max,mean,sd,tet) or, with
--json, as one JSON object per line.

The loop ends on Ctrl-C, after --cycles cycles, or on the first cycle that
misses its timing.
")]
struct Cli {
    /// Period in milliseconds [default: 100]
    #[arg(long, value_name = "MS", env = "TICKCTL_PERIOD_MS")]
    period_ms: Option<u64>,

    /// Maximum tolerated cycle time in milliseconds [default: 1.1 x period]
    #[arg(long, value_name = "MS")]
    max_wait_ms: Option<u64>,

    /// Simulated work per cycle in milliseconds
    #[arg(long, value_name = "MS", default_value_t = 75)]
    work_ms: u64,

    /// Stop after this many cycles
    #[arg(long)]
    cycles: Option<u64>,

    /// Timing strategy
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Measurement resolution
    #[arg(long, value_enum)]
    resolution: Option<ResolutionArg>,

    /// Cycles after start left out of statistics
    #[arg(long, value_name = "N")]
    warmup: Option<u32>,

    /// Request real-time scheduling for the loop thread
    #[arg(long)]
    rt: bool,

    /// Real-time priority used with --rt
    #[arg(long, default_value_t = 1)]
    priority: i32,

    /// Output JSON lines instead of CSV
    #[arg(long)]
    json: bool,

    /// Waiter configuration file (.yaml, .yml or .json)
    #[arg(long, value_name = "FILE", env = "TICKCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Auto,
    Deadline,
    Signal,
}

impl From<StrategyArg> for StrategySelection {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Auto => StrategySelection::Auto,
            StrategyArg::Deadline => StrategySelection::Deadline,
            StrategyArg::Signal => StrategySelection::Signal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ResolutionArg {
    #[value(alias = "s")]
    Seconds,
    #[value(alias = "ms")]
    Milliseconds,
    #[value(alias = "us")]
    Microseconds,
    #[value(alias = "ns")]
    Nanoseconds,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Seconds => Resolution::Seconds,
            ResolutionArg::Milliseconds => Resolution::Milliseconds,
            ResolutionArg::Microseconds => Resolution::Microseconds,
            ResolutionArg::Nanoseconds => Resolution::Nanoseconds,
        }
    }
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            period_ms: self.period_ms,
            max_wait_ms: self.max_wait_ms,
            strategy: self.strategy.map(Into::into),
            resolution: self.resolution.map(Into::into),
            warmup_cycles: self.warmup,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tickctl={log_level},periodic_waiter={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(waiter_err) = err.downcast_ref::<WaiterError>() {
        if waiter_err.is_timing_violation() {
            return 2;
        }
    }
    match err.downcast_ref::<CliError>() {
        Some(_) => 4,
        None => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    let base = match &cli.config {
        Some(path) => settings::load_config(path)?,
        None => periodic_waiter::WaiterConfig::default(),
    };
    let config = settings::apply_overrides(base, &cli.overrides())?;
    let resolution = config.resolution;

    let mut waiter = PeriodicWaiter::new(config).context("failed to create waiter")?;

    if cli.rt {
        let setup = RtSetup::new().with_priority(cli.priority);
        if let Err(e) = waiter.enable_elevated_scheduling(&setup) {
            tracing::warn!(error = %e, "Continuing without real-time scheduling");
        }
    }

    eprint!("{waiter}");

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            running.store(false, Ordering::Relaxed);
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if !cli.json {
        output::write_csv_header(&mut out)?;
    }

    let work = Duration::from_millis(cli.work_ms);
    waiter.start().context("failed to start waiter")?;
    tracing::info!(
        strategy = ?waiter.active_strategy(),
        work = ?work,
        "Loop running, press Ctrl-C to stop"
    );

    let mut violation = None;
    while running.load(Ordering::Relaxed) && cli.cycles.is_none_or(|limit| waiter.cycles() < limit)
    {
        if !work.is_zero() {
            thread::sleep(work);
        }

        match waiter.wait_checked() {
            Ok(elapsed) => {
                let stats = waiter.statistics()?;
                let row = CycleRow::new(&stats, resolution.to_units(elapsed));
                output::write_row(&mut out, &row, cli.json)?;
            }
            // Ctrl-C may cut the sleep short.
            Err(_) if !running.load(Ordering::Relaxed) => break,
            Err(e) if e.is_timing_violation() => {
                violation = Some(e);
                break;
            }
            Err(e) => return Err(e).context("wait failed"),
        }
    }

    // Read before stop, which resets the statistics.
    let stats = waiter.statistics()?;
    let cycles = waiter.cycles();
    waiter.stop();

    output::write_summary(&mut out, &stats, resolution, cli.json)?;
    out.flush()?;
    tracing::debug!(cycles, "Loop finished");

    match violation {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
