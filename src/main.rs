use std::{env, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use clap::{Parser, ValueEnum};
use ins_harness::{
    core::time::{Clock, SimulatedClock, SystemClock},
    harness::scenario::{Scenario, ScenarioSetup, run_scenario, write_samples_csv},
    parameters::{AdapterConfig, SimulationConfig},
    utils::capacity::Capacity,
};
use log::{error, info};
use strum::IntoEnumIterator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ScenarioArg {
    Basic,
    TimeSync,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ClockArg {
    /// Wall clock, runs in real time
    System,
    /// Virtual clock, runs as fast as possible
    Simulated,
}

#[derive(Parser, Debug)]
#[command(version, about = "Sensor adapter time synchronization harness", long_about = None)]
struct Args {
    #[arg(short, long, value_enum, default_value_t = ScenarioArg::All)]
    scenario: ScenarioArg,

    /// Adapter configuration (YAML), replaces the built-in one
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated device settings (YAML)
    #[arg(long)]
    sim: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ClockArg::Simulated)]
    clock: ClockArg,

    #[arg(long)]
    seed: Option<u64>,

    /// Seconds until the simulated GPS gets a fix, negative for never
    #[arg(long, allow_negative_numbers = true)]
    fix_delay: Option<f64>,

    /// Standard deviation of the simulated sample time noise, seconds
    #[arg(long)]
    jitter: Option<f64>,

    /// Topic remap rule "from:=to", can be repeated
    #[arg(long)]
    remap: Vec<String>,

    /// Subscriber queue depth, 0 for unbounded
    #[arg(long, default_value_t = 0)]
    queue: usize,

    /// Write the collected time sync stamps to this CSV file
    #[arg(long)]
    csv: Option<PathBuf>,
}

fn scenarios(arg: ScenarioArg) -> Vec<Scenario> {
    match arg {
        ScenarioArg::Basic => vec![Scenario::Basic],
        ScenarioArg::TimeSync => vec![Scenario::TimeSync],
        ScenarioArg::All => Scenario::iter().collect(),
    }
}

fn setup(args: &Args) -> Result<ScenarioSetup> {
    let config = args
        .config
        .as_deref()
        .map(AdapterConfig::from_file)
        .transpose()
        .context("Invalid adapter configuration")?;

    let mut simulation = match &args.sim {
        Some(path) => SimulationConfig::from_file(path).context("Invalid simulation settings")?,
        None => SimulationConfig::default(),
    };

    if let Some(seed) = args.seed {
        simulation.seed = Some(seed);
    }
    if let Some(fix_delay) = args.fix_delay {
        simulation.fix_delay_s = fix_delay;
    }
    if let Some(jitter) = args.jitter {
        simulation.jitter_s = jitter;
    }

    Ok(ScenarioSetup {
        config,
        simulation,
        remap: args.remap.clone(),
        queue: Capacity::from(args.queue),
        ..Default::default()
    })
}

fn main() -> Result<ExitCode> {
    // Default log level to "info"
    if env::var("RUST_LOG").is_err() {
        unsafe { env::set_var("RUST_LOG", "info") }
    }

    pretty_env_logger::init();

    let args = Args::parse();
    let setup = setup(&args)?;

    let clock: Box<dyn Clock> = match args.clock {
        ClockArg::System => Box::new(SystemClock::default()),
        ClockArg::Simulated => Box::new(SimulatedClock::new(Utc::now(), TimeDelta::zero())),
    };

    let mut failed = 0;

    for scenario in scenarios(args.scenario) {
        match run_scenario(scenario, &setup, clock.as_ref()) {
            Ok(report) => {
                if let (Some(path), Some(samples)) = (&args.csv, report.samples()) {
                    write_samples_csv(path, samples)?;
                }
            }
            Err(e) => {
                error!("{scenario}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        error!("{failed} scenario(s) failed");
        return Ok(ExitCode::FAILURE);
    }

    info!("All scenarios passed");

    Ok(ExitCode::SUCCESS)
}
