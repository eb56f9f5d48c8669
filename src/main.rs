//! Segnet CLI
//!
//! Runs one of the reference topologies and optionally writes the
//! capture trace and position snapshots.
//!
//! ```bash
//! segnet second --n-csma 3 --verbose
//! segnet third --n-wifi 5 --seed 42 --trace third.trace --positions third.pos
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use segnet::config::ScenarioConfig;
use segnet::scenario::{second, third, Scenario};
use segnet::time::{parse_duration, VirtualTime};
use segnet::{SimError, SimResult};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "segnet")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    scenario: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Point-to-point link into a shared bus
    Second(RunArgs),
    /// Second, plus a wireless cell behind node 0
    Third(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Number of "extra" bus nodes
    #[arg(long, default_value = "3")]
    n_csma: u32,

    /// Number of wireless stations (third only)
    #[arg(long, default_value = "3")]
    n_wifi: u32,

    /// Tell echo applications to log (`--verbose false` silences them)
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    verbose: bool,

    /// Stop time, e.g. "10s" or "2500ms"
    #[arg(long, default_value = "10s")]
    stop: String,

    /// Seed for mobility randomness
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Write the rendered capture trace here
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write position snapshots here
    #[arg(long)]
    positions: Option<PathBuf>,
}

impl RunArgs {
    fn scenario_config(&self) -> SimResult<ScenarioConfig> {
        Ok(ScenarioConfig {
            n_csma: self.n_csma,
            n_wifi: self.n_wifi,
            stop: VirtualTime::new(parse_duration(&self.stop)?),
            seed: self.seed,
            ..ScenarioConfig::default()
        })
    }
}

fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,segnet::app=info"
    } else {
        "warn"
    }
}

fn sink_err(path: &Path, e: std::io::Error) -> SimError {
    SimError::Sink(format!("{}: {}", path.display(), e))
}

fn write_outputs(scenario: &Scenario, args: &RunArgs) -> SimResult<()> {
    if let (Some(path), Some(trace)) = (&args.trace, scenario.net.packet_trace()) {
        let mut w = BufWriter::new(File::create(path).map_err(|e| sink_err(path, e))?);
        trace
            .write_to(&mut w)
            .and_then(|_| w.flush())
            .map_err(|e| sink_err(path, e))?;
        info!(path = %path.display(), records = trace.len(), "capture written");
    }
    if let (Some(path), Some(log)) = (&args.positions, scenario.net.position_log()) {
        let mut w = BufWriter::new(File::create(path).map_err(|e| sink_err(path, e))?);
        log.write_to(&mut w)
            .and_then(|_| w.flush())
            .map_err(|e| sink_err(path, e))?;
        info!(path = %path.display(), snapshots = log.snapshots().len(), "positions written");
    }
    Ok(())
}

fn run(cli: &Cli) -> SimResult<()> {
    let (args, mut scenario) = match &cli.scenario {
        Command::Second(args) => (args, second(&args.scenario_config()?)?),
        Command::Third(args) => (args, third(&args.scenario_config()?)?),
    };
    let summary = scenario.net.run()?;
    println!("{}", summary);
    write_outputs(&scenario, args)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = match &cli.scenario {
        Command::Second(args) | Command::Third(args) => args.verbose,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose))),
        )
        .without_time()
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(cli: &Cli) -> &RunArgs {
        match &cli.scenario {
            Command::Second(args) | Command::Third(args) => args,
        }
    }

    #[test]
    fn test_echo_logging_on_by_default() {
        let cli = Cli::try_parse_from(["segnet", "second"]).unwrap();
        assert!(args(&cli).verbose);
        assert_eq!(default_filter(args(&cli).verbose), "warn,segnet::app=info");
    }

    #[test]
    fn test_verbose_can_be_switched_off() {
        let cli = Cli::try_parse_from(["segnet", "third", "--verbose", "false"]).unwrap();
        assert!(!args(&cli).verbose);
        assert_eq!(default_filter(false), "warn");
    }

    #[test]
    fn test_run_args_build_scenario_config() {
        let cli =
            Cli::try_parse_from(["segnet", "second", "--n-csma", "5", "--stop", "2500ms"]).unwrap();
        let cfg = args(&cli).scenario_config().unwrap();
        assert_eq!(cfg.n_csma, 5);
        assert_eq!(cfg.stop, VirtualTime::from_millis(2500));
    }
}
