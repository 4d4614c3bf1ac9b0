//! Function Invocation Probe - CLI
//!
//! Runs the canned scenario suite (or one named scenario) against the
//! in-memory simulated platform and prints a report per scenario.

#![forbid(unsafe_code)]

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use fip::{ScenarioDriver, scenarios};
use fip_common::config::HarnessConfig;
use fip_common::mock::MockGateway;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "fip")]
#[command(author, version, about = "Function invocation probe - retry-shape observation harness")]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long, env = "FIP_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scenario suite (or a single named scenario)
    Run {
        /// Scenario name; omit to run the whole suite
        scenario: Option<String>,

        /// Classify as if this much time had passed (e.g. "6m" or "360s"),
        /// instead of sleeping out each scenario's settle wait
        #[arg(long, env = "FIP_ELAPSED", value_parser = humantime::parse_duration)]
        elapsed: Option<Duration>,

        /// Emit reports as JSON lines instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// List the available scenarios
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = HarnessConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::List => {
            for spec in scenarios::suite() {
                println!("{}", spec.name);
            }
            Ok(())
        }
        Command::Run { scenario, elapsed, json } => {
            run(&config, scenario.as_deref(), elapsed, json).await
        }
    }
}

async fn run(
    config: &HarnessConfig,
    scenario: Option<&str>,
    elapsed: Option<Duration>,
    json: bool,
) -> Result<()> {
    let mut specs = scenarios::suite_for(config);
    if let Some(name) = scenario {
        specs.retain(|s| s.name == name);
        if specs.is_empty() {
            bail!("unknown scenario '{name}'; see `fip list`");
        }
    }

    let gateway = MockGateway::default();
    scenarios::provision(&gateway);
    let driver = ScenarioDriver::new(gateway, config.clone());

    let mut violations = 0usize;
    for spec in &specs {
        info!(scenario = %spec.name, "running scenario");
        let report = match elapsed {
            Some(elapsed) => driver.run_with_elapsed(spec, elapsed).await?,
            None => driver.run(spec).await?,
        };
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{report}");
        }
        if report.is_failure() {
            violations += 1;
        }
    }

    if violations > 0 {
        bail!("{violations} of {} scenarios violated their expected shape", specs.len());
    }
    Ok(())
}
