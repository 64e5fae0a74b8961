//! Custody ledger CLI
//!
//! Runs scripted simulations against an in-memory bank and exposes the
//! normalization and valuation arithmetic.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;

use custody_ledger::cli::{
    normalize_amount, value_amount, OutputFormat, OutputFormatter, Simulation, SimulationConfig,
};

/// Multi-asset custodial ledger with USD-denominated limits
#[derive(Parser)]
#[command(name = "custody-ledger")]
#[command(version = custody_ledger::VERSION)]
#[command(about = "Command-line interface for the custody ledger", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Output format (text, json, json-pretty, table, minimal)
    #[arg(short, long, env = "CUSTODY_LEDGER_FORMAT", default_value = "text")]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an example simulation file
    Init {
        /// Destination
        path: PathBuf,

        /// Force overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Check a simulation file without running it
    Validate {
        /// Simulation file
        config: PathBuf,
    },

    /// Run a simulation file and report every step
    Run {
        /// Simulation file
        config: PathBuf,

        /// Write the final bank snapshot (bincode) to this path
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Print the event log after the run
        #[arg(long)]
        events: bool,
    },

    /// Normalize a native amount to 6 decimals
    Normalize {
        /// Amount in native units
        amount: u128,

        /// Native decimals
        decimals: u8,
    },

    /// Value a normalized amount in USD
    Value {
        /// Amount with 6 decimals
        normalized: u64,

        /// Feed answer
        price: i64,

        /// Feed decimals
        #[arg(default_value = "8")]
        decimals: u8,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut output = OutputFormatter::new(cli.format);
    if cli.no_color {
        output = output.without_color();
    }

    match cli.command {
        Commands::Init { path, force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists, use --force to overwrite", path.display());
            }
            SimulationConfig::example().save(&path)?;
            output.success(&format!("Example simulation written to {}", path.display()));
        }

        Commands::Validate { config } => {
            let sim = load(&config)?;
            output.section("Simulation");
            output.kv("bank", &sim.bank.summary());
            output.kv("feeds", &sim.feeds.len().to_string());
            output.kv("assets", &sim.assets.len().to_string());
            output.kv("steps", &sim.steps.len().to_string());
            output.success("Configuration is valid");
        }

        Commands::Run {
            config,
            snapshot,
            events,
        } => {
            let sim_config = load(&config)?;
            let sim = Simulation::from_config(&sim_config)?;
            let reports = sim.run(&sim_config.steps);

            output.section("Steps");
            output.reports(&reports);

            let bank = sim.bank();
            let snap = sim.snapshot()?;

            output.section("Balances");
            let rows: Vec<Vec<String>> = snap
                .balances
                .iter()
                .map(|e| vec![e.owner.short(), e.asset.short(), e.balance.to_string()])
                .collect();
            output.table(&["owner", "asset", "balance"], &rows);

            output.section("Bank");
            output.kv("total deposits", &bank.total_deposits_usd()?.to_string());
            output.kv("capacity", &bank.available_capacity_usd()?.to_string());
            match bank.mark_to_market_usd() {
                Ok(value) => output.kv("mark to market", &value.to_string()),
                Err(e) => output.warning(&format!("mark to market unavailable: {}", e)),
            }
            output.kv("paused", &bank.is_paused()?.to_string());
            output.kv("state hash", &snap.state_hash().to_hex());
            output.kv("event digest", &snap.event_digest().to_hex());

            let (pulls, pushes) = sim.custody().transfer_counts()?;
            output.section("Custody");
            output.kv("pulls", &pulls.to_string());
            output.kv("pushes", &pushes.to_string());

            if events {
                output.section("Events");
                let rows: Vec<Vec<String>> = bank
                    .events()?
                    .iter()
                    .map(|r| {
                        vec![
                            r.sequence.to_string(),
                            r.event.event_type().to_string(),
                            r.event.actor().short(),
                            r.hash().to_hex(),
                        ]
                    })
                    .collect();
                output.table(&["seq", "event", "actor", "hash"], &rows);
            }

            bank.verify_invariants()
                .context("ledger invariants violated after run")?;

            if let Some(path) = snapshot {
                std::fs::write(&path, snap.to_bytes()?)
                    .with_context(|| format!("writing snapshot to {}", path.display()))?;
                output.success(&format!("Snapshot written to {}", path.display()));
            }

            let rejected = reports.iter().filter(|r| !r.is_ok()).count();
            output.success(&format!(
                "{} steps applied, {} rejected",
                reports.len() - rejected,
                rejected
            ));
        }

        Commands::Normalize { amount, decimals } => {
            let n = normalize_amount(amount, decimals)?;
            output.kv("normalized", &n.normalized.to_string());
            output.kv("dust", &n.dust.to_string());
            if n.dust > 0 && !output.format().is_json() {
                output.warning(&format!("{} native units lost to truncation", n.dust));
            }
        }

        Commands::Value {
            normalized,
            price,
            decimals,
        } => {
            let value = value_amount(normalized, price, decimals)?;
            output.kv("value_usd", &value.to_string());
        }
    }

    Ok(())
}

/// Load a simulation file with `CUSTODY_*` overrides applied to its bank
fn load(path: &Path) -> Result<SimulationConfig> {
    let config = SimulationConfig::load_with_env(path)
        .with_context(|| format!("loading {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
