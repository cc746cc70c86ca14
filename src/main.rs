//! Stake client command line
//!
//! Offline tooling around the client library: compute pool hints from a
//! snapshot and check configuration files.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stake_client::config::Config;
use stake_client::metrics::metrics;
use stake_client::{simulate, PoolEntry, PoolPosition, TranscoderPoolHints};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "STAKE_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate a stake change against a pool snapshot and print the hints
    Hints {
        /// JSON file holding the pool as `[{"address": .., "stake": ..}]`, highest stake first
        #[arg(long)]
        pool: String,

        /// Transcoder whose stake changes
        #[arg(long)]
        address: Address,

        /// Stake the transcoder ends up with
        #[arg(long)]
        stake: U256,

        /// Pool capacity; the snapshot is treated as full when it reaches it
        #[arg(long)]
        max_size: usize,
    },
    /// Load and validate the configuration, then print it
    Config,
}

#[derive(Serialize)]
struct HintsReport {
    outcome: &'static str,
    in_pool: bool,
    hints: TranscoderPoolHints,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    init_logging(args.verbose, json_logs(&args, &config))?;
    metrics().set_enabled(config.monitoring.enable_metrics);

    match args.command {
        Command::Hints {
            pool,
            address,
            stake,
            max_size,
        } => run_hints(&pool, address, stake, max_size),
        Command::Config => run_config(&args.config),
    }
}

/// Load configuration from file when present, defaults otherwise
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        Ok(Config::default())
    }
}

fn json_logs(args: &Args, config: &Config) -> bool {
    args.json_logs || config.monitoring.json_logs
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "stake_client=debug,info"
    } else {
        "stake_client=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

fn load_pool(path: &str) -> Result<Vec<PoolEntry>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read pool from {}", path))?;
    let entries: Vec<PoolEntry> =
        serde_json::from_str(&content).with_context(|| format!("Invalid pool snapshot in {}", path))?;
    if entries.windows(2).any(|w| w[0].stake < w[1].stake) {
        warn!("pool snapshot is not sorted by descending stake");
    }
    Ok(entries)
}

fn run_hints(path: &str, address: Address, stake: U256, max_size: usize) -> Result<()> {
    let entries = load_pool(path)?;
    if entries.len() > max_size {
        anyhow::bail!(
            "pool snapshot has {} entries but max size is {}",
            entries.len(),
            max_size
        );
    }
    let is_full = entries.len() == max_size;
    info!(size = entries.len(), is_full, "loaded pool snapshot");

    let position: PoolPosition = simulate(address, stake, &entries, is_full);
    let report = HintsReport {
        outcome: position.label(),
        in_pool: position.in_pool(),
        hints: position.hints(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    let simulated = metrics()
        .pool_simulations
        .with_label_values(&[position.label()])
        .get();
    info!(outcome = position.label(), simulated, "pool simulation done");
    Ok(())
}

fn run_config(path: &str) -> Result<()> {
    let config = Config::from_file_with_env(path)
        .with_context(|| format!("Failed to load config from {}", path))?;
    info!(
        controller = %config.chain.controller_address,
        gas_limit = config.chain.gas_limit,
        "configuration valid"
    );
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
