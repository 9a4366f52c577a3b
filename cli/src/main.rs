//! Donation scanner CLI - watch an EVM chain for stealth donations

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use stealth_scanner::Network;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod mnemonic;
mod notifier;
mod secure_storage;
mod state_file;

#[cfg(test)]
mod tests;


use commands::*;
use config::{CliConfig, Overrides};

#[derive(Parser)]
#[command(name = "donation-scanner")]
#[command(version = "0.1.0")]
#[command(about = "Detect stealth-address donations announced on an EVM chain")]
#[command(long_about = r#"
Scans ERC-5564 style announcements for payments addressed to your stealth
meta-address and records every funded one as a donation.

Quick Start:
  1. donation-scanner keygen     Generate your stealth keys
  2. donation-scanner address    Print the meta-address to share
  3. donation-scanner scan       Scan once up to the chain head
  4. donation-scanner watch      Keep scanning on an interval

Set SCANNER_KEY_PASSWORD to unlock keys without a prompt.
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.stealth-scanner/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network preset: mainnet, sepolia or base
    #[arg(long, global = true)]
    network: Option<Network>,

    /// Use a single RPC endpoint instead of the configured providers
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate new stealth key pairs (scan + spend keys)
    Keygen {
        /// Force overwrite existing keys
        #[arg(short, long)]
        force: bool,

        /// Generate raw keys without a recovery phrase
        #[arg(long, conflicts_with = "import_mnemonic")]
        no_mnemonic: bool,

        /// Import from existing recovery phrase
        #[arg(long)]
        import_mnemonic: Option<String>,

        /// Passphrase for mnemonic (optional extra security)
        #[arg(long)]
        passphrase: Option<String>,
    },

    /// Show your stealth meta-address
    Address,

    /// Run one scan cycle
    Scan,

    /// Scan repeatedly until Ctrl-C
    Watch {
        /// Seconds between cycles
        #[arg(short, long = "interval", default_value_t = 60)]
        interval_secs: u64,
    },

    /// Show cursor, circuit breaker, provider health and metrics
    Status,

    /// List recorded donations
    Donations,

    /// Close the circuit breaker and clear its failure count
    ResetBreaker,

    /// Mark every provider healthy again
    RefreshProviders,

    /// Move the scan cursor to a block
    ResetCursor {
        #[arg(long)]
        block: u64,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = CliConfig::load(
        cli.config.as_deref(),
        Overrides {
            network: cli.network,
            rpc_url: cli.rpc_url,
        },
    )?;

    match cli.command {
        Commands::Keygen { force, no_mnemonic, import_mnemonic, passphrase } => {
            keygen::run(
                &config,
                keygen::KeygenOptions {
                    force,
                    with_mnemonic: !no_mnemonic,
                    import_mnemonic,
                    passphrase,
                },
            )?;
        }
        Commands::Address => address::run(&config)?,
        Commands::Scan => scan::run(&config).await?,
        Commands::Watch { interval_secs } => watch::run(&config, interval_secs).await?,
        Commands::Status => status::run(&config).await?,
        Commands::Donations => donations::run(&config).await?,
        Commands::ResetBreaker => reset::breaker(&config).await?,
        Commands::RefreshProviders => reset::providers(&config).await?,
        Commands::ResetCursor { block } => reset::cursor(&config, block).await?,
    }

    Ok(())
}
