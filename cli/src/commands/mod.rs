pub mod address;
pub mod donations;
pub mod keygen;
pub mod reset;
pub mod scan;
pub mod status;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use stealth_scanner::donation::format_units;
use stealth_scanner::{AnnouncementScanner, CycleOutcome, CycleReport, DonationRecord};

use crate::config::{short_hex, CliConfig};
use crate::notifier::ConsoleNotifier;
use crate::secure_storage::FileKeyVault;
use crate::state_file::JsonStateStore;

/// Build a scanner over the configured providers and the local state file.
///
/// With `unlock` the key vault is opened first; otherwise cycles are
/// skipped for lack of key material, which suits the read-only commands.
/// With `notify` new donations are also printed as they are found.
pub async fn open_scanner(config: &CliConfig, unlock: bool, notify: bool) -> Result<AnnouncementScanner> {
    let vault = Arc::new(FileKeyVault::new(config.key_file()?));
    if unlock {
        vault.unlock_interactive()?;
    }

    let state_path = config.state_file()?;
    let store = JsonStateStore::open(state_path.clone())
        .with_context(|| format!("Failed to open state file {}", state_path.display()))?;

    let mut builder = AnnouncementScanner::builder(config.scanner.clone())
        .key_vault(vault)
        .state_store(Arc::new(store));
    if notify {
        builder = builder.notifier(Arc::new(ConsoleNotifier));
    }
    let scanner = builder.build()?;
    scanner.initialize().await?;
    Ok(scanner)
}

pub fn print_report(report: &CycleReport) {
    let range = match (report.from_block, report.to_block) {
        (Some(from), Some(to)) => format!("blocks {from}..={to}"),
        _ => "no range".to_string(),
    };

    match &report.outcome {
        CycleOutcome::Success => println!(
            "{} {} in {} ms",
            "Scan complete:".green().bold(),
            range,
            report.duration_ms
        ),
        CycleOutcome::Degraded => {
            println!(
                "{} {} in {} ms",
                "Scan complete with gaps:".yellow().bold(),
                range,
                report.duration_ms
            );
            println!(
                "  {} sub-range, {} decode and {} match failures",
                report.progress.subrange_failures,
                report.progress.decode_failures,
                report.progress.match_failures
            );
        }
        CycleOutcome::Failed(reason) => println!("{} {}", "Scan failed:".red().bold(), reason),
        CycleOutcome::Cancelled => println!("{}", "Scan cancelled.".yellow()),
        CycleOutcome::Skipped(reason) => println!("{} {}", "Scan skipped:".yellow(), reason),
    }

    if report.outcome.completed() {
        println!(
            "  {} announcements, {} new donation(s)",
            report.progress.announcements_found,
            report.new_donations.len()
        );
    }
}

pub fn print_donation(index: usize, donation: &DonationRecord) {
    let status = if donation.swept {
        "SWEPT".dimmed()
    } else {
        "AVAILABLE".green()
    };
    let address = donation.stealth_address.to_string();
    let tx = donation.tx_hash.to_string();

    println!("{}. {} [{}]", index + 1, "Donation".yellow(), status);
    println!("   Address: {}", address);
    println!("   Amount:  {} ETH", format_units(donation.amount));
    println!("   Block:   {}", donation.block_number);
    println!("   Tx:      {}", short_hex(&tx));
    println!("   Seen:    {}", donation.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
}
