//! List recorded donations

use anyhow::Result;
use colored::Colorize;
use stealth_scanner::donation::format_units;
use stealth_scanner::StateStore;

use super::print_donation;
use crate::config::CliConfig;
use crate::state_file::JsonStateStore;

pub async fn run(config: &CliConfig) -> Result<()> {
    let store = JsonStateStore::open(config.state_file()?)?;
    let mut donations = store.list_donations().await?;

    println!();
    if donations.is_empty() {
        println!("{}", "No donations recorded yet.".yellow());
        println!("{}", "Run 'donation-scanner scan' to check for new ones.".dimmed());
        return Ok(());
    }

    // Newest first
    donations.sort_by(|a, b| b.block_number.cmp(&a.block_number));

    println!(
        "{}",
        format!("{} donation(s):", donations.len()).green().bold()
    );
    println!();
    for (i, donation) in donations.iter().enumerate() {
        print_donation(i, donation);
        println!();
    }

    let total = donations
        .iter()
        .filter(|d| !d.swept)
        .fold(alloy_primitives::U256::ZERO, |acc, d| acc.saturating_add(d.amount));
    println!("{} {} ETH", "Total available:".yellow(), format_units(total));

    Ok(())
}
