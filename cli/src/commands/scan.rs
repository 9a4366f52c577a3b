//! One scan cycle from the saved cursor to the chain head

use anyhow::Result;
use colored::Colorize;
use stealth_scanner::CycleOutcome;

use super::{open_scanner, print_donation, print_report};
use crate::config::CliConfig;

pub async fn run(config: &CliConfig) -> Result<()> {
    let scanner = open_scanner(config, true, false).await?;

    println!(
        "{}",
        format!("Scanning for donations from block {}...", scanner.cursor()).cyan()
    );
    let report = scanner.trigger_now().await;
    print_report(&report);

    if !report.new_donations.is_empty() {
        println!();
        for (i, donation) in report.new_donations.iter().enumerate() {
            print_donation(i, donation);
        }
    }

    if let CycleOutcome::Failed(reason) = report.outcome {
        anyhow::bail!("scan failed: {reason}");
    }
    Ok(())
}
