//! Operator resets: circuit breaker, provider health and scan cursor

use anyhow::Result;
use colored::Colorize;

use super::open_scanner;
use crate::config::CliConfig;

pub async fn breaker(config: &CliConfig) -> Result<()> {
    let scanner = open_scanner(config, false, false).await?;
    let before = scanner.circuit_breaker_status();
    scanner.reset_circuit_breaker().await;
    println!(
        "{} (was {}, {} failures)",
        "Circuit breaker closed".green(),
        before.state,
        before.consecutive_failures
    );
    Ok(())
}

pub async fn providers(config: &CliConfig) -> Result<()> {
    let scanner = open_scanner(config, false, false).await?;
    scanner.refresh_provider_health().await;
    println!(
        "{}",
        format!("Re-enabled {} provider(s)", scanner.provider_health().len()).green()
    );
    Ok(())
}

pub async fn cursor(config: &CliConfig, block: u64) -> Result<()> {
    let scanner = open_scanner(config, false, false).await?;
    let previous = scanner.cursor();
    scanner.reset_cursor(block).await?;
    println!(
        "{}",
        format!("Cursor moved from block {previous} to {block}").green()
    );
    if block < previous {
        println!(
            "{}",
            "Blocks in between will be rescanned; known donations are not duplicated.".dimmed()
        );
    }
    Ok(())
}
