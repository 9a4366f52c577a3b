//! Cursor, breaker, provider health and cumulative metrics

use anyhow::Result;
use colored::Colorize;
use stealth_scanner::{BreakerState, Network};

use super::open_scanner;
use crate::config::CliConfig;

pub async fn run(config: &CliConfig) -> Result<()> {
    let scanner = open_scanner(config, false, false).await?;

    println!();
    println!("{}", "=== Scanner Status ===".cyan().bold());
    println!();
    let network = config.network.unwrap_or(Network::Mainnet);
    println!("{:<18} {} (chain id {})", "Network:", network, network.chain_id());
    println!("{:<18} {}", "Cursor:", scanner.cursor());

    let breaker = scanner.circuit_breaker_status();
    let state = match breaker.state {
        BreakerState::Closed => breaker.state.to_string().green(),
        BreakerState::HalfOpen => breaker.state.to_string().yellow(),
        BreakerState::Open => breaker.state.to_string().red(),
    };
    println!(
        "{:<18} {} ({} consecutive failures)",
        "Circuit breaker:", state, breaker.consecutive_failures
    );
    if let Some(at) = breaker.last_failure_at {
        println!("{:<18} {}", "Last failure:", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }

    println!();
    println!("{}", "Providers".yellow());
    for health in scanner.provider_health() {
        let marker = if health.active { "up".green() } else { "down".red() };
        println!(
            "  [{}] {} ({} failures, {:.0} ms avg)",
            marker, health.url, health.failures, health.avg_response_time_ms
        );
    }

    let metrics = scanner.metrics();
    println!();
    println!("{}", "Metrics".yellow());
    println!(
        "  Scans:      {} total, {} ok, {} degraded, {} failed",
        metrics.total_scans, metrics.successful_scans, metrics.degraded_scans, metrics.failed_scans
    );
    println!(
        "  Last scan:  {}",
        metrics
            .last_scan_at
            .map(|at| format!("{} ({} ms)", at.format("%Y-%m-%d %H:%M:%S UTC"), metrics.last_scan_ms))
            .unwrap_or_else(|| "never".to_string())
    );
    println!("  Avg scan:   {:.0} ms", metrics.average_scan_ms);
    println!("  Blocks:     {}", metrics.total_blocks_scanned);
    println!("  Donations:  {}", metrics.total_donations_found);
    println!(
        "  RPC:        {} calls, {} failures, {:.0} ms avg",
        metrics.rpc_calls, metrics.rpc_failures, metrics.average_rpc_response_ms
    );
    println!(
        "  Skipped:    {} sub-ranges, {} logs, {} matches",
        metrics.subrange_failures, metrics.decode_failures, metrics.match_failures
    );
    println!();

    Ok(())
}
