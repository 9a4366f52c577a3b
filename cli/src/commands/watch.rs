//! Periodic scanning until interrupted

use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{open_scanner, print_report};
use crate::config::CliConfig;

pub async fn run(config: &CliConfig, interval_secs: u64) -> Result<()> {
    if interval_secs == 0 {
        bail!("--interval must be at least 1 second");
    }
    let scanner = open_scanner(config, true, true).await?;

    println!(
        "{}",
        format!("Watching for donations every {interval_secs}s. Press Ctrl-C to stop.").cyan()
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => break,
        }

        // Another process may have reset the breaker or cursor since the last cycle
        if let Err(e) = scanner.reload_state().await {
            warn!(error = %e, "could not reload scanner state, keeping in-memory state");
        }

        let cycle = scanner.run_cycle();
        tokio::pin!(cycle);
        tokio::select! {
            report = &mut cycle => print_report(&report),
            _ = tokio::signal::ctrl_c() => {
                scanner.shutdown();
                print_report(&cycle.await);
                break;
            }
        }
    }

    info!(cursor = scanner.cursor(), "watch stopped");
    println!();
    println!("{}", "Stopped.".yellow());
    Ok(())
}
