//! Cycle-level circuit breaker
//!
//! Guards whole scan cycles, not individual RPC calls: a flaky call is
//! absorbed by the executor, only a fully failed cycle counts here.
//!
//! Transitions:
//! - Closed -> Open once `consecutive_failures` reaches the threshold
//! - Open -> HalfOpen when `allow_scan` is asked after `reset_timeout`
//! - HalfOpen -> Closed on success, HalfOpen -> Open on failure

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info};

use crate::config::BreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        };
        f.write_str(s)
    }
}

/// Snapshot returned to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: BreakerState,
    consecutive_failures: u32,
    failure_threshold: u32,
    reset_timeout: Duration,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            last_failure: None,
            last_failure_at: None,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Whether a new cycle may start. Moves Open -> HalfOpen once the
    /// reset timeout has elapsed.
    pub fn allow_scan(&mut self) -> bool {
        match self.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooling = self
                    .last_failure
                    .is_some_and(|at| at.elapsed() < self.reset_timeout);
                if cooling {
                    return false;
                }
                self.state = BreakerState::HalfOpen;
                info!("circuit breaker half-open, attempting recovery");
                true
            }
        }
    }

    pub fn record_success(&mut self) {
        if self.state == BreakerState::HalfOpen {
            info!("circuit breaker closed after successful cycle");
        }
        if self.state != BreakerState::Open {
            self.state = BreakerState::Closed;
            self.consecutive_failures = 0;
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(Instant::now());
        self.last_failure_at = Some(Utc::now());

        let trip = match self.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => self.consecutive_failures >= self.failure_threshold,
            BreakerState::Open => false,
        };
        if trip {
            self.state = BreakerState::Open;
            error!(
                failures = self.consecutive_failures,
                reset_timeout_ms = self.reset_timeout.as_millis() as u64,
                "circuit breaker opened due to repeated cycle failures"
            );
        }
    }

    /// Operator escape hatch
    pub fn reset(&mut self) {
        self.state = BreakerState::Closed;
        self.consecutive_failures = 0;
        self.last_failure = None;
        info!("circuit breaker manually reset");
    }

    /// Re-apply a persisted status. The cool-down of an open breaker keeps
    /// counting from the persisted failure time.
    pub fn restore(&mut self, status: &CircuitBreakerStatus) {
        self.state = status.state;
        self.consecutive_failures = status.consecutive_failures;
        self.last_failure_at = status.last_failure_at;
        self.last_failure = status.last_failure_at.map(|at| {
            let ago = (Utc::now() - at).to_std().unwrap_or_default();
            let now = Instant::now();
            now.checked_sub(ago).unwrap_or(now)
        });
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            state: self.state,
            consecutive_failures: self.consecutive_failures,
            last_failure_at: self.last_failure_at,
        }
    }
}
