//! Scanner configuration
//!
//! Every knob has a default matching the production deployment; hosts
//! usually deserialize this from a config file and only override providers.

use std::time::Duration;

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};

/// Blocks fetched per `eth_getLogs` call (keeps providers under their limits)
pub const DEFAULT_BLOCKS_PER_REQUEST: u64 = 2_000;
/// First-run lookback when no cursor is persisted
pub const DEFAULT_MAX_LOOKBACK: u64 = 10_000;
pub const DEFAULT_MATCH_BATCH_SIZE: usize = 50;
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// ERC-5564 announcer, deployed through CREATE2 at the same address on
/// every supported chain
pub const ANNOUNCER_ADDRESS: Address = address!("55649E01B5Df198D18D95b5cc5051630cfD45564");

/// Supported networks with built-in provider presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Sepolia,
    Base,
}

impl Network {
    pub fn chain_id(self) -> u64 {
        match self {
            Network::Mainnet => 1,
            Network::Sepolia => 11_155_111,
            Network::Base => 8_453,
        }
    }

    /// Default provider list, primary first
    pub fn default_providers(self) -> Vec<ProviderConfig> {
        match self {
            Network::Mainnet => vec![
                ProviderConfig::new("https://eth-mainnet.g.alchemy.com/v2/", ANNOUNCER_ADDRESS)
                    .with_initial_latency(1_000.0),
                ProviderConfig::new("https://cloudflare-eth.com", ANNOUNCER_ADDRESS)
                    .with_initial_latency(800.0),
            ],
            Network::Sepolia => vec![ProviderConfig::new(
                "https://eth-sepolia.g.alchemy.com/v2/",
                ANNOUNCER_ADDRESS,
            )],
            Network::Base => vec![ProviderConfig::new("https://mainnet.base.org", ANNOUNCER_ADDRESS)],
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Sepolia => "sepolia",
            Network::Base => "base",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Network {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "sepolia" => Ok(Network::Sepolia),
            "base" => Ok(Network::Base),
            other => Err(ScanError::Config(format!("unknown network `{other}`"))),
        }
    }
}

/// One RPC endpoint and the announcer contract it should be queried for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub url: String,
    pub contract_address: Address,
    /// Appended to `url` on every request, for key-in-path endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Latency seed used to order providers before the first sample
    #[serde(default = "default_initial_latency")]
    pub initial_latency_ms: f64,
}

fn default_initial_latency() -> f64 {
    1_000.0
}

impl ProviderConfig {
    pub fn new(url: impl Into<String>, contract_address: Address) -> Self {
        Self {
            url: url.into(),
            contract_address,
            api_key: None,
            initial_latency_ms: default_initial_latency(),
        }
    }

    pub fn with_initial_latency(mut self, latency_ms: f64) -> Self {
        self.initial_latency_ms = latency_ms;
        self
    }
}

/// Backoff and timeout policy for the retry executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per provider before failing over
    pub max_retries: u32,
    pub timeout_ms: u64,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Upper bound of the random jitter added to every backoff
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_ms: 10_000,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_jitter_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before the next attempt, without jitter. `attempt` is 1-based.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1);
        let mult = 1u64.checked_shl(exp).unwrap_or(u64::MAX);
        self.base_delay_ms
            .saturating_mul(mult)
            .min(self.max_delay_ms)
    }
}

/// Thresholds for the cycle-level circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

/// Provider health thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before a provider is marked inactive
    pub failover_threshold: u32,
    /// Time after the last failure before an inactive provider is retried
    pub recovery_window_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failover_threshold: 3,
            recovery_window_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub providers: Vec<ProviderConfig>,
    pub blocks_per_request: u64,
    pub max_lookback: u64,
    /// Blocks below the cursor that are re-scanned every cycle
    pub rescan_window: u64,
    pub match_batch_size: usize,
    pub fetch_concurrency: usize,
    pub retry: RetryPolicy,
    pub breaker: BreakerConfig,
    pub health: HealthConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            blocks_per_request: DEFAULT_BLOCKS_PER_REQUEST,
            max_lookback: DEFAULT_MAX_LOOKBACK,
            rescan_window: 0,
            match_batch_size: DEFAULT_MATCH_BATCH_SIZE,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl ScannerConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            providers: network.default_providers(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(ScanError::Config("at least one provider is required".into()));
        }
        if let Some(p) = self.providers.iter().find(|p| p.url.trim().is_empty()) {
            return Err(ScanError::Config(format!(
                "provider for contract {} has an empty url",
                p.contract_address
            )));
        }
        if let Some(p) = self.providers.iter().find(|p| p.contract_address == Address::ZERO) {
            return Err(ScanError::Config(format!(
                "provider {} has no announcer contract_address",
                p.url
            )));
        }
        if self.blocks_per_request == 0 {
            return Err(ScanError::Config("blocks_per_request must be > 0".into()));
        }
        if self.match_batch_size == 0 {
            return Err(ScanError::Config("match_batch_size must be > 0".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(ScanError::Config("fetch_concurrency must be > 0".into()));
        }
        if self.retry.max_retries == 0 {
            return Err(ScanError::Config("retry.max_retries must be > 0".into()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ScanError::Config("breaker.failure_threshold must be > 0".into()));
        }
        if self.health.failover_threshold == 0 {
            return Err(ScanError::Config("health.failover_threshold must be > 0".into()));
        }
        Ok(())
    }
}
