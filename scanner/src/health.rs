//! Provider health registry
//!
//! Pure bookkeeping over the configured RPC endpoints: failure streaks,
//! rolling latency and the active flag used for failover ordering.

use std::time::Duration;

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{HealthConfig, ProviderConfig};

/// A provider as seen by one executor attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEndpoint {
    pub url: String,
    pub contract_address: Address,
    pub api_key: Option<String>,
}

impl From<&ProviderConfig> for ProviderEndpoint {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            url: config.url.clone(),
            contract_address: config.contract_address,
            api_key: config.api_key.clone(),
        }
    }
}

impl ProviderEndpoint {
    /// URL the request is actually sent to
    pub fn request_url(&self) -> String {
        match self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => format!("{}{}", self.url, key),
            None => self.url.clone(),
        }
    }
}

/// Health data persisted between runs and shown to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub url: String,
    pub failures: u32,
    pub avg_response_time_ms: f64,
    pub active: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct ProviderEntry {
    endpoint: ProviderEndpoint,
    failures: u32,
    avg_response_time_ms: f64,
    active: bool,
    last_failure: Option<Instant>,
    last_success_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct ProviderRegistry {
    providers: Vec<ProviderEntry>,
    failover_threshold: u32,
    recovery_window: Duration,
}

impl ProviderRegistry {
    pub fn new(providers: &[ProviderConfig], config: &HealthConfig) -> Self {
        let providers = providers
            .iter()
            .map(|p| ProviderEntry {
                endpoint: ProviderEndpoint::from(p),
                failures: 0,
                avg_response_time_ms: p.initial_latency_ms,
                active: true,
                last_failure: None,
                last_success_at: None,
                last_failure_at: None,
            })
            .collect();

        Self {
            providers,
            failover_threshold: config.failover_threshold.max(1),
            recovery_window: Duration::from_millis(config.recovery_window_ms),
        }
    }

    /// Active providers, fastest first.
    ///
    /// Inactive providers whose last failure is older than the recovery
    /// window are put back on probation before ordering.
    pub fn healthy_providers_ordered(&mut self) -> Vec<ProviderEndpoint> {
        let window = self.recovery_window;
        for entry in self.providers.iter_mut().filter(|p| !p.active) {
            let recovered = entry.last_failure.map_or(true, |at| at.elapsed() >= window);
            if recovered {
                entry.active = true;
                entry.failures = 0;
                info!(url = %entry.endpoint.url, "provider recovery window elapsed, reactivating");
            }
        }

        let mut active: Vec<&ProviderEntry> = self.providers.iter().filter(|p| p.active).collect();
        active.sort_by(|a, b| a.avg_response_time_ms.total_cmp(&b.avg_response_time_ms));
        active.into_iter().map(|p| p.endpoint.clone()).collect()
    }

    pub fn record_outcome(&mut self, url: &str, success: bool, latency_ms: f64) {
        let threshold = self.failover_threshold;
        let Some(entry) = self.providers.iter_mut().find(|p| p.endpoint.url == url) else {
            return;
        };

        if success {
            entry.failures = 0;
            entry.avg_response_time_ms = (entry.avg_response_time_ms + latency_ms) / 2.0;
            entry.active = true;
            entry.last_success_at = Some(Utc::now());
            return;
        }

        entry.failures = entry.failures.saturating_add(1);
        entry.last_failure = Some(Instant::now());
        entry.last_failure_at = Some(Utc::now());
        if entry.active && entry.failures >= threshold {
            entry.active = false;
            warn!(
                url = %entry.endpoint.url,
                failures = entry.failures,
                "provider marked inactive"
            );
        }
    }

    /// Operator-triggered recovery: clear every failure counter
    pub fn refresh_all(&mut self) {
        for entry in &mut self.providers {
            entry.failures = 0;
            entry.active = true;
            entry.last_failure = None;
            entry.last_failure_at = None;
        }
        info!(providers = self.providers.len(), "provider health refreshed");
    }

    pub fn snapshot(&self) -> Vec<ProviderHealth> {
        self.providers
            .iter()
            .map(|p| ProviderHealth {
                url: p.endpoint.url.clone(),
                failures: p.failures,
                avg_response_time_ms: p.avg_response_time_ms,
                active: p.active,
                last_success_at: p.last_success_at,
                last_failure_at: p.last_failure_at,
            })
            .collect()
    }

    /// Apply persisted health to matching providers; unknown urls are ignored.
    ///
    /// An inactive provider's recovery window keeps counting from its
    /// persisted failure time, or starts now when none was recorded.
    pub fn restore(&mut self, health: &[ProviderHealth]) {
        for saved in health {
            let Some(entry) = self.providers.iter_mut().find(|p| p.endpoint.url == saved.url) else {
                continue;
            };
            entry.failures = saved.failures;
            if saved.avg_response_time_ms.is_finite() && saved.avg_response_time_ms >= 0.0 {
                entry.avg_response_time_ms = saved.avg_response_time_ms;
            }
            entry.active = saved.active;
            entry.last_success_at = saved.last_success_at;
            entry.last_failure_at = saved.last_failure_at;
            entry.last_failure = match saved.last_failure_at {
                Some(at) => {
                    let ago = (Utc::now() - at).to_std().unwrap_or_default();
                    let now = Instant::now();
                    Some(now.checked_sub(ago).unwrap_or(now))
                }
                None => (!saved.active).then(Instant::now),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        let providers = vec![
            ProviderConfig::new("https://a", Address::ZERO).with_initial_latency(1_000.0),
            ProviderConfig::new("https://b", Address::ZERO).with_initial_latency(1_200.0),
            ProviderConfig::new("https://c", Address::ZERO).with_initial_latency(800.0),
        ];
        ProviderRegistry::new(&providers, &HealthConfig::default())
    }

    fn urls(endpoints: &[ProviderEndpoint]) -> Vec<&str> {
        endpoints.iter().map(|e| e.url.as_str()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_ordering_by_latency() {
        let mut reg = registry();
        assert_eq!(urls(&reg.healthy_providers_ordered()), ["https://c", "https://a", "https://b"]);

        reg.record_outcome("https://b", true, 100.0);
        assert_eq!(urls(&reg.healthy_providers_ordered()), ["https://b", "https://c", "https://a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivates_at_threshold() {
        let mut reg = registry();
        reg.record_outcome("https://c", false, 0.0);
        reg.record_outcome("https://c", false, 0.0);
        assert_eq!(reg.healthy_providers_ordered().len(), 3);

        reg.record_outcome("https://c", false, 0.0);
        assert_eq!(urls(&reg.healthy_providers_ordered()), ["https://a", "https://b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failures() {
        let mut reg = registry();
        reg.record_outcome("https://a", false, 0.0);
        reg.record_outcome("https://a", false, 0.0);
        reg.record_outcome("https://a", true, 200.0);
        reg.record_outcome("https://a", false, 0.0);

        let a = &reg.snapshot()[0];
        assert_eq!(a.failures, 1);
        assert!(a.active);
        assert_eq!(a.avg_response_time_ms, 600.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_window_reactivates() {
        let mut reg = registry();
        for _ in 0..3 {
            reg.record_outcome("https://a", false, 0.0);
        }
        assert_eq!(reg.healthy_providers_ordered().len(), 2);

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(reg.healthy_providers_ordered().len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(reg.healthy_providers_ordered().len(), 3);
        assert_eq!(reg.snapshot()[0].failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_all() {
        let mut reg = registry();
        for url in ["https://a", "https://b", "https://c"] {
            for _ in 0..3 {
                reg.record_outcome(url, false, 0.0);
            }
        }
        assert!(reg.healthy_providers_ordered().is_empty());

        reg.refresh_all();
        assert_eq!(reg.healthy_providers_ordered().len(), 3);
        assert!(reg.snapshot().iter().all(|p| p.failures == 0 && p.active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_applies_known_urls() {
        let mut reg = registry();
        reg.restore(&[
            ProviderHealth {
                url: "https://b".into(),
                failures: 4,
                avg_response_time_ms: 50.0,
                active: false,
                last_success_at: None,
                last_failure_at: None,
            },
            ProviderHealth {
                url: "https://gone".into(),
                failures: 9,
                avg_response_time_ms: 1.0,
                active: true,
                last_success_at: None,
                last_failure_at: None,
            },
        ]);

        assert_eq!(urls(&reg.healthy_providers_ordered()), ["https://c", "https://a"]);
        assert_eq!(reg.snapshot()[1].failures, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_keeps_elapsed_recovery_window() {
        let mut reg = registry();
        // Let the paused clock run past the window so the backdated instant fits
        tokio::time::advance(Duration::from_secs(600)).await;

        reg.restore(&[ProviderHealth {
            url: "https://c".into(),
            failures: 3,
            avg_response_time_ms: 10.0,
            active: false,
            last_success_at: None,
            last_failure_at: Some(Utc::now() - chrono::Duration::seconds(240)),
        }]);
        assert_eq!(urls(&reg.healthy_providers_ordered()), ["https://a", "https://b"]);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(reg.healthy_providers_ordered().len(), 3);
    }

    #[test]
    fn test_request_url_appends_api_key() {
        let endpoint = ProviderEndpoint {
            url: "https://eth-mainnet.g.alchemy.com/v2/".into(),
            contract_address: Address::ZERO,
            api_key: Some("secret".into()),
        };
        assert_eq!(endpoint.request_url(), "https://eth-mainnet.g.alchemy.com/v2/secret");
    }
}
