//! Retry/failover executor
//!
//! Every network call goes through [`RetryExecutor::execute`]: providers are
//! tried fastest-first, each up to `max_retries` times under a timeout, with
//! exponential backoff plus jitter between attempts on the same provider.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use rand::Rng;
use serde_json::json;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{DecodeError, Result, RpcError, ScanError};
use crate::health::{ProviderEndpoint, ProviderHealth, ProviderRegistry};
use crate::metrics::RpcStats;
use crate::rpc::{
    expect_hex_string, get_balance_params, get_logs_params, parse_quantity, parse_u256, RawLog,
    RpcTransport,
};

pub struct RetryExecutor {
    transport: Arc<dyn RpcTransport>,
    registry: Mutex<ProviderRegistry>,
    policy: RetryPolicy,
    // Successful calls and their summed latency; failures are exhausted operations
    calls: AtomicU64,
    failures: AtomicU64,
    latency_sum_ms: AtomicU64,
}

impl RetryExecutor {
    pub fn new(transport: Arc<dyn RpcTransport>, registry: ProviderRegistry, policy: RetryPolicy) -> Self {
        Self {
            transport,
            registry: Mutex::new(registry),
            policy,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency_sum_ms: AtomicU64::new(0),
        }
    }

    fn registry(&self) -> MutexGuard<'_, ProviderRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `op` against healthy providers until one succeeds
    pub async fn execute<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: Fn(ProviderEndpoint) -> Fut,
        Fut: Future<Output = std::result::Result<T, RpcError>>,
    {
        let providers = self.registry().healthy_providers_ordered();
        let mut last_error: Option<RpcError> = None;

        for provider in providers {
            for attempt in 1..=self.policy.max_retries {
                let started = Instant::now();
                let outcome = match timeout(self.policy.timeout(), op(provider.clone())).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RpcError::Timeout(self.policy.timeout_ms)),
                };

                match outcome {
                    Ok(value) => {
                        let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
                        self.registry().record_outcome(&provider.url, true, latency_ms);
                        self.calls.fetch_add(1, Ordering::Relaxed);
                        self.latency_sum_ms.fetch_add(latency_ms as u64, Ordering::Relaxed);
                        debug!(operation, url = %provider.url, attempt, latency_ms, "rpc ok");
                        return Ok(value);
                    }
                    Err(err) => {
                        warn!(
                            operation,
                            url = %provider.url,
                            attempt,
                            max_retries = self.policy.max_retries,
                            error = %err,
                            "rpc attempt failed"
                        );
                        self.registry().record_outcome(&provider.url, false, 0.0);
                        last_error = Some(err);

                        if attempt < self.policy.max_retries {
                            sleep(self.retry_delay(attempt)).await;
                        }
                    }
                }
            }
        }

        self.failures.fetch_add(1, Ordering::Relaxed);
        Err(ScanError::Exhausted {
            operation: operation.to_string(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no healthy providers".to_string()),
        })
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.policy.max_jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.policy.max_jitter_ms)
        };
        Duration::from_millis(self.policy.backoff_ms(attempt).saturating_add(jitter))
    }

    /// Current chain head via `eth_blockNumber`
    pub async fn chain_head(&self) -> Result<u64> {
        let transport = Arc::clone(&self.transport);
        self.execute("chain_head", move |endpoint| {
            let transport = Arc::clone(&transport);
            async move {
                let result = transport.call(&endpoint, "eth_blockNumber", json!([])).await?;
                let hex = expect_hex_string("eth_blockNumber", &result)?;
                Ok::<_, RpcError>(parse_quantity("eth_blockNumber", &hex)?)
            }
        })
        .await
    }

    /// Announcement logs for one inclusive block range
    pub async fn get_logs(&self, from_block: u64, to_block: u64, topic: B256) -> Result<Vec<RawLog>> {
        let transport = Arc::clone(&self.transport);
        let operation = format!("fetch_logs_{from_block}_{to_block}");
        self.execute(&operation, move |endpoint| {
            let transport = Arc::clone(&transport);
            async move {
                let params = get_logs_params(endpoint.contract_address, from_block, to_block, topic);
                let result = transport.call(&endpoint, "eth_getLogs", params).await?;
                serde_json::from_value::<Vec<RawLog>>(result)
                    .map_err(|e| RpcError::Decode(DecodeError::Json(e.to_string())))
            }
        })
        .await
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256> {
        let transport = Arc::clone(&self.transport);
        self.execute("get_balance", move |endpoint| {
            let transport = Arc::clone(&transport);
            async move {
                let result = transport
                    .call(&endpoint, "eth_getBalance", get_balance_params(address))
                    .await?;
                let hex = expect_hex_string("eth_getBalance", &result)?;
                Ok::<_, RpcError>(parse_u256("eth_getBalance", &hex)?)
            }
        })
        .await
    }

    /// Drain the RPC counters accumulated since the last call
    pub fn take_stats(&self) -> RpcStats {
        let calls = self.calls.swap(0, Ordering::Relaxed);
        let failures = self.failures.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_ms.swap(0, Ordering::Relaxed);
        RpcStats {
            calls,
            failures,
            average_response_ms: (calls > 0).then(|| latency_sum as f64 / calls as f64),
        }
    }

    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.registry().snapshot()
    }

    pub fn restore_provider_health(&self, health: &[ProviderHealth]) {
        self.registry().restore(health);
    }

    pub fn refresh_providers(&self) {
        self.registry().refresh_all();
    }
}
