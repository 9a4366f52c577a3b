//! Scan orchestrator
//!
//! One `AnnouncementScanner` owns the cursor, the circuit breaker and the
//! provider registry. A cycle runs `idle -> running -> done`:
//!
//! 1. guards: re-entrancy flag, circuit breaker, key material
//! 2. chain head, then the block range to scan
//! 3. fetch announcements, match them, persist new donations
//! 4. advance the cursor, record metrics and breaker outcome
//!
//! A cycle never panics on scan failure; everything ends up in the
//! returned [`CycleReport`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerStatus};
use crate::collaborators::{KeyMaterial, KeyVault, Notifier, StateStore};
use crate::config::ScannerConfig;
use crate::crypto::{DksapScheme, StealthScheme};
use crate::donation::DonationRecord;
use crate::error::{Result, ScanError};
use crate::executor::RetryExecutor;
use crate::fetcher::LogFetcher;
use crate::health::{ProviderHealth, ProviderRegistry};
use crate::matcher::StealthMatcher;
use crate::metrics::{ProgressHandle, ScanMetrics, ScanProgress};
use crate::rpc::{HttpTransport, RpcTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    AlreadyRunning,
    CircuitOpen,
    NoKeyMaterial,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SkipReason::AlreadyRunning => "a cycle is already running",
            SkipReason::CircuitOpen => "circuit breaker is open",
            SkipReason::NoKeyMaterial => "no key material available",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CycleOutcome {
    Success,
    /// Completed, but some sub-ranges or items were skipped
    Degraded,
    Failed(String),
    Cancelled,
    Skipped(SkipReason),
}

impl CycleOutcome {
    /// Whether the cursor moved forward
    pub fn completed(&self) -> bool {
        matches!(self, CycleOutcome::Success | CycleOutcome::Degraded)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
    /// Donations first seen in this cycle
    pub new_donations: Vec<DonationRecord>,
    pub progress: ScanProgress,
    pub duration_ms: u64,
}

impl CycleReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: CycleOutcome::Skipped(reason),
            from_block: None,
            to_block: None,
            new_donations: Vec::new(),
            progress: ScanProgress::default(),
            duration_ms: 0,
        }
    }
}

enum ScanPass {
    Completed {
        from: u64,
        to: u64,
        new_donations: Vec<DonationRecord>,
    },
    Cancelled {
        from: u64,
        to: u64,
    },
}

/// Clears the running flag however the cycle ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Assembles an [`AnnouncementScanner`] from its collaborators
pub struct ScannerBuilder {
    config: ScannerConfig,
    transport: Option<Arc<dyn RpcTransport>>,
    scheme: Option<Arc<dyn StealthScheme>>,
    key_vault: Option<Arc<dyn KeyVault>>,
    state_store: Option<Arc<dyn StateStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl ScannerBuilder {
    pub fn new(config: ScannerConfig) -> Self {
        Self {
            config,
            transport: None,
            scheme: None,
            key_vault: None,
            state_store: None,
            notifier: None,
        }
    }

    /// Defaults to [`HttpTransport`]
    pub fn transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Defaults to [`DksapScheme`]
    pub fn scheme(mut self, scheme: Arc<dyn StealthScheme>) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn key_vault(mut self, vault: Arc<dyn KeyVault>) -> Self {
        self.key_vault = Some(vault);
        self
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state_store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> Result<AnnouncementScanner> {
        self.config.validate()?;
        let key_vault = self
            .key_vault
            .ok_or_else(|| ScanError::Config("a key vault is required".into()))?;
        let store = self
            .state_store
            .ok_or_else(|| ScanError::Config("a state store is required".into()))?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new().map_err(|e| ScanError::Config(e.to_string()))?),
        };

        let registry = ProviderRegistry::new(&self.config.providers, &self.config.health);
        Ok(AnnouncementScanner {
            executor: RetryExecutor::new(transport, registry, self.config.retry.clone()),
            scheme: self.scheme.unwrap_or_else(|| Arc::new(DksapScheme)),
            key_vault,
            store,
            notifier: self.notifier,
            breaker: Mutex::new(CircuitBreaker::new(&self.config.breaker)),
            metrics: Mutex::new(ScanMetrics::default()),
            cursor: AtomicU64::new(0),
            progress: ProgressHandle::default(),
            running: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
            config: self.config,
        })
    }
}

pub struct AnnouncementScanner {
    config: ScannerConfig,
    executor: RetryExecutor,
    scheme: Arc<dyn StealthScheme>,
    key_vault: Arc<dyn KeyVault>,
    store: Arc<dyn StateStore>,
    notifier: Option<Arc<dyn Notifier>>,
    breaker: Mutex<CircuitBreaker>,
    metrics: Mutex<ScanMetrics>,
    cursor: AtomicU64,
    progress: ProgressHandle,
    running: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl AnnouncementScanner {
    pub fn builder(config: ScannerConfig) -> ScannerBuilder {
        ScannerBuilder::new(config)
    }

    fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn metrics_guard(&self) -> MutexGuard<'_, ScanMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load cursor, metrics, provider health and breaker state from the store
    pub async fn initialize(&self) -> Result<()> {
        let cursor = self.reload_state().await?;
        info!(
            cursor,
            providers = self.config.providers.len(),
            "announcement scanner initialized"
        );
        Ok(())
    }

    /// Adopt whatever the store currently holds for the cursor, metrics,
    /// provider health and breaker, returning the cursor.
    ///
    /// Long-running hosts call this between cycles to pick up changes
    /// another process made to the store, such as a breaker reset.
    pub async fn reload_state(&self) -> Result<u64> {
        let cursor = self.store.load_cursor().await?;
        self.cursor.store(cursor, Ordering::Release);

        if let Some(metrics) = self.store.load_metrics().await? {
            *self.metrics_guard() = metrics;
        }

        let health = self.store.load_provider_health().await?;
        if !health.is_empty() {
            self.executor.restore_provider_health(&health);
        }

        if let Some(status) = self.store.load_breaker_status().await? {
            self.breaker().restore(&status);
        }
        Ok(cursor)
    }

    /// Run one scan cycle now
    pub async fn trigger_now(&self) -> CycleReport {
        self.run_cycle().await
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            info!("scan already in progress, trigger dropped");
            return CycleReport::skipped(SkipReason::AlreadyRunning);
        };

        if !self.breaker().allow_scan() {
            warn!("circuit breaker is open, skipping scan");
            return CycleReport::skipped(SkipReason::CircuitOpen);
        }

        let Some(keys) = self.key_vault.active_key_material().await else {
            info!("no active key material, skipping scan");
            return CycleReport::skipped(SkipReason::NoKeyMaterial);
        };

        let cancel = CancellationToken::new();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = cancel.clone();

        let started = Instant::now();
        self.progress.replace(ScanProgress::started());
        let result = self.scan(&keys, &cancel).await;
        drop(keys);

        let duration_ms = started.elapsed().as_millis() as u64;
        self.progress.update(|p| p.is_active = false);
        let progress = self.progress.snapshot();

        let mut report = CycleReport {
            outcome: CycleOutcome::Success,
            from_block: None,
            to_block: None,
            new_donations: Vec::new(),
            progress: progress.clone(),
            duration_ms,
        };

        match result {
            Ok(ScanPass::Completed {
                from,
                to,
                new_donations,
            }) => {
                self.breaker().record_success();
                self.metrics_guard()
                    .record_success(duration_ms, &progress, new_donations.len() as u64);

                report.outcome = if progress.error_count > 0 {
                    CycleOutcome::Degraded
                } else {
                    CycleOutcome::Success
                };
                report.from_block = Some(from);
                report.to_block = Some(to);
                info!(
                    from,
                    to,
                    duration_ms,
                    announcements = progress.announcements_found,
                    new_donations = new_donations.len(),
                    errors = progress.error_count,
                    "scan cycle completed"
                );

                if !new_donations.is_empty() {
                    self.spawn_notification(new_donations.clone());
                }
                report.new_donations = new_donations;
            }
            Ok(ScanPass::Cancelled { from, to }) => {
                info!(from, to, "scan cycle cancelled, cursor unchanged");
                report.outcome = CycleOutcome::Cancelled;
                report.from_block = Some(from);
                report.to_block = Some(to);
            }
            Err(err) => {
                error!(error = %err, duration_ms, "scan cycle failed");
                self.breaker().record_failure();
                self.metrics_guard().record_failure(&progress);
                report.outcome = CycleOutcome::Failed(err.to_string());
            }
        }

        self.metrics_guard().absorb_rpc(self.executor.take_stats());
        self.persist_bookkeeping().await;
        report
    }

    async fn scan(&self, keys: &KeyMaterial, cancel: &CancellationToken) -> Result<ScanPass> {
        let head = self.executor.chain_head().await?;
        let cursor = self.cursor.load(Ordering::Acquire);
        let from = if cursor == 0 {
            head.saturating_sub(self.config.max_lookback)
        } else {
            cursor.saturating_sub(self.config.rescan_window)
        };
        let total_blocks = if from <= head { head - from + 1 } else { 0 };

        self.progress.update(|p| {
            p.current_block = head;
            p.total_blocks = total_blocks;
        });
        info!(from, to = head, total_blocks, "scanning for announcements");

        let fetched = LogFetcher::new(
            &self.executor,
            self.config.blocks_per_request,
            self.config.fetch_concurrency,
        )
        .fetch_range(from, head, &self.progress, cancel)
        .await;
        if fetched.cancelled {
            return Ok(ScanPass::Cancelled { from, to: head });
        }

        let matched = StealthMatcher::new(&self.executor, self.scheme.as_ref(), self.config.match_batch_size)
            .match_batch(&fetched.announcements, keys, &self.progress, cancel)
            .await;
        if matched.cancelled || cancel.is_cancelled() {
            return Ok(ScanPass::Cancelled { from, to: head });
        }

        let mut new_donations = Vec::new();
        for record in matched.donations {
            if self.store.upsert_donation(&record).await? {
                new_donations.push(record);
            }
        }

        let next = cursor.max(head);
        self.store.save_cursor(next).await?;
        self.cursor.store(next, Ordering::Release);

        Ok(ScanPass::Completed {
            from,
            to: head,
            new_donations,
        })
    }

    fn spawn_notification(&self, donations: Vec<DonationRecord>) {
        if let Some(notifier) = &self.notifier {
            let notifier = Arc::clone(notifier);
            tokio::spawn(async move {
                notifier.notify(donations).await;
            });
        }
    }

    /// Metrics, provider health and breaker state; failures are only logged
    async fn persist_bookkeeping(&self) {
        let metrics = self.metrics();
        if let Err(err) = self.store.save_metrics(&metrics).await {
            warn!(error = %err, "failed to save scan metrics");
        }
        if let Err(err) = self.store.save_provider_health(&self.executor.provider_health()).await {
            warn!(error = %err, "failed to save provider health");
        }
        let status = self.circuit_breaker_status();
        if let Err(err) = self.store.save_breaker_status(&status).await {
            warn!(error = %err, "failed to save circuit breaker state");
        }
    }

    pub fn progress(&self) -> ScanProgress {
        self.progress.snapshot()
    }

    pub fn metrics(&self) -> ScanMetrics {
        self.metrics_guard().clone()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn circuit_breaker_status(&self) -> CircuitBreakerStatus {
        self.breaker().status()
    }

    pub async fn reset_circuit_breaker(&self) {
        self.breaker().reset();
        let status = self.circuit_breaker_status();
        if let Err(err) = self.store.save_breaker_status(&status).await {
            warn!(error = %err, "failed to save circuit breaker state");
        }
    }

    pub fn provider_health(&self) -> Vec<ProviderHealth> {
        self.executor.provider_health()
    }

    pub async fn refresh_provider_health(&self) {
        self.executor.refresh_providers();
        if let Err(err) = self.store.save_provider_health(&self.executor.provider_health()).await {
            warn!(error = %err, "failed to save provider health");
        }
    }

    /// Move the cursor, backwards included. Takes effect on the next cycle.
    pub async fn reset_cursor(&self, block: u64) -> Result<()> {
        self.store.save_cursor(block).await?;
        self.cursor.store(block, Ordering::Release);
        info!(block, "scan cursor reset");
        Ok(())
    }

    /// Cancel the cycle in flight, if any
    pub fn shutdown(&self) {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).cancel();
        info!("announcement scanner shutting down");
    }
}
