//! Per-cycle progress and cumulative scan metrics

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live view of the cycle in flight; discarded when the cycle ends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub is_active: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub current_block: u64,
    pub blocks_processed: u64,
    pub total_blocks: u64,
    pub announcements_found: u64,
    pub donations_found: u64,
    /// Sum of the three failure counters below
    pub error_count: u64,
    pub subrange_failures: u64,
    pub decode_failures: u64,
    pub match_failures: u64,
}

impl ScanProgress {
    pub fn started() -> Self {
        Self {
            is_active: true,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn record_subrange_failure(&mut self) {
        self.subrange_failures += 1;
        self.error_count += 1;
    }

    pub fn record_decode_failures(&mut self, count: u64) {
        self.decode_failures += count;
        self.error_count += count;
    }

    pub fn record_match_failures(&mut self, count: u64) {
        self.match_failures += count;
        self.error_count += count;
    }
}

/// Shared handle so operators can read progress while a cycle runs
#[derive(Debug, Clone, Default)]
pub struct ProgressHandle(Arc<Mutex<ScanProgress>>);

impl ProgressHandle {
    pub fn update(&self, f: impl FnOnce(&mut ScanProgress)) {
        f(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }

    pub fn snapshot(&self) -> ScanProgress {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, progress: ScanProgress) {
        self.update(|p| *p = progress);
    }
}

/// Cumulative metrics, persisted after every cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanMetrics {
    pub total_scans: u64,
    pub successful_scans: u64,
    /// Subset of `successful_scans` that skipped some sub-ranges or items
    pub degraded_scans: u64,
    pub failed_scans: u64,
    pub average_scan_ms: f64,
    pub last_scan_ms: u64,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub total_blocks_scanned: u64,
    pub total_donations_found: u64,
    pub rpc_calls: u64,
    pub rpc_failures: u64,
    pub average_rpc_response_ms: f64,
    pub subrange_failures: u64,
    pub decode_failures: u64,
    pub match_failures: u64,
}

/// RPC counters accumulated by the executor during one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RpcStats {
    pub calls: u64,
    pub failures: u64,
    pub average_response_ms: Option<f64>,
}

impl ScanMetrics {
    pub fn record_success(&mut self, duration_ms: u64, progress: &ScanProgress, new_donations: u64) {
        self.total_scans += 1;
        self.successful_scans += 1;
        if progress.error_count > 0 {
            self.degraded_scans += 1;
        }
        self.average_scan_ms = rolling(self.average_scan_ms, duration_ms as f64, self.successful_scans);
        self.last_scan_ms = duration_ms;
        self.last_scan_at = Some(Utc::now());
        self.total_blocks_scanned += progress.blocks_processed;
        self.total_donations_found += new_donations;
        self.absorb_failures(progress);
    }

    pub fn record_failure(&mut self, progress: &ScanProgress) {
        self.total_scans += 1;
        self.failed_scans += 1;
        self.last_scan_at = Some(Utc::now());
        self.absorb_failures(progress);
    }

    pub fn absorb_rpc(&mut self, stats: RpcStats) {
        self.rpc_calls += stats.calls;
        self.rpc_failures += stats.failures;
        if let Some(avg) = stats.average_response_ms {
            self.average_rpc_response_ms = rolling(self.average_rpc_response_ms, avg, self.rpc_calls);
        }
    }

    fn absorb_failures(&mut self, progress: &ScanProgress) {
        self.subrange_failures += progress.subrange_failures;
        self.decode_failures += progress.decode_failures;
        self.match_failures += progress.match_failures;
    }
}

/// `(old + new) / 2`, seeded with the first sample
fn rolling(old: f64, sample: f64, count: u64) -> f64 {
    if count <= 1 || old == 0.0 {
        sample
    } else {
        (old + sample) / 2.0
    }
}
