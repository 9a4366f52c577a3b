//! Scanner state persisted as a single JSON file
//!
//! Every write replaces the whole file through a temporary sibling and a
//! rename, so a crash mid-write leaves the previous state intact. Several
//! processes may share one file (`watch` alongside `reset-breaker`), so
//! each operation re-reads the file under an advisory lock and only
//! touches the field it owns.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use stealth_scanner::{
    CircuitBreakerStatus, DonationRecord, ProviderHealth, ScanMetrics, StateStore, StoreError,
};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StateFile {
    cursor: u64,
    donations: BTreeMap<String, DonationRecord>,
    metrics: Option<ScanMetrics>,
    provider_health: Vec<ProviderHealth>,
    breaker: Option<CircuitBreakerStatus>,
}

pub struct JsonStateStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Held advisory lock; released when the file handle drops
struct FileLock(File);

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl JsonStateStore {
    /// Open the state file, starting empty if it does not exist yet
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let store = Self {
            lock_path: path.with_extension("json.lock"),
            path,
        };
        // Surface a corrupt file at startup rather than on the first scan
        store.snapshot()?;
        Ok(store)
    }

    fn acquire(&self, exclusive: bool) -> Result<FileLock, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        if exclusive {
            file.lock_exclusive()?;
        } else {
            file.lock_shared()?;
        }
        Ok(FileLock(file))
    }

    fn load(path: &Path) -> Result<StateFile, StoreError> {
        if !path.exists() {
            return Ok(StateFile::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Current on-disk state
    fn snapshot(&self) -> Result<StateFile, StoreError> {
        let _guard = self.acquire(false)?;
        Self::load(&self.path)
    }

    /// Re-read under an exclusive lock, apply `f` and write the result back
    fn update<T>(&self, f: impl FnOnce(&mut StateFile) -> T) -> Result<T, StoreError> {
        let _guard = self.acquire(true)?;
        let mut state = Self::load(&self.path)?;
        let out = f(&mut state);
        self.persist(&state)?;
        Ok(out)
    }

    fn persist(&self, state: &StateFile) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "state file written");
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load_cursor(&self) -> Result<u64, StoreError> {
        Ok(self.snapshot()?.cursor)
    }

    async fn save_cursor(&self, block: u64) -> Result<(), StoreError> {
        self.update(|state| state.cursor = block)
    }

    async fn upsert_donation(&self, record: &DonationRecord) -> Result<bool, StoreError> {
        if self.snapshot()?.donations.contains_key(&record.id) {
            return Ok(false);
        }
        self.update(|state| {
            if state.donations.contains_key(&record.id) {
                return false;
            }
            state.donations.insert(record.id.clone(), record.clone());
            true
        })
    }

    async fn list_donations(&self) -> Result<Vec<DonationRecord>, StoreError> {
        let mut donations: Vec<_> = self.snapshot()?.donations.into_values().collect();
        donations.sort_by_key(|d| d.block_number);
        Ok(donations)
    }

    async fn load_metrics(&self) -> Result<Option<ScanMetrics>, StoreError> {
        Ok(self.snapshot()?.metrics)
    }

    async fn save_metrics(&self, metrics: &ScanMetrics) -> Result<(), StoreError> {
        self.update(|state| state.metrics = Some(metrics.clone()))
    }

    async fn load_provider_health(&self) -> Result<Vec<ProviderHealth>, StoreError> {
        Ok(self.snapshot()?.provider_health)
    }

    async fn save_provider_health(&self, health: &[ProviderHealth]) -> Result<(), StoreError> {
        self.update(|state| state.provider_health = health.to_vec())
    }

    async fn load_breaker_status(&self) -> Result<Option<CircuitBreakerStatus>, StoreError> {
        Ok(self.snapshot()?.breaker)
    }

    async fn save_breaker_status(&self, status: &CircuitBreakerStatus) -> Result<(), StoreError> {
        self.update(|state| state.breaker = Some(status.clone()))
    }
}
