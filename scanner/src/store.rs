//! In-memory collaborators for embedding and tests

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::circuit_breaker::CircuitBreakerStatus;
use crate::collaborators::{KeyMaterial, KeyVault, StateStore};
use crate::donation::DonationRecord;
use crate::error::StoreError;
use crate::health::ProviderHealth;
use crate::metrics::ScanMetrics;

#[derive(Debug, Default)]
struct MemoryState {
    cursor: u64,
    donations: BTreeMap<String, DonationRecord>,
    metrics: Option<ScanMetrics>,
    provider_health: Vec<ProviderHealth>,
    breaker: Option<CircuitBreakerStatus>,
}

/// `StateStore` that keeps everything in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: u64) -> Self {
        let store = Self::default();
        store.lock().cursor = cursor;
        store
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cursor(&self) -> u64 {
        self.lock().cursor
    }

    pub fn donations(&self) -> Vec<DonationRecord> {
        self.lock().donations.values().cloned().collect()
    }

    pub fn metrics(&self) -> Option<ScanMetrics> {
        self.lock().metrics.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn load_cursor(&self) -> Result<u64, StoreError> {
        Ok(self.lock().cursor)
    }

    async fn save_cursor(&self, block: u64) -> Result<(), StoreError> {
        self.lock().cursor = block;
        Ok(())
    }

    async fn upsert_donation(&self, record: &DonationRecord) -> Result<bool, StoreError> {
        let mut state = self.lock();
        if state.donations.contains_key(&record.id) {
            return Ok(false);
        }
        state.donations.insert(record.id.clone(), record.clone());
        Ok(true)
    }

    async fn list_donations(&self) -> Result<Vec<DonationRecord>, StoreError> {
        Ok(self.donations())
    }

    async fn load_metrics(&self) -> Result<Option<ScanMetrics>, StoreError> {
        Ok(self.lock().metrics.clone())
    }

    async fn save_metrics(&self, metrics: &ScanMetrics) -> Result<(), StoreError> {
        self.lock().metrics = Some(metrics.clone());
        Ok(())
    }

    async fn load_provider_health(&self) -> Result<Vec<ProviderHealth>, StoreError> {
        Ok(self.lock().provider_health.clone())
    }

    async fn save_provider_health(&self, health: &[ProviderHealth]) -> Result<(), StoreError> {
        self.lock().provider_health = health.to_vec();
        Ok(())
    }

    async fn load_breaker_status(&self) -> Result<Option<CircuitBreakerStatus>, StoreError> {
        Ok(self.lock().breaker.clone())
    }

    async fn save_breaker_status(&self, status: &CircuitBreakerStatus) -> Result<(), StoreError> {
        self.lock().breaker = Some(status.clone());
        Ok(())
    }
}

/// Key vault holding already-unlocked material, or nothing
#[derive(Debug, Default)]
pub struct StaticKeyVault {
    material: Mutex<Option<KeyMaterial>>,
}

impl StaticKeyVault {
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            material: Mutex::new(Some(material)),
        }
    }

    pub fn locked() -> Self {
        Self::default()
    }

    pub fn lock(&self) {
        *self.material.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn unlock(&self, material: KeyMaterial) {
        *self.material.lock().unwrap_or_else(PoisonError::into_inner) = Some(material);
    }
}

#[async_trait]
impl KeyVault for StaticKeyVault {
    async fn active_key_material(&self) -> Option<KeyMaterial> {
        self.material.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256, U256};
    use chrono::Utc;

    fn record(tx: u8) -> DonationRecord {
        DonationRecord {
            id: DonationRecord::id_for(&B256::repeat_byte(tx), &Address::repeat_byte(1)),
            stealth_address: Address::repeat_byte(1),
            amount: U256::from(5u64),
            token: None,
            block_number: 10,
            tx_hash: B256::repeat_byte(tx),
            timestamp: Utc::now(),
            swept: false,
            memo: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.upsert_donation(&record(1)).await.unwrap());
        assert!(!store.upsert_donation(&record(1)).await.unwrap());
        assert!(store.upsert_donation(&record(2)).await.unwrap());
        assert_eq!(store.list_donations().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_vault_lock_unlock() {
        let vault = StaticKeyVault::locked();
        assert!(vault.active_key_material().await.is_none());

        vault.unlock(KeyMaterial::new([1; 32], [2; 32]));
        let material = vault.active_key_material().await.unwrap();
        assert_eq!(material.viewing_key(), &[2; 32]);

        vault.lock();
        assert!(vault.active_key_material().await.is_none());
    }
}
