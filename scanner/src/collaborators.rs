//! Interfaces the host supplies to the scanner

use async_trait::async_trait;
use zeroize::Zeroize;

use crate::circuit_breaker::CircuitBreakerStatus;
use crate::donation::DonationRecord;
use crate::error::StoreError;
use crate::health::ProviderHealth;
use crate::metrics::ScanMetrics;

/// Unlocked stealth keys for one cycle. Wiped on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct KeyMaterial {
    spending_key: [u8; 32],
    viewing_key: [u8; 32],
}

impl KeyMaterial {
    pub fn new(spending_key: [u8; 32], viewing_key: [u8; 32]) -> Self {
        Self {
            spending_key,
            viewing_key,
        }
    }

    pub fn spending_key(&self) -> &[u8; 32] {
        &self.spending_key
    }

    pub fn viewing_key(&self) -> &[u8; 32] {
        &self.viewing_key
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").finish_non_exhaustive()
    }
}

/// Source of the operator's keys. `None` means locked or not set up.
#[async_trait]
pub trait KeyVault: Send + Sync {
    async fn active_key_material(&self) -> Option<KeyMaterial>;
}

/// Durable scanner state.
///
/// `upsert_donation` returns `true` only when the record was not already
/// stored; the scanner relies on this to report each donation once.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load_cursor(&self) -> Result<u64, StoreError>;
    async fn save_cursor(&self, block: u64) -> Result<(), StoreError>;

    async fn upsert_donation(&self, record: &DonationRecord) -> Result<bool, StoreError>;
    async fn list_donations(&self) -> Result<Vec<DonationRecord>, StoreError>;

    async fn load_metrics(&self) -> Result<Option<ScanMetrics>, StoreError>;
    async fn save_metrics(&self, metrics: &ScanMetrics) -> Result<(), StoreError>;

    async fn load_provider_health(&self) -> Result<Vec<ProviderHealth>, StoreError> {
        Ok(Vec::new())
    }

    async fn save_provider_health(&self, _health: &[ProviderHealth]) -> Result<(), StoreError> {
        Ok(())
    }

    async fn load_breaker_status(&self) -> Result<Option<CircuitBreakerStatus>, StoreError> {
        Ok(None)
    }

    async fn save_breaker_status(&self, _status: &CircuitBreakerStatus) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Receives newly found donations after a successful cycle
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, donations: Vec<DonationRecord>);
}
