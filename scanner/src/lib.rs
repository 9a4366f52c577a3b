//! Resilient stealth announcement scanner
//!
//! Periodically pulls stealth-payment announcements from an EVM chain over
//! JSON-RPC, finds the ones addressed to the operator's keys and records
//! every funded one as a donation.
//!
//! Network access goes through a retry/failover executor over a pool of
//! providers; whole cycles are guarded by a circuit breaker. Keys, storage,
//! notifications and the stealth scheme itself are supplied by the host.

pub mod announcement;
pub mod circuit_breaker;
pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod donation;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod health;
pub mod matcher;
pub mod metrics;
pub mod rpc;
pub mod scanner;
pub mod store;

#[cfg(test)]
mod test_support;


#[cfg(test)]
mod fuzz_tests;

pub use announcement::Announcement;
pub use circuit_breaker::{BreakerState, CircuitBreakerStatus};
pub use collaborators::{KeyMaterial, KeyVault, Notifier, StateStore};
pub use config::{Network, ProviderConfig, ScannerConfig};
pub use crypto::{DksapScheme, StealthKeys, StealthScheme};
pub use donation::DonationRecord;
pub use error::{DecodeError, MatchError, Result, RpcError, ScanError, StoreError};
pub use health::ProviderHealth;
pub use metrics::{ScanMetrics, ScanProgress};
pub use scanner::{AnnouncementScanner, CycleOutcome, CycleReport, ScannerBuilder, SkipReason};
pub use store::{MemoryStore, StaticKeyVault};
