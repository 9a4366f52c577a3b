//! Donation records handed to the state store

use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::announcement::Announcement;

/// A detected payment to one of our stealth addresses.
///
/// `id` is derived from the transaction hash and stealth address, so
/// re-scanning a range yields the same id and the store upsert dedups it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecord {
    pub id: String,
    pub stealth_address: Address,
    /// Balance observed at detection time, in wei
    pub amount: U256,
    /// `None` for the native coin
    pub token: Option<Address>,
    pub block_number: u64,
    pub tx_hash: B256,
    pub timestamp: DateTime<Utc>,
    pub swept: bool,
    pub memo: String,
}

impl DonationRecord {
    pub fn id_for(tx_hash: &B256, stealth_address: &Address) -> String {
        format!("0x{}-0x{}", hex::encode(tx_hash), hex::encode(stealth_address))
    }

    pub fn from_announcement(announcement: &Announcement, recipient: Address, amount: U256) -> Self {
        Self {
            id: Self::id_for(&announcement.tx_hash, &announcement.stealth_address),
            stealth_address: recipient,
            amount,
            token: None,
            block_number: announcement.block_number,
            tx_hash: announcement.tx_hash,
            timestamp: Utc::now(),
            swept: false,
            memo: format!("Donation received at block {}", announcement.block_number),
        }
    }
}

/// Format a wei amount as whole units with 6 decimals
pub fn format_units(amount: U256) -> String {
    let unit = U256::from(1_000_000_000_000_000_000u128);
    let whole = amount / unit;
    let micro = u64::try_from((amount % unit) / U256::from(1_000_000_000_000u64)).unwrap_or(0);
    format!("{whole}.{micro:06}")
}
