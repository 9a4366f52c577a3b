//! Stealth matcher
//!
//! Announcements are checked in fixed-size batches. Items inside a batch run
//! concurrently; the next batch starts only once the current one is done.

use alloy_primitives::Address;
use futures::future::join_all;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::announcement::Announcement;
use crate::collaborators::KeyMaterial;
use crate::crypto::StealthScheme;
use crate::donation::DonationRecord;
use crate::error::MatchError;
use crate::executor::RetryExecutor;
use crate::metrics::ProgressHandle;

#[derive(Debug, Default)]
pub struct MatchReport {
    pub donations: Vec<DonationRecord>,
    /// Announcements addressed to us, funded or not
    pub matched: u64,
    pub failures: u64,
    pub cancelled: bool,
}

pub struct StealthMatcher<'a> {
    executor: &'a RetryExecutor,
    scheme: &'a dyn StealthScheme,
    batch_size: usize,
}

enum ItemOutcome {
    Foreign,
    Unfunded,
    Donation(DonationRecord),
}

impl<'a> StealthMatcher<'a> {
    pub fn new(executor: &'a RetryExecutor, scheme: &'a dyn StealthScheme, batch_size: usize) -> Self {
        Self {
            executor,
            scheme,
            batch_size: batch_size.max(1),
        }
    }

    /// Find the announcements paying us and look up their balances
    pub async fn match_batch(
        &self,
        announcements: &[Announcement],
        keys: &KeyMaterial,
        progress: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> MatchReport {
        let mut report = MatchReport::default();

        for batch in announcements.chunks(self.batch_size) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcomes = join_all(batch.iter().map(|ann| self.match_one(ann, keys))).await;

            let mut failures = 0;
            for (ann, outcome) in batch.iter().zip(outcomes) {
                match outcome {
                    Ok(ItemOutcome::Foreign) => {}
                    Ok(ItemOutcome::Unfunded) => report.matched += 1,
                    Ok(ItemOutcome::Donation(record)) => {
                        report.matched += 1;
                        info!(
                            block = record.block_number,
                            address = %record.stealth_address,
                            amount = %record.amount,
                            "donation found"
                        );
                        report.donations.push(record);
                    }
                    Err(err) => {
                        warn!(tx = %ann.tx_hash, error = %err, "failed to check announcement");
                        failures += 1;
                    }
                }
            }

            report.failures += failures;
            let found = report.donations.len() as u64;
            progress.update(|p| {
                p.donations_found = found;
                p.record_match_failures(failures);
            });
        }

        report
    }

    async fn match_one(&self, ann: &Announcement, keys: &KeyMaterial) -> Result<ItemOutcome, MatchError> {
        if !self.scheme.view_tag_matches(keys, ann)? {
            return Ok(ItemOutcome::Foreign);
        }

        let derived = self.scheme.derive_recipient(keys, ann)?;
        if !addresses_equal(&derived, &ann.stealth_address) {
            return Ok(ItemOutcome::Foreign);
        }

        let balance = self
            .executor
            .get_balance(derived)
            .await
            .map_err(|e| MatchError::Balance(e.to_string()))?;
        if balance.is_zero() {
            debug!(address = %derived, "stealth address already empty");
            return Ok(ItemOutcome::Unfunded);
        }

        Ok(ItemOutcome::Donation(DonationRecord::from_announcement(ann, derived, balance)))
    }
}

fn addresses_equal(a: &Address, b: &Address) -> bool {
    bool::from(a.as_slice().ct_eq(b.as_slice()))
}
