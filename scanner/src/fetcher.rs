//! Chunked announcement log fetcher
//!
//! A block range is split into sub-ranges of at most `blocks_per_request`
//! blocks. A sub-range whose fetch exhausts every provider is skipped and
//! counted; the rest of the range is still scanned.

use std::ops::RangeInclusive;

use alloy_primitives::B256;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::announcement::{announcement_topic, Announcement};
use crate::executor::RetryExecutor;
use crate::metrics::ProgressHandle;

/// Split `[from, to]` into consecutive inclusive chunks
pub fn split_range(from: u64, to: u64, blocks_per_request: u64) -> Vec<RangeInclusive<u64>> {
    let step = blocks_per_request.max(1);
    let mut ranges = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(step - 1).min(to);
        ranges.push(start..=end);
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// What one `fetch_range` call produced
#[derive(Debug, Default)]
pub struct FetchReport {
    pub announcements: Vec<Announcement>,
    pub subranges: usize,
    pub failed_ranges: Vec<RangeInclusive<u64>>,
    pub decode_failures: u64,
    pub blocks_fetched: u64,
    pub cancelled: bool,
}

enum SubRange {
    Fetched {
        range: RangeInclusive<u64>,
        announcements: Vec<Announcement>,
        decode_failures: u64,
    },
    Failed(RangeInclusive<u64>),
    Cancelled,
}

pub struct LogFetcher<'a> {
    executor: &'a RetryExecutor,
    blocks_per_request: u64,
    concurrency: usize,
    topic: B256,
}

impl<'a> LogFetcher<'a> {
    pub fn new(executor: &'a RetryExecutor, blocks_per_request: u64, concurrency: usize) -> Self {
        Self {
            executor,
            blocks_per_request,
            concurrency: concurrency.max(1),
            topic: announcement_topic(),
        }
    }

    /// Fetch and decode every announcement in `[from, to]`.
    ///
    /// Sub-ranges run with bounded parallelism but are folded back in block
    /// order. The token is checked before each sub-range starts.
    pub async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        progress: &ProgressHandle,
        cancel: &CancellationToken,
    ) -> FetchReport {
        let ranges = split_range(from, to, self.blocks_per_request);
        let mut report = FetchReport {
            subranges: ranges.len(),
            ..FetchReport::default()
        };

        let mut outcomes = stream::iter(ranges)
            .map(|range| self.fetch_subrange(range, cancel))
            .buffered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                SubRange::Fetched {
                    range,
                    announcements,
                    decode_failures,
                } => {
                    let blocks = range.end() - range.start() + 1;
                    report.blocks_fetched += blocks;
                    report.decode_failures += decode_failures;
                    report.announcements.extend(announcements);
                    let found = report.announcements.len() as u64;
                    progress.update(|p| {
                        p.blocks_processed += blocks;
                        p.announcements_found = found;
                        p.record_decode_failures(decode_failures);
                    });
                }
                SubRange::Failed(range) => {
                    report.failed_ranges.push(range);
                    progress.update(|p| p.record_subrange_failure());
                }
                SubRange::Cancelled => report.cancelled = true,
            }
        }

        report
    }

    async fn fetch_subrange(&self, range: RangeInclusive<u64>, cancel: &CancellationToken) -> SubRange {
        if cancel.is_cancelled() {
            return SubRange::Cancelled;
        }

        let (start, end) = (*range.start(), *range.end());
        let logs = match self.executor.get_logs(start, end, self.topic).await {
            Ok(logs) => logs,
            Err(err) => {
                error!(from = start, to = end, error = %err, "failed to fetch logs, skipping sub-range");
                return SubRange::Failed(range);
            }
        };

        let mut announcements = Vec::with_capacity(logs.len());
        let mut decode_failures = 0;
        for log in &logs {
            match Announcement::from_log(log) {
                Ok(announcement) => announcements.push(announcement),
                Err(err) => {
                    warn!(tx = %log.transaction_hash, error = %err, "failed to parse announcement log");
                    decode_failures += 1;
                }
            }
        }
        debug!(from = start, to = end, found = announcements.len(), "sub-range fetched");

        SubRange::Fetched {
            range,
            announcements,
            decode_failures,
        }
    }
}
