//! Windowed log fetching
//!
//! Providers cap the block range of a single `eth_getLogs` call, so long
//! ranges are split into fixed-size inclusive windows. Each window is
//! retried with exponential backoff; windows that still fail are reported
//! so the caller can decide how far its watermark may advance.

use crate::rpc::{ChainReader, LogFilter};
use crate::types::Log;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use backon::{ExponentialBuilder, Retryable};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

/// Default window size in blocks.
pub const DEFAULT_WINDOW_BLOCKS: u64 = 50_000;

/// Retry policy for a single window fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.attempts.saturating_sub(1))
    }
}

/// Split `[from, to]` into inclusive windows of at most `size` blocks.
pub fn block_windows(from: u64, to: u64, size: u64) -> Vec<(u64, u64)> {
    let size = size.max(1);
    let mut windows = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(size - 1).min(to);
        windows.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    windows
}

/// A window that failed after all retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowFailure {
    pub from: u64,
    pub to: u64,
    pub error: String,
}

/// Outcome of a windowed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Every window succeeded.
    Complete,
    /// Some windows failed.
    Partial,
    /// Every window failed.
    Failed,
}

/// Logs gathered from the windows that succeeded, plus the ones that did not.
#[derive(Debug, Default)]
pub struct FetchReport {
    pub logs: Vec<Log>,
    pub windows: usize,
    pub failures: Vec<WindowFailure>,
}

impl FetchReport {
    pub fn status(&self) -> FetchStatus {
        if self.failures.is_empty() {
            FetchStatus::Complete
        } else if self.failures.len() < self.windows {
            FetchStatus::Partial
        } else {
            FetchStatus::Failed
        }
    }

    /// How far a watermark may move after this fetch.
    ///
    /// `target` when every window succeeded, else the start of the earliest
    /// failed window so that range is fetched again next time.
    pub fn advance_to(&self, target: u64) -> u64 {
        advance_target(&self.failures, target)
    }
}

/// `target`, held back to the start of the earliest failed window if any.
pub fn advance_target(failures: &[WindowFailure], target: u64) -> u64 {
    failures
        .iter()
        .map(|f| f.from)
        .min()
        .map_or(target, |from| from.min(target))
}

/// Fetch logs for `address` matching any of `topics` over `[from, to]`.
///
/// A window counts as failed if any of its topic queries fails after
/// retrying; none of that window's logs are returned.
pub async fn fetch_logs(
    reader: &dyn ChainReader,
    retry: &RetryPolicy,
    address: Address,
    topics: &[B256],
    from: u64,
    to: u64,
    window_size: u64,
) -> FetchReport {
    let mut report = FetchReport::default();

    for (start, end) in block_windows(from, to, window_size) {
        report.windows += 1;

        let queries = topics.iter().map(|topic0| {
            let filter = LogFilter {
                address,
                topic0: *topic0,
                from_block: start,
                to_block: end,
            };
            fetch_window(reader, retry, filter)
        });
        let results = join_all(queries).await;

        let mut window_logs = Vec::new();
        let mut window_error = None;
        for result in results {
            match result {
                Ok(logs) => window_logs.extend(logs),
                Err(e) => {
                    window_error.get_or_insert(e);
                }
            }
        }

        match window_error {
            None => {
                debug!(
                    "Fetched {} logs for {:?} in blocks {}..={}",
                    window_logs.len(),
                    address,
                    start,
                    end
                );
                report.logs.extend(window_logs);
            }
            Some(e) => {
                warn!(
                    "Giving up on blocks {}..={} for {:?} after {} attempts: {:#}",
                    start, end, address, retry.attempts, e
                );
                report.failures.push(WindowFailure {
                    from: start,
                    to: end,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    report
}

async fn fetch_window(
    reader: &dyn ChainReader,
    retry: &RetryPolicy,
    filter: LogFilter,
) -> Result<Vec<Log>> {
    let filter = &filter;
    let fetch = move || async move { reader.get_logs(filter).await };
    fetch
        .retry(retry.backoff())
        .notify(|err: &anyhow::Error, delay: Duration| {
            warn!(
                "eth_getLogs for {:?} blocks {}..={} failed, retrying in {:?}: {:#}",
                filter.address, filter.from_block, filter.to_block, delay, err
            );
        })
        .await
}
