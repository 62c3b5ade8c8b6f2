//! Per-instance indexer
//!
//! Advances one payroll instance from its watermark to the confirmed head:
//! fetch every tracked event kind in windows, merge them into chain order,
//! then decode, enrich and apply each log.

use crate::apply::{apply_event, enrich_event, unix_now, Applied, EventContext};
use crate::events::{decode_log, EventKind};
use crate::fetch::{fetch_logs, FetchReport, FetchStatus, RetryPolicy, DEFAULT_WINDOW_BLOCKS};
use crate::records::TrackedInstance;
use crate::rpc::ChainReader;
use crate::store::{instance_watermark_key, IndexStore};
use crate::types::Log;
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables shared by the scheduler, the factory scan and backfill.
#[derive(Debug, Clone)]
pub struct IndexerSettings {
    pub factory_address: Address,
    /// First block to scan when the factory has never been indexed
    pub factory_start_block: u64,
    /// Blocks below the head treated as not yet final
    pub confirmations: u64,
    pub window_size: u64,
    /// Instances indexed concurrently per batch
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            factory_address: Address::ZERO,
            factory_start_block: 0,
            confirmations: 2,
            window_size: DEFAULT_WINDOW_BLOCKS,
            concurrency: 5,
            poll_interval: Duration::from_millis(15_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Counts from routing a batch of logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteStats {
    pub applied: usize,
    /// Unknown events and updates to rows that do not exist
    pub skipped: usize,
    pub failed: usize,
}

impl RouteStats {
    pub fn absorb(&mut self, other: RouteStats) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Result of indexing one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceOutcome {
    pub address: Address,
    pub from: u64,
    pub to: u64,
    /// Watermark after this run
    pub watermark: u64,
    pub routed: RouteStats,
    pub failed_windows: usize,
}

/// The indexer: a store, a chain and settings.
pub struct Indexer {
    pub(crate) store: Arc<dyn IndexStore>,
    pub(crate) reader: Arc<dyn ChainReader>,
    pub(crate) settings: IndexerSettings,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn IndexStore>,
        reader: Arc<dyn ChainReader>,
        settings: IndexerSettings,
    ) -> Self {
        Self {
            store,
            reader,
            settings,
        }
    }

    pub fn settings(&self) -> &IndexerSettings {
        &self.settings
    }

    /// Index `instance` from its watermark up to `head - confirmations`.
    pub async fn index_instance(&self, instance: &TrackedInstance) -> Result<InstanceOutcome> {
        let height = self
            .reader
            .current_height()
            .await
            .context("Failed to get current block height")?;
        let safe_to = height.saturating_sub(self.settings.confirmations);

        let key = instance_watermark_key(instance.address);
        let watermark = self
            .store
            .get_watermark(&key)
            .with_context(|| format!("Failed to read watermark for {:?}", instance.address))?;

        let mut outcome = InstanceOutcome {
            address: instance.address,
            from: watermark,
            to: safe_to,
            watermark,
            ..Default::default()
        };

        let from = match (watermark, instance.deployed_at_block) {
            (0, Some(deployed)) => deployed,
            (0, None) => {
                // No deployment block: only index from here on
                info!(
                    "Instance {:?} has no deployment block, starting at {}",
                    instance.address, safe_to
                );
                outcome.watermark = self.advance_watermark(instance.address, safe_to)?;
                outcome.from = safe_to;
                return Ok(outcome);
            }
            (w, _) => w,
        };
        outcome.from = from;

        if safe_to <= from {
            debug!(
                "Instance {:?} caught up (from={}, safe_to={})",
                instance.address, from, safe_to
            );
            return Ok(outcome);
        }

        let report = self
            .collect_instance_logs(instance.address, from, safe_to)
            .await;
        outcome.failed_windows = report.failures.len();
        outcome.routed = self.route_logs(instance, &report.logs).await;

        let target = report.advance_to(safe_to);
        if report.status() != FetchStatus::Complete {
            warn!(
                "Fetch for {:?} was {:?} ({} of {} windows failed), holding watermark at {}",
                instance.address,
                report.status(),
                report.failures.len(),
                report.windows,
                target
            );
        }
        outcome.watermark = self.advance_watermark(instance.address, target)?;

        info!(
            "Indexed {:?} blocks {}..={}: {} applied, {} skipped, {} failed, watermark {}",
            instance.address,
            from,
            safe_to,
            outcome.routed.applied,
            outcome.routed.skipped,
            outcome.routed.failed,
            outcome.watermark
        );
        Ok(outcome)
    }

    /// Record `block` as both the meta watermark and the instance row's `last_indexed_block`.
    fn advance_watermark(&self, instance: Address, block: u64) -> Result<u64> {
        let stored = self
            .store
            .set_watermark(&instance_watermark_key(instance), block)
            .with_context(|| format!("Failed to write watermark for {:?}", instance))?;
        self.store
            .set_instance_last_indexed(instance, stored)
            .with_context(|| format!("Failed to update instance {:?}", instance))?;
        Ok(stored)
    }

    /// Fetch all tracked event kinds for `instance` over `[from, to]`.
    ///
    /// Logs come back in chain order with reorged logs removed.
    pub async fn collect_instance_logs(&self, instance: Address, from: u64, to: u64) -> FetchReport {
        let topics: Vec<B256> = EventKind::ALL.iter().map(|kind| kind.topic()).collect();
        let mut report = fetch_logs(
            self.reader.as_ref(),
            &self.settings.retry,
            instance,
            &topics,
            from,
            to,
            self.settings.window_size,
        )
        .await;

        let before = report.logs.len();
        report.logs.retain(|log| !log.removed);
        if report.logs.len() < before {
            debug!(
                "Dropped {} removed logs for {:?}",
                before - report.logs.len(),
                instance
            );
        }
        report.logs.sort_by_key(Log::position);
        report
    }

    /// Route logs one at a time. A failing log is logged and skipped.
    pub async fn route_logs(&self, instance: &TrackedInstance, logs: &[Log]) -> RouteStats {
        let mut stats = RouteStats::default();
        for log in logs {
            match self.route_log(instance, log).await {
                Ok(Applied::Written) => stats.applied += 1,
                Ok(Applied::NoMatchingRow) => {
                    debug!(
                        "No stored row for {} at block {} in {:?}",
                        event_name(log),
                        log.block_number,
                        instance.address
                    );
                    stats.skipped += 1;
                }
                Ok(Applied::Ignored) => stats.skipped += 1,
                Err(e) => {
                    warn!(
                        "Failed to handle {} at block {} (tx {:?}) in {:?}: {:#}",
                        event_name(log),
                        log.block_number,
                        log.transaction_hash,
                        instance.address,
                        e
                    );
                    stats.failed += 1;
                }
            }
        }
        stats
    }

    async fn route_log(&self, instance: &TrackedInstance, log: &Log) -> Result<Applied> {
        let event = decode_log(log).context("Failed to decode log")?;
        let now = unix_now();
        let event = enrich_event(self.reader.as_ref(), log, event, now).await;
        let ctx = EventContext::new(instance, log, now);
        debug!(
            "Applying {} at ({}, {}) for {:?}",
            event.name(),
            log.block_number,
            log.log_index,
            instance.address
        );
        apply_event(self.store.as_ref(), &ctx, &event)
    }
}

fn event_name(log: &Log) -> &'static str {
    log.topic0()
        .as_ref()
        .and_then(EventKind::from_topic)
        .map_or("unknown event", |kind| kind.name())
}
