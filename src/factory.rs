//! Factory scanner
//!
//! Discovers payroll instances from the factory's created events and
//! registers them as tracked instances.

use crate::events::{decode_instance_created, event_topic, INSTANCE_CREATED_SIGNATURE};
use crate::fetch::{advance_target, fetch_logs, WindowFailure};
use crate::indexer::Indexer;
use crate::records::TrackedInstance;
use crate::store::factory_watermark_key;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// What a factory scan over a block range found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub from: u64,
    pub to: u64,
    /// Created events seen, including already tracked instances
    pub seen: usize,
    /// Instances registered for the first time
    pub new_instances: Vec<Address>,
    pub failures: Vec<WindowFailure>,
    /// Factory watermark after the scan (unchanged by backfill)
    pub watermark: u64,
}

impl Indexer {
    /// Scan the factory from its watermark to the current head.
    pub async fn scan_factory(&self) -> Result<Discovery> {
        let factory = self.settings.factory_address;
        let key = factory_watermark_key(factory);
        let watermark = self
            .store
            .get_watermark(&key)
            .context("Failed to read factory watermark")?;
        let from = if watermark == 0 {
            self.settings.factory_start_block
        } else {
            watermark
        };

        let head = self
            .reader
            .current_height()
            .await
            .context("Failed to get current block height")?;

        if head <= from {
            debug!("Factory {:?} caught up at {}", factory, from);
            return Ok(Discovery {
                from,
                to: head,
                watermark,
                ..Default::default()
            });
        }

        let mut discovery = self.discover_instances(from, head).await?;
        let target = advance_target(&discovery.failures, head);
        discovery.watermark = self
            .store
            .set_watermark(&key, target)
            .context("Failed to write factory watermark")?;

        info!(
            "Factory scan {}..={}: {} created events, {} new instances, watermark {}",
            from,
            head,
            discovery.seen,
            discovery.new_instances.len(),
            discovery.watermark
        );
        Ok(discovery)
    }

    /// Register every instance the factory created in `[from, to]`.
    ///
    /// Does not touch the factory watermark.
    pub async fn discover_instances(&self, from: u64, to: u64) -> Result<Discovery> {
        let factory = self.settings.factory_address;
        let report = fetch_logs(
            self.reader.as_ref(),
            &self.settings.retry,
            factory,
            &[event_topic(INSTANCE_CREATED_SIGNATURE)],
            from,
            to,
            self.settings.window_size,
        )
        .await;

        let mut discovery = Discovery {
            from,
            to,
            ..Default::default()
        };

        for log in report.logs.iter().filter(|log| !log.removed) {
            let (creator, instance) = match decode_instance_created(log) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(
                        "Skipping malformed created event at block {} (tx {:?}): {:#}",
                        log.block_number, log.transaction_hash, e
                    );
                    continue;
                }
            };
            discovery.seen += 1;

            let tracked = TrackedInstance::discovered(instance, creator, log.block_number);
            let created = self
                .store
                .upsert_instance(&tracked)
                .with_context(|| format!("Failed to register instance {:?}", instance))?;
            if created {
                info!(
                    "Discovered instance {:?} (creator {:?}) at block {}",
                    instance, creator, log.block_number
                );
                discovery.new_instances.push(instance);
            }
        }

        discovery.failures = report.failures;
        Ok(discovery)
    }
}
