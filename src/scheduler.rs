//! Scheduler loop
//!
//! One cycle = factory scan, then every tracked instance in batches of
//! `concurrency`. Cycles repeat on a fixed interval until the process stops.

use crate::indexer::{Indexer, InstanceOutcome, RouteStats};
use crate::records::TrackedInstance;
use anyhow::{Context, Result};
use futures::future::join_all;
use tracing::{error, info, warn};

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub new_instances: usize,
    pub instances_indexed: usize,
    pub instances_failed: usize,
    pub events: RouteStats,
    pub failed_windows: usize,
}

impl CycleReport {
    fn absorb(&mut self, outcome: &InstanceOutcome) {
        self.instances_indexed += 1;
        self.events.absorb(outcome.routed);
        self.failed_windows += outcome.failed_windows;
    }
}

impl Indexer {
    /// Register instances supplied by the operator. Existing rows are left alone.
    ///
    /// Returns how many were new.
    pub fn register_instances(&self, instances: &[TrackedInstance]) -> Result<usize> {
        let mut created = 0;
        for instance in instances {
            if self
                .store
                .upsert_instance(instance)
                .with_context(|| format!("Failed to register instance {:?}", instance.address))?
            {
                info!("Registered instance {:?}", instance.address);
                created += 1;
            }
        }
        Ok(created)
    }

    /// Run one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let discovery = self.scan_factory().await.context("Factory scan failed")?;
        let instances = self
            .store
            .list_instances()
            .context("Failed to list instances")?;

        let mut report = CycleReport {
            new_instances: discovery.new_instances.len(),
            ..Default::default()
        };
        self.index_batches(&instances, &mut report).await;
        Ok(report)
    }

    /// Index `instances` at most `concurrency` at a time. One instance failing
    /// does not stop the others.
    async fn index_batches(&self, instances: &[TrackedInstance], report: &mut CycleReport) {
        let batch_size = self.settings.concurrency.max(1);
        for batch in instances.chunks(batch_size) {
            let results = join_all(batch.iter().map(|instance| self.index_instance(instance))).await;
            for (instance, result) in batch.iter().zip(results) {
                match result {
                    Ok(outcome) => report.absorb(&outcome),
                    Err(e) => {
                        warn!("Failed to index instance {:?}: {:#}", instance.address, e);
                        report.instances_failed += 1;
                    }
                }
            }
        }
    }

    /// Run cycles forever, sleeping `poll_interval` between them.
    ///
    /// Cycle errors are logged and never end the loop.
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting indexer loop (factory {:?}, poll every {:?})",
            self.settings.factory_address, self.settings.poll_interval
        );

        loop {
            match self.run_cycle().await {
                Ok(report) => info!(
                    "Cycle complete: {} new instances, {} indexed, {} failed, {} events applied, {} skipped, {} failed, {} failed windows",
                    report.new_instances,
                    report.instances_indexed,
                    report.instances_failed,
                    report.events.applied,
                    report.events.skipped,
                    report.events.failed,
                    report.failed_windows
                ),
                Err(e) => error!("Indexing cycle failed: {:#}", e),
            }

            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}
