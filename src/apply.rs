//! Event application logic
//!
//! Turns decoded payroll events into store mutations. Every write is keyed
//! so that replaying the same event leaves the same rows behind.
//!
//! Application is split in two steps:
//! - [`enrich_event`] fills in what the log itself lacks (timestamps, the
//!   amount handle for raw `SalaryPaid` logs) and may call the chain.
//! - [`apply_event`] only touches the store.

use crate::events::{find_transfer_handle, PaidSource, PayrollEvent};
use crate::records::{EmployeeRecord, PayrollRun, SalaryPayment, SalaryUpdateEntry, TrackedInstance};
use crate::rpc::ChainReader;
use crate::store::IndexStore;
use crate::types::Log;
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Where an event was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventContext {
    /// Instance contract that emitted the event
    pub payroll: Address,
    /// Employer owning the instance; employee rows are keyed under it
    pub employer: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    /// Wall-clock seconds at processing time, used for soft-delete stamps
    pub observed_at: u64,
}

impl EventContext {
    pub fn new(instance: &TrackedInstance, log: &Log, observed_at: u64) -> Self {
        Self {
            payroll: instance.address,
            employer: instance.creator,
            tx_hash: log.transaction_hash,
            block_number: log.block_number,
            log_index: log.log_index,
            observed_at,
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Rows were written.
    Written,
    /// The event updates a row that does not exist; nothing was written.
    NoMatchingRow,
    /// The event is not one this indexer stores.
    Ignored,
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Pick a timestamp: a non-zero `candidate`, else the block's timestamp, else `fallback`.
pub async fn resolve_timestamp(
    reader: &dyn ChainReader,
    block: u64,
    candidate: Option<u64>,
    fallback: u64,
) -> u64 {
    if let Some(ts) = candidate.filter(|ts| *ts > 0) {
        return ts;
    }
    match reader.get_block(block).await {
        Ok(header) if header.timestamp > 0 => header.timestamp,
        Ok(_) => fallback,
        Err(e) => {
            warn!("Failed to fetch timestamp for block {}: {:#}", block, e);
            fallback
        }
    }
}

/// Fill in chain data the event's own log does not carry.
///
/// RPC failures degrade to the next fallback instead of failing the event.
pub async fn enrich_event(
    reader: &dyn ChainReader,
    log: &Log,
    event: PayrollEvent,
    now: u64,
) -> PayrollEvent {
    match event {
        PayrollEvent::EmployeeUpdated(mut e) => {
            e.timestamp = resolve_timestamp(reader, log.block_number, Some(e.timestamp), now).await;
            PayrollEvent::EmployeeUpdated(e)
        }
        PayrollEvent::SalaryPaid(mut paid) => {
            if paid.source == PaidSource::RawTopics && paid.encrypted_amount.is_none() {
                paid.encrypted_amount =
                    receipt_transfer_handle(reader, log.transaction_hash, paid.employee).await;
            }
            paid.timestamp =
                Some(resolve_timestamp(reader, log.block_number, paid.timestamp, now).await);
            PayrollEvent::SalaryPaid(paid)
        }
        PayrollEvent::SalaryClaimed(mut claimed) => {
            claimed.timestamp =
                resolve_timestamp(reader, log.block_number, Some(claimed.timestamp), now).await;
            PayrollEvent::SalaryClaimed(claimed)
        }
        other => other,
    }
}

/// Recover the amount handle for a raw `SalaryPaid` from the token transfer in the same tx.
async fn receipt_transfer_handle(
    reader: &dyn ChainReader,
    tx_hash: B256,
    employee: Address,
) -> Option<B256> {
    match reader.get_transaction_receipt(tx_hash).await {
        Ok(Some(receipt)) if !receipt.is_success() => {
            warn!("Tx {:?} reverted; no amount handle to recover", tx_hash);
            None
        }
        Ok(Some(receipt)) => {
            let handle = find_transfer_handle(&receipt.logs, employee);
            if handle.is_none() {
                warn!(
                    "No ConfidentialTransfer to {:?} in tx {:?}; amount handle unknown",
                    employee, tx_hash
                );
            }
            handle
        }
        Ok(None) => {
            warn!("Receipt for tx {:?} not found; amount handle unknown", tx_hash);
            None
        }
        Err(e) => {
            warn!("Failed to fetch receipt for tx {:?}: {:#}", tx_hash, e);
            None
        }
    }
}

/// Apply an enriched event to the store.
pub fn apply_event(
    store: &dyn IndexStore,
    ctx: &EventContext,
    event: &PayrollEvent,
) -> Result<Applied> {
    match event {
        PayrollEvent::EmployeeOnboarded(e) => {
            let existing = store.get_employee(ctx.employer, e.employee)?;
            let record = EmployeeRecord {
                employer: ctx.employer,
                employee: e.employee,
                payroll_address: ctx.payroll,
                whitelisted: true,
                encrypted_salary_handle: e.encrypted_salary,
                input_proof: e.input_proof.clone(),
                signature: e.signature.clone(),
                added_at: existing.map_or(ctx.observed_at, |r| r.added_at),
                removed_at: None,
            };
            if e.employer != ctx.employer {
                debug!(
                    "Onboarding event employer {:?} differs from instance owner {:?}",
                    e.employer, ctx.employer
                );
            }
            store
                .put_employee(&record)
                .context("Failed to store onboarded employee")?;
            Ok(Applied::Written)
        }

        PayrollEvent::EmployeeUpdated(e) => {
            store
                .put_salary_update(&SalaryUpdateEntry {
                    employer: ctx.employer,
                    employee: e.employee,
                    payroll_address: if e.payroll_address == Address::ZERO {
                        ctx.payroll
                    } else {
                        e.payroll_address
                    },
                    encrypted_salary_handle: e.encrypted_salary,
                    tx_hash: ctx.tx_hash,
                    block_number: ctx.block_number,
                    log_index: ctx.log_index,
                    timestamp: e.timestamp,
                })
                .context("Failed to append salary update")?;

            // The history row is written either way
            let Some(mut record) = store.get_employee(ctx.employer, e.employee)? else {
                debug!(
                    "Salary update for {:?} with no employee row, history only",
                    e.employee
                );
                return Ok(Applied::Written);
            };
            record.encrypted_salary_handle = e.encrypted_salary;
            record.input_proof = e.input_proof.clone();
            record.signature = e.signature.clone();
            store
                .put_employee(&record)
                .context("Failed to store updated employee")?;
            Ok(Applied::Written)
        }

        PayrollEvent::EmployeeRemoved { employee } => {
            let Some(mut record) = store.get_employee(ctx.employer, *employee)? else {
                return Ok(Applied::NoMatchingRow);
            };
            record.whitelisted = false;
            // Keep the first removal stamp across replays
            record.removed_at = record.removed_at.or(Some(ctx.observed_at));
            store
                .put_employee(&record)
                .context("Failed to store removed employee")?;
            Ok(Applied::Written)
        }

        PayrollEvent::EmployeeWhitelisted { employee } => {
            let Some(mut record) = store.get_employee(ctx.employer, *employee)? else {
                return Ok(Applied::NoMatchingRow);
            };
            record.whitelisted = true;
            record.removed_at = None;
            store
                .put_employee(&record)
                .context("Failed to store whitelisted employee")?;
            Ok(Applied::Written)
        }

        PayrollEvent::SalaryPaid(paid) => {
            let existing = store.get_payment(ctx.tx_hash, paid.employee)?;
            let timestamp = paid.timestamp.unwrap_or(ctx.observed_at);
            let payroll_address = paid.payroll_address.unwrap_or(ctx.payroll);

            // A claim may already have been recorded for this payment
            let (claimed, claimed_at) = existing
                .as_ref()
                .map_or((false, None), |p| (p.claimed, p.claimed_at));
            let encrypted_amount_handle = paid
                .encrypted_amount
                .or_else(|| existing.as_ref().and_then(|p| p.encrypted_amount_handle));

            store
                .put_payment(&SalaryPayment {
                    employer: paid.employer,
                    employee: paid.employee,
                    tx_hash: ctx.tx_hash,
                    block_number: ctx.block_number,
                    encrypted_amount_handle,
                    payment_index: paid.index,
                    payment_id: paid.payment_id,
                    timestamp,
                    claimed,
                    claimed_at,
                    payroll_address,
                })
                .context("Failed to store salary payment")?;

            if store.get_payroll_run(ctx.tx_hash)?.is_none() {
                store
                    .put_payroll_run(&PayrollRun {
                        employer: paid.employer,
                        tx_hash: ctx.tx_hash,
                        block_number: ctx.block_number,
                        timestamp,
                        payroll_address,
                    })
                    .context("Failed to store payroll run")?;
            }
            Ok(Applied::Written)
        }

        PayrollEvent::SalaryClaimed(claimed) => {
            let Some(mut payment) = store.get_payment(claimed.payment_tx, claimed.employee)? else {
                return Ok(Applied::NoMatchingRow);
            };
            payment.claimed = true;
            payment.claimed_at = payment.claimed_at.or(Some(claimed.timestamp));
            store
                .put_payment(&payment)
                .context("Failed to store claimed payment")?;
            Ok(Applied::Written)
        }

        PayrollEvent::Unknown { topic0 } => {
            debug!("Ignoring unrecognized event topic {:?}", topic0);
            Ok(Applied::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        address_topic, event_topic, EmployeeOnboarded, EmployeeUpdated, SalaryClaimed, SalaryPaid,
        CONFIDENTIAL_TRANSFER_SIGNATURE,
    };
    use crate::memory::MemoryIndexStore;
    use crate::testing::{FakeChain, LogBuilder};
    use alloy_primitives::address;

    const INSTANCE: Address = address!("00000000000000000000000000000000000000aa");
    const EMPLOYER: Address = address!("00000000000000000000000000000000000000c1");
    const EMPLOYEE: Address = address!("0000000000000000000000000000000000000eee");

    fn ctx(tx: u8, block: u64, log_index: u64, observed_at: u64) -> EventContext {
        EventContext {
            payroll: INSTANCE,
            employer: EMPLOYER,
            tx_hash: B256::repeat_byte(tx),
            block_number: block,
            log_index,
            observed_at,
        }
    }

    fn onboarded() -> PayrollEvent {
        PayrollEvent::EmployeeOnboarded(EmployeeOnboarded {
            employer: EMPLOYER,
            employee: EMPLOYEE,
            encrypted_salary: B256::repeat_byte(0x5a),
            input_proof: vec![1, 2],
            signature: vec![3, 4],
        })
    }

    fn paid(employee: Address) -> PayrollEvent {
        PayrollEvent::SalaryPaid(SalaryPaid {
            employer: EMPLOYER,
            employee,
            index: Some(0),
            encrypted_amount: Some(B256::repeat_byte(0xa1)),
            timestamp: Some(1_700_000_000),
            payment_id: None,
            payroll_address: Some(INSTANCE),
            source: PaidSource::Typed,
        })
    }

    #[test]
    fn test_onboarding_replay_is_idempotent() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(1, 100, 0, 10), &onboarded()).unwrap();
        let first = store.get_employee(EMPLOYER, EMPLOYEE).unwrap().unwrap();

        apply_event(&store, &ctx(1, 100, 0, 99), &onboarded()).unwrap();
        let second = store.get_employee(EMPLOYER, EMPLOYEE).unwrap().unwrap();

        assert_eq!(store.employee_count().unwrap(), 1);
        assert_eq!(first, second);
        assert!(second.whitelisted);
        assert_eq!(second.removed_at, None);
    }

    #[test]
    fn test_removed_then_whitelisted() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(1, 100, 0, 10), &onboarded()).unwrap();

        let removed = PayrollEvent::EmployeeRemoved { employee: EMPLOYEE };
        assert_eq!(
            apply_event(&store, &ctx(2, 101, 0, 20), &removed).unwrap(),
            Applied::Written
        );
        let row = store.get_employee(EMPLOYER, EMPLOYEE).unwrap().unwrap();
        assert!(!row.whitelisted);
        assert_eq!(row.removed_at, Some(20));

        let back = PayrollEvent::EmployeeWhitelisted { employee: EMPLOYEE };
        apply_event(&store, &ctx(3, 102, 0, 30), &back).unwrap();
        let row = store.get_employee(EMPLOYER, EMPLOYEE).unwrap().unwrap();
        assert!(row.whitelisted);
        assert_eq!(row.removed_at, None);
    }

    #[test]
    fn test_removal_of_unknown_employee_writes_nothing() {
        let store = MemoryIndexStore::new();
        let removed = PayrollEvent::EmployeeRemoved { employee: EMPLOYEE };
        assert_eq!(
            apply_event(&store, &ctx(2, 101, 0, 20), &removed).unwrap(),
            Applied::NoMatchingRow
        );
        assert_eq!(store.employee_count().unwrap(), 0);
    }

    #[test]
    fn test_employee_identity_is_per_employer() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(1, 100, 0, 10), &onboarded()).unwrap();

        let mut other = ctx(2, 110, 0, 10);
        other.employer = address!("00000000000000000000000000000000000000c2");
        other.payroll = address!("00000000000000000000000000000000000000bb");
        apply_event(&store, &other, &onboarded()).unwrap();

        // Removing under the second employer leaves the first one untouched
        let removed = PayrollEvent::EmployeeRemoved { employee: EMPLOYEE };
        apply_event(&store, &other, &removed).unwrap();

        assert_eq!(store.employee_count().unwrap(), 2);
        assert!(store.get_employee(EMPLOYER, EMPLOYEE).unwrap().unwrap().whitelisted);
        assert!(!store.get_employee(other.employer, EMPLOYEE).unwrap().unwrap().whitelisted);
    }

    #[test]
    fn test_update_appends_history_and_updates_row() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(1, 100, 0, 10), &onboarded()).unwrap();

        let update = PayrollEvent::EmployeeUpdated(EmployeeUpdated {
            employer: EMPLOYER,
            employee: EMPLOYEE,
            encrypted_salary: B256::repeat_byte(0x77),
            input_proof: vec![9],
            signature: vec![8],
            timestamp: 1_700_000_500,
            payroll_address: INSTANCE,
        });
        apply_event(&store, &ctx(2, 120, 4, 20), &update).unwrap();
        // Replay
        apply_event(&store, &ctx(2, 120, 4, 30), &update).unwrap();

        let row = store.get_employee(EMPLOYER, EMPLOYEE).unwrap().unwrap();
        assert_eq!(row.encrypted_salary_handle, B256::repeat_byte(0x77));
        let history = store.salary_updates(EMPLOYER, EMPLOYEE).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp, 1_700_000_500);
    }

    #[test]
    fn test_update_without_employee_still_records_history() {
        let store = MemoryIndexStore::new();
        let update = PayrollEvent::EmployeeUpdated(EmployeeUpdated {
            employer: EMPLOYER,
            employee: EMPLOYEE,
            encrypted_salary: B256::repeat_byte(0x77),
            input_proof: vec![9],
            signature: vec![8],
            timestamp: 1_700_000_500,
            payroll_address: INSTANCE,
        });

        assert_eq!(
            apply_event(&store, &ctx(2, 120, 4, 20), &update).unwrap(),
            Applied::Written
        );
        assert_eq!(store.get_employee(EMPLOYER, EMPLOYEE).unwrap(), None);
        assert_eq!(store.salary_updates(EMPLOYER, EMPLOYEE).unwrap().len(), 1);
    }

    #[test]
    fn test_salary_paid_replay_writes_one_payment() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(0x71, 1015, 0, 10), &paid(EMPLOYEE)).unwrap();
        apply_event(&store, &ctx(0x71, 1015, 0, 20), &paid(EMPLOYEE)).unwrap();

        assert_eq!(store.payment_count().unwrap(), 1);
        let run = store
            .payroll_run_view(B256::repeat_byte(0x71))
            .unwrap()
            .unwrap();
        assert_eq!(run.employee_count, 1);
    }

    #[test]
    fn test_run_counts_distinct_employees_even_when_replayed() {
        let store = MemoryIndexStore::new();
        let employees = [
            address!("0000000000000000000000000000000000000e01"),
            address!("0000000000000000000000000000000000000e02"),
            address!("0000000000000000000000000000000000000e03"),
        ];
        for (i, employee) in employees.iter().enumerate() {
            apply_event(&store, &ctx(0x71, 1015, i as u64, 10), &paid(*employee)).unwrap();
        }
        let tx = B256::repeat_byte(0x71);
        assert_eq!(store.payroll_run_view(tx).unwrap().unwrap().employee_count, 3);

        // Reprocessing the same range does not inflate the count
        for (i, employee) in employees.iter().enumerate() {
            apply_event(&store, &ctx(0x71, 1015, i as u64, 50), &paid(*employee)).unwrap();
        }
        assert_eq!(store.payroll_run_view(tx).unwrap().unwrap().employee_count, 3);
    }

    #[test]
    fn test_claim_marks_payment_and_survives_paid_replay() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(0x71, 1015, 0, 10), &paid(EMPLOYEE)).unwrap();

        let claim = PayrollEvent::SalaryClaimed(SalaryClaimed {
            employee: EMPLOYEE,
            encrypted_amount: B256::repeat_byte(0xa1),
            timestamp: 1_700_000_900,
            payment_tx: B256::repeat_byte(0x71),
        });
        assert_eq!(
            apply_event(&store, &ctx(0x72, 1030, 0, 20), &claim).unwrap(),
            Applied::Written
        );

        apply_event(&store, &ctx(0x71, 1015, 0, 30), &paid(EMPLOYEE)).unwrap();
        let payment = store
            .get_payment(B256::repeat_byte(0x71), EMPLOYEE)
            .unwrap()
            .unwrap();
        assert!(payment.claimed);
        assert_eq!(payment.claimed_at, Some(1_700_000_900));
    }

    #[test]
    fn test_claim_without_payment() {
        let store = MemoryIndexStore::new();
        let claim = PayrollEvent::SalaryClaimed(SalaryClaimed {
            employee: EMPLOYEE,
            encrypted_amount: B256::ZERO,
            timestamp: 1,
            payment_tx: B256::repeat_byte(0x71),
        });
        assert_eq!(
            apply_event(&store, &ctx(0x72, 1030, 0, 20), &claim).unwrap(),
            Applied::NoMatchingRow
        );
        assert_eq!(store.payment_count().unwrap(), 0);
    }

    #[test]
    fn test_unknown_event_is_ignored() {
        let store = MemoryIndexStore::new();
        apply_event(&store, &ctx(1, 100, 0, 10), &onboarded()).unwrap();
        let before = store.get_employee(EMPLOYER, EMPLOYEE).unwrap();

        let unknown = PayrollEvent::Unknown {
            topic0: Some(B256::repeat_byte(0x42)),
        };
        assert_eq!(
            apply_event(&store, &ctx(9, 200, 0, 10), &unknown).unwrap(),
            Applied::Ignored
        );
        assert_eq!(store.get_employee(EMPLOYER, EMPLOYEE).unwrap(), before);
        assert_eq!(store.payment_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enrich_raw_salary_paid_joins_receipt() {
        let chain = FakeChain::new(2000);
        let tx = B256::repeat_byte(0x71);
        chain.set_timestamp(1015, 1_700_001_015);
        chain.add_receipt(
            tx,
            vec![LogBuilder::new(INSTANCE, event_topic(CONFIDENTIAL_TRANSFER_SIGNATURE))
                .topic(address_topic(INSTANCE))
                .topic(address_topic(EMPLOYEE))
                .topic(B256::repeat_byte(0xcc))
                .at(1015, 0)
                .tx(tx)
                .build()],
        );

        let log = LogBuilder::anonymous(INSTANCE).at(1015, 1).tx(tx).build();
        let raw = PayrollEvent::SalaryPaid(SalaryPaid {
            employer: EMPLOYER,
            employee: EMPLOYEE,
            index: None,
            encrypted_amount: None,
            timestamp: None,
            payment_id: None,
            payroll_address: None,
            source: PaidSource::RawTopics,
        });

        let PayrollEvent::SalaryPaid(enriched) = enrich_event(&chain, &log, raw, 5).await else {
            panic!("expected SalaryPaid");
        };
        assert_eq!(enriched.encrypted_amount, Some(B256::repeat_byte(0xcc)));
        assert_eq!(enriched.timestamp, Some(1_700_001_015));
    }

    #[tokio::test]
    async fn test_timestamp_falls_back_to_now() {
        let chain = FakeChain::new(2000);
        // Block 77 has no known timestamp, so the fallback wins
        assert_eq!(resolve_timestamp(&chain, 77, Some(0), 42).await, 42);
        assert_eq!(resolve_timestamp(&chain, 77, Some(9), 42).await, 9);
        chain.set_timestamp(77, 1234);
        assert_eq!(resolve_timestamp(&chain, 77, None, 42).await, 1234);
    }
}
