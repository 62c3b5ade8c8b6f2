//! IndexStore trait and RocksDB implementation
//!
//! Provides a persistent store for tracked instances, watermarks and the
//! payroll rows derived from contract events.
//! Uses RocksDB with one column family per table.

use crate::keys::{
    encode_employee_key, encode_instance_key, encode_meta_key, encode_payment_key,
    encode_payment_prefix, encode_run_key, encode_salary_update_key, encode_salary_update_prefix,
};
use crate::records::{
    EmployeeRecord, PayrollRun, PayrollRunView, SalaryPayment, SalaryUpdateEntry, TrackedInstance,
};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

const CF_META: &str = "meta";
const CF_INSTANCES: &str = "instances";
const CF_EMPLOYEES: &str = "employees";
const CF_PAYMENTS: &str = "salary_payments";
const CF_RUNS: &str = "payroll_runs";
const CF_UPDATES: &str = "salary_updates";

/// Watermark key for the factory contract.
pub fn factory_watermark_key(factory: Address) -> String {
    format!("0x{:x}_lastIndexedBlock", factory)
}

/// Watermark key for a tracked instance.
pub fn instance_watermark_key(instance: Address) -> String {
    format!("0x{:x}", instance)
}

/// Trait defining the interface for indexed payroll storage.
///
/// Writes are plain puts; upsert and monotonicity rules live in the
/// provided methods so every backend shares them.
pub trait IndexStore: Send + Sync {
    /// Get a raw meta value.
    fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Store a raw meta value.
    fn put_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Get a tracked instance by address.
    fn get_instance(&self, addr: Address) -> Result<Option<TrackedInstance>>;

    /// Store a tracked instance.
    fn put_instance(&self, instance: &TrackedInstance) -> Result<()>;

    /// All tracked instances, ordered by address.
    fn list_instances(&self) -> Result<Vec<TrackedInstance>>;

    /// Get an employee row.
    fn get_employee(&self, employer: Address, employee: Address)
        -> Result<Option<EmployeeRecord>>;

    /// Store an employee row.
    fn put_employee(&self, record: &EmployeeRecord) -> Result<()>;

    /// Get a salary payment by (tx_hash, employee).
    fn get_payment(&self, tx_hash: B256, employee: Address) -> Result<Option<SalaryPayment>>;

    /// Store a salary payment.
    fn put_payment(&self, payment: &SalaryPayment) -> Result<()>;

    /// All payments made in `tx_hash`, ordered by employee.
    fn payments_for_tx(&self, tx_hash: B256) -> Result<Vec<SalaryPayment>>;

    /// Get the stored payroll run for `tx_hash`.
    fn get_payroll_run(&self, tx_hash: B256) -> Result<Option<PayrollRun>>;

    /// Store a payroll run.
    fn put_payroll_run(&self, run: &PayrollRun) -> Result<()>;

    /// Store a salary update history entry.
    fn put_salary_update(&self, entry: &SalaryUpdateEntry) -> Result<()>;

    /// Salary update history for (employer, employee), oldest first.
    fn salary_updates(&self, employer: Address, employee: Address)
        -> Result<Vec<SalaryUpdateEntry>>;

    /// Get a meta value, falling back to `default` when absent.
    fn get_meta_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get_meta(key)?.unwrap_or_else(|| default.to_string()))
    }

    /// Last recorded block for `key`, or 0 if never written.
    fn get_watermark(&self, key: &str) -> Result<u64> {
        let raw = self.get_meta_or(key, "0")?;
        raw.parse::<u64>()
            .with_context(|| format!("Watermark '{}' is not a block number: {}", key, raw))
    }

    /// Record `block` for `key`. Never moves a watermark backwards.
    ///
    /// Returns the value stored after the write.
    fn set_watermark(&self, key: &str, block: u64) -> Result<u64> {
        let current = self.get_watermark(key)?;
        if block <= current {
            return Ok(current);
        }
        self.put_meta(key, &block.to_string())?;
        Ok(block)
    }

    /// Insert `instance` unless one with the same address exists.
    ///
    /// Returns true if the row was created.
    fn upsert_instance(&self, instance: &TrackedInstance) -> Result<bool> {
        if self.get_instance(instance.address)?.is_some() {
            return Ok(false);
        }
        self.put_instance(instance)?;
        Ok(true)
    }

    /// Raise an instance's `last_indexed_block`. Unknown instances are ignored.
    fn set_instance_last_indexed(&self, addr: Address, block: u64) -> Result<()> {
        if let Some(mut instance) = self.get_instance(addr)? {
            if block > instance.last_indexed_block {
                instance.last_indexed_block = block;
                self.put_instance(&instance)?;
            }
        }
        Ok(())
    }

    /// The payroll run for `tx_hash` with its employee count derived from stored payments.
    fn payroll_run_view(&self, tx_hash: B256) -> Result<Option<PayrollRunView>> {
        let Some(run) = self.get_payroll_run(tx_hash)? else {
            return Ok(None);
        };
        let employee_count = self.payments_for_tx(tx_hash)?.len() as u64;
        Ok(Some(PayrollRunView {
            run,
            employee_count,
        }))
    }
}

/// RocksDB-backed implementation of IndexStore.
///
/// Uses column families to organize different tables:
/// - meta: watermarks
/// - instances: tracked payroll contracts
/// - employees: employee rows keyed by (employer, employee)
/// - salary_payments: payments keyed by (tx_hash, employee)
/// - payroll_runs: runs keyed by tx_hash
/// - salary_updates: append-only salary update history
pub struct RocksIndexStore {
    db: DB,
}

impl RocksIndexStore {
    /// Open or create a RocksDB database at the given path.
    ///
    /// Creates all required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let names = [CF_META, CF_INSTANCES, CF_EMPLOYEES, CF_PAYMENTS, CF_RUNS, CF_UPDATES];
        let column_families = names
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("Failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Get a column family handle by name.
    fn get_cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .with_context(|| format!("Column family '{}' not found", name))
    }

    fn get_record<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        let handle = self.get_cf(cf)?;
        match self
            .db
            .get_cf(handle, key)
            .with_context(|| format!("Failed to read from {}", cf))?
        {
            Some(bytes) => {
                let record = postcard::from_bytes(&bytes)
                    .with_context(|| format!("Failed to deserialize {} record", cf))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn put_record<T: Serialize>(&self, cf: &str, key: &[u8], record: &T) -> Result<()> {
        let handle = self.get_cf(cf)?;
        let value = postcard::to_allocvec(record)
            .with_context(|| format!("Failed to serialize {} record", cf))?;
        self.db
            .put_cf(handle, key, &value)
            .with_context(|| format!("Failed to write to {}", cf))?;
        Ok(())
    }

    /// Deserialize every record whose key starts with `prefix`, in key order.
    fn scan_prefix<T: DeserializeOwned>(
        &self,
        cf: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, T)>> {
        let handle = self.get_cf(cf)?;
        let iter = self
            .db
            .iterator_cf(handle, IteratorMode::From(prefix, Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.context("Failed to read iterator")?;

            // Stop once we've left the prefix range
            if !key.starts_with(prefix) {
                break;
            }

            let record: T = postcard::from_bytes(&value)
                .with_context(|| format!("Failed to deserialize {} record", cf))?;
            rows.push((key.to_vec(), record));
        }
        Ok(rows)
    }
}

impl IndexStore for RocksIndexStore {
    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let cf = self.get_cf(CF_META)?;
        match self
            .db
            .get_cf(cf, encode_meta_key(key))
            .context("Failed to get meta value")?
        {
            Some(bytes) => {
                let value = String::from_utf8(bytes)
                    .with_context(|| format!("Meta value for '{}' is not UTF-8", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_meta(&self, key: &str, value: &str) -> Result<()> {
        let cf = self.get_cf(CF_META)?;
        self.db
            .put_cf(cf, encode_meta_key(key), value.as_bytes())
            .context("Failed to put meta value")?;
        Ok(())
    }

    fn get_instance(&self, addr: Address) -> Result<Option<TrackedInstance>> {
        self.get_record(CF_INSTANCES, &encode_instance_key(addr))
    }

    fn put_instance(&self, instance: &TrackedInstance) -> Result<()> {
        self.put_record(CF_INSTANCES, &encode_instance_key(instance.address), instance)
    }

    fn list_instances(&self) -> Result<Vec<TrackedInstance>> {
        let rows = self.scan_prefix(CF_INSTANCES, b"I")?;
        Ok(rows.into_iter().map(|(_, instance)| instance).collect())
    }

    fn get_employee(
        &self,
        employer: Address,
        employee: Address,
    ) -> Result<Option<EmployeeRecord>> {
        self.get_record(CF_EMPLOYEES, &encode_employee_key(employer, employee))
    }

    fn put_employee(&self, record: &EmployeeRecord) -> Result<()> {
        self.put_record(
            CF_EMPLOYEES,
            &encode_employee_key(record.employer, record.employee),
            record,
        )
    }

    fn get_payment(&self, tx_hash: B256, employee: Address) -> Result<Option<SalaryPayment>> {
        self.get_record(CF_PAYMENTS, &encode_payment_key(tx_hash, employee))
    }

    fn put_payment(&self, payment: &SalaryPayment) -> Result<()> {
        self.put_record(
            CF_PAYMENTS,
            &encode_payment_key(payment.tx_hash, payment.employee),
            payment,
        )
    }

    fn payments_for_tx(&self, tx_hash: B256) -> Result<Vec<SalaryPayment>> {
        let rows = self.scan_prefix(CF_PAYMENTS, &encode_payment_prefix(tx_hash))?;
        Ok(rows.into_iter().map(|(_, payment)| payment).collect())
    }

    fn get_payroll_run(&self, tx_hash: B256) -> Result<Option<PayrollRun>> {
        self.get_record(CF_RUNS, &encode_run_key(tx_hash))
    }

    fn put_payroll_run(&self, run: &PayrollRun) -> Result<()> {
        self.put_record(CF_RUNS, &encode_run_key(run.tx_hash), run)
    }

    fn put_salary_update(&self, entry: &SalaryUpdateEntry) -> Result<()> {
        let key = encode_salary_update_key(
            entry.employer,
            entry.employee,
            entry.block_number,
            entry.log_index,
        );
        self.put_record(CF_UPDATES, &key, entry)
    }

    fn salary_updates(
        &self,
        employer: Address,
        employee: Address,
    ) -> Result<Vec<SalaryUpdateEntry>> {
        let prefix = encode_salary_update_prefix(employer, employee);
        let rows = self.scan_prefix(CF_UPDATES, &prefix)?;
        Ok(rows.into_iter().map(|(_, entry)| entry).collect())
    }
}
