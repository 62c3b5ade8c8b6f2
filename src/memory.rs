//! In-memory storage backend.
//!
//! Same semantics as [`RocksIndexStore`](crate::store::RocksIndexStore),
//! backed by ordered maps. All data is lost when the process exits.

use crate::records::{
    EmployeeRecord, PayrollRun, SalaryPayment, SalaryUpdateEntry, TrackedInstance,
};
use crate::store::IndexStore;
use alloy_primitives::{Address, B256};
use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    meta: HashMap<String, String>,
    instances: BTreeMap<Address, TrackedInstance>,
    employees: BTreeMap<(Address, Address), EmployeeRecord>,
    payments: BTreeMap<(B256, Address), SalaryPayment>,
    runs: HashMap<B256, PayrollRun>,
    updates: BTreeMap<(Address, Address, u64, u64), SalaryUpdateEntry>,
}

/// In-memory index store.
#[derive(Default)]
pub struct MemoryIndexStore {
    tables: Mutex<Tables>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    /// Total number of stored payments.
    pub fn payment_count(&self) -> Result<usize> {
        Ok(self.tables()?.payments.len())
    }

    /// Total number of stored employee rows.
    pub fn employee_count(&self) -> Result<usize> {
        Ok(self.tables()?.employees.len())
    }
}

impl IndexStore for MemoryIndexStore {
    fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tables()?.meta.get(key).cloned())
    }

    fn put_meta(&self, key: &str, value: &str) -> Result<()> {
        self.tables()?.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_instance(&self, addr: Address) -> Result<Option<TrackedInstance>> {
        Ok(self.tables()?.instances.get(&addr).cloned())
    }

    fn put_instance(&self, instance: &TrackedInstance) -> Result<()> {
        self.tables()?
            .instances
            .insert(instance.address, instance.clone());
        Ok(())
    }

    fn list_instances(&self) -> Result<Vec<TrackedInstance>> {
        Ok(self.tables()?.instances.values().cloned().collect())
    }

    fn get_employee(
        &self,
        employer: Address,
        employee: Address,
    ) -> Result<Option<EmployeeRecord>> {
        Ok(self.tables()?.employees.get(&(employer, employee)).cloned())
    }

    fn put_employee(&self, record: &EmployeeRecord) -> Result<()> {
        self.tables()?
            .employees
            .insert((record.employer, record.employee), record.clone());
        Ok(())
    }

    fn get_payment(&self, tx_hash: B256, employee: Address) -> Result<Option<SalaryPayment>> {
        Ok(self.tables()?.payments.get(&(tx_hash, employee)).cloned())
    }

    fn put_payment(&self, payment: &SalaryPayment) -> Result<()> {
        self.tables()?
            .payments
            .insert((payment.tx_hash, payment.employee), payment.clone());
        Ok(())
    }

    fn payments_for_tx(&self, tx_hash: B256) -> Result<Vec<SalaryPayment>> {
        let tables = self.tables()?;
        let range = (tx_hash, Address::ZERO)..=(tx_hash, Address::repeat_byte(0xff));
        Ok(tables.payments.range(range).map(|(_, p)| p.clone()).collect())
    }

    fn get_payroll_run(&self, tx_hash: B256) -> Result<Option<PayrollRun>> {
        Ok(self.tables()?.runs.get(&tx_hash).cloned())
    }

    fn put_payroll_run(&self, run: &PayrollRun) -> Result<()> {
        self.tables()?.runs.insert(run.tx_hash, run.clone());
        Ok(())
    }

    fn put_salary_update(&self, entry: &SalaryUpdateEntry) -> Result<()> {
        let key = (
            entry.employer,
            entry.employee,
            entry.block_number,
            entry.log_index,
        );
        self.tables()?.updates.insert(key, entry.clone());
        Ok(())
    }

    fn salary_updates(
        &self,
        employer: Address,
        employee: Address,
    ) -> Result<Vec<SalaryUpdateEntry>> {
        let tables = self.tables()?;
        let range = (employer, employee, 0, 0)..=(employer, employee, u64::MAX, u64::MAX);
        Ok(tables.updates.range(range).map(|(_, e)| e.clone()).collect())
    }
}
