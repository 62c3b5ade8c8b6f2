//! Payroll indexer - resumable event indexer for FHE payroll contracts
//!
//! This library discovers payroll instances deployed by a factory contract,
//! follows each instance's events with per-contract watermarks, and keeps
//! employees, salary payments, payroll runs and salary history in a
//! persistent store.

pub mod keys;
pub mod records;
pub mod store;
pub mod memory;
pub mod cli;

// Chain access
pub mod rpc;
pub mod types;
pub mod events;
pub mod fetch;

// Indexing
pub mod apply;
pub mod backfill;
pub mod config;
pub mod factory;
pub mod indexer;
pub mod scheduler;

#[cfg(test)]
mod testing;

// Re-export the main types for convenience
pub use events::PayrollEvent;
pub use indexer::{Indexer, IndexerSettings};
pub use memory::MemoryIndexStore;
pub use records::{
    EmployeeRecord, PayrollRun, PayrollRunView, SalaryPayment, SalaryUpdateEntry, TrackedInstance,
};
pub use rpc::{ChainReader, RpcClient};
pub use store::{IndexStore, RocksIndexStore};
