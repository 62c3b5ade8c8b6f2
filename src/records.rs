//! Record types for indexed payroll data
//!
//! These structs represent the rows stored in the index store.
//! They use postcard for binary serialization, which is compact and deterministic,
//! and serde_json for operator output.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};

/// A per-employer payroll contract discovered from the factory (or registered by hand).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedInstance {
    /// Instance contract address (unique key)
    pub address: Address,
    /// Employer that deployed the instance through the factory
    pub creator: Address,
    /// Block the factory reported the deployment in, if known
    pub deployed_at_block: Option<u64>,
    /// Last block whose events have been applied (monotonic)
    pub last_indexed_block: u64,
}

impl TrackedInstance {
    /// An instance first seen in the factory's created event at `block`.
    pub fn discovered(address: Address, creator: Address, block: u64) -> Self {
        Self {
            address,
            creator,
            deployed_at_block: Some(block),
            last_indexed_block: block,
        }
    }

    /// An instance registered by an operator, with an optional deployment block.
    pub fn registered(address: Address, creator: Address, deployed_at_block: Option<u64>) -> Self {
        Self {
            address,
            creator,
            deployed_at_block,
            last_indexed_block: deployed_at_block.unwrap_or(0),
        }
    }
}

/// Employee state for one employer.
///
/// Rows are never deleted; removal is a soft flag with a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub employer: Address,
    pub employee: Address,
    /// Instance contract the employee was onboarded through
    pub payroll_address: Address,
    pub whitelisted: bool,
    /// Ciphertext handle of the current encrypted salary
    pub encrypted_salary_handle: B256,
    pub input_proof: Vec<u8>,
    pub signature: Vec<u8>,
    /// Unix seconds of first onboarding
    pub added_at: u64,
    /// Unix seconds of removal, cleared on reinstatement
    pub removed_at: Option<u64>,
}

/// One salary payment, keyed by (tx_hash, employee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryPayment {
    pub employer: Address,
    pub employee: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    /// Canonical ciphertext handle of the paid amount (None if it could not be recovered)
    pub encrypted_amount_handle: Option<B256>,
    /// Position of the payment in the payroll batch, when the event carried it
    pub payment_index: Option<u64>,
    pub payment_id: Option<B256>,
    /// Unix seconds
    pub timestamp: u64,
    pub claimed: bool,
    pub claimed_at: Option<u64>,
    pub payroll_address: Address,
}

/// One payroll run, keyed by the transaction that paid it.
///
/// The employee count is not stored; see [`PayrollRunView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRun {
    pub employer: Address,
    pub tx_hash: B256,
    pub block_number: u64,
    /// Unix seconds
    pub timestamp: u64,
    pub payroll_address: Address,
}

/// A payroll run together with its employee count, computed from the
/// payments recorded for its transaction at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayrollRunView {
    #[serde(flatten)]
    pub run: PayrollRun,
    pub employee_count: u64,
}

/// Append-only history entry written for each salary update event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalaryUpdateEntry {
    pub employer: Address,
    pub employee: Address,
    pub payroll_address: Address,
    pub encrypted_salary_handle: B256,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    /// Unix seconds
    pub timestamp: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn test_discovered_instance_starts_at_deployment() {
        let inst = TrackedInstance::discovered(
            address!("00000000000000000000000000000000000000aa"),
            address!("00000000000000000000000000000000000000c1"),
            1000,
        );
        assert_eq!(inst.deployed_at_block, Some(1000));
        assert_eq!(inst.last_indexed_block, 1000);
    }

    #[test]
    fn test_registered_instance_without_block() {
        let inst = TrackedInstance::registered(
            address!("00000000000000000000000000000000000000aa"),
            Address::ZERO,
            None,
        );
        assert_eq!(inst.deployed_at_block, None);
        assert_eq!(inst.last_indexed_block, 0);
    }

    #[test]
    fn test_payment_postcard_encoding() {
        let payment = SalaryPayment {
            employer: address!("00000000000000000000000000000000000000c1"),
            employee: address!("0000000000000000000000000000000000000eee"),
            tx_hash: b256!("0000000000000000000000000000000000000000000000000000000000000071"),
            block_number: 1015,
            encrypted_amount_handle: Some(b256!(
                "00000000000000000000000000000000000000000000000000000000000000a1"
            )),
            payment_index: Some(0),
            payment_id: None,
            timestamp: 1_700_000_000,
            claimed: false,
            claimed_at: None,
            payroll_address: address!("00000000000000000000000000000000000000aa"),
        };
        let bytes = postcard::to_allocvec(&payment).unwrap();
        let decoded: SalaryPayment = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, payment);
    }

    #[test]
    fn test_run_view_json_flattens_run() {
        let view = PayrollRunView {
            run: PayrollRun {
                employer: Address::ZERO,
                tx_hash: B256::ZERO,
                block_number: 7,
                timestamp: 9,
                payroll_address: Address::ZERO,
            },
            employee_count: 3,
        };
        let value = serde_json::to_value(&view).unwrap();
        assert_eq!(value["employee_count"], 3);
        assert_eq!(value["block_number"], 7);
    }
}
