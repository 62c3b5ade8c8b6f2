//! Key encoding utilities
//!
//! All keys use a single-byte prefix followed by binary data.
//! This keeps keys deterministic and lexicographically ordered in RocksDB,
//! so rows sharing a leading component can be read with a prefix scan.

use alloy_primitives::{Address, B256};

/// Encode a meta key.
///
/// Format: byte 'M' (0x4D) + UTF-8 key name
pub fn encode_meta_key(name: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + name.len());
    key.push(b'M');
    key.extend_from_slice(name.as_bytes());
    key
}

/// Encode a tracked instance key.
///
/// Format: byte 'I' (0x49) + address (20 bytes)
/// Total length: 21 bytes
pub fn encode_instance_key(addr: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.push(b'I');
    key.extend_from_slice(addr.as_slice());
    key
}

/// Encode an employee key.
///
/// Format: byte 'E' (0x45) + employer (20 bytes) + employee (20 bytes)
/// Total length: 41 bytes
pub fn encode_employee_key(employer: Address, employee: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(41);
    key.push(b'E');
    key.extend_from_slice(employer.as_slice());
    key.extend_from_slice(employee.as_slice());
    key
}

/// Encode a salary payment key.
///
/// Format: byte 'P' (0x50) + tx_hash (32 bytes) + employee (20 bytes)
/// Total length: 53 bytes
pub fn encode_payment_key(tx_hash: B256, employee: Address) -> Vec<u8> {
    let mut key = encode_payment_prefix(tx_hash);
    key.extend_from_slice(employee.as_slice());
    key
}

/// Prefix shared by every payment made in `tx_hash`.
///
/// Format: byte 'P' (0x50) + tx_hash (32 bytes)
pub fn encode_payment_prefix(tx_hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(53);
    key.push(b'P');
    key.extend_from_slice(tx_hash.as_slice());
    key
}

/// Encode a payroll run key.
///
/// Format: byte 'R' (0x52) + tx_hash (32 bytes)
/// Total length: 33 bytes
pub fn encode_run_key(tx_hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(b'R');
    key.extend_from_slice(tx_hash.as_slice());
    key
}

/// Encode a salary update history key.
///
/// Format: byte 'U' (0x55) + employer (20 bytes) + employee (20 bytes)
///         + block_number (8 bytes, big-endian) + log_index (8 bytes, big-endian)
/// Total length: 57 bytes
pub fn encode_salary_update_key(
    employer: Address,
    employee: Address,
    block: u64,
    log_index: u64,
) -> Vec<u8> {
    let mut key = encode_salary_update_prefix(employer, employee);
    key.extend_from_slice(&block.to_be_bytes());
    key.extend_from_slice(&log_index.to_be_bytes());
    key
}

/// Prefix shared by every salary update for (employer, employee).
pub fn encode_salary_update_prefix(employer: Address, employee: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(57);
    key.push(b'U');
    key.extend_from_slice(employer.as_slice());
    key.extend_from_slice(employee.as_slice());
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn test_meta_key_encoding() {
        let key = encode_meta_key("0xabc_lastIndexedBlock");
        assert_eq!(key[0], b'M');
        assert_eq!(&key[1..], b"0xabc_lastIndexedBlock");
    }

    #[test]
    fn test_employee_key_encoding() {
        let employer = address!("00000000000000000000000000000000000000c1");
        let employee = address!("0000000000000000000000000000000000000eee");
        let key = encode_employee_key(employer, employee);
        assert_eq!(key.len(), 41);
        assert_eq!(key[0], b'E');
        assert_eq!(&key[1..21], employer.as_slice());
        assert_eq!(&key[21..], employee.as_slice());
    }

    #[test]
    fn test_payment_key_shares_tx_prefix() {
        let tx = b256!("00000000000000000000000000000000000000000000000000000000000000f1");
        let a = encode_payment_key(tx, address!("0000000000000000000000000000000000000001"));
        let b = encode_payment_key(tx, address!("0000000000000000000000000000000000000002"));
        let prefix = encode_payment_prefix(tx);
        assert_eq!(a.len(), 53);
        assert!(a.starts_with(&prefix));
        assert!(b.starts_with(&prefix));
        assert!(a < b);
    }

    #[test]
    fn test_salary_update_key_ordering() {
        let employer = address!("00000000000000000000000000000000000000c1");
        let employee = address!("0000000000000000000000000000000000000eee");
        let early = encode_salary_update_key(employer, employee, 100, 7);
        let late = encode_salary_update_key(employer, employee, 101, 0);
        assert!(early < late);
        assert_eq!(early.len(), 57);
        assert!(early.starts_with(&encode_salary_update_prefix(employer, employee)));
    }
}
