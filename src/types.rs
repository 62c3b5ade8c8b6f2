//! Ethereum JSON-RPC types
//!
//! Type definitions for logs, receipts, and block headers
//! returned from Ethereum JSON-RPC endpoints.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Deserializer};

/// Log entry emitted by a contract, as returned by `eth_getLogs` or inside a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log
    #[serde(rename = "address", deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature, topics[1..] = indexed params)
    #[serde(rename = "topics", default, deserialize_with = "deserialize_hex_b256_vec")]
    pub topics: Vec<B256>,

    /// Non-indexed event data (hex string)
    #[serde(rename = "data", default, deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    /// Block the log was included in (missing for pending logs)
    #[serde(rename = "blockNumber", default, deserialize_with = "deserialize_hex_u64_or_zero")]
    pub block_number: u64,

    /// Hash of the transaction that emitted the log
    #[serde(rename = "transactionHash", default, deserialize_with = "deserialize_hex_b256_or_zero")]
    pub transaction_hash: B256,

    /// Position of the log within its block
    #[serde(rename = "logIndex", default, deserialize_with = "deserialize_hex_u64_or_zero")]
    pub log_index: u64,

    /// Set by the node when the log was dropped by a reorg
    #[serde(rename = "removed", default)]
    pub removed: bool,
}

impl Log {
    /// The event signature topic, if any.
    pub fn topic0(&self) -> Option<B256> {
        self.topics.first().copied()
    }

    /// Ordering key within the chain: (block number, log index).
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Transaction receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    /// Transaction hash (hex string in JSON)
    #[serde(rename = "transactionHash", deserialize_with = "deserialize_hex_b256")]
    pub transaction_hash: B256,

    /// Block number (hex string in JSON)
    #[serde(rename = "blockNumber", default, deserialize_with = "deserialize_hex_u64_or_zero")]
    pub block_number: u64,

    /// Transaction status: 1 = success, 0 = failure (absent on pre-Byzantium chains)
    #[serde(rename = "status", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub status: Option<u64>,

    /// Logs emitted during transaction execution (empty for reverted txs)
    #[serde(rename = "logs", default)]
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Check if the transaction succeeded. Receipts without a status are treated as successful.
    pub fn is_success(&self) -> bool {
        self.status.map_or(true, |s| s == 1)
    }
}

/// The subset of a block header the indexer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct BlockHeader {
    /// Block number (hex string in JSON, parsed to u64)
    #[serde(rename = "number", deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Block timestamp in Unix seconds (hex string in JSON)
    #[serde(rename = "timestamp", deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse a `0x`-prefixed quantity into a u64.
pub(crate) fn parse_hex_u64(s: &str) -> Result<u64, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 16)
}

/// Parse a hex string into exactly 32 bytes.
pub(crate) fn parse_b256(s: &str) -> Result<B256, String> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("Expected 32 bytes for hash, got {}", bytes.len()));
    }
    Ok(B256::from_slice(&bytes))
}

/// Deserialize a hex string to u64.
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

/// Deserialize an optional hex string to u64.
fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_hex_u64(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Deserialize a hex string (or null) to u64, treating null as zero.
fn deserialize_hex_u64_or_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_hex_u64_opt(deserializer)?.unwrap_or(0))
}

/// Deserialize a hex string to B256.
fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_b256(&s).map_err(serde::de::Error::custom)
}

/// Deserialize a hex string (or null) to B256, treating null as zero.
fn deserialize_hex_b256_or_zero<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_b256(&s).map_err(serde::de::Error::custom),
        None => Ok(B256::ZERO),
    }
}

/// Deserialize a list of hex strings to B256 topics.
fn deserialize_hex_b256_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| parse_b256(s).map_err(serde::de::Error::custom))
        .collect()
}

/// Deserialize a hex string to Address.
fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != 20 {
        return Err(serde::de::Error::custom(format!(
            "Expected 20 bytes for address, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

/// Deserialize a hex string to bytes.
fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        let s = pad_hex_string(s);
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}
