//! JSON-RPC client for Ethereum nodes
//!
//! Provides the read-only [`ChainReader`] interface the indexer consumes
//! and a typed JSON-RPC implementation over HTTP.

use crate::types::{parse_hex_u64, BlockHeader, Log, Receipt};
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

/// Log query for a single contract and event signature over an inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
    pub from_block: u64,
    pub to_block: u64,
}

/// Read-only view of the chain.
///
/// Every call hits the endpoint; nothing is cached. Calls may fail
/// transiently and callers decide how to retry.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current chain height.
    async fn current_height(&self) -> Result<u64>;

    /// Logs emitted by `filter.address` with `filter.topic0` in `[from_block, to_block]`.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>>;

    /// Block header for `number`.
    async fn get_block(&self, number: u64) -> Result<BlockHeader>;

    /// Receipt for `tx_hash`, or `None` if the node does not know it.
    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>>;
}

/// JSON-RPC client for Ethereum nodes.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    /// Create a client whose requests fail after `timeout` at the transport layer.
    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, url })
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }
}

impl LogFilter {
    /// `eth_getLogs` params with hex quantities.
    fn to_params(&self) -> Value {
        json!([{
            "address": format!("0x{:x}", self.address),
            "topics": [format!("0x{:x}", self.topic0)],
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
        }])
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn current_height(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number_str = result
            .as_str()
            .context("Block number response is not a string")?;
        parse_hex_u64(number_str).context("Failed to parse block number")
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let result = self.call("eth_getLogs", filter.to_params()).await?;
        serde_json::from_value(result).context("Failed to deserialize logs")
    }

    async fn get_block(&self, number: u64) -> Result<BlockHeader> {
        let params = json!([format!("0x{:x}", number), false]);
        let result = self.call("eth_getBlockByNumber", params).await?;
        if result.is_null() {
            anyhow::bail!("Block {} not found", number);
        }
        serde_json::from_value(result).context("Failed to deserialize block header")
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        let params = json!([format!("0x{:x}", tx_hash)]);
        let result = self.call("eth_getTransactionReceipt", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .context("Failed to deserialize receipt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    #[test]
    fn test_log_filter_params() {
        let filter = LogFilter {
            address: address!("0742d35Cc6634C0532925a3b844Bc9e7595f0bEb"),
            topic0: b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"),
            from_block: 1000,
            to_block: 50999,
        };
        assert_eq!(
            filter.to_params(),
            json!([{
                "address": "0x0742d35cc6634c0532925a3b844bc9e7595f0beb",
                "topics": ["0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"],
                "fromBlock": "0x3e8",
                "toBlock": "0xc737",
            }])
        );
    }

    #[test]
    fn test_client_with_timeout_builds() {
        let client = RpcClient::with_timeout(
            "http://127.0.0.1:8545".to_string(),
            Duration::from_millis(250),
        );
        assert!(client.is_ok());
    }
}
