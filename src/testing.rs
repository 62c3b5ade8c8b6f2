//! Test fixtures: an in-memory chain and log builders.

use crate::rpc::{ChainReader, LogFilter};
use crate::types::{BlockHeader, Log, Receipt};
use alloy_primitives::{Address, B256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// One ABI value for [`abi_encode`].
pub enum AbiValue {
    Word(B256),
    Uint(u64),
    Address(Address),
    Bytes(Vec<u8>),
}

/// ABI-encode a tuple of static words and dynamic `bytes`.
pub fn abi_encode(values: &[AbiValue]) -> Vec<u8> {
    let head_len = values.len() * 32;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for value in values {
        let mut word = [0u8; 32];
        match value {
            AbiValue::Word(b) => word.copy_from_slice(b.as_slice()),
            AbiValue::Uint(n) => word[24..].copy_from_slice(&n.to_be_bytes()),
            AbiValue::Address(a) => word[12..].copy_from_slice(a.as_slice()),
            AbiValue::Bytes(bytes) => {
                let offset = (head_len + tail.len()) as u64;
                word[24..].copy_from_slice(&offset.to_be_bytes());

                let mut len = [0u8; 32];
                len[24..].copy_from_slice(&(bytes.len() as u64).to_be_bytes());
                tail.extend_from_slice(&len);
                tail.extend_from_slice(bytes);
                let pad = (32 - bytes.len() % 32) % 32;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
        }
        head.extend_from_slice(&word);
    }

    head.extend_from_slice(&tail);
    head
}

pub struct LogBuilder {
    log: Log,
}

impl LogBuilder {
    pub fn new(address: Address, topic0: B256) -> Self {
        let mut builder = Self::anonymous(address);
        builder.log.topics.push(topic0);
        builder
    }

    pub fn anonymous(address: Address) -> Self {
        Self {
            log: Log {
                address,
                topics: Vec::new(),
                data: Vec::new(),
                block_number: 0,
                transaction_hash: B256::ZERO,
                log_index: 0,
                removed: false,
            },
        }
    }

    pub fn topic(mut self, topic: B256) -> Self {
        self.log.topics.push(topic);
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.log.data = data;
        self
    }

    pub fn at(mut self, block: u64, log_index: u64) -> Self {
        self.log.block_number = block;
        self.log.log_index = log_index;
        self
    }

    pub fn tx(mut self, tx_hash: B256) -> Self {
        self.log.transaction_hash = tx_hash;
        self
    }

    pub fn removed(mut self) -> Self {
        self.log.removed = true;
        self
    }

    pub fn build(self) -> Log {
        self.log
    }
}

#[derive(Default)]
struct FakeState {
    height: u64,
    logs: Vec<Log>,
    receipts: HashMap<B256, Receipt>,
    timestamps: HashMap<u64, u64>,
    failing: Vec<(u64, u64)>,
    log_calls: usize,
}

/// In-memory [`ChainReader`] with injectable failures.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(height: u64) -> Self {
        let chain = Self::default();
        chain.set_height(height);
        chain
    }

    pub fn set_height(&self, height: u64) {
        self.state.lock().unwrap().height = height;
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn add_receipt(&self, tx_hash: B256, logs: Vec<Log>) {
        let receipt = Receipt {
            transaction_hash: tx_hash,
            block_number: logs.first().map_or(0, |l| l.block_number),
            status: Some(1),
            logs,
        };
        self.state.lock().unwrap().receipts.insert(tx_hash, receipt);
    }

    pub fn set_timestamp(&self, block: u64, timestamp: u64) {
        self.state.lock().unwrap().timestamps.insert(block, timestamp);
    }

    /// Make every `get_logs` call overlapping `[from, to]` fail.
    pub fn fail_range(&self, from: u64, to: u64) {
        self.state.lock().unwrap().failing.push((from, to));
    }

    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failing.clear();
    }

    pub fn log_calls(&self) -> usize {
        self.state.lock().unwrap().log_calls
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn current_height(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().height)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        let mut state = self.state.lock().unwrap();
        state.log_calls += 1;
        if state
            .failing
            .iter()
            .any(|(from, to)| *from <= filter.to_block && filter.from_block <= *to)
        {
            anyhow::bail!(
                "injected failure for blocks {}..={}",
                filter.from_block,
                filter.to_block
            );
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == filter.address
                    && log.topic0() == Some(filter.topic0)
                    && (filter.from_block..=filter.to_block).contains(&log.block_number)
            })
            .cloned()
            .collect())
    }

    async fn get_block(&self, number: u64) -> Result<BlockHeader> {
        let state = self.state.lock().unwrap();
        match state.timestamps.get(&number) {
            Some(timestamp) => Ok(BlockHeader {
                number,
                timestamp: *timestamp,
            }),
            None => anyhow::bail!("unknown block {}", number),
        }
    }

    async fn get_transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&tx_hash).cloned())
    }
}
