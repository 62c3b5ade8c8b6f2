//! Payroll contract events
//!
//! Maps raw logs to a closed set of event variants. Decoding is pure:
//! it never touches the network or the store. Anything that needs extra
//! chain data (timestamps, the receipt join for raw `SalaryPaid` logs)
//! happens later in [`crate::apply`].

use crate::types::Log;
use alloy_primitives::{keccak256, Address, B256};
use anyhow::{Context, Result};

/// Factory event announcing a new payroll instance.
pub const INSTANCE_CREATED_SIGNATURE: &str = "PayrollCreated(address,address)";

/// Confidential token transfer; all three parameters are indexed.
pub const CONFIDENTIAL_TRANSFER_SIGNATURE: &str = "ConfidentialTransfer(address,address,bytes32)";

/// keccak256 of an event signature.
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// Left-pad an address to a 32-byte topic word.
pub fn address_topic(addr: Address) -> B256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_slice());
    B256::from(word)
}

/// Recover an address from an indexed topic (drop the 12 bytes of padding).
pub fn topic_address(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

/// The six events every payroll instance emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    EmployeeOnboarded,
    EmployeeUpdated,
    EmployeeRemoved,
    EmployeeWhitelisted,
    SalaryPaid,
    SalaryClaimed,
}

impl EventKind {
    pub const ALL: [EventKind; 6] = [
        EventKind::EmployeeOnboarded,
        EventKind::EmployeeUpdated,
        EventKind::EmployeeRemoved,
        EventKind::EmployeeWhitelisted,
        EventKind::SalaryPaid,
        EventKind::SalaryClaimed,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::EmployeeOnboarded => "EmployeeOnboarded",
            EventKind::EmployeeUpdated => "EmployeeUpdated",
            EventKind::EmployeeRemoved => "EmployeeRemoved",
            EventKind::EmployeeWhitelisted => "EmployeeWhitelisted",
            EventKind::SalaryPaid => "SalaryPaid",
            EventKind::SalaryClaimed => "SalaryClaimed",
        }
    }

    /// Canonical Solidity signature. Encrypted handles are `bytes32` on the wire.
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::EmployeeOnboarded => "EmployeeOnboarded(address,address,bytes32,bytes,bytes)",
            EventKind::EmployeeUpdated => {
                "EmployeeUpdated(address,address,bytes32,bytes,bytes,uint256,address)"
            }
            EventKind::EmployeeRemoved => "EmployeeRemoved(address)",
            EventKind::EmployeeWhitelisted => "EmployeeWhitelisted(address)",
            EventKind::SalaryPaid => {
                "SalaryPaid(address,address,uint256,bytes32,uint256,bytes32,address)"
            }
            EventKind::SalaryClaimed => "SalaryClaimed(address,bytes32,uint256,bytes32)",
        }
    }

    pub fn topic(&self) -> B256 {
        event_topic(self.signature())
    }

    pub fn from_topic(topic: &B256) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == *topic)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeOnboarded {
    pub employer: Address,
    pub employee: Address,
    pub encrypted_salary: B256,
    pub input_proof: Vec<u8>,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeUpdated {
    pub employer: Address,
    pub employee: Address,
    pub encrypted_salary: B256,
    pub input_proof: Vec<u8>,
    pub signature: Vec<u8>,
    /// Zero means the contract did not stamp the update
    pub timestamp: u64,
    pub payroll_address: Address,
}

/// Where a `SalaryPaid` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaidSource {
    /// Full data section decoded.
    Typed,
    /// Only the indexed topics were usable; the amount handle comes from the receipt.
    RawTopics,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryPaid {
    pub employer: Address,
    pub employee: Address,
    pub index: Option<u64>,
    pub encrypted_amount: Option<B256>,
    pub timestamp: Option<u64>,
    pub payment_id: Option<B256>,
    pub payroll_address: Option<Address>,
    pub source: PaidSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalaryClaimed {
    pub employee: Address,
    pub encrypted_amount: B256,
    pub timestamp: u64,
    /// Transaction that made the payment being claimed
    pub payment_tx: B256,
}

/// A decoded payroll instance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayrollEvent {
    EmployeeOnboarded(EmployeeOnboarded),
    EmployeeUpdated(EmployeeUpdated),
    EmployeeRemoved { employee: Address },
    EmployeeWhitelisted { employee: Address },
    SalaryPaid(SalaryPaid),
    SalaryClaimed(SalaryClaimed),
    Unknown { topic0: Option<B256> },
}

impl PayrollEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PayrollEvent::EmployeeOnboarded(_) => EventKind::EmployeeOnboarded.name(),
            PayrollEvent::EmployeeUpdated(_) => EventKind::EmployeeUpdated.name(),
            PayrollEvent::EmployeeRemoved { .. } => EventKind::EmployeeRemoved.name(),
            PayrollEvent::EmployeeWhitelisted { .. } => EventKind::EmployeeWhitelisted.name(),
            PayrollEvent::SalaryPaid(_) => EventKind::SalaryPaid.name(),
            PayrollEvent::SalaryClaimed(_) => EventKind::SalaryClaimed.name(),
            PayrollEvent::Unknown { .. } => "Unknown",
        }
    }
}

/// Decode a log emitted by a payroll instance.
///
/// Unrecognized topics decode to [`PayrollEvent::Unknown`]. A recognized
/// event with malformed topics or data is an error, except `SalaryPaid`,
/// which falls back to its two indexed addresses.
pub fn decode_log(log: &Log) -> Result<PayrollEvent> {
    let Some(kind) = log.topic0().as_ref().and_then(EventKind::from_topic) else {
        return Ok(PayrollEvent::Unknown {
            topic0: log.topic0(),
        });
    };

    let event = match kind {
        EventKind::EmployeeOnboarded => {
            let words = AbiData::new(&log.data);
            PayrollEvent::EmployeeOnboarded(EmployeeOnboarded {
                employer: indexed_address(log, 1)?,
                employee: indexed_address(log, 2)?,
                encrypted_salary: words.b256(0)?,
                input_proof: words.bytes(1)?,
                signature: words.bytes(2)?,
            })
        }
        EventKind::EmployeeUpdated => {
            let words = AbiData::new(&log.data);
            PayrollEvent::EmployeeUpdated(EmployeeUpdated {
                employer: indexed_address(log, 1)?,
                employee: indexed_address(log, 2)?,
                encrypted_salary: words.b256(0)?,
                input_proof: words.bytes(1)?,
                signature: words.bytes(2)?,
                timestamp: words.u64(3)?,
                payroll_address: words.address(4)?,
            })
        }
        EventKind::EmployeeRemoved => PayrollEvent::EmployeeRemoved {
            employee: indexed_address(log, 1)?,
        },
        EventKind::EmployeeWhitelisted => PayrollEvent::EmployeeWhitelisted {
            employee: indexed_address(log, 1)?,
        },
        EventKind::SalaryPaid => PayrollEvent::SalaryPaid(decode_salary_paid(log)?),
        EventKind::SalaryClaimed => {
            let words = AbiData::new(&log.data);
            PayrollEvent::SalaryClaimed(SalaryClaimed {
                employee: indexed_address(log, 1)?,
                encrypted_amount: words.b256(0)?,
                timestamp: words.u64(1)?,
                payment_tx: words.b256(2)?,
            })
        }
    };

    Ok(event)
}

fn decode_salary_paid(log: &Log) -> Result<SalaryPaid> {
    let employer = indexed_address(log, 1)?;
    let employee = indexed_address(log, 2)?;

    let words = AbiData::new(&log.data);
    let typed = (|| -> Result<SalaryPaid> {
        Ok(SalaryPaid {
            employer,
            employee,
            index: Some(words.u64(0)?),
            encrypted_amount: Some(words.b256(1)?),
            timestamp: Some(words.u64(2)?),
            payment_id: Some(words.b256(3)?),
            payroll_address: Some(words.address(4)?),
            source: PaidSource::Typed,
        })
    })();

    match typed {
        Ok(paid) => Ok(paid),
        Err(e) => {
            tracing::debug!(
                "SalaryPaid data not decodable ({:#}), using indexed topics only",
                e
            );
            Ok(SalaryPaid {
                employer,
                employee,
                index: None,
                encrypted_amount: None,
                timestamp: None,
                payment_id: None,
                payroll_address: None,
                source: PaidSource::RawTopics,
            })
        }
    }
}

/// Decode the factory's created event into (creator, instance).
///
/// The instance address is read from the second indexed topic, or from
/// the first data word when it is not indexed.
pub fn decode_instance_created(log: &Log) -> Result<(Address, Address)> {
    let creator = indexed_address(log, 1)?;
    let instance = match log.topics.get(2) {
        Some(topic) => topic_address(topic),
        None => AbiData::new(&log.data)
            .address(0)
            .context("Created event carries no instance address")?,
    };
    Ok((creator, instance))
}

/// Find the ciphertext handle a receipt transferred to `employee`.
///
/// Matches the first `ConfidentialTransfer` whose `to` topic is the
/// employee and returns its third indexed topic.
pub fn find_transfer_handle(logs: &[Log], employee: Address) -> Option<B256> {
    let transfer = event_topic(CONFIDENTIAL_TRANSFER_SIGNATURE);
    let to = address_topic(employee);
    logs.iter()
        .filter(|log| log.topics.len() >= 4)
        .find(|log| log.topics[0] == transfer && log.topics[2] == to)
        .map(|log| log.topics[3])
}

fn indexed_address(log: &Log, position: usize) -> Result<Address> {
    log.topics
        .get(position)
        .map(topic_address)
        .with_context(|| format!("Missing indexed topic {}", position))
}

/// Reader over ABI-encoded event data (head words followed by dynamic tails).
struct AbiData<'a> {
    data: &'a [u8],
}

impl<'a> AbiData<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8]> {
        let end = offset.checked_add(32).context("ABI offset overflow")?;
        self.data.get(offset..end).with_context(|| {
            format!(
                "Event data too short: need {} bytes, have {}",
                end,
                self.data.len()
            )
        })
    }

    fn word(&self, index: usize) -> Result<&'a [u8]> {
        self.word_at(index * 32)
    }

    fn b256(&self, index: usize) -> Result<B256> {
        Ok(B256::from_slice(self.word(index)?))
    }

    fn address(&self, index: usize) -> Result<Address> {
        let word = self.word(index)?;
        if word[..12].iter().any(|b| *b != 0) {
            anyhow::bail!("Word {} is not a left-padded address", index);
        }
        Ok(Address::from_slice(&word[12..]))
    }

    fn u64(&self, index: usize) -> Result<u64> {
        word_to_u64(self.word(index)?).with_context(|| format!("Word {} overflows u64", index))
    }

    /// Dynamic `bytes` whose head word at `index` holds the tail offset.
    fn bytes(&self, index: usize) -> Result<Vec<u8>> {
        let offset = usize::try_from(self.u64(index)?).context("Offset overflows usize")?;
        let len_word = self.word_at(offset)?;
        let len = usize::try_from(word_to_u64(len_word).context("Length overflows u64")?)
            .context("Length overflows usize")?;
        let start = offset + 32;
        let end = start.checked_add(len).context("ABI length overflow")?;
        self.data
            .get(start..end)
            .map(|b| b.to_vec())
            .with_context(|| format!("Dynamic bytes out of range: {}..{}", start, end))
    }
}

fn word_to_u64(word: &[u8]) -> Option<u64> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let tail: [u8; 8] = word[24..].try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}
