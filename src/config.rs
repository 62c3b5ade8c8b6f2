//! Configuration and instance list loading
//!
//! Command-line arguments for the `indexer` and `backfill` binaries, each
//! with an environment variable fallback, and the optional instance seed file.

use crate::fetch::{RetryPolicy, DEFAULT_WINDOW_BLOCKS};
use crate::indexer::IndexerSettings;
use crate::records::TrackedInstance;
use alloy_primitives::{Address, B256};
use anyhow::{Context, Result};
use clap::{Args, Parser};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Arguments shared by every binary that talks to the chain.
#[derive(Debug, Clone, Args)]
pub struct ChainArgs {
    /// RPC endpoint URL
    #[arg(long, env = "RPC_URL")]
    pub rpc_url: String,

    /// Payroll factory contract address
    #[arg(long, env = "FACTORY_ADDRESS", value_parser = parse_address)]
    pub factory_address: Address,

    /// First block to scan when the factory has never been indexed
    #[arg(long, env = "FACTORY_START_BLOCK", default_value_t = 0)]
    pub factory_start_block: u64,

    /// Path to RocksDB database directory
    #[arg(long, env = "DB_PATH", default_value = "./payroll_db")]
    pub db_path: PathBuf,

    /// Blocks below the head that are not indexed yet
    #[arg(long, env = "CONFIRMATIONS", default_value_t = 2)]
    pub confirmations: u64,

    /// Maximum block span of a single log query
    #[arg(long, env = "LOG_WINDOW_BLOCKS", default_value_t = DEFAULT_WINDOW_BLOCKS)]
    pub window_blocks: u64,

    /// Instances indexed concurrently
    #[arg(long, env = "INDEXER_CONCURRENCY", default_value_t = 5)]
    pub concurrency: usize,

    /// Per-request RPC timeout in milliseconds
    #[arg(long, env = "RPC_TIMEOUT_MS", default_value_t = 30_000)]
    pub rpc_timeout_ms: u64,

    /// Attempts per log window before it is reported as failed
    #[arg(long, env = "RPC_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: usize,

    /// First retry delay in milliseconds (doubles per attempt)
    #[arg(long, env = "RPC_RETRY_DELAY_MS", default_value_t = 500)]
    pub retry_delay_ms: u64,
}

impl ChainArgs {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Indexer settings for these arguments with the given poll interval.
    pub fn settings(&self, poll_interval: Duration) -> IndexerSettings {
        IndexerSettings {
            factory_address: self.factory_address,
            factory_start_block: self.factory_start_block,
            confirmations: self.confirmations,
            window_size: self.window_blocks.max(1),
            concurrency: self.concurrency.max(1),
            poll_interval,
            retry: RetryPolicy {
                attempts: self.retry_attempts.max(1),
                min_delay: Duration::from_millis(self.retry_delay_ms),
                ..RetryPolicy::default()
            },
        }
    }
}

/// Payroll event indexer
#[derive(Debug, Parser)]
#[command(name = "indexer")]
#[command(about = "Index payroll factory and instance events into a local store")]
pub struct IndexerArgs {
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Delay between indexing cycles in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 15_000)]
    pub poll_interval_ms: u64,

    /// Instance list to register before the first cycle
    #[arg(long, env = "INSTANCES_FILE")]
    pub instances: Option<PathBuf>,
}

impl IndexerArgs {
    pub fn settings(&self) -> IndexerSettings {
        self.chain
            .settings(Duration::from_millis(self.poll_interval_ms))
    }
}

/// One-shot payroll backfill
#[derive(Debug, Parser)]
#[command(name = "backfill")]
#[command(about = "Re-index a fixed block range without touching watermarks")]
pub struct BackfillArgs {
    #[command(flatten)]
    pub chain: ChainArgs,

    /// First block of the range (inclusive)
    #[arg(long, env = "BLOCK_FROM")]
    pub from_block: u64,

    /// Last block of the range (inclusive)
    #[arg(long, env = "BLOCK_TO")]
    pub to_block: u64,

    /// Write into an in-memory store instead of the database
    #[arg(long)]
    pub dry_run: bool,
}

/// Load an instance list from a file.
///
/// Each line is `address,creator[,deployed_block]`. The creator is the
/// employer that owns every employee row of the instance, so it is required.
/// A missing block means the instance is only indexed from the head onwards.
/// Empty lines and lines starting with '#' are ignored.
///
/// # Example file format:
/// ```text
/// 0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb,0xdAC17F958D2ee523a2206206994597C13D831ec7,18500000
/// 0x00000000000000000000000000000000000000aa,0x00000000000000000000000000000000000000c1
/// # This is a comment
/// ```
pub fn load_instance_list(path: &Path) -> Result<Vec<TrackedInstance>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read instance list file: {:?}", path))?;

    let mut instances = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let instance = parse_instance_line(line)
            .with_context(|| format!("Invalid entry on line {}: {}", line_num + 1, line))?;
        instances.push(instance);
    }

    if instances.is_empty() {
        anyhow::bail!("Instance list is empty (no valid entries found)");
    }

    Ok(instances)
}

fn parse_instance_line(line: &str) -> Result<TrackedInstance> {
    let mut fields = line.split(',').map(str::trim);

    let address = parse_address(fields.next().unwrap_or_default())?;
    let creator = match fields.next() {
        Some(s) if !s.is_empty() => parse_address(s)?,
        _ => anyhow::bail!("Missing creator address"),
    };
    let deployed_at_block = match fields.next() {
        Some(s) if !s.is_empty() => Some(
            s.parse::<u64>()
                .with_context(|| format!("Invalid block number: {}", s))?,
        ),
        _ => None,
    };
    if fields.next().is_some() {
        anyhow::bail!("Too many fields");
    }

    Ok(TrackedInstance::registered(address, creator, deployed_at_block))
}

/// Pad an odd-length hex string with a leading zero.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

fn decode_hex_exact(s: &str, len: usize, what: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex {}: {}", what, s))?;
    if bytes.len() != len {
        anyhow::bail!(
            "{} must be {} bytes ({} hex chars), got {} bytes",
            what,
            len,
            len * 2,
            bytes.len()
        );
    }
    Ok(bytes)
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    Ok(Address::from_slice(&decode_hex_exact(s, 20, "address")?))
}

/// Parse a 32-byte hash from a hex string, with or without 0x prefix.
pub fn parse_hash(s: &str) -> Result<B256> {
    Ok(B256::from_slice(&decode_hex_exact(s, 32, "hash")?))
}
