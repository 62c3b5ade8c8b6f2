//! Payroll event indexer binary
//!
//! Polls the factory for new payroll instances and mirrors every instance's
//! events into the local store, resuming from stored watermarks.

use anyhow::{Context, Result};
use clap::Parser;
use payroll_indexer::config::{load_instance_list, IndexerArgs};
use payroll_indexer::indexer::Indexer;
use payroll_indexer::rpc::RpcClient;
use payroll_indexer::store::RocksIndexStore;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = IndexerArgs::parse();

    info!("Starting payroll indexer");
    info!("RPC URL: {}", args.chain.rpc_url);
    info!("Factory: {:?}", args.chain.factory_address);
    info!("Database: {:?}", args.chain.db_path);

    // Create RPC client
    let rpc = RpcClient::with_timeout(args.chain.rpc_url.clone(), args.chain.rpc_timeout())
        .context("Failed to create RPC client")?;

    // Open index store
    let store = RocksIndexStore::open(&args.chain.db_path)
        .with_context(|| format!("Failed to open database at {:?}", args.chain.db_path))?;

    let indexer = Indexer::new(Arc::new(store), Arc::new(rpc), args.settings());

    if let Some(path) = &args.instances {
        let instances = load_instance_list(path).context("Failed to load instance list")?;
        let created = indexer.register_instances(&instances)?;
        info!(
            "Loaded {} instances from {:?} ({} new)",
            instances.len(),
            path,
            created
        );
    }

    // Handle Ctrl+C gracefully
    tokio::select! {
        result = indexer.run() => {
            result.context("Indexer error")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
    }

    info!("Indexer stopped");
    Ok(())
}
