//! CLI implementation for indexctl
//!
//! Provides an operator-facing command-line interface over the index
//! store. All commands output pretty JSON.

use crate::config::{parse_address, parse_hash};
use crate::records::TrackedInstance;
use crate::store::{IndexStore, RocksIndexStore};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;

/// Payroll index CLI tool
#[derive(Parser)]
#[command(name = "indexctl")]
#[command(about = "Inspect the payroll index store")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, env = "DB_PATH", default_value = "./payroll_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get a raw watermark value
    Watermark {
        /// Meta key, e.g. 0x<factory>_lastIndexedBlock or 0x<instance>
        key: String,
    },
    /// List tracked instances
    Instances,
    /// Track an instance by hand
    RegisterInstance {
        /// Instance contract address (hex, with or without 0x prefix)
        address: String,
        /// Employer that owns the instance
        creator: String,
        /// Deployment block; without it indexing starts at the head
        #[arg(long)]
        deployed_at: Option<u64>,
    },
    /// Get an employee row
    Employee {
        /// Employer address
        employer: String,
        /// Employee address
        employee: String,
    },
    /// List payments made in a transaction
    Payments {
        /// Transaction hash (64 hex chars, with or without 0x prefix)
        tx_hash: String,
    },
    /// Get a payroll run with its employee count
    PayrollRun {
        /// Transaction hash (64 hex chars, with or without 0x prefix)
        tx_hash: String,
    },
    /// Salary update history for an employee, oldest first
    SalaryHistory {
        /// Employer address
        employer: String,
        /// Employee address
        employee: String,
    },
}

/// Execute one command against `store`.
pub fn execute(store: &dyn IndexStore, command: Commands) -> Result<Value> {
    let result = match command {
        Commands::Watermark { key } => match store.get_meta(&key)? {
            Some(value) => json!({ "key": key, "value": value }),
            None => json!({ "key": key, "value": null }),
        },
        Commands::Instances => {
            let instances = store.list_instances()?;
            json!({ "count": instances.len(), "instances": instances })
        }
        Commands::RegisterInstance {
            address,
            creator,
            deployed_at,
        } => {
            let instance = TrackedInstance::registered(
                parse_address(&address)?,
                parse_address(&creator)?,
                deployed_at,
            );
            let status = if store.upsert_instance(&instance)? {
                "registered"
            } else {
                "exists"
            };
            json!({
                "status": status,
                "instance": store.get_instance(instance.address)?,
            })
        }
        Commands::Employee { employer, employee } => {
            let employer = parse_address(&employer)?;
            let employee = parse_address(&employee)?;
            json!({
                "employer": format!("0x{:x}", employer),
                "employee": format!("0x{:x}", employee),
                "record": store.get_employee(employer, employee)?,
            })
        }
        Commands::Payments { tx_hash } => {
            let tx = parse_hash(&tx_hash)?;
            let payments = store.payments_for_tx(tx)?;
            json!({
                "tx_hash": format!("0x{:x}", tx),
                "count": payments.len(),
                "payments": payments,
            })
        }
        Commands::PayrollRun { tx_hash } => {
            let tx = parse_hash(&tx_hash)?;
            json!({
                "tx_hash": format!("0x{:x}", tx),
                "run": store.payroll_run_view(tx)?,
            })
        }
        Commands::SalaryHistory { employer, employee } => {
            let employer = parse_address(&employer)?;
            let employee = parse_address(&employee)?;
            let history = store.salary_updates(employer, employee)?;
            json!({
                "employer": format!("0x{:x}", employer),
                "employee": format!("0x{:x}", employee),
                "count": history.len(),
                "updates": history,
            })
        }
    };
    Ok(result)
}

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let store = RocksIndexStore::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = execute(&store, cli.command)?;

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
