//! indexctl - payroll index CLI tool
//!
//! A command-line interface for inspecting the payroll index store
//! and registering instances by hand.

use payroll_indexer::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
