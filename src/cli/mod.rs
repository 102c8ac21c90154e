//! CLI module for mirrordb
//!
//! Provides command-line interface for:
//! - init: Create an empty store directory
//! - status: Print meta, checkpoint, and retained-log summary
//! - history: Dump retained transactions
//! - drain: Run merge cycles to completion and print stats
//! - rebuild: Destroy and recreate the store

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{drain, history, init, rebuild, run, run_command, status};
pub use errors::{CliError, CliResult};
pub use io::write_response;
