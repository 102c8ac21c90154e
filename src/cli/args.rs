//! CLI argument definitions using clap
//!
//! Commands:
//! - mirrordb init --store <dir>
//! - mirrordb status --store <dir>
//! - mirrordb history --store <dir>
//! - mirrordb drain --store <dir>
//! - mirrordb rebuild --store <dir>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mirrordb - mirrors a shared on-disk store into an in-process projection
#[derive(Parser, Debug)]
#[command(name = "mirrordb")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize an empty store directory
    Init {
        /// Path to the store directory
        #[arg(long, default_value = "./mirror-store")]
        store: PathBuf,

        /// Create the store without history tracking
        #[arg(long)]
        no_history: bool,
    },

    /// Print store metadata, checkpoint, and retained-log summary
    Status {
        /// Path to the store directory
        #[arg(long, default_value = "./mirror-store")]
        store: PathBuf,
    },

    /// Dump the retained transaction history
    History {
        /// Path to the store directory
        #[arg(long, default_value = "./mirror-store")]
        store: PathBuf,
    },

    /// Run merge cycles to completion against a throwaway projection
    Drain {
        /// Path to the store directory
        #[arg(long, default_value = "./mirror-store")]
        store: PathBuf,
    },

    /// Destroy the store and recreate it with a fresh identity
    Rebuild {
        /// Path to the store directory
        #[arg(long, default_value = "./mirror-store")]
        store: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
