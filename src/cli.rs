// src/cli.rs
//! CLI definitions for aptferry
//!
//! Command-line interface definitions using clap. The actual command
//! implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default artifact store location on both hosts
pub const DEFAULT_STORE_DIR: &str = "/var/cache/aptferry";

#[derive(Parser)]
#[command(name = "aptferry")]
#[command(version)]
#[command(
    about = "Offline package porter: resolve and fetch on a connected host, install on an offline target",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a package's dependency closure and fetch every artifact
    /// into the store (run on the connected source host)
    Build {
        /// The package to port; installed last on the target
        package: String,

        /// Artifact store directory
        #[arg(short, long, default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,
    },

    /// Verify the transferred store and install it in dependency order
    /// (run on the offline target host)
    Install {
        /// Artifact store directory
        #[arg(short, long, default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,
    },

    /// Validate every artifact in the store, re-fetching failures
    Verify {
        /// Artifact store directory
        #[arg(short, long, default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,
    },

    /// Summarize the store without touching the target system
    Status {
        /// Artifact store directory
        #[arg(short, long, default_value = DEFAULT_STORE_DIR)]
        store: PathBuf,
    },
}
