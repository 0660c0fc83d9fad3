// src/cli.rs
//! CLI definitions for storpool-repo-add
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use storpool_repo_add::state::LifecycleEvent;

#[derive(Parser)]
#[command(name = "storpool-repo-add")]
#[command(version)]
#[command(about = "Provision the StorPool APT repository and track the packages installed from it", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle a lifecycle event and converge the repository setup
    Hook {
        /// install, config-changed, upgrade-charm, update-status or stop
        event: LifecycleEvent,
    },

    /// Show the saved provisioning state
    Status,

    /// Install the requested packages and record what was installed
    InstallPackages {
        /// Packages as NAME or NAME=VERSION (default: the configured [packages])
        packages: Vec<String>,
    },

    /// Remove every recorded package and delete the ledger
    UninstallRecorded,

    /// Show the APT policy for packages
    Policy {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// List the files installed by a package
    Files {
        /// Package name
        name: String,
    },

    /// Check whether the signing key and the repository are in place
    Check,
}
