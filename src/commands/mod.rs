// src/commands/mod.rs
//! Command handlers for the storpool-repo-add CLI

mod hook;
mod packages;
mod repo;

use anyhow::{Context, Result};
use std::path::Path;
use storpool_repo_add::config::AgentConfig;
use storpool_repo_add::packages::{InstallLedger, LedgerLayout};
use storpool_repo_add::process::SystemRunner;
use storpool_repo_add::repository::RepoProvisioner;
use storpool_repo_add::state::FlagStore;
use tracing::debug;

// Re-export all command handlers
pub use hook::{cmd_hook, cmd_status};
pub use packages::{cmd_files, cmd_install_packages, cmd_policy, cmd_uninstall_recorded};
pub use repo::cmd_check;

/// Configuration and system access shared by every command
pub struct AgentContext {
    pub config: AgentConfig,
    pub runner: SystemRunner,
}

impl AgentContext {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = AgentConfig::resolve_path(explicit);
        let config = AgentConfig::load(&path)
            .with_context(|| format!("Failed to load the configuration from {}", path.display()))?;
        debug!("Using configuration {:?}", config);

        let runner = SystemRunner::new().with_timeout(config.timeout());
        Ok(Self { config, runner })
    }

    pub fn ledger(&self) -> InstallLedger {
        let layout = if self.config.ledger.shared {
            LedgerLayout::Shared
        } else {
            LedgerLayout::Flat
        };
        InstallLedger::new(&self.config.paths.state_dir, &self.config.ledger.unit, layout)
    }

    pub fn provisioner(&self) -> RepoProvisioner<'_, SystemRunner> {
        RepoProvisioner::new(self.config.layout(), &self.config.paths.key_file, &self.runner)
    }

    pub fn flag_store(&self) -> FlagStore {
        FlagStore::new(&self.config.paths.state_dir, &self.config.ledger.unit)
    }
}
