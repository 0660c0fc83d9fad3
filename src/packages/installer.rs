// src/packages/installer.rs

//! Package installation and recorded uninstallation
//!
//! Installation is bracketed by two dpkg snapshots; every package whose
//! installed version differs between them is recorded in the ledger. This
//! includes upgrades of packages that were already present, so teardown
//! removes everything whose state this agent changed.

use super::dpkg_query::{changed_packages, installed_snapshot};
use super::ledger::InstallLedger;
use super::planner::{plan, Requested};
use super::policy::query_policy;
use crate::error::{Error, Result};
use crate::process::{CommandRunner, CommandSpec};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

fn apt_get(args: &[&str], names: &BTreeSet<String>) -> CommandSpec {
    CommandSpec::new("apt-get")
        .args(args.iter().copied())
        .arg("--")
        .args(names.iter().cloned())
        .env("DEBIAN_FRONTEND", "noninteractive")
}

/// Installs packages and uninstalls the ones it recorded
pub struct PackageInstaller<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    ledger: &'a InstallLedger,
}

impl<'a, R: CommandRunner + ?Sized> PackageInstaller<'a, R> {
    pub fn new(runner: &'a R, ledger: &'a InstallLedger) -> Self {
        Self { runner, ledger }
    }

    /// Install exactly `names` and record what changed
    ///
    /// Returns the newly installed (or upgraded) package names. On failure
    /// nothing is written to the ledger.
    pub fn install(&self, names: &BTreeSet<String>) -> Result<Vec<String>> {
        if names.is_empty() {
            debug!("Nothing to install");
            return Ok(Vec::new());
        }

        // A timeout stays a timeout; only exit and I/O failures are wrapped
        let install_failure = |e: Error| match e {
            Error::SubprocessTimeout { .. } => e,
            e => Error::InstallFailure {
                names: names.iter().cloned().collect(),
                reason: e.to_string(),
            },
        };

        let before = installed_snapshot(self.runner).map_err(install_failure)?;

        info!("Installing {:?}", names);
        let spec = apt_get(&["install", "-y", "--no-install-recommends"], names);
        self.runner.check_call(&spec).map_err(install_failure)?;

        let after = installed_snapshot(self.runner).map_err(install_failure)?;
        let newly_installed = changed_packages(&before, &after);
        info!("Newly installed: {:?}", newly_installed);

        self.ledger.record(&newly_installed)?;
        Ok(newly_installed)
    }

    /// Query, plan and install the requested packages
    ///
    /// This is the composite operation callers normally want: it fails with
    /// the single blocking reason if the request cannot be satisfied.
    pub fn install_requested(&self, requested: &Requested) -> Result<Vec<String>> {
        let names: BTreeSet<String> = requested.keys().cloned().collect();
        let policy = query_policy(self.runner, &names)?;
        let to_install = plan(requested, &policy)?;
        self.install(&to_install)
    }

    /// Remove every recorded package and delete the ledger
    ///
    /// This is teardown: a failing remove is logged and the ledger is
    /// deleted anyway. Ledger I/O errors are still reported.
    pub fn uninstall_recorded(&self) -> Result<()> {
        if !self.ledger.release()? {
            info!("Other units still need the recorded packages, leaving them installed");
            return Ok(());
        }

        let names = self.ledger.recorded()?;
        if names.is_empty() {
            debug!("No recorded packages to remove");
        } else {
            info!("Removing recorded packages {:?}", names);
            let spec = apt_get(&["remove", "-y"], &names);
            match self.runner.run(&spec) {
                Ok(output) if output.success() => {}
                Ok(output) => warn!(
                    "{} failed with exit code {:?}: {}",
                    spec,
                    output.code,
                    output.stderr.trim()
                ),
                Err(e) => warn!("Could not run {}: {}", spec, e),
            }
        }

        self.ledger.clear()
    }
}
