// src/repository/provisioner.rs

//! Repository provisioning
//!
//! [`RepoProvisioner`] owns the two files this agent manages under the
//! APT configuration root (the dedicated sources file and keyring) and
//! the cache refresh. It keeps no state besides those files.

use super::keyring;
use super::sources::{is_legacy_line, RepoDescriptor};
use crate::config::AptLayout;
use crate::error::{Error, Result};
use crate::filesystem::{atomic_write, ensure_dir, remove_if_exists, remove_lines};
use crate::process::{CommandRunner, CommandSpec};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Mode for the sources directory if we have to create it
const SOURCES_DIR_MODE: u32 = 0o755;
/// Mode of the dedicated sources file
const SOURCES_FILE_MODE: u32 = 0o644;

const SOURCES_TEMP_PREFIX: &str = ".storpool-maas.";
const SOURCES_TEMP_SUFFIX: &str = ".list";

pub struct RepoProvisioner<'a, R: CommandRunner + ?Sized> {
    layout: AptLayout,
    key_file: PathBuf,
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> RepoProvisioner<'a, R> {
    pub fn new(layout: AptLayout, key_file: &Path, runner: &'a R) -> Self {
        Self {
            layout,
            key_file: key_file.to_path_buf(),
            runner,
        }
    }

    pub fn layout(&self) -> &AptLayout {
        &self.layout
    }

    /// Check whether APT trusts the StorPool signing key
    pub fn has_key(&self) -> Result<bool> {
        keyring::has_key(self.runner)
    }

    /// Add the signing key to the dedicated keyring
    pub fn install_key(&self) -> Result<()> {
        keyring::install_key(self.runner, &self.layout.keyring(), &self.key_file)
    }

    /// Check whether the dedicated sources file describes `repo`
    pub fn has_repo(&self, repo: &RepoDescriptor) -> Result<bool> {
        debug!("has_repo() invoked");
        let path = self.layout.sources_list();
        if !path.is_file() {
            debug!("No {} file", path.display());
            return Ok(false);
        }

        let content = fs::read_to_string(&path).map_err(|e| Error::file_io(&path, e))?;
        Ok(repo.matches_contents(&content))
    }

    /// Remove references to superseded repositories from the global sources file
    ///
    /// Returns the number of lines removed; an absent file is skipped.
    pub fn clean_legacy_sources(&self) -> Result<usize> {
        let path = self.layout.global_sources_list();
        if !path.is_file() {
            debug!("No {} file to clean up", path.display());
            return Ok(0);
        }

        debug!("Cleaning up the {} file", path.display());
        let removed = remove_lines(&path, is_legacy_line)?;
        if removed > 0 {
            info!("Removed {} lines from {}", removed, path.display());
        } else {
            debug!("No need to remove any lines from {}", path.display());
        }
        Ok(removed)
    }

    /// Write the dedicated sources file for `repo`
    ///
    /// The caller is responsible for scheduling a cache refresh afterwards.
    pub fn install_repo(&self, repo: &RepoDescriptor) -> Result<()> {
        debug!("install_repo() invoked");
        self.clean_legacy_sources()?;

        let path = self.layout.sources_list();
        let text = repo.file_contents();
        debug!("Creating the {} file with contents: {:?}", path.display(), text);
        if let Some(dir) = path.parent() {
            ensure_dir(dir, SOURCES_DIR_MODE)?;
        }
        atomic_write(
            &path,
            text.as_bytes(),
            SOURCES_TEMP_PREFIX,
            SOURCES_TEMP_SUFFIX,
            SOURCES_FILE_MODE,
        )?;

        info!("Configured the {} repository", repo.url);
        Ok(())
    }

    /// Refresh the APT package cache
    pub fn update_cache(&self) -> Result<()> {
        info!("Updating the APT cache");
        self.runner.check_call(&CommandSpec::new("apt-get").arg("update"))
    }

    /// Delete the dedicated sources file and keyring
    ///
    /// Files that are already gone are fine. Both removals are attempted
    /// even if the first one fails; the first error is returned.
    pub fn remove(&self) -> Result<()> {
        let mut first_error = None;

        for path in [self.layout.sources_list(), self.layout.keyring()] {
            match remove_if_exists(&path) {
                Ok(true) => info!("Removed {}", path.display()),
                Ok(false) => debug!("No {} to remove", path.display()),
                Err(e) => {
                    warn!("Could not remove {}: {}", path.display(), e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
