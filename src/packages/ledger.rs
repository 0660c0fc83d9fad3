// src/packages/ledger.rs

//! Durable record of the packages this agent installed
//!
//! The ledger is what scopes uninstallation: only packages recorded here
//! are ever removed. Two layouts are supported:
//!
//! - **Flat** (default): one `{state_dir}/{unit}.packages` file owned by
//!   this unit alone.
//! - **Shared**: several co-installed units append to
//!   `{state_dir}/install-charms.txt`, and each keeps an empty marker file
//!   in `{state_dir}/install-charms/`. The shared list is only acted on
//!   once the last marker is gone.

use crate::error::{Error, Result};
use crate::filesystem::{ensure_dir, remove_if_exists};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Permissions for the ledger directories
const LEDGER_DIR_MODE: u32 = 0o700;
/// Permissions for the ledger and marker files
const LEDGER_FILE_MODE: u32 = 0o600;

const SHARED_LIST_FILE: &str = "install-charms.txt";
const SHARED_FLAG_DIR: &str = "install-charms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerLayout {
    Flat,
    Shared,
}

#[derive(Debug, Clone)]
pub struct InstallLedger {
    state_dir: PathBuf,
    unit: String,
    layout: LedgerLayout,
}

impl InstallLedger {
    pub fn new(state_dir: &Path, unit: &str, layout: LedgerLayout) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            unit: unit.to_string(),
            layout,
        }
    }

    pub fn layout(&self) -> LedgerLayout {
        self.layout
    }

    /// The file listing recorded package names
    pub fn list_path(&self) -> PathBuf {
        match self.layout {
            LedgerLayout::Flat => self.state_dir.join(format!("{}.packages", self.unit)),
            LedgerLayout::Shared => self.state_dir.join(SHARED_LIST_FILE),
        }
    }

    /// Directory of per-unit marker files (shared layout only)
    pub fn flag_dir(&self) -> PathBuf {
        self.state_dir.join(SHARED_FLAG_DIR)
    }

    /// This unit's marker file (shared layout only)
    pub fn flag_file(&self) -> PathBuf {
        self.flag_dir().join(&self.unit)
    }

    pub fn exists(&self) -> bool {
        self.list_path().is_file()
    }

    /// Append `names` to the ledger
    pub fn record(&self, names: &[String]) -> Result<()> {
        ensure_dir(&self.state_dir, LEDGER_DIR_MODE)?;

        if self.layout == LedgerLayout::Shared {
            let flag_dir = self.flag_dir();
            ensure_dir(&flag_dir, LEDGER_DIR_MODE)?;
            let flag = self.flag_file();
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .mode(LEDGER_FILE_MODE)
                .open(&flag)
                .map_err(|e| Error::file_io(&flag, e))?;
        }

        if names.is_empty() {
            return Ok(());
        }

        let path = self.list_path();
        debug!("Recording {:?} in {}", names, path.display());
        let mut content = names.join("\n");
        content.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(LEDGER_FILE_MODE)
            .open(&path)
            .map_err(|e| Error::file_io(&path, e))?;
        file.write_all(content.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| Error::file_io(&path, e))
    }

    /// All recorded package names, deduplicated
    pub fn recorded(&self) -> Result<BTreeSet<String>> {
        let path = self.list_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(Error::file_io(&path, e)),
        };

        Ok(content
            .lines()
            .map(str::trim_end)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Drop this unit's claim on the ledger
    ///
    /// Returns true when no other unit still needs the recorded packages,
    /// i.e. the caller should go on to uninstall them.
    pub fn release(&self) -> Result<bool> {
        match self.layout {
            LedgerLayout::Flat => Ok(true),
            LedgerLayout::Shared => {
                remove_if_exists(&self.flag_file())?;
                let flag_dir = self.flag_dir();
                if !flag_dir.is_dir() {
                    return Ok(true);
                }

                let others = fs::read_dir(&flag_dir)
                    .map_err(|e| Error::file_io(&flag_dir, e))?
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
                    .count();
                if others > 0 {
                    debug!("{} other unit(s) still use the shared package list", others);
                }
                Ok(others == 0)
            }
        }
    }

    /// Delete the ledger (and, for the shared layout, the empty marker directory)
    pub fn clear(&self) -> Result<()> {
        let path = self.list_path();
        if remove_if_exists(&path)? {
            debug!("Removed {}", path.display());
        }

        if self.layout == LedgerLayout::Shared {
            let flag_dir = self.flag_dir();
            if flag_dir.is_dir()
                && let Err(e) = fs::remove_dir(&flag_dir)
            {
                warn!("Could not remove {}: {}", flag_dir.display(), e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flat_record_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let state_dir = temp_dir.path().join("storpool");
        let ledger = InstallLedger::new(&state_dir, "storpool-block", LedgerLayout::Flat);

        assert!(!ledger.exists());
        assert!(ledger.recorded().unwrap().is_empty());

        ledger.record(&names(&["foo", "bar"])).unwrap();
        ledger.record(&names(&["bar", "baz"])).unwrap();

        assert_eq!(
            ledger.list_path(),
            state_dir.join("storpool-block.packages")
        );
        let recorded: Vec<_> = ledger.recorded().unwrap().into_iter().collect();
        assert_eq!(recorded, names(&["bar", "baz", "foo"]));

        let mode = fs::metadata(&state_dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode & !0o700, 0);
    }

    #[test]
    fn test_flat_empty_record_creates_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = InstallLedger::new(temp_dir.path(), "unit", LedgerLayout::Flat);
        ledger.record(&[]).unwrap();
        assert!(!ledger.exists());
    }

    #[test]
    fn test_flat_release_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = InstallLedger::new(temp_dir.path(), "unit", LedgerLayout::Flat);
        ledger.record(&names(&["foo"])).unwrap();

        assert!(ledger.release().unwrap());
        ledger.clear().unwrap();
        assert!(!ledger.exists());

        // Clearing twice is fine
        ledger.clear().unwrap();
    }

    #[test]
    fn test_shared_waits_for_last_unit() {
        let temp_dir = TempDir::new().unwrap();
        let block = InstallLedger::new(temp_dir.path(), "storpool-block", LedgerLayout::Shared);
        let cinder = InstallLedger::new(temp_dir.path(), "cinder-storpool", LedgerLayout::Shared);

        block.record(&names(&["storpool-block"])).unwrap();
        cinder.record(&names(&["python-storpool"])).unwrap();
        assert!(block.flag_file().is_file());
        assert!(cinder.flag_file().is_file());

        let recorded = block.recorded().unwrap();
        assert!(recorded.contains("storpool-block"));
        assert!(recorded.contains("python-storpool"));

        assert!(!block.release().unwrap());
        assert!(!block.flag_file().exists());

        assert!(cinder.release().unwrap());
        cinder.clear().unwrap();
        assert!(!cinder.exists());
        assert!(!cinder.flag_dir().exists());
    }

    #[test]
    fn test_shared_release_without_flag_dir() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = InstallLedger::new(temp_dir.path(), "unit", LedgerLayout::Shared);
        assert!(ledger.release().unwrap());
    }
}
