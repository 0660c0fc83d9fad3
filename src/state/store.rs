// src/state/store.rs

//! Flag bag persistence
//!
//! Each hook invocation is a separate process, so the flag bag is loaded
//! from `{state_dir}/{unit}.state.json` at the start and written back
//! (atomically) at the end.

use super::Flags;
use crate::error::{Error, Result};
use crate::filesystem::{atomic_write, ensure_dir};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const STATE_DIR_MODE: u32 = 0o700;
const STATE_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone)]
pub struct FlagStore {
    path: PathBuf,
}

impl FlagStore {
    pub fn new(state_dir: &Path, unit: &str) -> Self {
        Self {
            path: state_dir.join(format!("{}.state.json", unit)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the flag bag; a missing file is an empty bag
    pub fn load(&self) -> Result<Flags> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No saved state at {}", self.path.display());
                return Ok(Flags::new());
            }
            Err(e) => return Err(Error::file_io(&self.path, e)),
        };

        serde_json::from_str(&content)
            .map_err(|e| Error::ParseError(format!("{}: {}", self.path.display(), e)))
    }

    pub fn save(&self, flags: &Flags) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            ensure_dir(dir, STATE_DIR_MODE)?;
        }

        let json = serde_json::to_string_pretty(flags)
            .map_err(|e| Error::ParseError(format!("Failed to serialize state: {}", e)))?;
        debug!("Saving state to {}: {}", self.path.display(), json);
        atomic_write(&self.path, json.as_bytes(), ".state.", ".json", STATE_FILE_MODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Flag;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FlagStore::new(temp_dir.path(), "unit");
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = FlagStore::new(&temp_dir.path().join("state"), "storpool-repo-add");

        let flags: Flags = [Flag::Configured, Flag::InstalledAptKey].into_iter().collect();
        store.save(&flags).unwrap();

        assert_eq!(
            store.path(),
            temp_dir.path().join("state/storpool-repo-add.state.json")
        );
        assert_eq!(store.load().unwrap(), flags);
    }

    #[test]
    fn test_corrupt_state_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = FlagStore::new(temp_dir.path(), "unit");
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(Error::ParseError(_))));
    }
}
