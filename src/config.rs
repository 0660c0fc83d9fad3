// src/config.rs

//! Agent configuration
//!
//! The configuration is a TOML file. Every section has defaults, so a
//! missing file is not an error: it simply leaves the repository URL unset,
//! which the state machine reports as "waiting for configuration".
//!
//! # Example config.toml
//!
//! ```toml
//! [repository]
//! url = "https://repo.example.com/storpool-maas/"
//!
//! [paths]
//! apt_root = "/etc/apt"
//! state_dir = "/var/lib/storpool"
//!
//! [packages]
//! storpool-common = "*"
//! storpool-block = "18.01.1234"
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default path for the agent configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/storpool-repo-add/config.toml";

/// Environment variable overriding the configuration file location
pub const CONFIG_PATH_ENV: &str = "STORPOOL_REPO_ADD_CONFIG";

/// Configuration key holding the repository URL
pub const REPO_URL_KEY: &str = "storpool_repo_url";

const APT_SOURCES_DIR: &str = "sources.list.d";
const APT_SOURCES_FILE: &str = "storpool-maas.list";
const APT_KEYRING_DIR: &str = "trusted.gpg.d";
const APT_KEYRING_FILE: &str = "storpool-maas.gpg";
const APT_GLOBAL_SOURCES: &str = "sources.list";

/// Read-only key/value view of the configuration
///
/// This is the interface the state machine consumes; it never needs to
/// know how the values were obtained.
pub trait ConfigProvider {
    /// Get the value for `key`, or `None` if it has not been set
    fn get(&self, key: &str) -> Option<String>;

    /// Get the value for `key`, falling back to `default`
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }
}

/// Top-level agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    /// Requested packages (package name -> exact version or "*")
    #[serde(default)]
    pub packages: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// StorPool package repository URL; empty means "not configured"
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// APT configuration root
    #[serde(default = "default_apt_root")]
    pub apt_root: PathBuf,

    /// Directory for the install ledger and the persisted flag bag
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Bundled OpenPGP key material for the repository
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            apt_root: default_apt_root(),
            state_dir: default_state_dir(),
            key_file: default_key_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Name of this unit; identifies its ledger and flag files
    #[serde(default = "default_unit")]
    pub unit: String,

    /// Use per-unit flag files gating one list shared by co-installed units
    #[serde(default)]
    pub shared: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            unit: default_unit(),
            shared: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Upper bound for any single package-manager or key-store invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_apt_root() -> PathBuf {
    PathBuf::from("/etc/apt")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/storpool")
}

fn default_key_file() -> PathBuf {
    PathBuf::from("/usr/share/storpool-repo-add/storpool-maas.key")
}

fn default_unit() -> String {
    "storpool-repo-add".to_string()
}

fn default_timeout_secs() -> u64 {
    600
}

impl AgentConfig {
    /// Parse a configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Load the configuration file at `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_io(path, e))?;
        Self::parse(&content)
    }

    /// Resolve the configuration path from an explicit argument or the environment
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// The configured repository URL, if any and non-empty
    pub fn repo_url(&self) -> Option<&str> {
        self.repository
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.commands.timeout_secs)
    }

    /// Derived filesystem locations
    pub fn layout(&self) -> AptLayout {
        AptLayout::new(&self.paths.apt_root)
    }
}

impl ConfigProvider for AgentConfig {
    fn get(&self, key: &str) -> Option<String> {
        match key {
            REPO_URL_KEY => self.repo_url().map(str::to_string),
            _ => None,
        }
    }
}

/// Locations of the files managed under the APT configuration root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptLayout {
    pub root: PathBuf,
}

impl AptLayout {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// The dedicated sources file for the StorPool repository
    pub fn sources_list(&self) -> PathBuf {
        self.root.join(APT_SOURCES_DIR).join(APT_SOURCES_FILE)
    }

    /// The dedicated keyring holding the StorPool signing key
    pub fn keyring(&self) -> PathBuf {
        self.root.join(APT_KEYRING_DIR).join(APT_KEYRING_FILE)
    }

    /// The system-global sources file that may hold legacy entries
    pub fn global_sources_list(&self) -> PathBuf {
        self.root.join(APT_GLOBAL_SOURCES)
    }
}
