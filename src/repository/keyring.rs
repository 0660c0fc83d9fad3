// src/repository/keyring.rs

//! StorPool signing key detection and installation
//!
//! The key is added to a dedicated keyring file rather than the system
//! default one, so removing it later is a single file deletion.

use crate::error::Result;
use crate::filesystem::ensure_dir;
use crate::process::{CommandRunner, CommandSpec};
use std::path::Path;
use tracing::{debug, info};

/// Colon-separated listing prefix identifying the StorPool package signing key
pub const KEY_IDENTITY: &str = "pub:-:2048:1:7FF335CEB2E5AAA2:";

/// Mode for a keyring directory we have to create
const KEYRING_DIR_MODE: u32 = 0o755;

/// True if the `--with-colons` listing contains the signing key
pub fn listing_has_key(listing: &str) -> bool {
    listing.lines().any(|line| line.starts_with(KEY_IDENTITY))
}

/// Check whether APT trusts the signing key
pub fn has_key<R: CommandRunner + ?Sized>(runner: &R) -> Result<bool> {
    debug!("has_key() invoked");
    let spec = CommandSpec::new("apt-key").args(["adv", "--list-keys", "--batch", "--with-colons"]);
    Ok(listing_has_key(&runner.check_output(&spec)?))
}

/// Add the bundled key material to the dedicated keyring
pub fn install_key<R: CommandRunner + ?Sized>(runner: &R, keyring: &Path, key_file: &Path) -> Result<()> {
    debug!("install_key() invoked");
    if let Some(dir) = keyring.parent() {
        ensure_dir(dir, KEYRING_DIR_MODE)?;
    }

    info!("Adding {} to {}", key_file.display(), keyring.display());
    let spec = CommandSpec::new("apt-key")
        .arg("--keyring")
        .arg(keyring.to_string_lossy())
        .arg("add")
        .arg(key_file.to_string_lossy());
    runner.check_call(&spec)
}
