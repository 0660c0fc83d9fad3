// src/filesystem/mod.rs

//! Crash-safe file helpers
//!
//! Files that other processes read (the APT sources files and the saved
//! flag bag) are never truncated in place. New content goes to a temporary
//! file in the same directory, is synced, and is renamed over the target,
//! so a reader sees either the old file or the new one.

use crate::error::{Error, Result};
use std::fs::{self, DirBuilder, Permissions};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use tempfile::{Builder, NamedTempFile};
use tracing::debug;

/// Create `dir` (and missing parents) with `mode` if it does not exist yet
pub fn ensure_dir(dir: &Path, mode: u32) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    debug!("Creating the {} directory (mode {:o})", dir.display(), mode);
    DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(dir)
        .map_err(|e| Error::file_io(dir, e))
}

fn temp_in(dir: &Path, prefix: &str, suffix: &str) -> Result<NamedTempFile> {
    Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| Error::file_io(dir, e))
}

fn persist(temp: NamedTempFile, target: &Path, mode: u32) -> Result<()> {
    temp.as_file()
        .set_permissions(Permissions::from_mode(mode))
        .map_err(|e| Error::file_io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| Error::file_io(temp.path(), e))?;
    temp.persist(target)
        .map_err(|e| Error::file_io(target, e.error))?;
    Ok(())
}

/// Atomically replace `target` with `content`
///
/// The temporary file is created next to the target with the given name
/// prefix and suffix; the parent directory must already exist.
pub fn atomic_write(target: &Path, content: &[u8], prefix: &str, suffix: &str, mode: u32) -> Result<()> {
    let dir = target
        .parent()
        .ok_or_else(|| Error::ConfigError(format!("{} has no parent directory", target.display())))?;

    let mut temp = temp_in(dir, prefix, suffix)?;
    debug!(
        "Writing {} bytes to {} via {}",
        content.len(),
        target.display(),
        temp.path().display()
    );
    temp.write_all(content)
        .and_then(|_| temp.flush())
        .map_err(|e| Error::file_io(temp.path(), e))?;

    persist(temp, target, mode)
}

/// Drop every line of `target` for which `remove` returns true
///
/// The file is only replaced if at least one line was removed; the
/// existing permissions are kept. Returns the number of removed lines.
pub fn remove_lines<F>(target: &Path, remove: F) -> Result<usize>
where
    F: Fn(&str) -> bool,
{
    let dir = target
        .parent()
        .ok_or_else(|| Error::ConfigError(format!("{} has no parent directory", target.display())))?;

    let file = fs::File::open(target).map_err(|e| Error::file_io(target, e))?;
    let mode = file
        .metadata()
        .map_err(|e| Error::file_io(target, e))?
        .permissions()
        .mode();

    let mut temp = temp_in(dir, ".sources.", ".list")?;
    let mut removed = 0;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| Error::file_io(target, e))?;
        if read == 0 {
            break;
        }
        if remove(&line) {
            removed += 1;
            continue;
        }
        temp.write_all(line.as_bytes())
            .map_err(|e| Error::file_io(temp.path(), e))?;
    }

    if removed == 0 {
        // Dropping the NamedTempFile deletes it.
        return Ok(0);
    }

    temp.flush().map_err(|e| Error::file_io(temp.path(), e))?;
    persist(temp, target, mode & 0o7777)?;
    Ok(removed)
}

/// Remove `path` if it exists; returns whether anything was removed
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::file_io(path, e)),
    }
}
