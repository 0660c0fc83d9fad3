// src/packages/dpkg_query.rs

//! Query installed dpkg packages from the system database
//!
//! The installed-package snapshot is taken before and after an install so
//! the installer can tell exactly which packages changed.

use crate::error::Result;
use crate::process::{CommandRunner, CommandSpec};
use std::collections::BTreeMap;
use tracing::debug;

/// Output format for one line of the listing: name, version, status
pub const SNAPSHOT_FORMAT: &str = "${Package}\t${Version}\t${Status}\n";

/// Installed packages (name -> version) at one point in time
pub type InstalledSnapshot = BTreeMap<String, String>;

/// Parse the tab-separated `dpkg-query -W` listing
///
/// Only lines with exactly three fields whose status starts with
/// `install` are kept.
pub fn parse_snapshot(output: &str) -> InstalledSnapshot {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.as_slice() {
                [name, version, status] if status.starts_with("install") => {
                    Some((name.to_string(), version.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}

/// Capture the currently installed packages
pub fn installed_snapshot<R: CommandRunner + ?Sized>(runner: &R) -> Result<InstalledSnapshot> {
    debug!("Querying installed dpkg packages");

    let spec = CommandSpec::new("dpkg-query").args(["-W", "--showformat", SNAPSHOT_FORMAT]);
    let snapshot = parse_snapshot(&runner.check_output(&spec)?);

    debug!("Found {} installed packages", snapshot.len());
    Ok(snapshot)
}

/// Names present in `after` that were absent or at another version in `before`
pub fn changed_packages(before: &InstalledSnapshot, after: &InstalledSnapshot) -> Vec<String> {
    after
        .iter()
        .filter(|(name, version)| before.get(*name) != Some(*version))
        .map(|(name, _)| name.clone())
        .collect()
}

/// List the files installed by a package, sorted
pub fn package_files<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Result<Vec<String>> {
    debug!("Querying files for package: {}", name);

    let spec = CommandSpec::new("dpkg").args(["-L", "--", name]);
    let mut files: Vec<String> = runner
        .check_output(&spec)?
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    files.sort();

    debug!("Found {} files for package {}", files.len(), name);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(entries: &[(&str, &str)]) -> InstalledSnapshot {
        entries
            .iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_snapshot_filters_status() {
        let output = "\
bash\t4.3-14ubuntu1\tinstall ok installed
old-kernel\t4.4.0-21\tdeinstall ok config-files
storpool-common\t18.01\tinstall ok installed
broken line without tabs
too\tmany\tfields\there
\t\t
";
        let parsed = parse_snapshot(output);
        assert_eq!(
            parsed,
            snapshot(&[("bash", "4.3-14ubuntu1"), ("storpool-common", "18.01")])
        );
    }

    #[test]
    fn test_changed_packages_includes_upgrades() {
        let before = snapshot(&[("bash", "4.3"), ("curl", "7.47")]);
        let after = snapshot(&[("bash", "4.3"), ("curl", "7.58"), ("storpool-common", "18.01")]);

        let changed = changed_packages(&before, &after);
        assert_eq!(changed, vec!["curl".to_string(), "storpool-common".to_string()]);
    }

    #[test]
    fn test_changed_packages_ignores_removals() {
        let before = snapshot(&[("bash", "4.3"), ("curl", "7.47")]);
        let after = snapshot(&[("bash", "4.3")]);
        assert!(changed_packages(&before, &after).is_empty());
    }
}
