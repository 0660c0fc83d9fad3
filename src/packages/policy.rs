// src/packages/policy.rs

//! APT policy inspection
//!
//! Runs `apt-cache policy` for each requested package and extracts the
//! installed and candidate versions. An entry whose output is missing a
//! field, or repeats one, is reported as unknown (`None`), which planning
//! treats differently from "not installed and not available".

use crate::error::{Error, Result};
use crate::process::{CommandRunner, CommandSpec};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;
use tracing::debug;

/// Token APT prints in place of a version
const NONE_TOKEN: &str = "(none)";

/// Installed and candidate versions of one package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePolicy {
    pub name: String,
    /// Currently installed version, `None` if not installed
    pub installed: Option<String>,
    /// Version APT would install, `None` if unavailable in the configured sources
    pub candidate: Option<String>,
}

/// Policy for each queried name; `None` means the policy is unknown
pub type PolicyMap = BTreeMap<String, Option<PackagePolicy>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Field {
    Installed,
    Candidate,
}

static FIELD_PATTERNS: LazyLock<[(Field, Regex); 2]> = LazyLock::new(|| {
    [
        (
            Field::Installed,
            Regex::new(r"^\s*Installed:\s+(\S+)\s*$").expect("static regex"),
        ),
        (
            Field::Candidate,
            Regex::new(r"^\s*Candidate:\s+(\S+)\s*$").expect("static regex"),
        ),
    ]
});

fn normalize(version: String) -> Option<String> {
    if version == NONE_TOKEN { None } else { Some(version) }
}

/// Parse the output of `apt-cache policy -- NAME`
///
/// Returns `None` if either field is missing or appears more than once.
pub fn parse_policy(name: &str, output: &str) -> Option<PackagePolicy> {
    let mut found: BTreeMap<Field, String> = BTreeMap::new();

    for line in output.lines() {
        for (field, pattern) in FIELD_PATTERNS.iter() {
            let Some(caps) = pattern.captures(line) else {
                continue;
            };
            if found.contains_key(field) {
                debug!("Duplicate {:?} field in the policy for {}", field, name);
                return None;
            }
            found.insert(*field, caps[1].to_string());
        }
    }

    let installed = found.remove(&Field::Installed)?;
    let candidate = found.remove(&Field::Candidate)?;
    Some(PackagePolicy {
        name: name.to_string(),
        installed: normalize(installed),
        candidate: normalize(candidate),
    })
}

/// Query the APT policy for every name in `names`
///
/// Fails as a whole with `QueryFailure` if any query cannot be run. A query
/// that hangs is reported as `SubprocessTimeout` instead.
pub fn query_policy<R: CommandRunner + ?Sized>(runner: &R, names: &BTreeSet<String>) -> Result<PolicyMap> {
    let mut policy = PolicyMap::new();

    for name in names {
        let spec = CommandSpec::new("apt-cache").args(["policy", "--", name.as_str()]);
        let output = runner.check_output(&spec).map_err(|e| match e {
            Error::SubprocessTimeout { .. } => e,
            e => Error::QueryFailure {
                names: names.iter().cloned().collect(),
                reason: e.to_string(),
            },
        })?;

        let parsed = parse_policy(name, &output);
        debug!("APT policy for {}: {:?}", name, parsed);
        policy.insert(name.clone(), parsed);
    }

    Ok(policy)
}
