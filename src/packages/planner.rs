// src/packages/planner.rs

//! Installation planning
//!
//! Decides which of the requested packages need to be installed, given
//! their APT policy. Planning is all-or-nothing: the first package that
//! cannot be satisfied aborts it, and the error names only that package.

use super::policy::PolicyMap;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Version requirement that accepts whatever is installed or available
pub const ANY_VERSION: &str = "*";

/// Requested version of a package
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionReq {
    /// Any installed or available version is acceptable
    Any,
    /// Exactly this version
    Exact(String),
}

impl VersionReq {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == ANY_VERSION || s.is_empty() {
            Self::Any
        } else {
            Self::Exact(s.to_string())
        }
    }

    pub fn matches(&self, version: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(wanted) => wanted == version,
        }
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(ANY_VERSION),
            Self::Exact(v) => f.write_str(v),
        }
    }
}

/// A requested package, in `name` or `name=version` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageConstraint {
    pub name: String,
    pub version: VersionReq,
}

impl FromStr for PackageConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = match s.split_once('=') {
            Some((name, version)) => (name.trim(), VersionReq::parse(version)),
            None => (s.trim(), VersionReq::Any),
        };
        if name.is_empty() {
            return Err(Error::ParseError(format!("invalid package constraint '{}'", s)));
        }
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

/// Requested constraints keyed by package name
pub type Requested = BTreeMap<String, VersionReq>;

/// Build the requested map from `name -> version` pairs (as in the config)
pub fn requested_from_map(map: &BTreeMap<String, String>) -> Requested {
    map.iter()
        .map(|(name, version)| (name.clone(), VersionReq::parse(version)))
        .collect()
}

/// Build the requested map from parsed constraints; later duplicates win
pub fn requested_from_constraints<I>(constraints: I) -> Requested
where
    I: IntoIterator<Item = PackageConstraint>,
{
    constraints
        .into_iter()
        .map(|c| (c.name, c.version))
        .collect()
}

/// Compute the set of packages to install
///
/// Packages are examined in name order, so the reported error is stable
/// from one run to the next.
pub fn plan(requested: &Requested, policy: &PolicyMap) -> Result<BTreeSet<String>> {
    let mut to_install = BTreeSet::new();

    for (name, req) in requested {
        let Some(Some(pol)) = policy.get(name) else {
            return Err(Error::PolicyUnavailable(name.clone()));
        };

        if pol.installed.as_deref().is_some_and(|installed| req.matches(installed)) {
            continue;
        }

        let Some(candidate) = pol.candidate.as_deref() else {
            return Err(Error::NotInRepositories(name.clone()));
        };

        if !req.matches(candidate) {
            return Err(Error::VersionMismatch {
                name: name.clone(),
                requested: req.to_string(),
                candidate: candidate.to_string(),
            });
        }

        to_install.insert(name.clone());
    }

    Ok(to_install)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::policy::PackagePolicy;

    fn pol(name: &str, installed: Option<&str>, candidate: Option<&str>) -> (String, Option<PackagePolicy>) {
        (
            name.to_string(),
            Some(PackagePolicy {
                name: name.to_string(),
                installed: installed.map(str::to_string),
                candidate: candidate.map(str::to_string),
            }),
        )
    }

    fn req(entries: &[(&str, &str)]) -> Requested {
        entries
            .iter()
            .map(|(n, v)| (n.to_string(), VersionReq::parse(v)))
            .collect()
    }

    #[test]
    fn test_constraint_parse() {
        let c: PackageConstraint = "storpool-block=18.01".parse().unwrap();
        assert_eq!(c.name, "storpool-block");
        assert_eq!(c.version, VersionReq::Exact("18.01".to_string()));

        let c: PackageConstraint = "storpool-common".parse().unwrap();
        assert_eq!(c.version, VersionReq::Any);

        let c: PackageConstraint = "storpool-common=*".parse().unwrap();
        assert_eq!(c.version, VersionReq::Any);

        assert!("=1.0".parse::<PackageConstraint>().is_err());
    }

    #[test]
    fn test_satisfied_packages_are_skipped() {
        let policy: PolicyMap = [
            pol("bash", Some("4.3"), Some("4.4")),
            pol("curl", Some("7.47"), Some("7.47")),
        ]
        .into_iter()
        .collect();

        let plan = plan(&req(&[("bash", "*"), ("curl", "7.47")]), &policy).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_missing_package_is_planned() {
        let policy: PolicyMap = [pol("foo", None, Some("1.2"))].into_iter().collect();
        let plan = plan(&req(&[("foo", "*")]), &policy).unwrap();
        assert_eq!(plan, BTreeSet::from(["foo".to_string()]));
    }

    #[test]
    fn test_exact_upgrade_is_planned() {
        let policy: PolicyMap = [pol("foo", Some("1.0"), Some("1.2"))].into_iter().collect();
        let plan = plan(&req(&[("foo", "1.2")]), &policy).unwrap();
        assert_eq!(plan, BTreeSet::from(["foo".to_string()]));
    }

    #[test]
    fn test_not_in_repositories() {
        let policy: PolicyMap = [
            pol("bar", None, Some("2.0")),
            pol("foo", None, None),
        ]
        .into_iter()
        .collect();

        let err = plan(&req(&[("bar", "*"), ("foo", "*")]), &policy).unwrap_err();
        assert!(matches!(err, Error::NotInRepositories(ref name) if name == "foo"));
    }

    #[test]
    fn test_version_mismatch() {
        let policy: PolicyMap = [pol("foo", Some("1.0"), Some("1.2"))].into_iter().collect();
        let err = plan(&req(&[("foo", "1.1")]), &policy).unwrap_err();
        match err {
            Error::VersionMismatch {
                name,
                requested,
                candidate,
            } => {
                assert_eq!(name, "foo");
                assert_eq!(requested, "1.1");
                assert_eq!(candidate, "1.2");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unknown_policy() {
        let mut policy: PolicyMap = [pol("bar", None, Some("2.0"))].into_iter().collect();
        policy.insert("foo".to_string(), None);

        let err = plan(&req(&[("bar", "*"), ("foo", "*")]), &policy).unwrap_err();
        assert!(matches!(err, Error::PolicyUnavailable(ref name) if name == "foo"));

        // A name the policy query never saw is also unknown
        let err = plan(&req(&[("baz", "*")]), &PolicyMap::new()).unwrap_err();
        assert!(matches!(err, Error::PolicyUnavailable(ref name) if name == "baz"));
    }

    #[test]
    fn test_first_error_in_name_order() {
        let policy: PolicyMap = [pol("aaa", None, None), pol("zzz", None, None)]
            .into_iter()
            .collect();
        let err = plan(&req(&[("zzz", "*"), ("aaa", "*")]), &policy).unwrap_err();
        assert!(matches!(err, Error::NotInRepositories(ref name) if name == "aaa"));
    }

    #[test]
    fn test_requested_from_sources() {
        let map = BTreeMap::from([("foo".to_string(), "*".to_string())]);
        assert_eq!(requested_from_map(&map)["foo"], VersionReq::Any);

        let requested = requested_from_constraints(vec![
            "foo=1.0".parse().unwrap(),
            "foo=1.1".parse().unwrap(),
        ]);
        assert_eq!(requested["foo"], VersionReq::Exact("1.1".to_string()));
    }
}
