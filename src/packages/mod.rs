// src/packages/mod.rs

//! Requested package installation
//!
//! The flow for a requested constraint set is:
//! 1. [`policy`] queries the installed and candidate versions
//! 2. [`planner`] decides what to install, or names the one blocking problem
//! 3. [`installer`] installs the plan and diffs [`dpkg_query`] snapshots
//! 4. [`ledger`] records the newly installed names for teardown

pub mod dpkg_query;
pub mod installer;
pub mod ledger;
pub mod planner;
pub mod policy;

pub use installer::PackageInstaller;
pub use ledger::{InstallLedger, LedgerLayout};
pub use planner::{PackageConstraint, Requested, VersionReq};
pub use policy::{PackagePolicy, PolicyMap};
