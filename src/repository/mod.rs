// src/repository/mod.rs

//! StorPool package repository provisioning
//!
//! This module provides functionality for:
//! - Detecting and installing the repository signing key
//! - Generating and matching the dedicated APT sources file
//! - Cleaning superseded repository lines out of the global sources file
//! - Removing everything again on teardown

pub mod keyring;
pub mod provisioner;
pub mod sources;

pub use keyring::KEY_IDENTITY;
pub use provisioner::RepoProvisioner;
pub use sources::RepoDescriptor;
