// src/lib.rs

//! StorPool APT repository agent
//!
//! Host agent that makes a machine trust and fetch from the StorPool
//! package repository, and installs requested packages while recording
//! exactly which ones it installed so they can be removed on teardown.
//!
//! # Architecture
//!
//! - Event-driven: lifecycle hooks edit a persisted flag bag, then the
//!   state machine converges the system to it
//! - Idempotent: every step checks before it changes anything
//! - Crash-safe: managed files are replaced by temp-then-rename
//! - Scoped teardown: only packages in the install ledger are removed

pub mod config;
mod error;
pub mod filesystem;
pub mod packages;
pub mod process;
pub mod repository;
pub mod state;
pub mod status;

pub use config::{AgentConfig, ConfigProvider};
pub use error::{Error, Result};
pub use packages::{InstallLedger, LedgerLayout, PackageConstraint, PackageInstaller, VersionReq};
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
pub use repository::{RepoDescriptor, RepoProvisioner};
pub use state::{handle_event, Flag, FlagStore, Flags, LifecycleEvent, ProvisioningState, StateMachine};
pub use status::{LogStatus, RecordingStatus, Status, StatusSink};
