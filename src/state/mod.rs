// src/state/mod.rs

//! Provisioning state machine
//!
//! The agent is driven by lifecycle events from the deployment framework.
//! Progress between invocations is kept in a [`Flags`] bag: *request*
//! flags say what should be (re)checked, *mark* flags say what has been
//! verified. An event only edits the bag ([`handle_event`]); the actual
//! work happens in [`StateMachine::converge`], which repeatedly applies the
//! first enabled step of the transition table until none is left:
//!
//! | Step        | Enabled when                                              |
//! |-------------|-----------------------------------------------------------|
//! | stop        | `stop`, not `stopped`                                     |
//! | configure   | `configure`, not `configured`                             |
//! | wait        | not `configured`, any of the install/update requests      |
//! | install key | `configured`, `install-apt-key`, not `installed-apt-key`  |
//! | install repo| `configured`, `install-apt-repo`, not `installed-apt-repo`|
//! | update apt  | `configured`, `update-apt`, `installed-apt-repo`, not `updated-apt` |
//!
//! Every step either sets the mark that disables it or parks the machine,
//! so a converge run always terminates. `stopped` is terminal.

pub mod store;

use crate::config::{ConfigProvider, REPO_URL_KEY};
use crate::error::{Error, Result};
use crate::packages::PackageInstaller;
use crate::process::CommandRunner;
use crate::repository::{RepoDescriptor, RepoProvisioner};
use crate::status::{Status, StatusSink};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

pub use store::FlagStore;

/// A single entry in the flag bag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flag {
    /// Re-read the configuration
    Configure,
    /// A repository URL is configured
    Configured,
    /// Check (and install) the signing key
    InstallAptKey,
    InstalledAptKey,
    /// Check (and install) the sources file
    InstallAptRepo,
    InstalledAptRepo,
    /// Refresh the package cache
    UpdateApt,
    UpdatedApt,
    /// The repository is usable by other components
    Available,
    /// Tear everything down
    Stop,
    Stopped,
}

/// Flags set by a full re-arm of the forward path
const REDO_REQUESTS: [Flag; 4] = [
    Flag::InstallAptKey,
    Flag::InstallAptRepo,
    Flag::UpdateApt,
    Flag::Configure,
];

/// Marks cleared by a full re-arm of the forward path
const REDO_MARKS: [Flag; 3] = [Flag::InstalledAptKey, Flag::InstalledAptRepo, Flag::UpdatedApt];

/// The persisted flag bag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(BTreeSet<Flag>);

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, flag: Flag) -> bool {
        self.0.contains(&flag)
    }

    pub fn set(&mut self, flag: Flag) {
        self.0.insert(flag);
    }

    pub fn clear(&mut self, flag: Flag) {
        self.0.remove(&flag);
    }

    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Lifecycle events delivered by the deployment framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Install,
    ConfigChanged,
    UpgradeCharm,
    UpdateStatus,
    Stop,
}

impl LifecycleEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::ConfigChanged => "config-changed",
            Self::UpgradeCharm => "upgrade-charm",
            Self::UpdateStatus => "update-status",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "install" => Ok(Self::Install),
            "config-changed" => Ok(Self::ConfigChanged),
            "upgrade-charm" => Ok(Self::UpgradeCharm),
            "update-status" => Ok(Self::UpdateStatus),
            "stop" => Ok(Self::Stop),
            other => Err(Error::ParseError(format!("unknown lifecycle event '{}'", other))),
        }
    }
}

/// Where the provisioning currently stands, derived from the flag bag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    /// No repository URL
    Unconfigured,
    /// A configuration check is pending
    Configuring,
    /// The key still has to be checked or installed
    KeyMissing,
    /// The key is in place, the repository has not been requested
    KeyPresent,
    /// The repository still has to be checked or installed
    RepoMissing,
    /// The repository is in place, no refresh has been requested
    RepoPresent,
    /// The repository is in place and the cache needs a refresh
    CacheStale,
    /// Everything is in place
    Available,
    /// A stop has been requested
    Stopping,
    /// Torn down; no further work will be done
    Stopped,
}

impl ProvisioningState {
    pub fn from_flags(flags: &Flags) -> Self {
        if flags.has(Flag::Stopped) {
            return Self::Stopped;
        }
        if flags.has(Flag::Stop) {
            return Self::Stopping;
        }
        if !flags.has(Flag::Configured) {
            return if flags.has(Flag::Configure) {
                Self::Configuring
            } else {
                Self::Unconfigured
            };
        }
        if !flags.has(Flag::InstalledAptKey) {
            return Self::KeyMissing;
        }
        if !flags.has(Flag::InstalledAptRepo) {
            return if flags.has(Flag::InstallAptRepo) {
                Self::RepoMissing
            } else {
                Self::KeyPresent
            };
        }
        if flags.has(Flag::UpdatedApt) || (flags.has(Flag::Available) && !flags.has(Flag::UpdateApt)) {
            return Self::Available;
        }
        if flags.has(Flag::UpdateApt) {
            Self::CacheStale
        } else {
            Self::RepoPresent
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configuring => "configuring",
            Self::KeyMissing => "key-missing",
            Self::KeyPresent => "key-present",
            Self::RepoMissing => "repo-missing",
            Self::RepoPresent => "repo-present",
            Self::CacheStale => "cache-stale",
            Self::Available => "available",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn redo(mut flags: Flags, clear_configured: bool) -> Flags {
    for flag in REDO_REQUESTS {
        flags.set(flag);
    }
    for flag in REDO_MARKS {
        flags.clear(flag);
    }
    if clear_configured {
        flags.clear(Flag::Configured);
    }
    flags
}

/// Apply a lifecycle event to the flag bag
///
/// This only records what has to be done; nothing is touched on the
/// system until [`StateMachine::converge`] runs.
pub fn handle_event(mut flags: Flags, event: LifecycleEvent) -> Flags {
    debug!("Handling the {} event", event);
    if flags.has(Flag::Stopped) {
        debug!("Already stopped, ignoring {}", event);
        return flags;
    }

    match event {
        LifecycleEvent::Install => redo(flags, false),
        LifecycleEvent::ConfigChanged | LifecycleEvent::UpgradeCharm => redo(flags, true),
        LifecycleEvent::UpdateStatus => {
            // Recheck the key and the repository without forcing a refresh
            flags.set(Flag::InstallAptKey);
            flags.set(Flag::InstallAptRepo);
            for flag in REDO_MARKS {
                flags.clear(flag);
            }
            if !flags.has(Flag::Configured) {
                flags.set(Flag::Configure);
            }
            flags
        }
        LifecycleEvent::Stop => {
            flags.set(Flag::Stop);
            flags
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Stop,
    Configure,
    Deconfigure,
    WaitForConfig,
    InstallKey,
    InstallRepo,
    UpdateApt,
}

/// Upper bound on steps in one converge run; each step disables itself
const MAX_STEPS: usize = 16;

/// Drives the provisioning steps against the system
pub struct StateMachine<'a, R: CommandRunner + ?Sized> {
    config: &'a dyn ConfigProvider,
    repo: &'a RepoProvisioner<'a, R>,
    installer: &'a PackageInstaller<'a, R>,
    status: &'a dyn StatusSink,
}

impl<'a, R: CommandRunner + ?Sized> StateMachine<'a, R> {
    pub fn new(
        config: &'a dyn ConfigProvider,
        repo: &'a RepoProvisioner<'a, R>,
        installer: &'a PackageInstaller<'a, R>,
        status: &'a dyn StatusSink,
    ) -> Self {
        Self {
            config,
            repo,
            installer,
            status,
        }
    }

    fn repo_url(&self) -> Option<String> {
        self.config
            .get(REPO_URL_KEY)
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
    }

    fn next_step(&self, flags: &Flags) -> Option<Step> {
        if flags.has(Flag::Stopped) {
            return None;
        }
        if flags.has(Flag::Stop) {
            return Some(Step::Stop);
        }
        if flags.has(Flag::Configure) && !flags.has(Flag::Configured) {
            return Some(Step::Configure);
        }
        if flags.has(Flag::Configured) && self.repo_url().is_none() {
            return Some(Step::Deconfigure);
        }

        let requested = [Flag::InstallAptKey, Flag::InstallAptRepo, Flag::UpdateApt]
            .into_iter()
            .any(|flag| flags.has(flag));
        if !flags.has(Flag::Configured) {
            return requested.then_some(Step::WaitForConfig);
        }

        if flags.has(Flag::InstallAptKey) && !flags.has(Flag::InstalledAptKey) {
            return Some(Step::InstallKey);
        }
        if flags.has(Flag::InstallAptRepo) && !flags.has(Flag::InstalledAptRepo) {
            return Some(Step::InstallRepo);
        }
        if flags.has(Flag::UpdateApt) && flags.has(Flag::InstalledAptRepo) && !flags.has(Flag::UpdatedApt) {
            return Some(Step::UpdateApt);
        }
        None
    }

    /// Run every enabled step until the machine settles
    ///
    /// The flag bag is updated in place after each completed step, so the
    /// caller can persist partial progress even when a step fails.
    pub fn converge(&self, flags: &mut Flags) -> Result<ProvisioningState> {
        for _ in 0..MAX_STEPS {
            let Some(step) = self.next_step(flags) else {
                break;
            };
            debug!("Running the {:?} step", step);

            if step == Step::WaitForConfig {
                self.report_no_config();
                break;
            }

            if let Err(e) = self.run_step(step, flags) {
                self.status.set(Status::Blocked, &e.to_string());
                return Err(e);
            }
        }

        let state = ProvisioningState::from_flags(flags);
        if state == ProvisioningState::Available {
            self.status.set(Status::Active, "");
        }
        debug!("Settled in the {} state", state);
        Ok(state)
    }

    fn run_step(&self, step: Step, flags: &mut Flags) -> Result<()> {
        match step {
            Step::Stop => self.stop(flags),
            Step::Configure => {
                self.configure(flags);
                Ok(())
            }
            Step::Deconfigure => {
                info!("The repository URL is no longer set");
                for flag in [Flag::Configured, Flag::Available, Flag::UpdatedApt] {
                    flags.clear(flag);
                }
                Ok(())
            }
            Step::InstallKey => self.install_key(flags),
            Step::InstallRepo => self.install_repo(flags),
            Step::UpdateApt => self.update_apt(flags),
            Step::WaitForConfig => Ok(()),
        }
    }

    fn report_no_config(&self) {
        debug!("No StorPool configuration yet");
        self.status.set(Status::Waiting, "waiting for the StorPool configuration");
    }

    fn configure(&self, flags: &mut Flags) {
        flags.clear(Flag::Configure);
        match self.repo_url() {
            Some(url) => {
                debug!("Got a repository URL: {}", url);
                flags.set(Flag::Configured);
            }
            None => {
                debug!("No repository URL set in the config yet");
                flags.clear(Flag::Configured);
            }
        }
    }

    fn descriptor(&self) -> Result<RepoDescriptor> {
        self.repo_url()
            .map(|url| RepoDescriptor::new(&url))
            .ok_or_else(|| Error::ConfigError(format!("{} is not set", REPO_URL_KEY)))
    }

    fn install_key(&self, flags: &mut Flags) -> Result<()> {
        self.status.set(Status::Maintenance, "checking for the APT key");
        if !self.repo.has_key()? {
            self.repo.install_key()?;
        }
        debug!("The APT key seems fine");
        self.status.set(Status::Maintenance, "");
        flags.set(Flag::InstalledAptKey);
        Ok(())
    }

    fn install_repo(&self, flags: &mut Flags) -> Result<()> {
        self.status.set(Status::Maintenance, "checking for the APT repository");
        let repo = self.descriptor()?;
        if !self.repo.has_repo(&repo)? {
            self.repo.install_repo(&repo)?;
            flags.set(Flag::UpdateApt);
            flags.clear(Flag::UpdatedApt);
        }
        debug!("The APT repository seems fine");
        self.status.set(Status::Maintenance, "");
        flags.set(Flag::InstalledAptRepo);
        Ok(())
    }

    fn update_apt(&self, flags: &mut Flags) -> Result<()> {
        self.status.set(Status::Maintenance, "updating the APT cache");
        self.repo.update_cache()?;
        debug!("The APT cache update seems fine");
        self.status.set(Status::Maintenance, "");
        flags.clear(Flag::UpdateApt);
        flags.set(Flag::UpdatedApt);
        flags.set(Flag::Available);
        Ok(())
    }

    fn stop(&self, flags: &mut Flags) -> Result<()> {
        info!("Stopping as requested");
        if let Err(e) = self.repo.remove() {
            warn!("Could not remove all the repository files: {}", e);
        }
        if let Err(e) = self.installer.uninstall_recorded() {
            warn!("Could not uninstall the recorded packages: {}", e);
        }

        *flags = Flags::new();
        flags.set(Flag::Stopped);
        self.status.set(Status::Maintenance, "");
        Ok(())
    }
}
