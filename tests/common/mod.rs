// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;
use storpool_repo_add::config::AgentConfig;
use storpool_repo_add::packages::{InstallLedger, LedgerLayout};
use storpool_repo_add::repository::{RepoProvisioner, KEY_IDENTITY};
use storpool_repo_add::{CommandOutput, CommandRunner, CommandSpec, Error, FlagStore, Result};
use tempfile::TempDir;

pub const REPO_URL: &str = "https://repo.example.com/storpool-maas/";

/// Simulated package database and key store
#[derive(Debug, Default)]
pub struct SystemState {
    /// Installed packages (name -> version)
    pub installed: BTreeMap<String, String>,
    /// Versions available from the configured sources
    pub available: BTreeMap<String, String>,
    /// Packages pulled in along with a package
    pub depends: BTreeMap<String, Vec<String>>,
    /// Names whose policy output is garbled
    pub garbled_policy: BTreeSet<String>,
    pub has_key: bool,
    pub fail_install: bool,
    pub fail_remove: bool,
    pub fail_update: bool,
    pub fail_key_list: bool,
    pub fail_policy: bool,
    /// Program and first argument (e.g. "apt-get install") that hang
    pub hang_on: Option<String>,
}

/// `CommandRunner` that simulates apt-cache, dpkg, apt-get and apt-key
///
/// Every invocation is recorded so tests can assert on exactly what ran.
#[derive(Debug, Default)]
pub struct FakeSystem {
    pub state: RefCell<SystemState>,
    pub calls: RefCell<Vec<CommandSpec>>,
}

fn ok(stdout: impl Into<String>) -> Result<CommandOutput> {
    Ok(CommandOutput {
        code: Some(0),
        stdout: stdout.into(),
        stderr: String::new(),
    })
}

fn fail(code: i32, stderr: &str) -> Result<CommandOutput> {
    Ok(CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

fn names_after_separator(args: &[String]) -> Vec<String> {
    args.iter()
        .skip_while(|arg| arg.as_str() != "--")
        .skip(1)
        .cloned()
        .collect()
}

impl FakeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(self, name: &str, version: &str) -> Self {
        self.state
            .borrow_mut()
            .installed
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn with_available(self, name: &str, version: &str) -> Self {
        self.state
            .borrow_mut()
            .available
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn with_depends(self, name: &str, deps: &[&str]) -> Self {
        self.state
            .borrow_mut()
            .depends
            .insert(name.to_string(), deps.iter().map(|d| d.to_string()).collect());
        self
    }

    pub fn installed(&self) -> BTreeMap<String, String> {
        self.state.borrow().installed.clone()
    }

    /// Command lines run so far, rendered as strings
    pub fn commands(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|spec| spec.to_string()).collect()
    }

    /// Calls whose program and first argument match
    pub fn calls_to(&self, program: &str, first_arg: &str) -> Vec<CommandSpec> {
        self.calls
            .borrow()
            .iter()
            .filter(|spec| spec.program == program && spec.args.first().map(String::as_str) == Some(first_arg))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn policy(&self, name: &str) -> String {
        let state = self.state.borrow();
        if state.garbled_policy.contains(name) {
            return format!("{}:\n  Installed: 1.0\n  Installed: 1.1\n  Candidate: 1.1\n", name);
        }

        let installed = state.installed.get(name).cloned();
        let candidate = state.available.get(name).cloned().or_else(|| installed.clone());
        format!(
            "{}:\n  Installed: {}\n  Candidate: {}\n  Version table:\n",
            name,
            installed.as_deref().unwrap_or("(none)"),
            candidate.as_deref().unwrap_or("(none)")
        )
    }

    fn dpkg_listing(&self) -> String {
        let state = self.state.borrow();
        let mut out = String::new();
        for (name, version) in &state.installed {
            out.push_str(&format!("{}\t{}\tinstall ok installed\n", name, version));
        }
        out.push_str("removed-pkg\t1.0\tdeinstall ok config-files\n");
        out
    }

    fn apt_install(&self, names: &[String]) -> Result<CommandOutput> {
        let mut state = self.state.borrow_mut();
        if state.fail_install {
            return fail(100, "E: Could not get lock /var/lib/dpkg/lock-frontend");
        }
        if let Some(missing) = names.iter().find(|n| !state.available.contains_key(*n)) {
            return fail(100, &format!("E: Unable to locate package {}", missing));
        }

        let mut queue: Vec<String> = names.to_vec();
        while let Some(name) = queue.pop() {
            let Some(version) = state.available.get(&name).cloned() else {
                continue;
            };
            if state.installed.get(&name) == Some(&version) {
                continue;
            }
            state.installed.insert(name.clone(), version);
            if let Some(deps) = state.depends.get(&name) {
                queue.extend(deps.iter().cloned());
            }
        }
        ok("")
    }

    fn apt_remove(&self, names: &[String]) -> Result<CommandOutput> {
        let mut state = self.state.borrow_mut();
        if state.fail_remove {
            return fail(100, "E: Could not get lock /var/lib/dpkg/lock-frontend");
        }
        for name in names {
            state.installed.remove(name);
        }
        ok("")
    }

    fn apt_key(&self, args: &[String]) -> Result<CommandOutput> {
        match args {
            [adv, ..] if adv == "adv" => {
                let state = self.state.borrow();
                if state.fail_key_list {
                    return fail(2, "gpg: keyblock resource: No such file or directory");
                }
                let mut out = String::from("tru::1:1526371200:0:3:1:5\n");
                out.push_str("pub:-:4096:1:3B4FE6ACC0B21F32:1336770936:::-:::scSC:\n");
                if state.has_key {
                    out.push_str(&format!("{}1502175613:::-:::scESC:\n", KEY_IDENTITY));
                }
                ok(out)
            }
            [opt, keyring, add, key_file] if opt == "--keyring" && add == "add" => {
                let material = match fs::read(key_file) {
                    Ok(material) => material,
                    Err(_) => return fail(2, "gpg: can't open key file"),
                };
                if fs::write(keyring, material).is_err() {
                    return fail(2, "gpg: can't create keyring");
                }
                self.state.borrow_mut().has_key = true;
                ok("OK\n")
            }
            _ => fail(1, "apt-key: unsupported invocation"),
        }
    }
}

impl CommandRunner for FakeSystem {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        self.calls.borrow_mut().push(spec.clone());

        let args = spec.args.as_slice();
        let first_arg = args.first().map(String::as_str);
        if let Some(hang_on) = &self.state.borrow().hang_on
            && *hang_on == format!("{} {}", spec.program, first_arg.unwrap_or_default())
        {
            return Err(Error::SubprocessTimeout {
                command: spec.to_string(),
                timeout_secs: 600,
            });
        }

        match (spec.program.as_str(), first_arg) {
            ("apt-cache", Some("policy")) if self.state.borrow().fail_policy => {
                fail(100, "E: Could not open file /var/lib/apt/lists/lock")
            }
            ("apt-cache", Some("policy")) => {
                let names = names_after_separator(args);
                let out: String = names.iter().map(|name| self.policy(name)).collect();
                ok(out)
            }
            ("dpkg-query", Some("-W")) => ok(self.dpkg_listing()),
            ("dpkg", Some("-L")) => {
                let names = names_after_separator(args);
                match names.first() {
                    Some(name) if self.state.borrow().installed.contains_key(name) => {
                        ok(format!("/.\n/usr/share/doc/{}\n\n/usr\n", name))
                    }
                    Some(name) => fail(1, &format!("dpkg-query: package '{}' is not installed", name)),
                    None => fail(2, "dpkg: --listfiles needs a valid package name"),
                }
            }
            ("apt-get", Some("install")) => self.apt_install(&names_after_separator(args)),
            ("apt-get", Some("remove")) => self.apt_remove(&names_after_separator(args)),
            ("apt-get", Some("update")) => {
                if self.state.borrow().fail_update {
                    fail(100, "E: Failed to fetch https://repo.example.com/storpool-maas/")
                } else {
                    ok("Reading package lists...\n")
                }
            }
            ("apt-key", _) => self.apt_key(args),
            _ => fail(127, "command not found"),
        }
    }
}

/// A throwaway APT root and state directory
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config: AgentConfig,
}

impl TestEnv {
    /// Environment with the repository URL configured
    pub fn new() -> Self {
        Self::with_url(Some(REPO_URL))
    }

    pub fn with_url(url: Option<&str>) -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path();
        let apt_root = root.join("etc/apt");
        fs::create_dir_all(&apt_root).unwrap();
        let key_file = root.join("storpool-maas.key");
        fs::write(&key_file, "-----BEGIN PGP PUBLIC KEY BLOCK-----\n").unwrap();

        let mut config = AgentConfig::default();
        config.repository.url = url.map(str::to_string);
        config.paths.apt_root = apt_root;
        config.paths.state_dir = root.join("var/lib/storpool");
        config.paths.key_file = key_file;
        config.ledger.unit = "storpool-block".to_string();

        Self { temp_dir, config }
    }

    pub fn set_url(&mut self, url: Option<&str>) {
        self.config.repository.url = url.map(str::to_string);
    }

    pub fn ledger(&self) -> InstallLedger {
        InstallLedger::new(&self.config.paths.state_dir, &self.config.ledger.unit, LedgerLayout::Flat)
    }

    pub fn shared_ledger(&self, unit: &str) -> InstallLedger {
        InstallLedger::new(&self.config.paths.state_dir, unit, LedgerLayout::Shared)
    }

    pub fn provisioner<'a>(&self, system: &'a FakeSystem) -> RepoProvisioner<'a, FakeSystem> {
        RepoProvisioner::new(self.config.layout(), &self.config.paths.key_file, system)
    }

    pub fn flag_store(&self) -> FlagStore {
        FlagStore::new(&self.config.paths.state_dir, &self.config.ledger.unit)
    }

    pub fn sources_list(&self) -> PathBuf {
        self.config.layout().sources_list()
    }

    pub fn keyring(&self) -> PathBuf {
        self.config.layout().keyring()
    }

    pub fn global_sources_list(&self) -> PathBuf {
        self.config.layout().global_sources_list()
    }
}
