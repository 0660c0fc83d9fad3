// src/process/mod.rs

//! Subprocess execution for package-manager and key-store commands
//!
//! Every external command goes through the [`CommandRunner`] trait so the
//! rest of the crate can be exercised against a scripted system in tests.
//! [`SystemRunner`] is the real implementation:
//!
//! - stdin is nulled so the package manager never waits for a prompt
//! - stdout and stderr are drained on helper threads, so a large
//!   `dpkg-query` listing cannot fill the pipe and stall the child
//! - the child is killed once the configured timeout expires

use crate::error::{Error, Result};
use std::fmt;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default upper bound for one subprocess invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// A command line to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` if the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Return stdout if the command succeeded, `CommandFailed` otherwise
    pub fn into_stdout(self, spec: &CommandSpec) -> Result<String> {
        if self.success() {
            Ok(self.stdout)
        } else {
            Err(Error::CommandFailed {
                command: spec.to_string(),
                code: self.code.unwrap_or(-1),
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Executes external commands
pub trait CommandRunner {
    /// Run `spec` to completion (or timeout) and capture its output
    ///
    /// A non-zero exit status is not an error at this level; callers decide
    /// what a failure means for them.
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run `spec` and return its stdout, failing on a non-zero exit
    fn check_output(&self, spec: &CommandSpec) -> Result<String> {
        self.run(spec)?.into_stdout(spec)
    }

    /// Run `spec`, failing on a non-zero exit
    fn check_call(&self, spec: &CommandSpec) -> Result<()> {
        self.check_output(spec).map(|_| ())
    }
}

/// Runs commands on the local system with a bounded timeout
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                warn!("Failed to read command output: {}", e);
            }
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

fn spawn(spec: &CommandSpec) -> Result<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    Ok(cmd.spawn()?)
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Running: {}", spec);

        let mut child = spawn(spec)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match child.wait_timeout(self.timeout)? {
            Some(status) => {
                let output = CommandOutput {
                    code: status.code(),
                    stdout: collect(stdout),
                    stderr: collect(stderr),
                };
                if output.success() {
                    debug!("{} completed successfully", spec.program);
                } else {
                    debug!("{} exited with {:?}", spec.program, output.code);
                    for line in output.stderr.lines() {
                        debug!("[{}] {}", spec.program, line);
                    }
                }
                Ok(output)
            }
            None => {
                warn!(
                    "{} timed out after {} seconds, killing it",
                    spec,
                    self.timeout.as_secs()
                );
                let _ = child.kill();
                let _ = child.wait();
                // Grandchildren may still hold the pipes open, so the
                // reader threads are left to finish on their own.
                Err(Error::SubprocessTimeout {
                    command: spec.to_string(),
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        }
    }
}
