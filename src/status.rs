// src/status.rs

//! Unit status reporting
//!
//! The state machine reports `(status, message)` pairs through the
//! [`StatusSink`] trait. Implementations include:
//! - `LogStatus`: Logs each update to tracing
//! - `RecordingStatus`: Keeps every update in memory (for tests and the CLI summary)

use std::fmt;
use std::sync::Mutex;
use tracing::{info, warn};

/// Workload status of the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Work is in progress
    Maintenance,
    /// Parked until some external input arrives
    Waiting,
    /// An operation failed and needs operator attention
    Blocked,
    /// The repository is ready for use
    Active,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::Waiting => "waiting",
            Self::Blocked => "blocked",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver for status updates
///
/// An empty message clears whatever was reported before.
pub trait StatusSink {
    fn set(&self, status: Status, message: &str);
}

/// Log status updates via tracing
#[derive(Debug, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn set(&self, status: Status, message: &str) {
        match status {
            Status::Blocked => warn!("[{}] {}", status, message),
            _ if message.is_empty() => info!("[{}]", status),
            _ => info!("[{}] {}", status, message),
        }
    }
}

/// Keep every status update in memory
#[derive(Debug, Default)]
pub struct RecordingStatus {
    updates: Mutex<Vec<(Status, String)>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All updates so far, oldest first
    pub fn updates(&self) -> Vec<(Status, String)> {
        self.updates
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    /// The most recent update, if any
    pub fn last(&self) -> Option<(Status, String)> {
        self.updates().pop()
    }
}

impl StatusSink for RecordingStatus {
    fn set(&self, status: Status, message: &str) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push((status, message.to_string()));
        }
    }
}
