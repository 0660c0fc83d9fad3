// src/error.rs

//! Error types for the repository agent
//!
//! Planning errors carry exactly one blocking package so that the message
//! shown to the operator names a single problem to fix.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The policy query could not be run or its output could not be used
    #[error("Could not query the APT policy for {names:?}: {reason}")]
    QueryFailure { names: Vec<String>, reason: String },

    #[error("could not obtain APT policy information about the {0} package")]
    PolicyUnavailable(String),

    #[error("the {0} package is not available in the repositories, cannot proceed")]
    NotInRepositories(String),

    #[error(
        "the {requested} version of the {name} package is not available in the repositories, we have {candidate} instead"
    )]
    VersionMismatch {
        name: String,
        requested: String,
        candidate: String,
    },

    #[error("Could not install the {names:?} packages: {reason}")]
    InstallFailure { names: Vec<String>, reason: String },

    #[error("{command} did not finish within {timeout_secs} seconds")]
    SubprocessTimeout { command: String, timeout_secs: u64 },

    #[error("{command} failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("File operation on {path} failed: {source}")]
    FileIOFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl Error {
    /// Wrap an I/O error with the path it happened on
    pub fn file_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileIOFailure {
            path: path.into(),
            source,
        }
    }

    /// True for the errors produced by installation planning
    pub fn is_plan_error(&self) -> bool {
        matches!(
            self,
            Self::PolicyUnavailable(_) | Self::NotInRepositories(_) | Self::VersionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_error_messages() {
        let err = Error::NotInRepositories("storpool-block".to_string());
        assert_eq!(
            err.to_string(),
            "the storpool-block package is not available in the repositories, cannot proceed"
        );

        let err = Error::VersionMismatch {
            name: "storpool-block".to_string(),
            requested: "18.02".to_string(),
            candidate: "18.01".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "the 18.02 version of the storpool-block package is not available in the repositories, we have 18.01 instead"
        );
        assert!(err.is_plan_error());
    }

    #[test]
    fn test_file_io_keeps_path() {
        let err = Error::file_io(
            "/etc/apt/sources.list",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/etc/apt/sources.list"));
        assert!(!err.is_plan_error());
    }
}
