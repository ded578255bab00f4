//! Error types for image builds.

use thiserror::Error;

/// Categories of image build errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// docker is not installed
    NotInstalled,
    /// docker ran and reported failure
    Command,
}

impl ErrorCategory {
    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotInstalled => "Install Docker from https://docs.docker.com/get-docker/",
            Self::Command => "Check the Docker output above; is the daemon running and are you logged in to the registry?",
        }
    }
}

/// Errors that can occur while building, pulling or pushing images.
#[derive(Debug, Error)]
pub enum Error {
    /// The docker executable was not found in PATH
    #[error("docker not found in PATH")]
    NotInstalled,

    /// docker could not be started
    #[error("failed to execute docker {command}: {source}")]
    Spawn {
        /// Subcommand
        command: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// docker exited unsuccessfully
    #[error("docker {command} failed for {image}")]
    CommandFailed {
        /// Subcommand
        command: String,
        /// Image reference the command operated on
        image: String,
        /// Exit code, if any
        code: Option<i32>,
    },
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotInstalled => ErrorCategory::NotInstalled,
            Error::Spawn { .. } | Error::CommandFailed { .. } => ErrorCategory::Command,
        }
    }
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, Error>;
