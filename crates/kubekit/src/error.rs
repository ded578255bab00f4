//! Error types for cluster and version-control operations.

use thiserror::Error;

/// Categories of kubekit errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A required binary is missing
    NotInstalled,
    /// An external tool ran and reported failure
    Command,
}

impl ErrorCategory {
    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotInstalled => "Run 'kubails doctor' to see which tools are missing",
            Self::Command => "Check the tool output above; is kubectl authenticated to the cluster?",
        }
    }
}

/// Errors that can occur while talking to kubectl, git or helm.
#[derive(Debug, Error)]
pub enum Error {
    /// The binary was not found in PATH
    #[error("{0} not found in PATH")]
    NotInstalled(&'static str),

    /// The binary could not be started
    #[error("failed to execute {binary} {command}: {source}")]
    Spawn {
        /// Executable name
        binary: &'static str,
        /// Arguments
        command: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The binary exited unsuccessfully
    #[error("{binary} {command} failed{}", stderr_suffix(.stderr))]
    CommandFailed {
        /// Executable name
        binary: &'static str,
        /// Arguments
        command: String,
        /// Captured stderr, if any
        stderr: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotInstalled(_) => ErrorCategory::NotInstalled,
            Error::Spawn { .. } | Error::CommandFailed { .. } => ErrorCategory::Command,
        }
    }
}

/// Result type for kubekit operations.
pub type Result<T> = std::result::Result<T, Error>;
