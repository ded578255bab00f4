//! Error types for Terraform operations.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of Terraform errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// A value cannot be expressed as a Terraform variable
    Encoding,
    /// The terraform binary is missing
    NotInstalled,
    /// terraform ran and reported failure
    Command,
    /// Infrastructure outputs are missing or unreadable
    Output,
}

impl ErrorCategory {
    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Encoding => "Use only strings, numbers, booleans, null, arrays and objects",
            Self::NotInstalled => "Install Terraform from https://developer.hashicorp.com/terraform/install",
            Self::Command => "Check the Terraform output above for details",
            Self::Output => "Has the infrastructure been deployed? Run 'kubails infra deploy'",
        }
    }
}

/// Errors that can occur while encoding variables or running Terraform.
#[derive(Debug, Error)]
pub enum Error {
    /// The value is not one of the encodable kinds
    #[error("unsupported value kind: {0}")]
    UnsupportedValueKind(String),

    /// The terraform executable was not found in PATH
    #[error("terraform not found in PATH")]
    NotInstalled,

    /// terraform could not be started
    #[error("failed to execute terraform {command}: {source}")]
    Spawn {
        /// Subcommand line
        command: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// terraform exited unsuccessfully
    #[error("terraform {command} failed{}", exit_suffix(.code))]
    CommandFailed {
        /// Subcommand line
        command: String,
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured stderr, if any
        stderr: String,
    },

    /// The named output is empty
    #[error("Terraform output '{0}' doesn't exist")]
    OutputMissing(String),

    /// The named output is not valid JSON
    #[error("invalid JSON in Terraform output '{name}': {source}")]
    InvalidOutput {
        /// Output name
        name: String,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// The Terraform working directory does not exist
    #[error("Terraform directory not found: {0}")]
    MissingDirectory(PathBuf),
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => String::new(),
    }
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedValueKind(_) => ErrorCategory::Encoding,
            Error::NotInstalled => ErrorCategory::NotInstalled,
            Error::Spawn { .. } | Error::CommandFailed { .. } | Error::MissingDirectory(_) => {
                ErrorCategory::Command
            }
            Error::OutputMissing(_) | Error::InvalidOutput { .. } => ErrorCategory::Output,
        }
    }
}

/// Result type for Terraform operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let err = Error::CommandFailed {
            command: "apply".to_string(),
            code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "terraform apply failed with exit code 1");
        assert_eq!(err.category(), ErrorCategory::Command);
    }

    #[test]
    fn test_output_missing_advice() {
        let err = Error::OutputMissing("cluster_name".to_string());
        assert_eq!(err.category(), ErrorCategory::Output);
        assert!(err.category().advice().contains("infra deploy"));
    }
}
