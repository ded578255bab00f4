//! Error types for configuration store operations.
//!
//! A missing path is not an error: [`crate::ConfigStore::get`] returns `None`
//! and callers fall back to their defaults. Everything here is either a
//! programmer error (a path that walks through a scalar) or an environment
//! error (the document cannot be read or written).

use std::path::PathBuf;
use thiserror::Error;

/// Categories of store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The dotted path cannot address a location in the document
    InvalidPath,
    /// Reading or writing the backing file failed
    Storage,
    /// The document or a section of it has an unexpected shape
    Format,
    /// No project document was found
    NotAProject,
}

impl ErrorCategory {
    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::InvalidPath => "Check the key path; intermediate keys must be objects",
            Self::Storage => "Check file permissions and free disk space",
            Self::Format => "Fix the JSON document by hand or restore it from version control",
            Self::NotAProject => "Run the command from inside a project or pass --config",
        }
    }
}

/// Errors that can occur while loading, mutating or persisting a project config.
#[derive(Debug, Error)]
pub enum Error {
    /// A `set` path is empty or walks through a value that is not an object
    #[error("invalid config path '{path}': {reason}")]
    InvalidConfigPath {
        /// The full dotted path given by the caller
        path: String,
        /// Why the path cannot be used
        reason: String,
    },

    /// The document could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// Location of the document
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The document could not be written back
    #[error("failed to write {path}: {source}")]
    Persist {
        /// Location of the document
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The document is not valid JSON
    #[error("invalid JSON in {path}: {source}")]
    Parse {
        /// Location of the document
        path: PathBuf,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// The document root is not a JSON object
    #[error("config root in {0} must be a JSON object")]
    InvalidRoot(PathBuf),

    /// A service entry does not match the service schema
    #[error("invalid service '{name}': {source}")]
    InvalidService {
        /// Service name (key under `__services`)
        name: String,
        /// Underlying deserialization error
        source: serde_json::Error,
    },

    /// A reserved section has the wrong JSON type
    #[error("config key '{key}' must be {expected}")]
    InvalidSection {
        /// Reserved key
        key: String,
        /// Expected JSON type
        expected: &'static str,
    },

    /// No project document was found in the start directory or its parents
    #[error("could not find '{file_name}' in {start} or any parent directory")]
    NotAProject {
        /// File name that was searched for
        file_name: String,
        /// Directory the search started from
        start: PathBuf,
    },

    /// Serializing the document failed
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConfigPath { .. } => ErrorCategory::InvalidPath,
            Error::Read { .. } | Error::Persist { .. } => ErrorCategory::Storage,
            Error::NotAProject { .. } => ErrorCategory::NotAProject,
            Error::Parse { .. }
            | Error::InvalidRoot(_)
            | Error::InvalidService { .. }
            | Error::InvalidSection { .. }
            | Error::Serialize(_) => ErrorCategory::Format,
        }
    }

    pub(crate) fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Error::InvalidConfigPath {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, Error>;
