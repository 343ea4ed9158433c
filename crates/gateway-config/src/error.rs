//! Errors raised while reading configuration from disk.
//!
//! Validation failures of individual documents are not errors here: they
//! are reported as rejected objects or status conditions.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file is not well-formed YAML, JSON or TOML.
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Path being parsed.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// File extension is not a supported format.
    #[error("Unsupported configuration format: {path}")]
    UnsupportedFormat {
        /// Offending path.
        path: PathBuf,
    },

    /// Controller settings are invalid.
    #[error("Invalid settings: {0}")]
    Settings(String),
}

impl ConfigError {
    /// Build an I/O error for a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build a parse error for a path.
    pub fn parse(path: impl AsRef<Path>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "CONFIG_IO",
            Self::Parse { .. } => "CONFIG_PARSE",
            Self::UnsupportedFormat { .. } => "CONFIG_FORMAT",
            Self::Settings(_) => "CONFIG_SETTINGS",
        }
    }
}
