//! Error types for Fuelwatch operations.
//!
//! [`FuelwatchError`] covers the failures shared by every crate in the
//! workspace: configuration loading, filesystem access and invalid session
//! data. HTTP failures live in `fuelwatch-alerts` and wrap this type when
//! they need to.
//!
//! [`FuelwatchError::guidance`] is printed by the binary under the error.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`FuelwatchError`].
pub type Result<T> = std::result::Result<T, FuelwatchError>;

/// Error type for shared Fuelwatch operations.
#[derive(Debug, Error)]
pub enum FuelwatchError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// A user or branch identifier was empty or malformed
    #[error("Invalid {kind} identifier: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    /// An operation needs a logged-in user but the session has none
    #[error("No user in session")]
    MissingUser,

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in Fuelwatch)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FuelwatchError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a ConfigNotFound error with source
    pub fn config_not_found_with_source(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: Some(source),
        }
    }

    /// Create a ConfigValidation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an invalid identifier error
    pub fn invalid_identifier(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind,
            value: value.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigValidation { .. }
        )
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.fuelwatch/config.yaml or pass --config with an existing file")
            }
            Self::ConfigInvalid { .. } => Some("Check the YAML syntax of the configuration file"),
            Self::ConfigValidation { .. } => {
                Some("Fix the reported field in the configuration file or environment")
            }
            Self::MissingUser => {
                Some("Set session.user_id in the configuration or FUELWATCH_USER_ID")
            }
            Self::InvalidIdentifier { .. } => {
                Some("Identifiers must be non-empty and contain no '/'")
            }
            Self::DirectoryCreation { .. } => Some("Pass --log-dir with a writable directory"),
            _ => None,
        }
    }
}
