//! Query Monitor Error System
//!
//! Errors raised by the monitoring core itself. Failures of the operations being
//! monitored are never wrapped here; they pass through `monitor()` untouched.

use thiserror::Error;

/// Result type for all monitoring operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Main error type for the monitoring core
#[derive(Error, Debug)]
pub enum MonitorError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Data store errors raised while validating the database
    #[error("Store operation failed: {operation} - {reason}")]
    Store {
        /// Operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Cache collaborator errors
    #[error("Cache operation failed: {operation} - {reason}")]
    Cache {
        /// Operation that failed
        operation: String,
        /// Reason for failure
        reason: String,
    },

    /// Validation errors
    #[error("Validation failed for '{check}': {reason}")]
    Validation {
        /// Check or identifier that failed validation
        check: String,
        /// Reason for validation failure
        reason: String,
    },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Layered configuration loading errors
    #[error("Config source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// `SQLite` errors
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl MonitorError {
    /// Create configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create store error
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create cache error
    pub fn cache(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cache {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create validation error
    pub fn validation(check: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            check: check.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error came from a collaborator rather than this crate
    #[must_use]
    pub const fn is_external(&self) -> bool {
        match self {
            Self::Store { .. } | Self::Cache { .. } | Self::Io(_) => true,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => true,
            Self::Configuration { .. }
            | Self::Validation { .. }
            | Self::Serialization(_)
            | Self::Toml(_)
            | Self::ConfigSource(_) => false,
        }
    }
}
