//! Core error types for tim-core.
//!
//! This module defines the error hierarchy used across the library, built
//! with thiserror. Integration failures are kept separate from store
//! failures because the cycle runner treats them differently: the former are
//! isolated and logged, the latter abort the cycle.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for tim-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Store-related errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Integration-related errors
    #[error("Integration error for '{service}': {message}")]
    Integration {
        service: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An integrator call did not return in time
    #[error("Integration '{service}' timed out after {timeout_secs}s")]
    Timeout { service: String, timeout_secs: u64 },

    /// No schedule with the given id
    #[error("Schedule {0} not found")]
    ScheduleNotFound(i64),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking or spawned task panicked or was cancelled
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CoreError {
    /// Wrap an integrator failure with the service it came from.
    pub fn integration(
        service: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        CoreError::Integration {
            service: service.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// Store-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Two events of one schedule share a source id
    #[error("Schedule {schedule_id} already has an event with source id '{source_id}'")]
    DuplicateSource { schedule_id: i64, source_id: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// A stored row could not be decoded
    #[error("Corrupt row in '{table}': {message}")]
    Corrupt { table: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home/data directory could not be prepared
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors raised at the integration boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Unknown IANA timezone identifier
    #[error("Unknown timezone '{0}'")]
    InvalidTimezone(String),

    /// Unknown weekday abbreviation
    #[error("Unknown weekday '{0}'")]
    InvalidWeekday(String),

    /// Flag string not present in the recognized-flag table
    #[error("Unknown flag '{0}'")]
    UnknownFlag(String),

    /// Unknown rescheduling behavior
    #[error("Unknown rescheduling behavior '{0}'")]
    InvalidReschedulingBehavior(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(err, _msg) => {
                if err.code == rusqlite::ErrorCode::DatabaseLocked {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_name_the_offending_input() {
        let errors = [
            ValidationError::InvalidTimezone("Mars/Olympus".into()),
            ValidationError::InvalidWeekday("Funday".into()),
            ValidationError::UnknownFlag("p9".into()),
            ValidationError::InvalidReschedulingBehavior("LAZY".into()),
        ];
        for (error, needle) in errors.iter().zip(["Mars/Olympus", "Funday", "p9", "LAZY"]) {
            assert!(error.to_string().contains(needle), "{error}");
        }
    }

    #[test]
    fn nested_errors_convert_into_core_error() {
        let core: CoreError = ValidationError::UnknownFlag("p9".into()).into();
        assert!(matches!(core, CoreError::Validation(_)));

        let missing = rusqlite::Error::QueryReturnedNoRows;
        assert!(matches!(
            CoreError::from(missing),
            CoreError::Store(StoreError::QueryFailed(_))
        ));
    }
}
