//! Core error types for fieldtrack-core.
//!
//! The top-level [`CoreError`] mirrors how failures are handled by callers:
//! permission and location problems are actionable for a user in front of
//! the device, network and auth failures degrade to "retry later", and
//! corrupt persisted state is treated as empty rather than fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fieldtrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Location permission was refused.
    #[error("Location permission denied")]
    PermissionDenied {
        /// `false` when the OS will no longer show the prompt and the user
        /// has to enable the permission from system settings.
        can_ask_again: bool,
    },

    /// GPS fix could not be obtained.
    #[error("Location unavailable: {0}")]
    LocationUnavailable(String),

    /// Remote call failed or the server refused the payload.
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// Credentials were rejected twice in a row.
    #[error("Session expired")]
    AuthExpired,

    /// Start while already tracking, or Stop while idle.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// No employee is signed in.
    #[error("Not signed in")]
    NotSignedIn,

    /// A persisted value could not be decoded.
    #[error("Corrupt stored value for '{key}': {message}")]
    StorageCorruption { key: String, message: String },

    /// Durable store errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Text suitable for an alert shown to the user after a foreground action.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::PermissionDenied { can_ask_again: true } => {
                "Location permission is required. Please allow location access and try again."
                    .to_string()
            }
            CoreError::PermissionDenied { can_ask_again: false } => {
                "Location permission was permanently denied. Enable it in the system settings."
                    .to_string()
            }
            CoreError::LocationUnavailable(_) => {
                "Could not get your location. Make sure GPS is enabled and try again.".to_string()
            }
            CoreError::NetworkFailure(msg) => {
                format!("Could not reach the server ({msg}). The data was saved and will be sent later.")
            }
            CoreError::AuthExpired => "Session expired. Please log in again.".to_string(),
            CoreError::InvalidTransition(msg) => msg.clone(),
            CoreError::NotSignedIn => "No employee is signed in.".to_string(),
            CoreError::StorageCorruption { .. } | CoreError::Store(_) | CoreError::Json(_) => {
                "Local data could not be saved. Please try again.".to_string()
            }
            CoreError::Config(e) => format!("Configuration problem: {e}"),
        }
    }

    /// Whether the failure should be retried on a later tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::NetworkFailure(_) | CoreError::LocationUnavailable(_) | CoreError::Store(_)
        )
    }
}

/// Durable store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the backing database
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Database is locked by another process
    #[error("Store is locked")]
    Locked,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store refused the write (used by in-memory fault injection)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
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

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked
                {
                    StoreError::Locked
                } else {
                    StoreError::QueryFailed(err.to_string())
                }
            }
            _ => StoreError::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_messages_distinguish_permanent_denial() {
        let ask = CoreError::PermissionDenied { can_ask_again: true }.user_message();
        let settings = CoreError::PermissionDenied { can_ask_again: false }.user_message();
        assert_ne!(ask, settings);
        assert!(settings.contains("settings"));
    }

    #[test]
    fn network_failures_are_retryable() {
        assert!(CoreError::NetworkFailure("timeout".into()).is_retryable());
        assert!(!CoreError::AuthExpired.is_retryable());
        assert!(!CoreError::PermissionDenied { can_ask_again: true }.is_retryable());
    }
}
