//! Error types for `CertVault` core library.

use thiserror::Error;

/// Result type alias using `CertVault` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `CertVault` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A stored or user-supplied value is outside its closed set.
    #[error("Invalid {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// Date or timestamp that does not parse.
    #[error("Invalid date {value:?}: {reason}")]
    InvalidDate { value: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
