//! Error types for temptrack-export
//!
//! This module provides the error handling for the library, including:
//! - Configuration errors surfaced before any request is made
//! - Transport, HTTP status and endpoint-reported failures
//! - Session state violations (downloading before a preview, etc.)
//! - Machine-readable error codes for embedding applications

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for temptrack-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for temptrack-export
///
/// Every failure in an export session is fatal to that session. Nothing is
/// retried automatically; callers start a fresh session from offset 0.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "backend.api_key")
        key: Option<String>,
    },

    /// The export filters do not describe a valid request
    #[error("invalid export request: {0}")]
    InvalidRequest(String),

    /// Operation attempted in the wrong session state
    #[error("cannot {operation} while session is {current_state}")]
    InvalidState {
        /// The operation that was attempted (e.g., "download", "preview")
        operation: String,
        /// The state that prevents the operation
        current_state: String,
    },

    /// The backend answered with a non-success HTTP status
    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body (possibly empty)
        body: String,
    },

    /// The backend answered 2xx but reported a logical failure
    #[error("backend reported failure: {0}")]
    Endpoint(String),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Output file already exists and the collision action forbids replacing it
    #[error("file collision at {path}")]
    FileCollision {
        /// The path that already exists
        path: PathBuf,
    },

    /// Session was cancelled between pages
    #[error("export cancelled")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code
    ///
    /// Stable across releases; suitable for programmatic handling by the
    /// embedding application.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::InvalidRequest(_) => "invalid_request",
            Error::InvalidState { .. } => "invalid_state",
            Error::HttpStatus { .. } => "http_status",
            Error::Endpoint(_) => "endpoint_failure",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Csv(_) => "csv_error",
            Error::Io(_) => "io_error",
            Error::FileCollision { .. } => "file_collision",
            Error::Cancelled => "cancelled",
            Error::Other(_) => "internal_error",
        }
    }

    /// Whether the error came from talking to the backend
    ///
    /// Useful for telling the user "try again" versus "fix your filters".
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Error::HttpStatus { .. } | Error::Endpoint(_) | Error::Network(_)
        )
    }
}
