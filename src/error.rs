//! Error types for the fuel price pipeline.
//!
//! Row-level problems never show up here: they are tallied in a
//! [`NormalizationReport`](crate::normalize::NormalizationReport). What does
//! show up is source-level failure, which the caller can answer by serving a
//! stale table or reporting the source as unavailable.

use thiserror::Error;

/// Source-level failure raised by the fetch, parse and configuration paths.
///
/// Payloads are plain strings so a single failure can be cloned out to every
/// caller waiting on the same cache key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FuelError {
    /// Network or HTTP transport failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// Upstream replied with a non-success status
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Payload could not be decoded
    #[error("failed to parse payload: {0}")]
    Parse(String),

    /// No input row could be mapped with the selected profile
    #[error("profile '{profile}' does not match input, missing columns: {missing:?}")]
    SchemaMismatch {
        profile: String,
        missing: Vec<String>,
    },

    /// Settings or config file problem
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential could not be encoded as an HTTP header
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl FuelError {
    /// Returns `true` for failures caused by the upstream source rather than
    /// by local configuration.
    pub fn is_transport(&self) -> bool {
        matches!(self, FuelError::Transport(_) | FuelError::Status { .. })
    }
}

impl From<reqwest::Error> for FuelError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FuelError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            },
            None if err.is_decode() => FuelError::Parse(err.to_string()),
            None => FuelError::Transport(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for FuelError {
    fn from(err: serde_json::Error) -> Self {
        FuelError::Parse(err.to_string())
    }
}

impl From<csv::Error> for FuelError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Io(_) => FuelError::Io(err.to_string()),
            _ => FuelError::Parse(err.to_string()),
        }
    }
}

impl From<std::io::Error> for FuelError {
    fn from(err: std::io::Error) -> Self {
        FuelError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FuelError>;
