//! Error types for the benchmark engine

use crate::types::FailureKind;
use thiserror::Error;

/// Result type alias for benchmark engine operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Main error type for the benchmark engine
///
/// Request-level errors (everything except [`BenchError::Config`]) are
/// recovered locally and converted into a failed
/// [`crate::types::RequestOutcome`] via [`BenchError::classify`]; they never
/// abort a load driver or the orchestrator.
#[derive(Error, Debug, Clone)]
pub enum BenchError {
    /// Configuration related errors; fatal before any network activity
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not establish or maintain the connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Deadline exceeded before the request completed
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Backend returned data the adapter could not parse
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Non-success status code before streaming began
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Other HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// The run was cancelled (deadline or user interrupt)
    #[error("Run cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl BenchError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a new connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a new timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a new malformed-frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }

    /// Map a request-level error into the outcome failure taxonomy.
    ///
    /// `first_token_seen` distinguishes a stall before the first token
    /// (no valid TTFT) from a stall mid-stream (TTFT is valid, the request
    /// is partial).
    pub fn classify(&self, first_token_seen: bool) -> FailureKind {
        match self {
            Self::Timeout(_) | Self::Cancelled => {
                if first_token_seen {
                    FailureKind::TimeoutMidStream
                } else {
                    FailureKind::TimeoutNoFirstToken
                }
            }
            Self::MalformedFrame(_) | Self::Json(_) => FailureKind::MalformedFrame,
            Self::HttpStatus { status, .. } => FailureKind::HttpErrorStatus { status: *status },
            Self::Connection(_) | Self::Http(_) | Self::Io(_) | Self::Config(_) | Self::Other(_) => {
                FailureKind::ConnectionError
            }
        }
    }
}

impl From<anyhow::Error> for BenchError {
    fn from(error: anyhow::Error) -> Self {
        Self::Other(error.to_string())
    }
}

impl From<std::io::Error> for BenchError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

impl From<reqwest::Error> for BenchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(error.to_string())
        } else if error.is_connect() {
            Self::Connection(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_classification_depends_on_first_token() {
        let err = BenchError::timeout("stalled");
        assert_eq!(err.classify(false), FailureKind::TimeoutNoFirstToken);
        assert_eq!(err.classify(true), FailureKind::TimeoutMidStream);
    }

    #[test]
    fn cancellation_classifies_as_timeout() {
        assert_eq!(
            BenchError::Cancelled.classify(false),
            FailureKind::TimeoutNoFirstToken
        );
        assert_eq!(
            BenchError::Cancelled.classify(true),
            FailureKind::TimeoutMidStream
        );
    }

    #[test]
    fn http_status_carries_code() {
        let err = BenchError::HttpStatus {
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(
            err.classify(false),
            FailureKind::HttpErrorStatus { status: 503 }
        );
    }

    #[test]
    fn malformed_is_distinct_from_timeout() {
        let err = BenchError::malformed("not json");
        assert_eq!(err.classify(false), FailureKind::MalformedFrame);
        assert_eq!(err.classify(true), FailureKind::MalformedFrame);
    }
}
