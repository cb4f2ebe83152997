//! Error Handling Infrastructure
//!
//! This module defines the error type shared by the connection provider, the
//! inspector and the analyzer. None of these errors ever reach the agent as a
//! fault: the gateway façade renders every one of them into a line of text.
//!
//! # Error Categories
//! - `NoConnection`: No connection descriptor configured for the session
//! - `ConnectionFailed`: Could not open a connection to the database
//! - `QueryFailed`: The database rejected or failed a statement
//! - `InvalidInput`: Malformed input (bad identifier, bad descriptor)
//! - `Timeout`: The per-call deadline elapsed
//! - `Cancelled`: The caller tripped the cancellation signal
//! - `ConfigError`: Configuration file or environment errors

use std::time::Duration;

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// No connection descriptor available for this session
    #[error("No database connection available. Database connection should be established at startup.")]
    NoConnection,

    /// Database connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement preparation or execution failed
    #[error("{0}")]
    QueryFailed(String),

    /// Invalid input or missing required parameters
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Per-call deadline elapsed before the operation finished
    #[error("query exceeded deadline of {}s", .0.as_secs())]
    Timeout(Duration),

    /// Caller cancelled the operation
    #[error("query cancelled by caller")]
    Cancelled,

    /// Configuration error (file not found, invalid JSON, etc.)
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GatewayError {
    /// Convert error to a stable error code string
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NoConnection => "NO_CONNECTION",
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::Timeout(_) => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Human-readable message, safe to hand to the agent.
    ///
    /// Never contains the connection descriptor or its password.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Map a driver error to its most useful message.
///
/// Server-side errors carry a `DbError` whose message is what psql would print
/// (`relation "x" does not exist`); client-side errors fall back to `Display`.
impl From<tokio_postgres::Error> for GatewayError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self::QueryFailed(db_err.message().to_string()),
            None if err.is_closed() => {
                Self::ConnectionFailed(format!("connection closed unexpectedly: {err}"))
            }
            None => Self::QueryFailed(err.to_string()),
        }
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GatewayError::NoConnection.error_code(), "NO_CONNECTION");
        assert_eq!(GatewayError::connection_failed("test").error_code(), "CONNECTION_FAILED");
        assert_eq!(GatewayError::query_failed("test").error_code(), "QUERY_FAILED");
        assert_eq!(GatewayError::invalid_input("test").error_code(), "INVALID_INPUT");
        assert_eq!(GatewayError::Timeout(Duration::from_secs(5)).error_code(), "TIMEOUT");
        assert_eq!(GatewayError::Cancelled.error_code(), "CANCELLED");
        assert_eq!(GatewayError::config_error("test").error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_query_failed_is_bare_driver_message() {
        let err = GatewayError::query_failed("relation \"ghost\" does not exist");
        assert_eq!(err.message(), "relation \"ghost\" does not exist");
    }

    #[test]
    fn test_timeout_message_reports_seconds() {
        let err = GatewayError::Timeout(Duration::from_millis(30_500));
        assert_eq!(err.message(), "query exceeded deadline of 30s");
    }

    #[test]
    fn test_no_connection_message() {
        assert!(GatewayError::NoConnection.message().starts_with("No database connection available"));
    }
}
