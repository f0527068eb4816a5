//! # Interop Error Types
//!
//! Unified error handling for the interop client library and binary.
//!
//! Errors fall into the categories the harness reports on: assertion
//! failures, unexpected RPC statuses, credential resolution failures and
//! configuration problems (including unknown test case names).

use thiserror::Error;
use tonic::{Code, Status};

/// Interop operation result type
pub type InteropResult<T> = Result<T, InteropError>;

/// Comprehensive error types for interop test runs
#[derive(Debug, Error)]
pub enum InteropError {
    #[error("Assertion failed in {test_case}: {message}")]
    Assertion { test_case: String, message: String },

    #[error("Unexpected status during {operation}: {code:?} - {message}")]
    UnexpectedStatus {
        operation: String,
        code: Code,
        message: String,
    },

    #[error("Credential resolution failed: {0}")]
    Credential(String),

    #[error("Unknown test case: {0}")]
    UnknownTestCase(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InteropError {
    /// Create an assertion failure for a test case
    pub fn assertion(test_case: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Assertion {
            test_case: test_case.into(),
            message: message.into(),
        }
    }

    /// Create an unexpected status error from a tonic status
    pub fn unexpected_status(operation: impl Into<String>, status: &Status) -> Self {
        Self::UnexpectedStatus {
            operation: operation.into(),
            code: status.code(),
            message: status.message().to_string(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a credential resolution error
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential(message.into())
    }

    /// Whether the error reports observed behaviour diverging from the interop rules
    #[must_use]
    pub fn is_assertion(&self) -> bool {
        matches!(self, InteropError::Assertion { .. })
    }
}

/// Convert a tonic Status that nobody expected into an InteropError
impl From<Status> for InteropError {
    fn from(status: Status) -> Self {
        InteropError::unexpected_status("rpc", &status)
    }
}

/// Fail `test_case` with `message` unless `condition` holds.
pub fn check(
    condition: bool,
    test_case: &str,
    message: impl FnOnce() -> String,
) -> InteropResult<()> {
    if condition {
        Ok(())
    } else {
        Err(InteropError::assertion(test_case, message()))
    }
}
