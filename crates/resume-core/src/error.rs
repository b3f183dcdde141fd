//! Unified error type shared by the HTTP surface and the server binary.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Application-wide error.
///
/// Queue-level errors are converted into this type at the edges (REST
/// handlers, process startup) so they map onto a status code and a stable
/// machine-readable code.
#[derive(Error, Debug)]
pub enum ResumeError {
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Job store (Redis) unreachable or failing
    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    /// External service error
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ResumeError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::StoreUnavailable(_) | Self::Timeout(_) => 503,
            Self::ExternalService { .. } => 502,
            Self::Configuration(_) | Self::Internal(_) | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

impl From<serde_json::Error> for ResumeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error body for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Request trace ID for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl ErrorResponse {
    /// Creates a new error response from a `ResumeError`.
    #[must_use]
    pub fn from_error(error: &ResumeError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            trace_id: None,
        }
    }

    /// Sets the trace ID.
    #[must_use]
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }
}

impl From<&ResumeError> for ErrorResponse {
    fn from(error: &ResumeError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ResumeError::not_found("Job", "abc").status_code(), 404);
        assert_eq!(ResumeError::validation("bad priority").status_code(), 400);
        assert_eq!(ResumeError::StoreUnavailable("down".into()).status_code(), 503);
        assert_eq!(ResumeError::Timeout("slow".into()).status_code(), 503);
        assert_eq!(
            ResumeError::ExternalService {
                service: "email".into(),
                message: "502".into()
            }
            .status_code(),
            502
        );
        assert_eq!(ResumeError::internal("oops").status_code(), 500);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ResumeError::not_found("Job", 1).error_code(), "NOT_FOUND");
        assert_eq!(ResumeError::validation("x").error_code(), "VALIDATION_ERROR");
        assert_eq!(
            ResumeError::StoreUnavailable("x".into()).error_code(),
            "STORE_UNAVAILABLE"
        );
        assert_eq!(ResumeError::internal("x").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_response_from_error() {
        let err = ResumeError::not_found("Job", "job-1");
        let response = ErrorResponse::from_error(&err);
        assert_eq!(response.code, "NOT_FOUND");
        assert!(response.message.contains("job-1"));
        assert!(response.trace_id.is_none());
    }

    #[test]
    fn test_error_response_with_trace_id() {
        let response = ErrorResponse::from(&ResumeError::internal("boom")).with_trace_id("trace-9");
        assert_eq!(response.trace_id.as_deref(), Some("trace-9"));
    }

    #[test]
    fn test_json_error_is_internal() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ResumeError::from(json_err);
        assert_eq!(err.status_code(), 500);
    }
}
