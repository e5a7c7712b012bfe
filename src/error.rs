//! Error types for media-dl
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Validation, CapacityExceeded, UpstreamTimeout, etc.)
//! - HTTP status code mapping for API integration
//! - Structured error responses with machine-readable error codes
//! - Context information (job id, artifact path, etc.)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{JobId, JobStatus};

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input from the caller (bad URL, unknown format id, etc.)
    #[error("validation error: {0}")]
    Validation(String),

    /// Concurrency ceiling reached - caller may retry later
    #[error("capacity exceeded: {active} jobs active, limit is {limit}")]
    CapacityExceeded {
        /// Number of jobs currently in a non-terminal state
        active: usize,
        /// Configured concurrency ceiling
        limit: usize,
    },

    /// External metadata/extraction tool did not respond in time
    #[error("upstream timed out after {seconds}s")]
    UpstreamTimeout {
        /// The timeout that elapsed, in seconds
        seconds: u64,
    },

    /// External tool ran and reported failure
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// Produced artifact is missing, empty, or unreadable after bounded retries
    #[error("artifact integrity error at {path}: {reason}")]
    ArtifactIntegrity {
        /// Path where the artifact was expected
        path: PathBuf,
        /// Why the artifact failed verification
        reason: String,
    },

    /// Job-state error
    #[error("job error: {0}")]
    Job(#[from] JobError),

    /// Requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Artifact requested before the job reached a completed state
    #[error("job {id} is not ready: status is {status:?}")]
    NotReady {
        /// The job whose artifact was requested
        id: JobId,
        /// Its current (non-completed) status
        status: JobStatus,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_dir")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// API server error
    #[error("API server error: {0}")]
    ApiServerError(String),

    /// Operation not supported (missing extractor binary, not implemented, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Shutdown in progress - not accepting new jobs
    #[error("shutdown in progress: not accepting new jobs")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Job lifecycle errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Attempted a state transition the job state machine forbids
    #[error("job {id}: illegal transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The job whose record rejected the update
        id: JobId,
        /// Current status of the record
        from: JobStatus,
        /// Status the update attempted to apply
        to: JobStatus,
    },

    /// Job id is not present in the store
    #[error("job {id} not found")]
    UnknownJob {
        /// The missing job id
        id: JobId,
    },
}

/// API error response format
///
/// This structure is returned by API endpoints when an error occurs.
/// It follows a standard format with machine-readable error codes,
/// human-readable messages, and optional contextual details.
///
/// # Example JSON Response
///
/// ```json
/// {
///   "error": {
///     "code": "capacity_exceeded",
///     "message": "capacity exceeded: 4 jobs active, limit is 4",
///     "details": {
///       "active": 4,
///       "limit": 4
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "not_found", "validation_error")
    ///
    /// Clients can use this for programmatic error handling.
    pub code: String,

    /// Human-readable error message
    ///
    /// This is suitable for displaying to end users.
    pub message: String,

    /// Optional additional context about the error
    ///
    /// This can include fields like job id, artifact path, limits, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Create an API error with additional details
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    /// Create a "service unavailable" error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }
}

/// Convert errors to HTTP status codes for API responses
///
/// This trait maps domain errors to appropriate HTTP status codes.
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - Client error (invalid input)
            Error::Validation(_) => 400,
            Error::Config { .. } => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,
            Error::Job(JobError::UnknownJob { .. }) => 404,

            // 409 Conflict - Resource not in the required state
            Error::NotReady { .. } => 409,
            Error::Job(JobError::InvalidTransition { .. }) => 409,

            // 410 Gone - artifact failed verification or was reclaimed
            Error::ArtifactIntegrity { .. } => 410,

            // 429 Too Many Requests - ceiling reached, retryable
            Error::CapacityExceeded { .. } => 429,

            // 500 Internal Server Error - Server-side issues
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
            Error::ApiServerError(_) => 500,
            Error::Other(_) => 500,

            // 501 Not Implemented - Feature not supported
            Error::NotSupported(_) => 501,

            // 502 Bad Gateway - External tool errors
            Error::UpstreamFailure(_) => 502,
            Error::Network(_) => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 504 Gateway Timeout - external tool unresponsive
            Error::UpstreamTimeout { .. } => 504,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::CapacityExceeded { .. } => "capacity_exceeded",
            Error::UpstreamTimeout { .. } => "upstream_timeout",
            Error::UpstreamFailure(_) => "upstream_failure",
            Error::ArtifactIntegrity { .. } => "artifact_integrity",
            Error::Job(e) => match e {
                JobError::InvalidTransition { .. } => "invalid_transition",
                JobError::UnknownJob { .. } => "job_not_found",
            },
            Error::NotFound(_) => "not_found",
            Error::NotReady { .. } => "not_ready",
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::ApiServerError(_) => "api_server_error",
            Error::NotSupported(_) => "not_supported",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let code = error.error_code().to_string();
        let message = error.to_string();

        // Add contextual details for specific error types
        let details = match &error {
            Error::CapacityExceeded { active, limit } => Some(serde_json::json!({
                "active": active,
                "limit": limit,
            })),
            Error::UpstreamTimeout { seconds } => Some(serde_json::json!({
                "timeout_seconds": seconds,
            })),
            Error::ArtifactIntegrity { path, reason } => Some(serde_json::json!({
                "path": path,
                "reason": reason,
            })),
            Error::NotReady { id, status } => Some(serde_json::json!({
                "job_id": id,
                "status": status,
            })),
            Error::Job(JobError::UnknownJob { id }) => Some(serde_json::json!({
                "job_id": id,
            })),
            Error::Job(JobError::InvalidTransition { id, from, to }) => {
                Some(serde_json::json!({
                    "job_id": id,
                    "from": from,
                    "to": to,
                }))
            }
            _ => None,
        };

        ApiError {
            error: ErrorDetail {
                code,
                message,
                details,
            },
        }
    }
}
