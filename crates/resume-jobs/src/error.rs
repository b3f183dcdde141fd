//! Job error types.

use resume_core::ResumeError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job store could not be reached or rejected the operation.
    #[error("Job store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Invalid job state.
    #[error("Invalid job state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The job type does not belong to the target queue.
    #[error("Job type {job_type} cannot be enqueued on queue {queue}")]
    QueueMismatch { queue: String, job_type: String },

    /// Rejected enqueue options or malformed input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No handler is known for the job type.
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    /// The payload does not fit the job type.
    #[error("Payload does not match job type: {0}")]
    PayloadMismatch(String),

    /// Job execution failed.
    #[error("Job execution failed: {0}")]
    ExecutionFailed(String),

    /// An external HTTP service failed.
    #[error("External service {service} failed: {message}")]
    External { service: String, message: String },

    /// Job timed out.
    #[error("Job timed out after {0} seconds")]
    Timeout(u64),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Returns true if a failed attempt with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::ExecutionFailed(_)
                | JobError::External { .. }
                | JobError::Timeout(_)
                | JobError::StoreUnavailable(_)
        )
    }

    /// Returns true if the error came from the job store.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, JobError::StoreUnavailable(_))
    }

    /// Short label used as a metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::StoreUnavailable(_) => "store_unavailable",
            JobError::Serialization(_) => "serialization",
            JobError::NotFound(_) => "not_found",
            JobError::InvalidState { .. } => "invalid_state",
            JobError::QueueMismatch { .. } => "queue_mismatch",
            JobError::Validation(_) => "validation",
            JobError::UnknownJobType(_) => "unknown_job_type",
            JobError::PayloadMismatch(_) => "payload_mismatch",
            JobError::ExecutionFailed(_) => "execution_failed",
            JobError::External { .. } => "external",
            JobError::Timeout(_) => "timeout",
            JobError::Configuration(_) => "configuration",
            JobError::Internal(_) => "internal",
        }
    }

    /// Creates an external service error.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::External {
            service: service.into(),
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for JobError {
    fn from(err: redis::RedisError) -> Self {
        JobError::StoreUnavailable(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for JobError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        JobError::StoreUnavailable(err.to_string())
    }
}

impl From<JobError> for ResumeError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::StoreUnavailable(msg) => ResumeError::StoreUnavailable(msg),
            JobError::NotFound(id) => ResumeError::not_found("Job", id),
            JobError::Validation(_)
            | JobError::QueueMismatch { .. }
            | JobError::UnknownJobType(_)
            | JobError::PayloadMismatch(_)
            | JobError::Serialization(_) => ResumeError::Validation(err.to_string()),
            JobError::External { service, message } => {
                ResumeError::ExternalService { service, message }
            }
            JobError::Timeout(secs) => ResumeError::Timeout(format!("{} seconds", secs)),
            JobError::Configuration(msg) => ResumeError::Configuration(msg),
            JobError::InvalidState { .. } | JobError::ExecutionFailed(_) | JobError::Internal(_) => {
                ResumeError::Internal(err.to_string())
            }
        }
    }
}
