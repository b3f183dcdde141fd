//! Result type aliases.

use crate::ResumeError;

/// A specialized `Result` type for application operations.
pub type ResumeResult<T> = Result<T, ResumeError>;
