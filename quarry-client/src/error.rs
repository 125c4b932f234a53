//! Error types for the quarry client

use std::collections::BTreeSet;
use std::time::Duration;

use quarry_core::domain::job::ErrorDetail;
use quarry_core::status::StatusCode;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by connections, the poll engine and job futures
///
/// Errors are plain values: they are cloned into every continuation that
/// observes a resolved future.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Malformed request or configuration
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Job or resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Caller is not allowed to access the resource
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Retriable service or network failure
    #[error("Transient failure ({code}): {message}")]
    Transient {
        /// Status reported by the transport
        code: StatusCode,
        /// Message reported by the transport
        message: String,
    },

    /// Workflow was abandoned by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// Remote job finished in error
    #[error("Job {job_id} failed: {detail}")]
    JobFailed {
        /// Id of the failed job
        job_id: String,
        /// Error reported by the service
        detail: ErrorDetail,
    },

    /// Polling budget spent before the job finished
    #[error("Polling exhausted after {attempts} attempt(s) in {elapsed:?}")]
    Exhausted {
        /// Poll calls issued
        attempts: u32,
        /// Time spent in the polling phase
        elapsed: Duration,
        /// Last transient failure seen, if any
        last_error: Option<Box<ClientError>>,
    },

    /// Non-retryable service failure outside the categories above
    #[error("Service error ({code}): {message}")]
    Service {
        /// Status reported by the transport
        code: StatusCode,
        /// Message reported by the transport
        message: String,
    },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Translates a transport status into the client taxonomy.
    ///
    /// Codes in `retryable` become `Transient` regardless of their kind; the
    /// remaining codes map onto the fixed categories.
    pub fn from_status(
        code: StatusCode,
        message: impl Into<String>,
        retryable: &BTreeSet<StatusCode>,
    ) -> Self {
        let message = message.into();
        if retryable.contains(&code) {
            return Self::Transient { code, message };
        }

        match code {
            StatusCode::InvalidArgument
            | StatusCode::FailedPrecondition
            | StatusCode::OutOfRange => Self::Invalid(message),
            StatusCode::NotFound => Self::NotFound(message),
            StatusCode::PermissionDenied | StatusCode::Unauthenticated => {
                Self::PermissionDenied(message)
            }
            StatusCode::Cancelled => Self::Cancelled,
            _ => Self::Service { code, message },
        }
    }

    /// Check if the poll engine may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error reports an abandoned workflow
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_retryable() -> BTreeSet<StatusCode> {
        [StatusCode::Unavailable, StatusCode::ResourceExhausted]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_retryable_codes_are_transient() {
        let err = ClientError::from_status(StatusCode::Unavailable, "try again", &default_retryable());
        assert!(err.is_transient());
        assert_eq!(
            err,
            ClientError::Transient {
                code: StatusCode::Unavailable,
                message: "try again".to_string()
            }
        );
    }

    #[test]
    fn test_retryable_set_is_configurable() {
        let retryable: BTreeSet<_> = [StatusCode::Internal].into_iter().collect();
        assert!(ClientError::from_status(StatusCode::Internal, "boom", &retryable).is_transient());
        assert!(!ClientError::from_status(StatusCode::Unavailable, "down", &retryable).is_transient());
    }

    #[test]
    fn test_fixed_categories() {
        let retryable = default_retryable();
        assert!(ClientError::from_status(StatusCode::NotFound, "gone", &retryable).is_not_found());
        assert!(matches!(
            ClientError::from_status(StatusCode::Unauthenticated, "who", &retryable),
            ClientError::PermissionDenied(_)
        ));
        assert!(matches!(
            ClientError::from_status(StatusCode::InvalidArgument, "bad", &retryable),
            ClientError::Invalid(_)
        ));
        assert!(ClientError::from_status(StatusCode::Cancelled, "stop", &retryable).is_cancelled());
        assert!(matches!(
            ClientError::from_status(StatusCode::Unimplemented, "nope", &retryable),
            ClientError::Service { code: StatusCode::Unimplemented, .. }
        ));
    }
}
