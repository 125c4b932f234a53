//! Canonical status codes for transport failures
//!
//! Transports report failures with one of these codes so the client can
//! classify them without knowing the wire protocol.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    /// Maps an HTTP response status to a canonical code
    pub fn from_http(status: u16) -> Self {
        match status {
            400 => Self::InvalidArgument,
            401 => Self::Unauthenticated,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            412 => Self::FailedPrecondition,
            416 => Self::OutOfRange,
            429 => Self::ResourceExhausted,
            499 => Self::Cancelled,
            500 => Self::Internal,
            501 => Self::Unimplemented,
            502 | 503 => Self::Unavailable,
            504 => Self::DeadlineExceeded,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_http() {
        assert_eq!(StatusCode::from_http(404), StatusCode::NotFound);
        assert_eq!(StatusCode::from_http(403), StatusCode::PermissionDenied);
        assert_eq!(StatusCode::from_http(429), StatusCode::ResourceExhausted);
        assert_eq!(StatusCode::from_http(503), StatusCode::Unavailable);
        assert_eq!(StatusCode::from_http(502), StatusCode::Unavailable);
        assert_eq!(StatusCode::from_http(418), StatusCode::Unknown);
    }
}
