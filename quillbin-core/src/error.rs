//! Error kinds surfaced by core operations.
//!
//! Handlers map each kind to a response; the core never touches transport.

use thiserror::Error;

use crate::storage::StoreError;
use crate::token::{Permission, TokenError};

/// Outcome of a failed core operation.
#[derive(Debug, Error)]
pub enum Error {
    /// Document or version absent, or access denied without revealing existence.
    #[error("document not found")]
    NotFound,

    /// Attempt to delegate a permission the requester does not hold.
    #[error("permission denied: cannot grant '{0}'")]
    Forbidden(Permission),

    /// Malformed token, malformed version, empty body or oversized content.
    #[error("{0}")]
    Invalid(String),

    /// Mutation budget for this client and endpoint class is exhausted.
    #[error("rate limit exceeded")]
    RateLimited,

    /// Persistence failure. Always surfaced, never retried here.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::Invalid(reason.into())
    }

    /// True for failures the caller is expected to log.
    pub fn is_storage(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Error::NotFound,
            other => Error::Storage(other),
        }
    }
}

impl From<TokenError> for Error {
    fn from(e: TokenError) -> Self {
        Error::Invalid(e.to_string())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let err: Error = StoreError::NotFound("abc".into()).into();
        assert!(matches!(err, Error::NotFound));
    }

    #[test]
    fn test_store_failures_stay_storage() {
        let err: Error = StoreError::Database("disk full".into()).into();
        assert!(err.is_storage());
        assert_eq!(err.to_string(), "storage error: database error: disk full");
    }

    #[test]
    fn test_token_errors_are_invalid() {
        let err: Error = TokenError::BadSignature.into();
        assert!(matches!(err, Error::Invalid(_)));
    }

    #[test]
    fn test_forbidden_names_permission() {
        let err = Error::Forbidden(Permission::Delete);
        assert_eq!(err.to_string(), "permission denied: cannot grant 'delete'");
    }
}
