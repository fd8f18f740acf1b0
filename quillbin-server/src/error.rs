//! Server errors and the JSON error body returned to clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quillbin_core::Error;
use serde::Serialize;

/// Errors raised while starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("missing jwt_secret (set it in the config file or {})", crate::config::SECRET_ENV)]
    MissingSecret,

    #[error("{0}")]
    Core(#[from] Error),
}

/// Error body: `{message, status, path, request_id}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    pub path: String,
    pub request_id: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: status.as_u16(),
            path: String::new(),
            request_id: String::new(),
        }
    }

    /// Map a core error to an HTTP status. Storage failures are reported
    /// without detail.
    pub fn from_core(err: Error) -> Self {
        match err {
            Error::NotFound => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            Error::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, err.to_string()),
            Error::Invalid(message) => Self::new(StatusCode::BAD_REQUEST, message),
            Error::RateLimited => Self::new(StatusCode::TOO_MANY_REQUESTS, err.to_string()),
            Error::Storage(_) => Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
        }
    }

    pub fn with_context(mut self, path: impl Into<String>, request_id: impl Into<String>) -> Self {
        self.path = path.into();
        self.request_id = request_id.into();
        self
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::from_core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillbin_core::{Permission, StoreError};

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from(Error::NotFound).status, 404);
        assert_eq!(ApiError::from(Error::Forbidden(Permission::Delete)).status, 403);
        assert_eq!(ApiError::from(Error::invalid("bad")).status, 400);
        assert_eq!(ApiError::from(Error::RateLimited).status, 429);
        assert_eq!(
            ApiError::from(Error::Storage(StoreError::Database("disk".into()))).status,
            500
        );
    }

    #[test]
    fn test_storage_detail_is_hidden() {
        let err = ApiError::from(Error::Storage(StoreError::Database("secret path".into())));
        assert!(!err.message.contains("secret path"));
    }

    #[test]
    fn test_invalid_keeps_message() {
        let err = ApiError::from(Error::invalid("empty request body"));
        assert_eq!(err.message, "empty request body");
    }
}
