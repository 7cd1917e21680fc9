//! HTTP error handling and conversion

use crate::core::service::ServiceError;
use crate::core::signature::AuthError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

/// HTTP error types
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Missing or unreadable request data
    BadRequest(String),

    /// Authentication errors
    Unauthorized(String),

    NotFound(String),

    /// Server errors
    InternalServerError(String),
}

impl HttpError {
    /// Convert to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            HttpError::BadRequest(msg)
            | HttpError::Unauthorized(msg)
            | HttpError::NotFound(msg)
            | HttpError::InternalServerError(msg) => msg,
        }
    }
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            HttpError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            HttpError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            HttpError::InternalServerError(msg) => write!(f, "Internal Server Error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{}", self);
        } else {
            warn!("{}", self);
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message().to_string(),
        )
            .into_response()
    }
}

/// Convert service errors to HTTP errors
impl From<ServiceError> for HttpError {
    fn from(err: ServiceError) -> Self {
        let msg = err.to_string();
        match err {
            ServiceError::MalformedRequest(_) | ServiceError::Metadata(_) => {
                HttpError::BadRequest(msg)
            }
            ServiceError::StaleRequest(_) => HttpError::Unauthorized(msg),
            ServiceError::Auth(AuthError::Storage(_)) => HttpError::InternalServerError(msg),
            ServiceError::Auth(_) => HttpError::Unauthorized(msg),
            ServiceError::NotFound(_) => HttpError::NotFound(msg),
            ServiceError::Storage(_)
            | ServiceError::CorruptIndexEntry(_)
            | ServiceError::Io(_)
            | ServiceError::Config(_) => HttpError::InternalServerError(msg),
        }
    }
}

/// Result type alias for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::MetadataError;
    use crate::storage::StorageError;

    #[test]
    fn test_service_error_status_mapping() {
        let cases = [
            (
                ServiceError::MalformedRequest("x".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::Metadata(MetadataError::UnsupportedFormat("gzip".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ServiceError::StaleRequest("old".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServiceError::Auth(AuthError::CorruptKey("bad".into())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                ServiceError::Auth(AuthError::Storage(StorageError::Task("join".into()))),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ServiceError::NotFound("f".into()), StatusCode::NOT_FOUND),
            (
                ServiceError::CorruptIndexEntry("k".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(HttpError::from(err).status_code(), status);
        }
    }
}
