use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{AuthError, CsrfError, UploadError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ValidationError(String),

    InternalError(String),

    Auth(AuthError),

    Csrf(CsrfError),

    Upload(UploadError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            ApiError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::Auth(err) => write!(f, "{}", err),
            ApiError::Csrf(err) => write!(f, "{}", err),
            ApiError::Upload(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            // The Display strings of the auth taxonomy are user-safe by
            // construction; the status code is all that varies.
            ApiError::Auth(err) => match err {
                AuthError::NotLoggedIn
                | AuthError::SessionExpired
                | AuthError::SecurityViolation
                | AuthError::BadCredentials => (StatusCode::UNAUTHORIZED, err.to_string()),
                AuthError::AccountLocked | AuthError::AccountInactive => {
                    (StatusCode::FORBIDDEN, err.to_string())
                }
                AuthError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
                AuthError::Database(msg) | AuthError::Internal(msg) => {
                    tracing::error!("Auth backend error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "An internal error occurred".to_string(),
                    )
                }
            },
            ApiError::Csrf(err) => (StatusCode::FORBIDDEN, err.to_string()),
            // Upload failures are descriptive on purpose: they reveal no
            // sensitive state and the uploader needs to know what to fix.
            ApiError::Upload(err) => match err {
                UploadError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, err.to_string()),
                UploadError::Storage(msg) => {
                    tracing::error!("Upload storage error: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to store the uploaded file".to_string(),
                    )
                }
                _ => (StatusCode::BAD_REQUEST, err.to_string()),
            },
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<CsrfError> for ApiError {
    fn from(err: CsrfError) -> Self {
        ApiError::Csrf(err)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        ApiError::Upload(err)
    }
}

impl ApiError {
    pub fn not_found(resource: &str, id: impl fmt::Display) -> Self {
        ApiError::NotFound(format!("{} {} not found", resource, id))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::InternalError(msg.into())
    }
}
