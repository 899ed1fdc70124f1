//! HTTP error mapping
//!
//! The single place where domain error kinds become statuses. Every
//! response body is the `{"message": "..."}` envelope. Store and
//! internal failures are logged here and answered with a generic 500
//! so no backend detail leaks.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;
use crate::catalog::CatalogError;
use crate::observation::ObservationError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    /// Carries the underlying detail for the log line only.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(detail) => {
                error!("internal error: {detail}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserNotFound => ApiError::NotFound("User not found".to_string()),
            AuthError::EmailExists => ApiError::Conflict("Email already exists".to_string()),
            AuthError::RoleNotFound => ApiError::NotFound("Role not found".to_string()),
            AuthError::RoleNameExists => {
                ApiError::Conflict("Role name already exists".to_string())
            }
            AuthError::InvalidRoles => ApiError::BadRequest("Invalid roles".to_string()),
            AuthError::InvalidScopes => ApiError::BadRequest("Invalid scopes".to_string()),
            AuthError::InvalidPassword => {
                ApiError::Unauthorized("Invalid password".to_string())
            }
            AuthError::InvalidToken => ApiError::Unauthorized("Invalid token".to_string()),
            AuthError::SessionExpired => ApiError::Unauthorized("Token expired".to_string()),
            AuthError::SessionNotFound => {
                ApiError::Unauthorized("Invalid refresh token".to_string())
            }
            AuthError::PermissionDenied => {
                ApiError::Forbidden("Permission denied".to_string())
            }
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::SessionStore(detail)
            | AuthError::Store(detail)
            | AuthError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::ServerNotFound => ApiError::NotFound("Server not found".to_string()),
            CatalogError::NameExists => {
                ApiError::Conflict("Server name already exists".to_string())
            }
            CatalogError::InvalidInput(msg) => ApiError::BadRequest(msg),
            CatalogError::Store(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<ObservationError> for ApiError {
    fn from(err: ObservationError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}
