//! API error types and responses.
//!
//! This module defines the standard error format for all API responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use indexswap_auth::AuthError;
use indexswap_core::CoreError;
use indexswap_engine::EngineError;

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or invalid owner token, or the session is gone.
    #[error("unauthorized")]
    Unauthorized,

    /// The owner does not have access to this session.
    #[error("forbidden")]
    Forbidden,

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request conflicts with the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The owner has too many running sessions.
    #[error("{0}")]
    RateLimited(String),

    /// Invalid request body or parameters.
    #[error("{0}")]
    BadRequest(String),

    /// The service cannot take more sessions right now.
    #[error("{0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the error for an HTTP status reported by a lower layer.
    ///
    /// Statuses without a dedicated variant become `Internal`.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => Self::BadRequest(message),
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            429 => Self::RateLimited(message),
            503 => Self::Unavailable(message),
            _ => Self::Internal(message),
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::RateLimited(_) => "rate_limited",
            Self::BadRequest(_) => "bad_request",
            Self::Unavailable(_) => "unavailable",
            Self::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = match &err {
            AuthError::LoginFailed(msg) => msg.clone(),
            AuthError::Internal(_) => {
                tracing::error!(error = %err, "Auth internal error");
                "authentication service error".to_string()
            }
            _ => err.to_string(),
        };
        Self::from_status(err.http_status_code(), message)
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidId(e) => Self::BadRequest(format!("invalid session id: {e}")),
            CoreError::SessionNotFound(id) => Self::NotFound(format!("session {id}")),
            CoreError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                Self::Internal(msg)
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = match &err {
            EngineError::InvalidRequest(msg) => msg.clone(),
            EngineError::SessionNotFound(id) => format!("session {id}"),
            EngineError::WorkerAlreadyActive(id) => format!("session {id} is already running"),
            EngineError::QuotaExceeded { limit, .. } => {
                format!("A swap is already running for this account (limit is {limit}).")
            }
            EngineError::CapacityExceeded { .. } => {
                "The service is at capacity, try again later.".to_string()
            }
            EngineError::Gateway(_) => "registration system error".to_string(),
            EngineError::Store(_) => "storage error".to_string(),
            EngineError::Internal(msg) => msg.clone(),
            _ => err.to_string(),
        };

        let status = err.http_status_code();
        if status >= 500 && status != 503 {
            tracing::error!(error = %err, "Engine error");
        }
        Self::from_status(status, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexswap_core::{OwnerId, SessionId};

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ApiError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::RateLimited("x".into()).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn engine_errors_map_to_api_errors() {
        let owner = OwnerId::from_bytes([1u8; 32]);
        let session_id = SessionId::generate();

        let err = ApiError::from(EngineError::NotOwner { owner, session_id });
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);

        let err = ApiError::from(EngineError::QuotaExceeded { owner, limit: 1 });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = ApiError::from(EngineError::CapacityExceeded { limit: 200 });
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err = ApiError::from(EngineError::SessionNotFound(session_id));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ApiError::from(EngineError::Gateway(
            indexswap_engine::GatewayError::Fatal("401".into()),
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "internal error: registration system error");

        let err = ApiError::from(EngineError::InvalidRequest("Invalid module data".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Invalid module data");
    }

    #[test]
    fn login_failure_is_bad_request() {
        let err = ApiError::from(AuthError::LoginFailed("Username and password are required.".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(AuthError::TokenExpired).code(), "unauthorized");
    }
}
