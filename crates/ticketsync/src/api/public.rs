//! Public API types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;
use ticketsync_core::Error;

use crate::auth::AuthError;

// Errors

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed or invalid request.
    BadRequest(String),
    /// Caller could not be identified.
    Unauthorized(String),
    /// Caller does not own the resource.
    Forbidden(String),
    /// Unknown or expired resource.
    NotFound(String),
    /// Manual sync requested inside the cool-down window.
    RateLimited {
        /// Earliest accepted retry.
        retry_after: DateTime<Utc>,
    },
    /// The mail server or identity provider failed.
    BadGateway(String),
    /// Anything else.
    Internal(anyhow::Error),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::BadGateway(m) => m.clone(),
            Self::RateLimited { .. } => "Manual sync is limited to once per 24 hours".to_string(),
            Self::Internal(e) => format!("Something went wrong: {e}"),
        }
    }
}

/// Convert `ApiError` into an Axum compatible response.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!("{message}");
        } else {
            tracing::debug!("Request rejected ({status}): {message}");
        }

        let body = match &self {
            Self::RateLimited { retry_after } => json!({
                "error": message,
                "retryAfter": retry_after.to_rfc3339_opts(SecondsFormat::Secs, true),
            }),
            _ => json!({ "error": message }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::RateLimited { retry_after } => Self::RateLimited { retry_after },
            Error::SessionForbidden(_) => Self::Forbidden(err.to_string()),
            Error::SessionNotFound(_) | Error::CredentialNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            Error::Config(_) => Self::BadRequest(err.to_string()),
            Error::Sync(_) => Self::BadGateway(err.to_string()),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Missing | AuthError::Rejected(_) => Self::Unauthorized(err.to_string()),
            AuthError::Unavailable(_) => Self::BadGateway(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// Re-export public types from each route

/// Types of the sync routes.
pub mod sync {
    pub use crate::api::routes::sync::public::*;
}
