//! Caller-facing dispatch errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced to the caller of a dispatched request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No route, zero redirects, or every redirect filtered out.
    #[error("Endpoint not found")]
    EndpointNotFound,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Required app_key")]
    NotApplicationKey,

    /// Infrastructure failure while resolving filters.
    #[error("Error resolving filters: {0}")]
    FilterError(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Upstream could not be reached or answered unusably.
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::EndpointNotFound => StatusCode::NOT_FOUND,
            GatewayError::NotAuthenticated | GatewayError::NotApplicationKey => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::FilterError(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Render for the caller; `production` hides internal detail.
    pub fn into_response_with(self, production: bool) -> Response {
        let status = self.status();
        let detail = match &self {
            GatewayError::FilterError(_)
            | GatewayError::Internal(_)
            | GatewayError::Upstream(_)
                if production =>
            {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        error_response(status, &detail)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_response_with(false)
    }
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        GatewayError::Internal(e.to_string())
    }
}

/// JSON error document: `{"errors":[{"status":N,"detail":"..."}]}`.
pub fn error_response(status: StatusCode, detail: &str) -> Response {
    (
        status,
        Json(json!({
            "errors": [{ "status": status.as_u16(), "detail": detail }]
        })),
    )
        .into_response()
}
