//! HTTP error responses
//!
//! Every failure leaves the gateway as
//! `{"error":{"type":"...","message":"...","request_id":"req_..."}}`, except
//! non-2xx answers from the payments API, which are passed through with the
//! upstream status and body so callers see Zoho's own error payload.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, warn};

/// Per-request failures surfaced by the route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Credentials(#[from] zoho_auth::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotConfigured(String),

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("payments API returned {status}")]
    Upstream { status: StatusCode, body: Value },

    #[error("payments API request failed: {0}")]
    PaymentApi(String),

    #[error("payments API request timed out")]
    PaymentApiTimeout,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Credentials(e) => match e {
                zoho_auth::Error::NotConfigured(_) | zoho_auth::Error::Unauthorized(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                zoho_auth::Error::AuthServer(_) | zoho_auth::Error::Network(_) => {
                    StatusCode::BAD_GATEWAY
                }
                zoho_auth::Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InvalidSignature => StatusCode::UNAUTHORIZED,
            ApiError::Upstream { status, .. } => *status,
            ApiError::PaymentApi(_) => StatusCode::BAD_GATEWAY,
            ApiError::PaymentApiTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Credentials(e) => e.kind(),
            ApiError::BadRequest(_) => "invalid_request",
            ApiError::NotConfigured(_) => "not_configured",
            ApiError::InvalidSignature => "invalid_signature",
            ApiError::Upstream { .. } => "upstream_error",
            ApiError::PaymentApi(_) => "payments_api_error",
            ApiError::PaymentApiTimeout => "timeout",
        }
    }
}

/// Classify a reqwest failure talking to the payments API.
pub fn payment_api_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::PaymentApiTimeout
    } else {
        ApiError::PaymentApi(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let ApiError::Upstream { body, .. } = self {
            warn!(status = status.as_u16(), "payments API returned an error");
            return (status, Json(body)).into_response();
        }

        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        let error_type = self.error_type();
        let message = self.to_string();
        if status.is_server_error() {
            error!(request_id = %request_id, error_type, error = %message, "request failed");
        } else {
            warn!(request_id = %request_id, error_type, error = %message, "request rejected");
        }

        let body = serde_json::json!({
            "error": {
                "type": error_type,
                "message": message,
                "request_id": request_id,
            }
        });
        (status, Json(body)).into_response()
    }
}
