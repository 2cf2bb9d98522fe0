//! API error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use swarmlink_types::SwarmlinkError;

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub success: bool,
    pub code: String,
    pub error: String,
}

impl ApiError {
    fn new(status: StatusCode, code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            code: code.into(),
            error: error.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<SwarmlinkError> for ApiError {
    fn from(err: SwarmlinkError) -> Self {
        let status = match &err {
            SwarmlinkError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            SwarmlinkError::NoIdleNode
            | SwarmlinkError::CapabilityMismatch { .. }
            | SwarmlinkError::JobTimeout { .. }
            | SwarmlinkError::DeadLetter { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SwarmlinkError::AgentNotFound { .. } => StatusCode::NOT_FOUND,
            SwarmlinkError::MalformedFrame { .. }
            | SwarmlinkError::DepositAlreadyProcessed { .. }
            | SwarmlinkError::DepositSenderMismatch { .. }
            | SwarmlinkError::DepositInvalid { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.error_code(), err.to_string())
    }
}
