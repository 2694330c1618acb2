//! API request and response types

use crate::flow::FlowError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Query string of the webhook subscription handshake
#[derive(Debug, Default, Deserialize)]
pub struct VerificationQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Acknowledgement for an accepted webhook delivery.
///
/// Failed messages are logged and counted; the delivery is still accepted.
#[derive(Debug, Default, Serialize)]
pub struct WebhookAck {
    pub dispatched: usize,
    /// Redeliveries of messages that already dispatched
    pub duplicates: usize,
    pub failed: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    /// The flow request was encrypted for a key we do not hold
    MisdirectedRequest(String),
    GatewayTimeout(String),
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MisdirectedRequest(_) => StatusCode::MISDIRECTED_REQUEST,
            AppError::GatewayTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::MisdirectedRequest(msg)
            | AppError::GatewayTimeout(msg)
            | AppError::Internal(msg) => msg,
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}

impl From<FlowError> for AppError {
    fn from(err: FlowError) -> Self {
        if err.is_decryption_failure() {
            AppError::MisdirectedRequest(err.to_string())
        } else if matches!(err, FlowError::DeadlineExceeded(_)) {
            AppError::GatewayTimeout(err.to_string())
        } else {
            AppError::Internal(err.to_string())
        }
    }
}
