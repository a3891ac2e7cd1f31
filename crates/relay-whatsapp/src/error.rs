//! Error types for relay-whatsapp

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// relay-whatsapp error type
#[derive(Error, Debug)]
pub enum WhatsAppError {
    #[error("Webhook signature verification failed")]
    SignatureVerificationFailed,

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Completion failed: {0}")]
    Completion(#[from] relay_core::Error),

    #[error("WhatsApp API rejected message: {0}")]
    Delivery(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for WhatsAppError {
    fn from(err: reqwest::Error) -> Self {
        WhatsAppError::Http(err.to_string())
    }
}

impl IntoResponse for WhatsAppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            WhatsAppError::SignatureVerificationFailed => {
                (StatusCode::UNAUTHORIZED, "Invalid signature")
            }
            WhatsAppError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "Bad request"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (status, Json(serde_json::json!({ "message": message }))).into_response()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, WhatsAppError>;
