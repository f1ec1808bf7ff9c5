//! # Gateway Error Types Module
//!
//! Wraps [`clawgate_core::CoreError`] in an axum-aware error type. The core
//! crate stays transport-agnostic (it only knows its own status/code
//! pairing); this module is the one place that turns that pairing into an
//! actual HTTP response, in the wire shape `{"error": {"code", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clawgate_core::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            GatewayError::Core(e) => (
                StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.code(),
                e.to_string(),
            ),
            GatewayError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message.clone()),
            GatewayError::Config(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "VALIDATION_ERROR", message.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
