//! Maps the gateway's error taxonomy onto HTTP responses.
//!
//! A small enum implementing `IntoResponse` that renders `{"error": {"code",
//! "message"}}` and logs internal errors before erasing their detail from
//! the client-facing body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use elpp_types::{ErrorCode, GatewayError};

/// The HTTP layer's error type. Every variant carries enough to render both
/// a status code and a `{"error": {"code", "message"}}` body.
pub enum AppError {
    /// A malformed ingress request: bad base64, wrong port, missing field.
    BadRequest(String),
    /// A gateway subsystem error (decoder, TAPOS, dispatch) surfaced to the caller.
    Gateway(GatewayError),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::Gateway(err)
    }
}

impl IntoResponse for AppError {
    // Every ingress failure renders as 500 with a human-readable error; the
    // envelope carries no client-vs-server fault split.
    fn into_response(self) -> Response {
        let (code, message) = match self {
            AppError::BadRequest(msg) => ("GATEWAY_BAD_REQUEST", msg),
            AppError::Gateway(err) => {
                tracing::warn!(target: "http-gateway", code = err.code(), error = %err, "request failed");
                (err.code(), err.to_string())
            }
        };
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}
