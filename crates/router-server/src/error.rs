//! API error envelopes.
//!
//! Callers never see vendor-raw bodies. OpenAI-shaped paths answer
//! `{"error": {"message", "type", "code"}}`; the Anthropic path answers
//! `{"type": "error", "error": {"type", "message"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use router_core::RouterError;
use serde_json::json;

/// Which wire shape an error renders in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorShape {
    /// `{"error": {...}}`
    OpenAi,
    /// `{"type": "error", "error": {...}}`
    Anthropic,
}

/// A structured, wire-ready API error.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status to answer with.
    pub status: StatusCode,
    /// Wire error type.
    pub error_type: &'static str,
    /// Stable machine-readable code (OpenAI shape only).
    pub code: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Rendering shape.
    pub shape: ErrorShape,
}

impl ApiError {
    /// A 400 validation error.
    #[must_use]
    pub fn invalid_request(
        message: impl Into<String>,
        code: impl Into<String>,
        shape: ErrorShape,
    ) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error_type: "invalid_request_error",
            code: Some(code.into()),
            message: message.into(),
            shape,
        }
    }

    /// A 401 for a missing or wrong router token.
    #[must_use]
    pub fn unauthorized(shape: ErrorShape) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error_type: "authentication_error",
            code: Some("invalid_api_key".to_string()),
            message: "missing or invalid API key".to_string(),
            shape,
        }
    }

    /// A 404 for an unknown resource.
    #[must_use]
    pub fn not_found(message: impl Into<String>, shape: ErrorShape) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error_type: "invalid_request_error",
            code: Some("not_found".to_string()),
            message: message.into(),
            shape,
        }
    }

    /// Map a router error to its wire representation.
    #[must_use]
    pub fn from_router(error: &RouterError, shape: ErrorShape) -> Self {
        match error {
            RouterError::Validation { message, code } => {
                Self::invalid_request(message.clone(), code.clone(), shape)
            }
            RouterError::Provider { status, body, .. } if *status < 500 && *status != 429 => {
                Self {
                    status: StatusCode::from_u16(*status)
                        .unwrap_or(StatusCode::BAD_REQUEST),
                    error_type: if *status == 401 || *status == 403 {
                        "authentication_error"
                    } else {
                        "invalid_request_error"
                    },
                    code: Some("upstream_rejected".to_string()),
                    message: vendor_message(body)
                        .unwrap_or_else(|| "the upstream provider rejected the request".to_string()),
                    shape,
                }
            }
            RouterError::QueueFull => Self {
                status: StatusCode::SERVICE_UNAVAILABLE,
                error_type: "overloaded_error",
                code: Some("queue_full".to_string()),
                message: "queue is full".to_string(),
                shape,
            },
            RouterError::QueueTimeout => Self {
                status: StatusCode::REQUEST_TIMEOUT,
                error_type: "timeout_error",
                code: Some("queue_timeout".to_string()),
                message: "no provider recovered before the request deadline".to_string(),
                shape,
            },
            RouterError::Cancelled => Self {
                status: StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
                error_type: "request_cancelled",
                code: Some("request_cancelled".to_string()),
                message: "request cancelled by the client".to_string(),
                shape,
            },
            _ => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                error_type: "api_error",
                code: Some("api_error".to_string()),
                message: "internal error while routing the request".to_string(),
                shape,
            },
        }
    }
}

/// Pull the vendor's own error message out of its body, without ever
/// relaying the raw body itself.
fn vendor_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.pointer("/error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.shape {
            ErrorShape::OpenAi => json!({
                "error": {
                    "message": self.message,
                    "type": self.error_type,
                    "code": self.code,
                }
            }),
            ErrorShape::Anthropic => json!({
                "type": "error",
                "error": {
                    "type": self.error_type,
                    "message": self.message,
                }
            }),
        };
        (self.status, Json(body)).into_response()
    }
}
