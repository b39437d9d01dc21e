//! Error types
//!
//! Gateway and store errors never reach an HTTP caller; they are logged and
//! turned into fallbacks. `ApiError` covers request validation only.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failures talking to the LLM gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Completion contained no text")]
    EmptyCompletion,
}

/// Failures reading or writing the interaction log
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Store rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Failed to decode rows: {0}")]
    Decode(String),
}

/// Failures loading NPC profiles
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid profile {path}: {message}")]
    Yaml { path: String, message: String },

    #[error("Duplicate NPC id: {0}")]
    DuplicateId(String),

    #[error("Registry has no NPCs")]
    Empty,
}

/// Request-level errors returned to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown npc: {0}")]
    UnknownNpc(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    details: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownNpc(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::UnknownNpc(_) => "unknown_npc",
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            details: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
