//! Error types and their HTTP rendering
//!
//! Every failure a handler or middleware stage can produce ends up as an
//! [`AppError`]. Client errors are answered with their status text and are
//! not logged as faults. Server errors are logged with their full source
//! chain and answered with a generic 500 so internals never leak.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::models::ModelError;
use crate::session::SessionError;

/// Body sent for every 500
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// JSON envelope for non-HTML responses
///
/// Serializes as `{"error": ...}` or `{"result": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope<T> {
    /// Failure payload
    Error(T),
    /// Success payload
    Result(T),
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request: bad form body, bad path parameter, forgery failure
    #[error("client error: {0}")]
    Client(StatusCode),

    /// Resource does not exist
    #[error("not found")]
    NotFound,

    /// A page was requested that the template cache does not hold
    #[error("the template {0} does not exist")]
    MissingTemplate(String),

    /// A template failed while rendering
    #[error("template render failed: {0}")]
    Render(#[from] askama::Error),

    /// Snippet or user store failure
    #[error("store error: {0}")]
    Model(ModelError),

    /// Session handling failure
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Anything else
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a 400
    #[must_use]
    pub const fn bad_request() -> Self {
        Self::Client(StatusCode::BAD_REQUEST)
    }

    /// Status code this error is answered with
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Client(status) => *status,
            Self::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NoRecord => Self::NotFound,
            other => Self::Model(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "{self}");
            return server_error();
        }
        client_error(status)
    }
}

/// Envelope response carrying the status text, e.g. `{"error":"Bad Request"}`
#[must_use]
pub fn client_error(status: StatusCode) -> Response {
    let text = status.canonical_reason().unwrap_or("error");
    (status, Json(Envelope::Error(text))).into_response()
}

/// Generic 500 envelope; callers log the cause first
#[must_use]
pub fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope::Error(INTERNAL_ERROR_MESSAGE)),
    )
        .into_response()
}
