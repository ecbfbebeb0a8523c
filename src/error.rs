//! Error types for the AutoCAD bridge.
//!
//! Session-level failures are `SessionError`; the registry wraps them into a
//! `ConnectionError` at its boundary, and the HTTP layer maps everything to a
//! status code through `ApiError`.

use crate::automation::AutomationFault;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised while talking to a session worker.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Fault(#[from] AutomationFault),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Session worker is busy")]
    Busy,

    #[error("Worker channel closed")]
    WorkerClosed,

    #[error("Failed to spawn session worker: {0}")]
    SpawnFailed(String),

    #[error("AutoCAD instance is not responding")]
    NotAlive,

    #[error("No session for instance '{0}'")]
    NotConnected(String),

    #[error("Session limit reached ({0} instances)")]
    SessionLimit(usize),
}

impl From<tokio::sync::oneshot::error::RecvError> for SessionError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SessionError::WorkerClosed
    }
}

/// A failed connect. The lower-level cause stays reachable via `source()`.
#[derive(Error, Debug)]
#[error("Failed to connect to AutoCAD instance '{instance_id}': {source}")]
pub struct ConnectionError {
    pub instance_id: String,
    #[source]
    pub source: SessionError,
}

impl ConnectionError {
    pub fn new(instance_id: impl Into<String>, source: SessionError) -> Self {
        Self {
            instance_id: instance_id.into(),
            source,
        }
    }
}

/// Errors surfaced by HTTP handlers as `{"success": false, "error": ...}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields(_) | ApiError::Validation(_) | ApiError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Session(SessionError::NotConnected(_)) => StatusCode::NOT_FOUND,
            ApiError::Connection(_) | ApiError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        warn!(status = status.as_u16(), error = %message, "Request failed");
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
