//! Request types for the session worker.

use super::types::DocumentInfo;
use crate::error::SessionError;
use serde_json::Value;
use tokio::sync::oneshot;

/// Outcome of the worker-side connect procedure.
#[derive(Debug, Clone)]
pub struct Connected {
    pub application: String,
    pub document_name: String,
    /// The endpoint was started rather than attached to.
    pub launched: bool,
}

/// Request types for the session worker
pub enum SessionRequest {
    Connect {
        resp: oneshot::Sender<Result<Connected, SessionError>>,
    },
    Probe {
        resp: oneshot::Sender<bool>,
    },
    Execute {
        code: String,
        resp: oneshot::Sender<Result<Option<Value>, SessionError>>,
    },
    SaveAs {
        path: String,
        resp: oneshot::Sender<Result<(), SessionError>>,
    },
    DocumentInfo {
        resp: oneshot::Sender<Result<DocumentInfo, SessionError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}
