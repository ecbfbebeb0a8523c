//! Session worker handle for async requests.

use super::loop_impl::run_session_loop;
use super::request::{Connected, SessionRequest};
use super::types::DocumentInfo;
use crate::automation::AutomationBackend;
use crate::config::AutomationSettings;
use crate::error::SessionError;
use serde_json::Value;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Bound of the request queue; a full queue reports `Busy`.
const QUEUE_CAPACITY: usize = 64;
/// Maximum time to retry enqueuing shutdown requests when the queue is full.
const SHUTDOWN_SEND_TIMEOUT_SECS: u64 = 5;
/// Backoff between control enqueue retries (milliseconds).
const CONTROL_SEND_BACKOFF_MS: u64 = 25;

/// Handle for sending requests to a session worker thread
#[derive(Clone)]
pub struct SessionWorker {
    tx: mpsc::SyncSender<SessionRequest>,
    timeout: Duration,
    connect_timeout: Duration,
}

impl SessionWorker {
    /// Start a worker thread for `instance_id`.
    pub fn spawn(
        instance_id: &str,
        backend: Arc<dyn AutomationBackend>,
        settings: AutomationSettings,
    ) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        let timeout = settings.timeout;
        let connect_timeout = timeout + settings.launch_settle + settings.document_settle;
        let id = instance_id.to_string();
        thread::Builder::new()
            .name(format!("acad-session-{instance_id}"))
            .spawn(move || run_session_loop(id, backend, settings, rx))
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;
        Ok(Self {
            tx,
            timeout,
            connect_timeout,
        })
    }

    fn try_send(&self, req: SessionRequest) -> Result<(), SessionError> {
        match self.tx.try_send(req) {
            Ok(()) => Ok(()),
            Err(mpsc::TrySendError::Full(_)) => Err(SessionError::Busy),
            Err(mpsc::TrySendError::Disconnected(_)) => Err(SessionError::WorkerClosed),
        }
    }

    async fn send_with_retry(
        &self,
        req: SessionRequest,
        max_wait: Duration,
    ) -> Result<(), SessionError> {
        let start = Instant::now();
        let mut pending = req;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(req)) => {
                    if Instant::now().duration_since(start) >= max_wait {
                        return Err(SessionError::Busy);
                    }
                    pending = req;
                    tokio::time::sleep(Duration::from_millis(CONTROL_SEND_BACKOFF_MS)).await;
                }
                Err(mpsc::TrySendError::Disconnected(_)) => {
                    return Err(SessionError::WorkerClosed)
                }
            }
        }
    }

    /// Helper to receive with a timeout
    async fn recv_with_timeout<T>(
        rx: oneshot::Receiver<Result<T, SessionError>>,
        timeout: Duration,
    ) -> Result<T, SessionError> {
        match tokio::time::timeout(timeout, rx).await {
            Ok(result) => result?,
            Err(_) => Err(SessionError::Timeout(timeout)),
        }
    }

    /// Attach to or launch the endpoint and make sure a document is active.
    pub async fn connect(&self) -> Result<Connected, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::Connect { resp: tx })?;
        Self::recv_with_timeout(rx, self.connect_timeout).await
    }

    /// Liveness probe. Any failure, including a timeout, reads as not alive.
    pub async fn probe(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.try_send(SessionRequest::Probe { resp: tx }).is_err() {
            return false;
        }
        matches!(tokio::time::timeout(self.timeout, rx).await, Ok(Ok(true)))
    }

    /// Send source text to the command line.
    pub async fn execute(&self, code: String) -> Result<Option<Value>, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::Execute { code, resp: tx })?;
        Self::recv_with_timeout(rx, self.timeout).await
    }

    pub async fn save_as(&self, path: &str) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::SaveAs {
            path: path.to_string(),
            resp: tx,
        })?;
        Self::recv_with_timeout(rx, self.timeout).await
    }

    pub async fn document_info(&self) -> Result<DocumentInfo, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.try_send(SessionRequest::DocumentInfo { resp: tx })?;
        Self::recv_with_timeout(rx, self.timeout).await
    }

    /// Stop the worker loop and wait for it to release its handles.
    ///
    /// A worker stuck in a blocking call cannot acknowledge; after the
    /// timeout the handle is dropped and the thread exits on its own once the
    /// call returns.
    pub async fn shutdown(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.send_with_retry(
            SessionRequest::Shutdown { resp: tx },
            Duration::from_secs(SHUTDOWN_SEND_TIMEOUT_SECS),
        )
        .await?;
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(ack) => ack.map_err(SessionError::from),
            Err(_) => Err(SessionError::Timeout(self.timeout)),
        }
    }
}
