//! Registry of live sessions keyed by instance id.

use super::types::{ConnectionInfo, ConnectionSummary, DocumentInfo, ExecutionResult, SessionPhase};
use super::worker::SessionWorker;
use crate::automation::AutomationBackend;
use crate::config::AutomationSettings;
use crate::error::{ConnectionError, SessionError};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Per-key state. The async mutex around it is the key's gate: connect,
/// probe, evict, execute and disconnect for one key never interleave.
#[derive(Default)]
struct Slot {
    phase: SessionPhase,
    worker: Option<SessionWorker>,
    info: Option<ConnectionInfo>,
}

type SlotRef = Arc<AsyncMutex<Slot>>;

/// A resolved session as returned by [`SessionRegistry::get`].
#[derive(Clone)]
pub struct SessionHandle {
    info: ConnectionInfo,
    worker: SessionWorker,
}

impl SessionHandle {
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn instance_id(&self) -> &str {
        &self.info.instance_id
    }
}

/// Owns every session of the process.
pub struct SessionRegistry {
    backend: Arc<dyn AutomationBackend>,
    settings: AutomationSettings,
    slots: Mutex<HashMap<String, SlotRef>>,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn AutomationBackend>, settings: AutomationSettings) -> Self {
        Self {
            backend,
            settings,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, SlotRef>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_current(&self, instance_id: &str, slot: &SlotRef) -> bool {
        self.lock_map()
            .get(instance_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    /// Remove the key if it still maps to `slot`. Returns whether the map is
    /// now empty.
    fn remove_slot(&self, instance_id: &str, slot: &SlotRef) -> bool {
        let mut map = self.lock_map();
        if map
            .get(instance_id)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            map.remove(instance_id);
        }
        map.is_empty()
    }

    /// Number of keys currently registered.
    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lock the gate of an existing key.
    async fn lock_existing(&self, instance_id: &str) -> Option<(SlotRef, OwnedMutexGuard<Slot>)> {
        loop {
            let slot = self.lock_map().get(instance_id).cloned()?;
            let guard = slot.clone().lock_owned().await;
            // The entry may have been evicted while we waited.
            if self.is_current(instance_id, &slot) {
                return Some((slot, guard));
            }
        }
    }

    /// Lock the gate of a key, registering it first if needed.
    async fn lock_or_insert(
        &self,
        instance_id: &str,
    ) -> Result<(SlotRef, OwnedMutexGuard<Slot>), SessionError> {
        loop {
            let slot = {
                let mut map = self.lock_map();
                match map.get(instance_id) {
                    Some(slot) => slot.clone(),
                    None => {
                        if map.len() >= self.settings.max_sessions {
                            return Err(SessionError::SessionLimit(self.settings.max_sessions));
                        }
                        let slot: SlotRef = Arc::default();
                        map.insert(instance_id.to_string(), slot.clone());
                        slot
                    }
                }
            };
            let guard = slot.clone().lock_owned().await;
            if self.is_current(instance_id, &slot) {
                return Ok((slot, guard));
            }
        }
    }

    /// Connect under `instance_id`, replacing any session already there.
    pub async fn connect(&self, instance_id: &str) -> Result<ConnectionInfo, ConnectionError> {
        let (slot, mut guard) = self
            .lock_or_insert(instance_id)
            .await
            .map_err(|e| ConnectionError::new(instance_id, e))?;
        self.connect_locked(instance_id, &slot, &mut guard)
            .await
            .map_err(|e| ConnectionError::new(instance_id, e))
    }

    async fn connect_locked(
        &self,
        instance_id: &str,
        slot: &SlotRef,
        guard: &mut Slot,
    ) -> Result<ConnectionInfo, SessionError> {
        // The previous worker stays registered until its replacement is up.
        let previous_phase = guard.phase;
        guard.phase = SessionPhase::Connecting;

        let outcome = match SessionWorker::spawn(
            instance_id,
            self.backend.clone(),
            self.settings.clone(),
        ) {
            Ok(worker) => match worker.connect().await {
                Ok(connected) => Ok((worker, connected)),
                Err(e) => {
                    shutdown_worker(instance_id, &worker).await;
                    Err(e)
                }
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok((worker, connected)) => {
                let info = ConnectionInfo {
                    instance_id: instance_id.to_string(),
                    connected: true,
                    application: connected.application,
                    document_name: connected.document_name,
                    connected_at: Utc::now(),
                };
                if let Some(previous) = guard.worker.replace(worker) {
                    info!(instance_id = %instance_id, "Replacing existing session");
                    shutdown_worker(instance_id, &previous).await;
                }
                guard.phase = SessionPhase::Alive;
                guard.info = Some(info.clone());
                info!(instance_id = %instance_id, document = %info.document_name, "Session registered");
                Ok(info)
            }
            Err(e) => {
                if guard.worker.is_some() {
                    guard.phase = previous_phase;
                    warn!(
                        instance_id = %instance_id,
                        error = %e,
                        phase = %previous_phase,
                        "Connect failed, keeping existing session"
                    );
                } else {
                    guard.phase = SessionPhase::Absent;
                    self.remove_slot(instance_id, slot);
                    warn!(instance_id = %instance_id, error = %e, "Connect failed");
                }
                Err(e)
            }
        }
    }

    /// Look up a session and probe it. Stale sessions and failed probes
    /// evict the session.
    pub async fn get(&self, instance_id: &str) -> Option<SessionHandle> {
        let (slot, mut guard) = self.lock_existing(instance_id).await?;
        let handle = match (&guard.worker, &guard.info) {
            (Some(worker), Some(info)) if guard.phase == SessionPhase::Alive => {
                Some(SessionHandle {
                    info: info.clone(),
                    worker: worker.clone(),
                })
            }
            _ => None,
        };
        if let Some(handle) = handle {
            if handle.worker.probe().await {
                return Some(handle);
            }
        }
        self.evict_locked(instance_id, &slot, &mut guard).await;
        None
    }

    /// Cheap liveness check. Every failure reads as not alive.
    pub async fn is_alive(&self, session: &SessionHandle) -> bool {
        session.worker.probe().await
    }

    async fn evict_locked(&self, instance_id: &str, slot: &SlotRef, guard: &mut Slot) {
        guard.phase = SessionPhase::Stale;
        warn!(instance_id = %instance_id, "Session is not responding, evicting");
        if let Some(worker) = guard.worker.take() {
            shutdown_worker(instance_id, &worker).await;
        }
        guard.info = None;
        if self.remove_slot(instance_id, slot) {
            info!("No sessions remain");
        }
    }

    /// Return a live worker for the key, reconnecting when it is missing or
    /// stale. Runs with the key's gate held.
    async fn resolve_locked(
        &self,
        instance_id: &str,
        slot: &SlotRef,
        guard: &mut Slot,
    ) -> Result<SessionWorker, ConnectionError> {
        let reusable = match &guard.worker {
            Some(worker) if guard.phase == SessionPhase::Alive => worker.probe().await,
            _ => false,
        };
        if !reusable {
            if guard.worker.is_some() {
                info!(instance_id = %instance_id, phase = %guard.phase, "Session unusable, reconnecting");
                guard.phase = SessionPhase::Stale;
            } else {
                debug!(instance_id = %instance_id, "No session, connecting");
            }
            self.connect_locked(instance_id, slot, guard)
                .await
                .map_err(|e| ConnectionError::new(instance_id, e))?;
        }
        let worker = guard
            .worker
            .clone()
            .ok_or_else(|| ConnectionError::new(instance_id, SessionError::NotAlive))?;
        if !reusable && !worker.probe().await {
            guard.phase = SessionPhase::Stale;
            return Err(ConnectionError::new(instance_id, SessionError::NotAlive));
        }
        Ok(worker)
    }

    /// Resolve the key (connecting if needed) and run `op` on its worker.
    /// Timeouts mark the session stale. Failures come back as messages.
    async fn with_session<T, F, Fut>(&self, instance_id: &str, op: F) -> Result<T, String>
    where
        F: FnOnce(SessionWorker) -> Fut,
        Fut: std::future::Future<Output = Result<T, SessionError>>,
    {
        let (slot, mut guard) = self
            .lock_or_insert(instance_id)
            .await
            .map_err(|e| ConnectionError::new(instance_id, e).to_string())?;
        let worker = self
            .resolve_locked(instance_id, &slot, &mut guard)
            .await
            .map_err(|e| e.to_string())?;
        match op(worker).await {
            Ok(value) => Ok(value),
            Err(e) => {
                if matches!(e, SessionError::Timeout(_)) {
                    warn!(instance_id = %instance_id, "Request timed out, marking session stale");
                    guard.phase = SessionPhase::Stale;
                }
                Err(e.to_string())
            }
        }
    }

    /// Send source text to the session, connecting first when needed.
    ///
    /// Never fails: every problem is reported in the returned result.
    pub async fn execute(&self, source: &str, instance_id: &str) -> ExecutionResult {
        let start = Instant::now();
        let code = format!("{source}\n");
        let outcome = self
            .with_session(instance_id, |worker| async move { worker.execute(code).await })
            .await;
        let elapsed = start.elapsed();
        match outcome {
            Ok(result) => {
                debug!(instance_id = %instance_id, elapsed_ms = elapsed.as_millis() as u64, "Executed");
                ExecutionResult::success(result, elapsed)
            }
            Err(message) => {
                warn!(instance_id = %instance_id, error = %message, "Execution failed");
                ExecutionResult::failure(message, elapsed)
            }
        }
    }

    /// Save the active drawing of the session under `path`.
    pub async fn save_drawing(&self, path: &str, instance_id: &str) -> ExecutionResult {
        let start = Instant::now();
        let outcome = self
            .with_session(instance_id, |worker| async move { worker.save_as(path).await })
            .await;
        let elapsed = start.elapsed();
        match outcome {
            Ok(()) => ExecutionResult::success(
                Some(Value::String(format!("Drawing saved to {path}"))),
                elapsed,
            ),
            Err(message) => ExecutionResult::failure(message, elapsed),
        }
    }

    /// Execute the contents of a `.lsp` file.
    pub async fn load_lisp_file(&self, path: &str, instance_id: &str) -> ExecutionResult {
        let start = Instant::now();
        match tokio::fs::read_to_string(path).await {
            Ok(source) => {
                info!(instance_id = %instance_id, path = %path, "Loading LISP file");
                self.execute(&source, instance_id).await
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ExecutionResult::failure(format!("LISP file not found: {path}"), start.elapsed())
            }
            Err(e) => ExecutionResult::failure(
                format!("Failed to read LISP file {path}: {e}"),
                start.elapsed(),
            ),
        }
    }

    /// Remove a session and stop its worker. Unknown keys return `false`.
    pub async fn disconnect(&self, instance_id: &str) -> bool {
        let Some((slot, mut guard)) = self.lock_existing(instance_id).await else {
            return false;
        };
        if let Some(worker) = guard.worker.take() {
            shutdown_worker(instance_id, &worker).await;
        }
        guard.phase = SessionPhase::Absent;
        guard.info = None;
        let empty = self.remove_slot(instance_id, &slot);
        info!(instance_id = %instance_id, "Disconnected");
        if empty {
            info!("No sessions remain");
        }
        true
    }

    /// Disconnect every session. Returns how many were removed.
    pub async fn disconnect_all(&self) -> usize {
        let keys: Vec<String> = self.lock_map().keys().cloned().collect();
        let mut count = 0;
        for key in keys {
            if self.disconnect(&key).await {
                count += 1;
            }
        }
        count
    }

    /// Probe every session. The document name is only read from live ones.
    pub async fn list_connections(&self) -> Vec<ConnectionSummary> {
        let mut keys: Vec<String> = self.lock_map().keys().cloned().collect();
        keys.sort();
        let mut summaries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some((_slot, mut guard)) = self.lock_existing(&key).await else {
                continue;
            };
            let mut connected = false;
            let mut document_name = None;
            if let Some(worker) = guard.worker.clone() {
                connected = worker.probe().await;
                if connected {
                    document_name = worker.document_info().await.ok().map(|d| d.name);
                } else {
                    guard.phase = SessionPhase::Stale;
                }
            }
            summaries.push(ConnectionSummary {
                instance_id: key,
                connected,
                state: guard.phase,
                document_name: document_name.unwrap_or_else(|| "Unknown".to_string()),
            });
        }
        summaries
    }

    /// Identity of the session's active document. Never connects.
    pub async fn document_info(&self, instance_id: &str) -> Result<DocumentInfo, SessionError> {
        let (_slot, guard) = self
            .lock_existing(instance_id)
            .await
            .ok_or_else(|| SessionError::NotConnected(instance_id.to_string()))?;
        match &guard.worker {
            Some(worker) => worker.document_info().await,
            None => Err(SessionError::NotConnected(instance_id.to_string())),
        }
    }
}

async fn shutdown_worker(instance_id: &str, worker: &SessionWorker) {
    if let Err(e) = worker.shutdown().await {
        warn!(instance_id = %instance_id, error = %e, "Session worker did not shut down cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::testing::FakeBackend;
    use crate::automation::AutomationFault;
    use crate::config::{Environment, Settings};
    use std::error::Error as _;
    use std::io::Write;
    use std::time::Duration;

    fn registry(backend: &FakeBackend) -> SessionRegistry {
        let mut settings = Settings::for_environment(Environment::Testing).automation;
        settings.timeout = Duration::from_millis(500);
        settings.lisp_path = "/srv/acad/lisp".into();
        SessionRegistry::new(Arc::new(backend.clone()), settings)
    }

    #[tokio::test]
    async fn connect_registers_session() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);

        let info = registry.connect("default").await.unwrap();
        assert!(info.connected);
        assert_eq!(info.instance_id, "default");
        assert_eq!(info.document_name, "Drawing1.dwg");

        let handle = registry.get("default").await.unwrap();
        assert_eq!(handle.instance_id(), "default");
        assert!(registry.is_alive(&handle).await);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn connect_failure_keeps_cause() {
        let backend = FakeBackend::new();
        backend.state().fail_launch = true;
        let registry = registry(&backend);

        let err = registry.connect("default").await.unwrap_err();
        assert_eq!(err.instance_id, "default");
        assert!(matches!(err.source, SessionError::Fault(_)));
        assert!(err.source().is_some());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failed_reconnect_keeps_working_session() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        let first = registry.connect("a").await.unwrap();

        // The endpoint still answers, but neither attach nor launch works.
        backend.state().running = false;
        backend.state().fail_launch = true;
        let err = registry.connect("a").await.unwrap_err();
        assert!(matches!(err.source, SessionError::Fault(_)));

        let handle = registry.get("a").await.unwrap();
        assert_eq!(handle.info(), &first);
        assert_eq!(registry.len(), 1);
        let result = registry.execute("(princ)", "a").await;
        assert!(result.is_success(), "{}", result.error_message());

        // Only the failed replacement worker has exited.
        let state = backend.state();
        assert_eq!(state.thread_inits, 2);
        assert_eq!(state.thread_uninits, 1);
    }

    #[tokio::test]
    async fn runtime_init_failure_is_a_connection_error() {
        let backend = FakeBackend::running();
        backend.state().fail_thread_init = true;
        let registry = registry(&backend);

        let err = registry.connect("default").await.unwrap_err();
        assert!(matches!(
            err.source,
            SessionError::Fault(AutomationFault::Unavailable(_))
        ));
        assert!(err.source().is_some());
        assert!(registry.is_empty());

        let state = backend.state();
        assert_eq!(state.attaches, 0);
        assert_eq!(state.thread_inits, 0);
        assert_eq!(state.thread_uninits, 0);
    }

    #[tokio::test]
    async fn support_path_fault_is_a_connection_error() {
        let backend = FakeBackend::running();
        backend.state().fail_support_path = true;
        let registry = registry(&backend);

        let err = registry.connect("default").await.unwrap_err();
        assert!(matches!(
            err.source,
            SessionError::Fault(AutomationFault::Call { member: "Preferences", .. })
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn execute_connects_implicitly() {
        let backend = FakeBackend::new();
        let registry = registry(&backend);

        let result = registry.execute("(princ \"hi\")", "fresh").await;
        assert!(result.is_success(), "{}", result.error_message());
        assert_eq!(result.error_message(), "");

        let state = backend.state();
        assert_eq!(state.launches, 1);
        assert_eq!(state.commands, vec!["(princ \"hi\")\n".to_string()]);
    }

    #[tokio::test]
    async fn execute_failure_is_data() {
        let backend = FakeBackend::new();
        backend.state().fail_launch = true;
        let registry = registry(&backend);

        let result = registry.execute("(princ)", "default").await;
        assert!(!result.is_success());
        assert!(result
            .error_message()
            .starts_with("Failed to connect to AutoCAD instance 'default'"));

        backend.state().fail_launch = false;
        backend.state().running = true;
        backend.state().alive = true;
        backend.state().fail_commands = true;
        let result = registry.execute("(princ)", "default").await;
        assert!(!result.is_success());
        assert!(result.error_message().contains("command rejected"));
    }

    #[tokio::test]
    async fn dead_session_is_evicted_then_reconnected() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        registry.connect("default").await.unwrap();

        backend.kill();
        assert!(registry.get("default").await.is_none());
        assert!(registry.is_empty());

        let result = registry.execute("(princ)", "default").await;
        assert!(result.is_success());
        assert_eq!(backend.state().launches, 1);
    }

    #[tokio::test]
    async fn timeout_marks_session_stale_and_reconnects() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        registry.connect("default").await.unwrap();

        backend.state().command_delay = Some(Duration::from_secs(2));
        let result = registry.execute("(slow)", "default").await;
        assert!(!result.is_success());
        assert!(result.error_message().contains("timed out"));

        let summaries = registry.list_connections().await;
        assert_eq!(summaries[0].state, SessionPhase::Stale);

        backend.state().command_delay = None;
        let result = registry.execute("(princ)", "default").await;
        assert!(result.is_success(), "{}", result.error_message());
        assert_eq!(backend.state().attaches, 2);
    }

    #[tokio::test]
    async fn disconnect_semantics() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        assert!(!registry.disconnect("nobody").await);

        registry.connect("a").await.unwrap();
        registry.connect("b").await.unwrap();
        assert!(registry.disconnect("a").await);
        assert!(!registry.disconnect("a").await);
        assert_eq!(registry.disconnect_all().await, 1);
        assert!(registry.is_empty());

        let state = backend.state();
        assert_eq!(state.thread_inits, state.thread_uninits);
    }

    #[tokio::test]
    async fn reconnect_replaces_worker() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        registry.connect("default").await.unwrap();
        registry.connect("default").await.unwrap();
        assert_eq!(registry.len(), 1);
        let state = backend.state();
        assert_eq!(state.thread_inits, 2);
        assert_eq!(state.thread_uninits, 1);
    }

    #[tokio::test]
    async fn session_limit() {
        let backend = FakeBackend::running();
        let mut settings = Settings::for_environment(Environment::Testing).automation;
        settings.max_sessions = 1;
        let registry = SessionRegistry::new(Arc::new(backend.clone()), settings);

        registry.connect("a").await.unwrap();
        let err = registry.connect("b").await.unwrap_err();
        assert!(matches!(err.source, SessionError::SessionLimit(1)));
        // Reconnecting an existing key is not limited.
        registry.connect("a").await.unwrap();
    }

    #[tokio::test]
    async fn list_connections_reports_documents() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        registry.connect("b").await.unwrap();
        registry.connect("a").await.unwrap();

        let summaries = registry.list_connections().await;
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].instance_id, "a");
        assert!(summaries[0].connected);
        assert_eq!(summaries[0].document_name, "Drawing1.dwg");

        backend.kill();
        let summaries = registry.list_connections().await;
        assert!(summaries.iter().all(|s| !s.connected && s.document_name == "Unknown"));
    }

    #[tokio::test]
    async fn unreadable_document_still_counts_as_connected() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        registry.connect("a").await.unwrap();

        backend.state().fail_document_info = true;
        let summaries = registry.list_connections().await;
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].connected);
        assert_eq!(summaries[0].state, SessionPhase::Alive);
        assert_eq!(summaries[0].document_name, "Unknown");
    }

    #[tokio::test]
    async fn document_info_never_connects() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        assert!(matches!(
            registry.document_info("default").await,
            Err(SessionError::NotConnected(_))
        ));
        assert_eq!(backend.state().attaches, 0);

        registry.connect("default").await.unwrap();
        let info = registry.document_info("default").await.unwrap();
        assert_eq!(info.name, "Drawing1.dwg");
        assert_eq!(info.path, "Untitled");
    }

    #[tokio::test]
    async fn save_drawing_reports_path() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);
        let result = registry.save_drawing("C:\\plans\\a.dwg", "default").await;
        assert!(result.is_success());
        assert_eq!(
            result.result(),
            Some(&Value::String("Drawing saved to C:\\plans\\a.dwg".to_string()))
        );
        assert_eq!(backend.state().saved_paths, vec!["C:\\plans\\a.dwg".to_string()]);
    }

    #[tokio::test]
    async fn load_lisp_file() {
        let backend = FakeBackend::running();
        let registry = registry(&backend);

        let missing = registry.load_lisp_file("/no/such/file.lsp", "default").await;
        assert!(!missing.is_success());
        assert_eq!(missing.error_message(), "LISP file not found: /no/such/file.lsp");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(defun c:hello () (princ \"hello\"))").unwrap();
        let path = file.path().display().to_string();
        let loaded = registry.load_lisp_file(&path, "default").await;
        assert!(loaded.is_success());
        assert_eq!(
            backend.state().commands,
            vec!["(defun c:hello () (princ \"hello\"))\n".to_string()]
        );
    }

    #[tokio::test]
    async fn concurrent_executes_share_one_connect() {
        let backend = FakeBackend::new();
        let registry = Arc::new(registry(&backend));
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.execute(&format!("(princ {i})"), "default").await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_success());
        }
        let state = backend.state();
        assert_eq!(state.launches, 1);
        assert_eq!(state.commands.len(), 4);
    }
}
