//! Session worker loop.

use super::request::{Connected, SessionRequest};
use super::types::DocumentInfo;
use crate::automation::{AutomationApp, AutomationBackend, AutomationDocument, AutomationFault};
use crate::config::AutomationSettings;
use crate::error::SessionError;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use tracing::{debug, error, info, warn};

/// Log result with debug on success and warn on error.
macro_rules! log_result {
    ($id:expr, $result:expr, $ok_msg:literal, $err_msg:literal) => {
        match &$result {
            Ok(_) => debug!(instance_id = %$id, $ok_msg),
            Err(e) => warn!(instance_id = %$id, error = %e, $err_msg),
        }
    };
}

/// Handles owned by a connected session. Never leaves the worker thread.
struct LiveSession {
    app: Box<dyn AutomationApp>,
    document: Box<dyn AutomationDocument>,
}

/// Run the session worker loop on the current thread.
///
/// Blocks until `Shutdown` is received or every sender is dropped. The
/// automation runtime is claimed on entry and released on exit, after all
/// handles have been dropped.
pub fn run_session_loop(
    instance_id: String,
    backend: Arc<dyn AutomationBackend>,
    settings: AutomationSettings,
    rx: mpsc::Receiver<SessionRequest>,
) {
    let runtime = backend.initialize_thread();
    match &runtime {
        Ok(()) => debug!(instance_id = %instance_id, backend = backend.name(), "Automation runtime initialized"),
        Err(e) => error!(instance_id = %instance_id, error = %e, "Failed to initialize automation runtime"),
    }
    let mut session: Option<LiveSession> = None;
    let mut shutdown_ack = None;

    while let Ok(req) = rx.recv() {
        match req {
            SessionRequest::Connect { resp } => {
                info!(instance_id = %instance_id, application = %settings.application_name, "Connecting");
                drop(session.take());
                let result = match &runtime {
                    Ok(()) => open_session(&instance_id, backend.as_ref(), &settings),
                    Err(e) => Err(e.clone()),
                };
                let result = result.map(|(live, connected)| {
                    session = Some(live);
                    connected
                });
                match &result {
                    Ok(c) => info!(
                        instance_id = %instance_id,
                        application = %c.application,
                        document = %c.document_name,
                        launched = c.launched,
                        "Connected"
                    ),
                    Err(e) => error!(instance_id = %instance_id, error = %e, "Failed to connect"),
                }
                let _ = resp.send(result.map_err(SessionError::from));
            }
            SessionRequest::Probe { resp } => {
                let alive = session.as_ref().is_some_and(|s| s.app.name().is_ok());
                if !alive {
                    debug!(instance_id = %instance_id, "Liveness probe failed");
                }
                let _ = resp.send(alive);
            }
            SessionRequest::Execute { code, resp } => {
                debug!(instance_id = %instance_id, bytes = code.len(), "Executing source text");
                let result = match &session {
                    Some(s) => s.document.send_command(&code).map_err(SessionError::from),
                    None => Err(SessionError::NotConnected(instance_id.clone())),
                };
                log_result!(instance_id, result, "Source text executed", "Execution failed");
                let _ = resp.send(result);
            }
            SessionRequest::SaveAs { path, resp } => {
                info!(instance_id = %instance_id, path = %path, "Saving drawing");
                let result = match &session {
                    Some(s) => s.document.save_as(&path).map_err(SessionError::from),
                    None => Err(SessionError::NotConnected(instance_id.clone())),
                };
                log_result!(instance_id, result, "Drawing saved", "Failed to save drawing");
                let _ = resp.send(result);
            }
            SessionRequest::DocumentInfo { resp } => {
                let result = match &session {
                    Some(s) => document_info(s.document.as_ref()).map_err(SessionError::from),
                    None => Err(SessionError::NotConnected(instance_id.clone())),
                };
                log_result!(instance_id, result, "Document info read", "Failed to read document info");
                let _ = resp.send(result);
            }
            SessionRequest::Shutdown { resp } => {
                info!(instance_id = %instance_id, "Session worker shutting down");
                shutdown_ack = Some(resp);
                break;
            }
        }
    }

    drop(session.take());
    if runtime.is_ok() {
        backend.uninitialize_thread();
    }
    debug!(instance_id = %instance_id, "Session worker exited");
    if let Some(resp) = shutdown_ack {
        let _ = resp.send(());
    }
}

fn open_session(
    instance_id: &str,
    backend: &dyn AutomationBackend,
    settings: &AutomationSettings,
) -> Result<(LiveSession, Connected), AutomationFault> {
    let prog_id = settings.application_name.as_str();
    let (app, launched) = match backend.attach(prog_id) {
        Ok(app) => (app, false),
        Err(e) => {
            info!(instance_id = %instance_id, reason = %e, "No running instance, launching a new one");
            let app = backend.launch(prog_id)?;
            app.set_visible(true)?;
            thread::sleep(settings.launch_settle);
            (app, true)
        }
    };

    ensure_support_path(app.as_ref(), &settings.lisp_path)?;

    let document = match app.active_document()? {
        Some(document) => document,
        None => {
            info!(instance_id = %instance_id, "No active document, adding one");
            let document = app.add_document()?;
            thread::sleep(settings.document_settle);
            document
        }
    };

    let connected = Connected {
        application: app.name()?,
        document_name: document.name()?,
        launched,
    };
    Ok((LiveSession { app, document }, connected))
}

fn ensure_support_path(app: &dyn AutomationApp, folder: &Path) -> Result<(), AutomationFault> {
    let folder = folder.display().to_string();
    let current = app.support_path()?;
    if let Some(updated) = with_support_entry(&current, &folder) {
        app.set_support_path(&updated)?;
        info!(path = %folder, "Added LISP folder to support path");
    }
    Ok(())
}

/// `current` with `entry` appended, or `None` if it is already listed.
/// Entries are `;`-separated and compared case-insensitively.
pub(crate) fn with_support_entry(current: &str, entry: &str) -> Option<String> {
    let wanted = entry.to_lowercase();
    if current
        .split(';')
        .any(|existing| existing.trim().to_lowercase() == wanted)
    {
        return None;
    }
    let current = current.trim_end_matches(';');
    if current.is_empty() {
        Some(entry.to_string())
    } else {
        Some(format!("{current};{entry}"))
    }
}

fn document_info(document: &dyn AutomationDocument) -> Result<DocumentInfo, AutomationFault> {
    let full_name = document.full_name()?;
    Ok(DocumentInfo {
        name: document.name()?,
        path: if full_name.is_empty() {
            "Untitled".to_string()
        } else {
            full_name
        },
        saved: document.saved()?,
        read_only: document.read_only()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::testing::FakeBackend;
    use crate::config::{Environment, Settings};

    #[test]
    fn support_entry_is_appended_once() {
        assert_eq!(
            with_support_entry("C:\\a;C:\\b", "C:\\lisp").as_deref(),
            Some("C:\\a;C:\\b;C:\\lisp")
        );
        assert_eq!(with_support_entry("C:\\a;c:\\LISP", "C:\\lisp"), None);
        assert_eq!(with_support_entry("", "C:\\lisp").as_deref(), Some("C:\\lisp"));
        assert_eq!(
            with_support_entry("C:\\a;", "C:\\lisp").as_deref(),
            Some("C:\\a;C:\\lisp")
        );
    }

    #[test]
    fn open_session_launches_and_adds_document() {
        let backend = FakeBackend::new();
        let mut settings = Settings::for_environment(Environment::Testing).automation;
        settings.lisp_path = "/srv/acad/lisp".into();

        let (live, connected) = open_session("t", &backend, &settings).unwrap();
        assert!(connected.launched);
        assert_eq!(connected.document_name, "Drawing1.dwg");
        assert!(live.app.name().is_ok());

        let state = backend.state();
        assert_eq!(state.launches, 1);
        assert_eq!(state.documents_added, 1);
        assert!(state.support_path.ends_with(";/srv/acad/lisp"));
    }

    #[test]
    fn open_session_attaches_to_running_instance() {
        let backend = FakeBackend::running();
        let mut settings = Settings::for_environment(Environment::Testing).automation;
        settings.lisp_path = "/srv/acad/lisp".into();
        backend.state().support_path = "/SRV/ACAD/LISP".to_string();

        let (_live, connected) = open_session("t", &backend, &settings).unwrap();
        assert!(!connected.launched);
        let state = backend.state();
        assert_eq!(state.attaches, 1);
        assert_eq!(state.launches, 0);
        assert_eq!(state.documents_added, 0);
        assert_eq!(state.support_path, "/SRV/ACAD/LISP");
    }

    #[test]
    fn launch_failure_surfaces() {
        let backend = FakeBackend::new();
        backend.state().fail_launch = true;
        let settings = Settings::for_environment(Environment::Testing).automation;
        assert!(matches!(
            open_session("t", &backend, &settings),
            Err(AutomationFault::Unavailable(_))
        ));
    }

    #[test]
    fn support_path_fault_fails_the_connect() {
        let backend = FakeBackend::running();
        backend.state().fail_support_path = true;
        let settings = Settings::for_environment(Environment::Testing).automation;
        match open_session("t", &backend, &settings) {
            Err(AutomationFault::Call { member, .. }) => assert_eq!(member, "Preferences"),
            Err(other) => panic!("unexpected fault: {other}"),
            Ok(_) => panic!("connect succeeded despite a support path fault"),
        }
        assert_eq!(backend.state().documents_added, 0);
    }

    #[test]
    fn untitled_documents() {
        let backend = FakeBackend::running();
        let settings = Settings::for_environment(Environment::Testing).automation;
        let (live, _) = open_session("t", &backend, &settings).unwrap();
        let info = document_info(live.document.as_ref()).unwrap();
        assert_eq!(info.path, "Untitled");
        assert!(!info.saved);
    }
}
