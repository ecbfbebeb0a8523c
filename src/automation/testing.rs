//! Scripted in-memory backend for tests.

use super::{AutomationApp, AutomationBackend, AutomationDocument, AutomationFault};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Observable state shared by the fake backend and every handle it returns.
#[derive(Debug, Default)]
pub(crate) struct FakeState {
    /// An endpoint is already running, so `attach` succeeds.
    pub running: bool,
    /// `Name` reads succeed.
    pub alive: bool,
    pub has_document: bool,
    pub fail_launch: bool,
    pub fail_commands: bool,
    pub fail_thread_init: bool,
    /// `Preferences.Files.SupportPath` reads fail.
    pub fail_support_path: bool,
    /// `FullName` reads fail while `Name` keeps answering.
    pub fail_document_info: bool,
    pub command_delay: Option<Duration>,
    pub support_path: String,
    pub document_name: String,
    pub document_path: String,
    pub commands: Vec<String>,
    pub saved_paths: Vec<String>,
    pub attaches: usize,
    pub launches: usize,
    pub documents_added: usize,
    pub thread_inits: usize,
    pub thread_uninits: usize,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    /// Nothing running; the first connect launches.
    pub fn new() -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state();
            state.support_path = "C:\\AutoCAD\\Support".to_string();
            state.document_name = "Drawing1.dwg".to_string();
        }
        backend
    }

    /// An endpoint with an open document is already running.
    pub fn running() -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state();
            state.running = true;
            state.alive = true;
            state.has_document = true;
        }
        backend
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn kill(&self) {
        let mut state = self.state();
        state.running = false;
        state.alive = false;
    }

    fn app(&self) -> Box<dyn AutomationApp> {
        Box::new(FakeApp {
            backend: self.clone(),
        })
    }
}

impl AutomationBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn initialize_thread(&self) -> Result<(), AutomationFault> {
        let mut state = self.state();
        if state.fail_thread_init {
            return Err(AutomationFault::Unavailable("thread init refused".to_string()));
        }
        state.thread_inits += 1;
        Ok(())
    }

    fn uninitialize_thread(&self) {
        self.state().thread_uninits += 1;
    }

    fn attach(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault> {
        let mut state = self.state();
        if !state.running {
            return Err(AutomationFault::Unavailable(format!("{prog_id} is not running")));
        }
        state.attaches += 1;
        drop(state);
        Ok(self.app())
    }

    fn launch(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault> {
        let mut state = self.state();
        if state.fail_launch {
            return Err(AutomationFault::Unavailable(format!(
                "failed to launch {prog_id}"
            )));
        }
        state.launches += 1;
        state.running = true;
        state.alive = true;
        drop(state);
        Ok(self.app())
    }
}

struct FakeApp {
    backend: FakeBackend,
}

impl FakeApp {
    fn document(&self) -> Box<dyn AutomationDocument> {
        Box::new(FakeDocument {
            backend: self.backend.clone(),
        })
    }
}

impl AutomationApp for FakeApp {
    fn name(&self) -> Result<String, AutomationFault> {
        if self.backend.state().alive {
            Ok("AutoCAD".to_string())
        } else {
            Err(AutomationFault::call("Name", "RPC server is unavailable"))
        }
    }

    fn set_visible(&self, _visible: bool) -> Result<(), AutomationFault> {
        Ok(())
    }

    fn support_path(&self) -> Result<String, AutomationFault> {
        let state = self.backend.state();
        if state.fail_support_path {
            return Err(AutomationFault::call("Preferences", "access denied"));
        }
        Ok(state.support_path.clone())
    }

    fn set_support_path(&self, path: &str) -> Result<(), AutomationFault> {
        self.backend.state().support_path = path.to_string();
        Ok(())
    }

    fn active_document(&self) -> Result<Option<Box<dyn AutomationDocument>>, AutomationFault> {
        if self.backend.state().has_document {
            Ok(Some(self.document()))
        } else {
            Ok(None)
        }
    }

    fn add_document(&self) -> Result<Box<dyn AutomationDocument>, AutomationFault> {
        {
            let mut state = self.backend.state();
            state.has_document = true;
            state.documents_added += 1;
        }
        Ok(self.document())
    }
}

struct FakeDocument {
    backend: FakeBackend,
}

impl AutomationDocument for FakeDocument {
    fn name(&self) -> Result<String, AutomationFault> {
        Ok(self.backend.state().document_name.clone())
    }

    fn full_name(&self) -> Result<String, AutomationFault> {
        let state = self.backend.state();
        if state.fail_document_info {
            return Err(AutomationFault::call("FullName", "document is busy"));
        }
        Ok(state.document_path.clone())
    }

    fn saved(&self) -> Result<bool, AutomationFault> {
        Ok(!self.backend.state().saved_paths.is_empty())
    }

    fn read_only(&self) -> Result<bool, AutomationFault> {
        Ok(false)
    }

    fn send_command(&self, text: &str) -> Result<Option<Value>, AutomationFault> {
        let delay = {
            let mut state = self.backend.state();
            state.commands.push(text.to_string());
            state.command_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.backend.state().fail_commands {
            return Err(AutomationFault::call("SendCommand", "command rejected"));
        }
        Ok(None)
    }

    fn save_as(&self, path: &str) -> Result<(), AutomationFault> {
        let mut state = self.backend.state();
        state.saved_paths.push(path.to_string());
        state.document_path = path.to_string();
        Ok(())
    }
}
