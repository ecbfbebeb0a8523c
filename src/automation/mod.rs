//! Narrow automation interface the session worker talks to.
//!
//! Handles returned by a backend are thread-affine: they are created, used and
//! dropped on the session worker thread that called
//! [`AutomationBackend::initialize_thread`]. That is why only the backend
//! itself is `Send + Sync`.

#[cfg(windows)]
mod com;
#[cfg(test)]
pub(crate) mod testing;
mod unavailable;

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[cfg(windows)]
pub use com::ComBackend;
pub use unavailable::UnavailableBackend;

/// Faults raised by an automation adapter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationFault {
    #[error("Automation unavailable: {0}")]
    Unavailable(String),

    #[error("Automation call {member} failed: {message}")]
    Call {
        member: &'static str,
        message: String,
    },

    #[error("No active document")]
    NoDocument,
}

impl AutomationFault {
    pub fn call(member: &'static str, message: impl Into<String>) -> Self {
        Self::Call {
            member,
            message: message.into(),
        }
    }
}

/// Entry point of an automation adapter.
pub trait AutomationBackend: Send + Sync {
    /// Short adapter name used in logs.
    fn name(&self) -> &'static str;

    /// Claim the automation runtime for the calling thread.
    fn initialize_thread(&self) -> Result<(), AutomationFault>;

    /// Release the claim taken by `initialize_thread`. Every handle obtained
    /// on this thread must already be dropped.
    fn uninitialize_thread(&self);

    /// Attach to an endpoint that is already running under `prog_id`.
    fn attach(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault>;

    /// Start a new endpoint under `prog_id`.
    fn launch(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault>;
}

/// The application object.
pub trait AutomationApp {
    /// Application name. Cheap, used as the liveness probe.
    fn name(&self) -> Result<String, AutomationFault>;
    fn set_visible(&self, visible: bool) -> Result<(), AutomationFault>;
    /// `;`-separated support file search path.
    fn support_path(&self) -> Result<String, AutomationFault>;
    fn set_support_path(&self, path: &str) -> Result<(), AutomationFault>;
    /// The active document, `None` when no drawing is open.
    fn active_document(&self) -> Result<Option<Box<dyn AutomationDocument>>, AutomationFault>;
    fn add_document(&self) -> Result<Box<dyn AutomationDocument>, AutomationFault>;
}

/// A drawing document.
pub trait AutomationDocument {
    fn name(&self) -> Result<String, AutomationFault>;
    /// Full path on disk, empty for a drawing that was never saved.
    fn full_name(&self) -> Result<String, AutomationFault>;
    fn saved(&self) -> Result<bool, AutomationFault>;
    fn read_only(&self) -> Result<bool, AutomationFault>;
    /// Send text to the command line for synchronous execution.
    fn send_command(&self, text: &str) -> Result<Option<Value>, AutomationFault>;
    fn save_as(&self, path: &str) -> Result<(), AutomationFault>;
}

/// The backend native to this host.
#[cfg(windows)]
pub fn default_backend() -> Arc<dyn AutomationBackend> {
    Arc::new(ComBackend)
}

/// The backend native to this host.
#[cfg(not(windows))]
pub fn default_backend() -> Arc<dyn AutomationBackend> {
    Arc::new(UnavailableBackend::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_messages() {
        let fault = AutomationFault::call("SendCommand", "RPC server unavailable");
        assert_eq!(
            fault.to_string(),
            "Automation call SendCommand failed: RPC server unavailable"
        );
        assert_eq!(AutomationFault::NoDocument.to_string(), "No active document");
    }

    #[cfg(not(windows))]
    #[test]
    fn default_backend_is_unavailable_off_windows() {
        let backend = default_backend();
        assert_eq!(backend.name(), "unavailable");
        assert!(backend.attach("AutoCAD.Application").is_err());
    }
}
