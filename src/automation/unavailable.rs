//! Backend for hosts without COM.

use super::{AutomationApp, AutomationBackend, AutomationFault};

/// Fails every attach and launch with a descriptive fault. Thread
/// initialization succeeds so workers start and report the real reason.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for UnavailableBackend {
    fn default() -> Self {
        Self::new(format!(
            "COM automation requires Windows (running on {})",
            std::env::consts::OS
        ))
    }
}

impl AutomationBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn initialize_thread(&self) -> Result<(), AutomationFault> {
        Ok(())
    }

    fn uninitialize_thread(&self) {}

    fn attach(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault> {
        Err(AutomationFault::Unavailable(format!(
            "cannot attach to {prog_id}: {}",
            self.reason
        )))
    }

    fn launch(&self, prog_id: &str) -> Result<Box<dyn AutomationApp>, AutomationFault> {
        Err(AutomationFault::Unavailable(format!(
            "cannot launch {prog_id}: {}",
            self.reason
        )))
    }
}
