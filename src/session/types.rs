//! Session and execution result types.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

/// Lifecycle phase of a session key.
///
/// `Absent -> Connecting` on first use, `Connecting -> Alive` on success and
/// back to `Absent` on failure. Any phase moves to `Stale` when a probe fails
/// or a request times out; the next execute reconnects a stale session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Absent,
    Connecting,
    Alive,
    Stale,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Absent => "absent",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Alive => "alive",
            SessionPhase::Stale => "stale",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn as_secs_f64<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Outcome of sending source text to a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    success: bool,
    result: Option<Value>,
    error_message: String,
    #[serde(serialize_with = "as_secs_f64")]
    execution_time: Duration,
}

impl ExecutionResult {
    pub fn success(result: Option<Value>, execution_time: Duration) -> Self {
        Self {
            success: true,
            result,
            error_message: String::new(),
            execution_time,
        }
    }

    pub fn failure(error_message: impl Into<String>, execution_time: Duration) -> Self {
        Self {
            success: false,
            result: None,
            error_message: error_message.into(),
            execution_time,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Empty on success.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }
}

/// Returned by a successful connect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub instance_id: String,
    pub connected: bool,
    /// Application name reported by the endpoint.
    pub application: String,
    /// Active document at connect time.
    pub document_name: String,
    pub connected_at: DateTime<Utc>,
}

/// One row of `list_connections`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSummary {
    pub instance_id: String,
    pub connected: bool,
    pub state: SessionPhase,
    pub document_name: String,
}

/// Identity of the active document, read on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub name: String,
    /// Full path, or `"Untitled"` for a drawing never saved.
    pub path: String,
    pub saved: bool,
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn execution_result_serializes_seconds() {
        let ok = ExecutionResult::success(None, Duration::from_millis(1500));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"success": true, "result": null, "error_message": "", "execution_time": 1.5})
        );
        let failed = ExecutionResult::failure("boom", Duration::ZERO);
        assert!(!failed.is_success());
        assert_eq!(failed.error_message(), "boom");
        assert!(failed.result().is_none());
    }

    #[test]
    fn phase_names() {
        assert_eq!(SessionPhase::Stale.to_string(), "stale");
        assert_eq!(serde_json::to_value(SessionPhase::Alive).unwrap(), json!("alive"));
    }
}
