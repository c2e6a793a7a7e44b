//! Supervisor state machine states.

use serde::Serialize;
use std::fmt;

/// Lifecycle state of the supervised server.
///
/// `Idle` and `Running` are the only states that persist between requests;
/// the two in-progress states exist only while a start or stop is being
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServerProcessState {
    Idle,
    StartInProgress,
    /// The PID is read from the PID file when the start completes. It can be
    /// missing if the server had not written it yet.
    Running { pid: Option<u32> },
    StopInProgress,
}

impl ServerProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerProcessState::Idle => "idle",
            ServerProcessState::StartInProgress => "start_in_progress",
            ServerProcessState::Running { .. } => "running",
            ServerProcessState::StopInProgress => "stop_in_progress",
        }
    }

    /// Whether a start or stop is currently being resolved.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            ServerProcessState::StartInProgress | ServerProcessState::StopInProgress
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServerProcessState::Running { .. })
    }
}

impl Default for ServerProcessState {
    fn default() -> Self {
        ServerProcessState::Idle
    }
}

impl fmt::Display for ServerProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerProcessState::Running { pid: Some(pid) } => write!(f, "running (pid {})", pid),
            other => f.write_str(other.as_str()),
        }
    }
}
