//! Broadcast events emitted by the supervisor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status reported after a successful transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Started,
    Stopped,
}

/// Error reported after a failed start or stop attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerError {
    StartFailed,
    StopFailed,
}

/// An event broadcast to every subscriber.
///
/// Serializes as `{"status":"started"}` or `{"error":"start_failed"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorEvent {
    Status(ServerStatus),
    Error(ServerError),
}

impl SupervisorEvent {
    pub const STARTED: Self = SupervisorEvent::Status(ServerStatus::Started);
    pub const STOPPED: Self = SupervisorEvent::Status(ServerStatus::Stopped);
    pub const START_FAILED: Self = SupervisorEvent::Error(ServerError::StartFailed);
    pub const STOP_FAILED: Self = SupervisorEvent::Error(ServerError::StopFailed);

    /// Whether the event ends a start attempt.
    pub fn resolves_start(&self) -> bool {
        matches!(*self, Self::STARTED | Self::START_FAILED)
    }

    /// Whether the event ends a stop attempt.
    pub fn resolves_stop(&self) -> bool {
        matches!(*self, Self::STOPPED | Self::STOP_FAILED)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SupervisorEvent::Error(_))
    }
}

impl fmt::Display for SupervisorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorEvent::Status(ServerStatus::Started) => f.write_str("started"),
            SupervisorEvent::Status(ServerStatus::Stopped) => f.write_str("stopped"),
            SupervisorEvent::Error(ServerError::StartFailed) => f.write_str("start_failed"),
            SupervisorEvent::Error(ServerError::StopFailed) => f.write_str("stop_failed"),
        }
    }
}
