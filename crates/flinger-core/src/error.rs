//! Error types for the flinger supervisor.
//!
//! Every failure a start or stop attempt can hit is represented here. The
//! supervisor recovers all of them locally into one of the two broadcast
//! error events; the typed value is still returned to the direct caller.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the flinger supervisor.
#[derive(Debug, Error)]
pub enum FlingerError {
    // Start preconditions
    #[error("No usable network address, refusing to start the server")]
    NotConnected,

    #[error("A start or stop is already in progress")]
    AlreadyInProgress,

    #[error("Server binary not installed: {0}")]
    NotInstalled(PathBuf),

    // Start attempt failures
    #[error("Failed to write credential file {path:?}: {message}")]
    CredentialWriteFailed { path: PathBuf, message: String },

    #[error("Server launch failed: {message}")]
    LaunchFailed { message: String },

    #[error("Server did not create its PID file within {0:?}")]
    StartTimeout(Duration),

    #[error("Start request was dropped before the server was launched")]
    StartAbandoned,

    // Stop failures
    #[error("Server stop failed: {message}")]
    StopFailed { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File watch error: {message}")]
    Watch { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for flinger operations.
pub type Result<T> = std::result::Result<T, FlingerError>;

impl From<std::io::Error> for FlingerError {
    fn from(err: std::io::Error) -> Self {
        FlingerError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for FlingerError {
    fn from(err: serde_json::Error) -> Self {
        FlingerError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<notify::Error> for FlingerError {
    fn from(err: notify::Error) -> Self {
        FlingerError::Watch {
            message: err.to_string(),
        }
    }
}

impl FlingerError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        FlingerError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Whether the error rejected a request without touching any state.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FlingerError::AlreadyInProgress)
    }

    /// Convert to a process exit code for command-line front ends.
    ///
    /// - 2: configuration problem
    /// - 3: not connected to any network
    /// - 4: busy with another start or stop
    /// - 5: server binary missing
    /// - 6: start attempt failed
    /// - 7: stop attempt failed
    /// - 1: anything else
    pub fn exit_code(&self) -> i32 {
        match self {
            FlingerError::Config { .. } | FlingerError::Json { .. } => 2,
            FlingerError::NotConnected => 3,
            FlingerError::AlreadyInProgress => 4,
            FlingerError::NotInstalled(_) => 5,
            FlingerError::CredentialWriteFailed { .. }
            | FlingerError::LaunchFailed { .. }
            | FlingerError::StartTimeout(_)
            | FlingerError::StartAbandoned => 6,
            FlingerError::StopFailed { .. } => 7,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FlingerError::StartTimeout(Duration::from_millis(5000));
        assert_eq!(
            err.to_string(),
            "Server did not create its PID file within 5s"
        );

        let err = FlingerError::NotInstalled(PathBuf::from("/system/bin/vncflinger"));
        assert_eq!(
            err.to_string(),
            "Server binary not installed: /system/bin/vncflinger"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(FlingerError::NotConnected.exit_code(), 3);
        assert_eq!(FlingerError::AlreadyInProgress.exit_code(), 4);
        assert_eq!(
            FlingerError::StopFailed {
                message: "no PID".into()
            }
            .exit_code(),
            7
        );
        assert_eq!(FlingerError::Other("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_io_with_path_keeps_context() {
        let err = FlingerError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
            "/tmp/vncflinger.pid",
        );
        match err {
            FlingerError::Io { path, source, .. } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/vncflinger.pid")));
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_only_busy_is_rejection() {
        assert!(FlingerError::AlreadyInProgress.is_rejection());
        assert!(!FlingerError::NotConnected.is_rejection());
    }
}
