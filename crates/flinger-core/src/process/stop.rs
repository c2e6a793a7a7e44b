//! Synchronous server teardown.

use super::layout::{remove_if_exists, ServerLayout};
use crate::error::{FlingerError, Result};
use crate::platform;
use std::time::Duration;
use tracing::{info, warn};

/// Kill the server recorded in the PID file and remove its state files.
///
/// Both files are removed even when signalling fails. The first error
/// encountered is returned.
pub fn stop_server(layout: &ServerLayout, grace: Duration) -> Result<()> {
    let signalled = match layout.read_pid() {
        Some(pid) => {
            info!("Stopping server process {}", pid);
            match platform::terminate_process(pid, grace) {
                Ok(true) => Ok(()),
                Ok(false) => Err(FlingerError::StopFailed {
                    message: format!("Process {} is still alive", pid),
                }),
                Err(e) => Err(e),
            }
        }
        None => Err(FlingerError::StopFailed {
            message: format!("No PID recorded in {}", layout.pid_file().display()),
        }),
    };

    let pid_removed = remove_if_exists(&layout.pid_file());
    let credential_removed = remove_if_exists(&layout.credential_file());

    for cleanup in [&pid_removed, &credential_removed] {
        if let Err(e) = cleanup {
            warn!("Cleanup after stop failed: {}", e);
        }
    }

    signalled?;
    pid_removed.map_err(as_stop_failure)?;
    credential_removed.map_err(as_stop_failure)
}

fn as_stop_failure(err: FlingerError) -> FlingerError {
    FlingerError::StopFailed {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn layout(temp_dir: &TempDir) -> ServerLayout {
        ServerLayout::new(temp_dir.path(), temp_dir.path())
    }

    #[test]
    fn test_missing_pid_fails_but_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(&temp_dir);
        fs::write(layout.pid_file(), "garbage").unwrap();
        fs::write(layout.credential_file(), "secret").unwrap();

        let result = stop_server(&layout, Duration::from_millis(100));
        assert!(matches!(result, Err(FlingerError::StopFailed { .. })));
        assert!(!layout.pid_file().exists());
        assert!(!layout.credential_file().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_pid_counts_as_stopped() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(&temp_dir);
        fs::write(layout.pid_file(), format!("{}", i32::MAX)).unwrap();

        stop_server(&layout, Duration::from_millis(100)).unwrap();
        assert!(!layout.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_kills_recorded_process() {
        let temp_dir = TempDir::new().unwrap();
        let layout = layout(&temp_dir);
        let child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        fs::write(layout.pid_file(), child.id().to_string()).unwrap();

        stop_server(&layout, Duration::from_secs(2)).unwrap();
        assert!(!platform::is_process_alive(child.id()));
        assert!(!layout.is_running());
    }
}
