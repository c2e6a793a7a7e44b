//! Platform-specific process management.
//!
//! PID file parsing, liveness checks and termination of the detached
//! server process.

use crate::config::SupervisorConfig;
use crate::error::{FlingerError, Result};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Read a PID from a PID file.
///
/// Returns `None` if the file is missing, unreadable, or does not hold a
/// positive PID that fits a signed 32-bit value. A zero or negative PID
/// would address a whole process group when signalled, so it is rejected.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    let content = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            debug!("Failed to read PID file {:?}: {}", path, e);
            return None;
        }
    };
    parse_pid(&content)
}

fn parse_pid(content: &str) -> Option<u32> {
    let first = content.lines().next()?.trim();
    match first.parse::<u32>() {
        Ok(pid) if pid > 0 && pid <= i32::MAX as u32 => Some(pid),
        Ok(pid) => {
            debug!("PID {} out of range", pid);
            None
        }
        Err(e) => {
            debug!("Invalid PID {:?}: {}", first, e);
            None
        }
    }
}

/// Check if a process with the given PID is alive.
///
/// Zombies count as alive until they are reaped.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match i32::try_from(pid) {
            Ok(raw) if raw > 0 => kill(Pid::from_raw(raw), None).is_ok(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    {
        warn!("Process alive check not implemented for this platform");
        let _ = pid;
        false
    }
}

/// Terminate a process gracefully, then forcefully if needed.
///
/// Sends SIGTERM, waits up to `grace` for the process to exit, then sends
/// SIGKILL. Children of this process are reaped along the way so they do
/// not linger as zombies.
///
/// Returns `true` if the process is gone (including when it was already
/// gone before the call), `false` if it survived SIGKILL.
pub fn terminate_process(pid: u32, grace: Duration) -> Result<bool> {
    #[cfg(unix)]
    {
        terminate_process_unix(pid, grace)
    }

    #[cfg(not(unix))]
    {
        let _ = (pid, grace);
        Err(FlingerError::StopFailed {
            message: "Process termination not implemented for this platform".into(),
        })
    }
}

#[cfg(unix)]
fn terminate_process_unix(pid: u32, grace: Duration) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::thread::sleep;

    let raw = i32::try_from(pid).map_err(|_| FlingerError::StopFailed {
        message: format!("PID {} out of range", pid),
    })?;
    let nix_pid = Pid::from_raw(raw);

    debug!("Sending SIGTERM to process {}", pid);
    match kill(nix_pid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            debug!("Process {} is not running", pid);
            return Ok(true);
        }
        Err(e) => {
            return Err(FlingerError::StopFailed {
                message: format!("Failed to send SIGTERM to {}: {}", pid, e),
            });
        }
    }

    let deadline = Instant::now() + grace;
    loop {
        reap(nix_pid);
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(SupervisorConfig::POLL_INTERVAL);
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    match kill(nix_pid, Signal::SIGKILL) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(true),
        Err(e) => {
            return Err(FlingerError::StopFailed {
                message: format!("Failed to kill process {}: {}", pid, e),
            });
        }
    }

    sleep(SupervisorConfig::POLL_INTERVAL);
    reap(nix_pid);

    let gone = !is_process_alive(pid);
    if !gone {
        warn!("Process {} survived SIGKILL", pid);
    }
    Ok(gone)
}

/// Reap the process if it is our own child. ECHILD just means it is not.
#[cfg(unix)]
fn reap(pid: nix::unistd::Pid) {
    use nix::sys::wait::{waitpid, WaitPidFlag};

    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(status) => debug!("waitpid({}) -> {:?}", pid, status),
        Err(nix::errno::Errno::ECHILD) => {}
        Err(e) => debug!("waitpid({}) failed: {}", pid, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("1234\n"), Some(1234));
        assert_eq!(parse_pid("  42  "), Some(42));
        assert_eq!(parse_pid("0"), None);
        assert_eq!(parse_pid("-5"), None);
        assert_eq!(parse_pid("4000000000"), None);
        assert_eq!(parse_pid("abc"), None);
        assert_eq!(parse_pid(""), None);
    }

    #[test]
    fn test_read_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let pid_file = temp_dir.path().join("vncflinger.pid");

        assert_eq!(read_pid_file(&pid_file), None);

        fs::write(&pid_file, "31337\n").unwrap();
        assert_eq!(read_pid_file(&pid_file), Some(31337));
    }

    #[cfg(unix)]
    #[test]
    fn test_is_process_alive_self() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        assert!(!is_process_alive(4_000_000_000));
        assert!(!is_process_alive(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_nonexistent() {
        // Highest valid PID is far above any pid_max in practice
        let result = terminate_process(i32::MAX as u32, Duration::from_millis(100));
        assert!(result.unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child() {
        let child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(is_process_alive(pid));

        let gone = terminate_process(pid, Duration::from_secs(2)).unwrap();
        assert!(gone);
        assert!(!is_process_alive(pid));
    }
}
