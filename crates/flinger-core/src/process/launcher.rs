//! Process launching functionality.

use super::credential;
use super::layout::ServerLayout;
use crate::error::{FlingerError, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use std::os::unix::process::CommandExt;

/// Everything needed to start the server binary once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Path to the server executable.
    pub binary: PathBuf,
    /// Where the server is told to write its PID file.
    pub pid_file: PathBuf,
    /// Caller-supplied arguments, passed through verbatim.
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Launch spec for the given layout and arguments.
    pub fn new(layout: &ServerLayout, args: Vec<String>) -> Self {
        Self {
            binary: layout.binary.clone(),
            pid_file: layout.pid_file(),
            args,
        }
    }

    /// Arguments after the binary: `-pid <pidfile> <args...>`.
    pub fn command_args(&self) -> Vec<OsString> {
        let mut out = Vec::with_capacity(self.args.len() + 2);
        out.push(OsString::from("-pid"));
        out.push(self.pid_file.clone().into_os_string());
        out.extend(self.args.iter().map(OsString::from));
        out
    }
}

/// Starts the server and prepares its credentials.
///
/// The supervisor only depends on this trait, so tests can swap in a
/// scripted launcher.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Write the hashed password file. Blocks the caller until the tool exits.
    async fn write_credential(&self, tool: &Path, password: &str, out_file: &Path) -> Result<()>;

    /// Spawn the server and return without waiting for it to be ready.
    fn launch(&self, spec: &LaunchSpec) -> Result<()>;
}

/// Launcher running the real executables.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerLauncher;

#[async_trait]
impl Launcher for ServerLauncher {
    async fn write_credential(&self, tool: &Path, password: &str, out_file: &Path) -> Result<()> {
        credential::write_credential_file(tool, password, out_file).await
    }

    fn launch(&self, spec: &LaunchSpec) -> Result<()> {
        let mut cmd = Command::new(&spec.binary);
        cmd.args(spec.command_args());
        if let Some(dir) = spec.binary.parent() {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        detach(&mut cmd);

        info!(
            "Launching {} -pid {} ({} extra args)",
            spec.binary.display(),
            spec.pid_file.display(),
            spec.args.len()
        );
        debug!("Server args: {:?}", spec.args);

        let mut child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", spec.binary.display(), e);
            FlingerError::LaunchFailed {
                message: format!("Failed to spawn {}: {}", spec.binary.display(), e),
            }
        })?;

        let pid = child.id();
        info!("Launched server process with PID {}", pid);

        // The server daemonizes on its own; reap whatever we spawned so it
        // does not linger as a zombie.
        let reaper = std::thread::Builder::new()
            .name(format!("flinger-reap-{}", pid))
            .spawn(move || match child.wait() {
                Ok(status) => debug!("Launched process {} exited: {}", pid, status),
                Err(e) => debug!("wait({}) failed: {}", pid, e),
            });
        if let Err(e) = reaper {
            warn!("Failed to spawn reaper thread for {}: {}", pid, e);
        }

        Ok(())
    }
}

/// Put the child in its own session so it outlives the supervisor and
/// does not receive the supervisor's terminal signals.
#[cfg(unix)]
#[allow(unsafe_code)]
fn detach(cmd: &mut Command) {
    // SAFETY: the closure only calls setsid(), which is async-signal-safe
    // and touches no memory shared with the parent.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }
}

#[cfg(not(unix))]
fn detach(_cmd: &mut Command) {}
