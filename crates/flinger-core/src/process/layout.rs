//! File layout of the supervised server.

use crate::config::LayoutConfig;
use crate::error::{FlingerError, Result};
use crate::platform;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where the server binary, its password tool and its state files live.
///
/// Deserialized from JSON with every field optional; missing fields fall
/// back to the on-device defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerLayout {
    /// The `vncflinger` executable.
    pub binary: PathBuf,
    /// The `vncpasswd` credential hashing tool.
    pub password_tool: PathBuf,
    /// Directory holding the PID file and the credential file.
    pub state_dir: PathBuf,
}

impl Default for ServerLayout {
    fn default() -> Self {
        Self::new(LayoutConfig::ROOT_DIR, LayoutConfig::STATE_DIR)
    }
}

impl ServerLayout {
    /// Layout with both executables under `root_dir`.
    pub fn new(root_dir: impl AsRef<Path>, state_dir: impl AsRef<Path>) -> Self {
        let root_dir = root_dir.as_ref();
        Self {
            binary: root_dir.join(LayoutConfig::SERVER_BINARY),
            password_tool: root_dir.join(LayoutConfig::PASSWORD_TOOL),
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    /// Replace the state directory.
    pub fn with_state_dir(mut self, state_dir: impl AsRef<Path>) -> Self {
        self.state_dir = state_dir.as_ref().to_path_buf();
        self
    }

    /// Load a layout from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| FlingerError::Io {
            message: format!("Failed to read layout file: {}", e),
            path: Some(path.to_path_buf()),
            source: Some(e),
        })?;

        let layout: ServerLayout =
            serde_json::from_str(&content).map_err(|e| FlingerError::Json {
                message: format!("Failed to parse layout from {}: {}", path.display(), e),
                source: Some(e),
            })?;

        if layout.state_dir.as_os_str().is_empty() {
            return Err(FlingerError::Config {
                message: format!("{}: state_dir must not be empty", path.display()),
            });
        }

        info!(
            "Loaded server layout from {} (binary {})",
            path.display(),
            layout.binary.display()
        );
        Ok(layout)
    }

    /// Name of the PID file inside the state directory.
    pub fn pid_file_name(&self) -> &'static str {
        LayoutConfig::PID_FILE_NAME
    }

    /// Path of the PID file the server writes once it is listening.
    pub fn pid_file(&self) -> PathBuf {
        self.state_dir.join(LayoutConfig::PID_FILE_NAME)
    }

    /// Path of the hashed password file.
    pub fn credential_file(&self) -> PathBuf {
        self.state_dir.join(LayoutConfig::CREDENTIAL_FILE_NAME)
    }

    /// Whether the server binary exists.
    pub fn is_installed(&self) -> bool {
        self.binary.exists()
    }

    /// Whether the server is running, defined purely as "the PID file
    /// exists". A stale file left by a dead process still reads as running.
    pub fn is_running(&self) -> bool {
        self.pid_file().exists()
    }

    /// PID recorded in the PID file, if any.
    pub fn read_pid(&self) -> Option<u32> {
        platform::read_pid_file(&self.pid_file())
    }

    /// Create the state directory if it does not exist yet.
    pub fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir)
                .map_err(|e| FlingerError::io_with_path(e, &self.state_dir))?;
            debug!("Created state directory {}", self.state_dir.display());
        }
        Ok(())
    }
}

/// Remove a file if present.
pub(crate) fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FlingerError::io_with_path(e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_layout() {
        let layout = ServerLayout::default();
        assert_eq!(layout.binary, PathBuf::from("/system/bin/vncflinger"));
        assert_eq!(layout.password_tool, PathBuf::from("/system/bin/vncpasswd"));
        assert!(layout.pid_file().ends_with("vncflinger.pid"));
        assert!(layout.credential_file().ends_with("vncflinger.auth"));
    }

    #[test]
    fn test_is_running_follows_pid_file() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ServerLayout::default().with_state_dir(temp_dir.path());

        assert!(!layout.is_running());
        assert_eq!(layout.read_pid(), None);

        fs::write(layout.pid_file(), "4242").unwrap();
        assert!(layout.is_running());
        assert_eq!(layout.read_pid(), Some(4242));

        // Garbage content still counts as running
        fs::write(layout.pid_file(), "not a pid").unwrap();
        assert!(layout.is_running());
        assert_eq!(layout.read_pid(), None);
    }

    #[test]
    fn test_load_partial_json() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("layout.json");
        fs::write(
            &file,
            r#"{ "binary": "/vendor/bin/vncflinger", "state_dir": "/data/flinger" }"#,
        )
        .unwrap();

        let layout = ServerLayout::load(&file).unwrap();
        assert_eq!(layout.binary, PathBuf::from("/vendor/bin/vncflinger"));
        assert_eq!(layout.password_tool, PathBuf::from("/system/bin/vncpasswd"));
        assert_eq!(layout.state_dir, PathBuf::from("/data/flinger"));
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("layout.json");
        fs::write(&file, "{ not json").unwrap();
        assert!(matches!(
            ServerLayout::load(&file),
            Err(FlingerError::Json { .. })
        ));
    }

    #[test]
    fn test_load_rejects_empty_state_dir() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("layout.json");
        fs::write(&file, r#"{ "state_dir": "" }"#).unwrap();
        assert!(matches!(
            ServerLayout::load(&file),
            Err(FlingerError::Config { .. })
        ));
    }

    #[test]
    fn test_ensure_state_dir_and_remove() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ServerLayout::default().with_state_dir(temp_dir.path().join("nested/state"));

        layout.ensure_state_dir().unwrap();
        assert!(layout.state_dir.is_dir());

        fs::write(layout.credential_file(), "secret").unwrap();
        remove_if_exists(&layout.credential_file()).unwrap();
        assert!(!layout.credential_file().exists());
        // Second removal is a no-op
        remove_if_exists(&layout.credential_file()).unwrap();
    }
}
