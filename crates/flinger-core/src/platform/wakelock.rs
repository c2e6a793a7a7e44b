//! Kernel wake lock through the Android sysfs interface.
//!
//! Writing a name to `/sys/power/wake_lock` takes a named wake lock that
//! stays held until the same name is written to `/sys/power/wake_unlock`.
//! The lock belongs to the kernel, not to this process, so it survives the
//! supervisor exiting while the server keeps running.

use crate::error::{FlingerError, Result};
use crate::hold::HeldResource;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const WAKE_LOCK_PATH: &str = "/sys/power/wake_lock";
const WAKE_UNLOCK_PATH: &str = "/sys/power/wake_unlock";

/// A named kernel wake lock.
#[derive(Debug, Clone)]
pub struct SysfsWakeLock {
    name: String,
    lock_path: PathBuf,
    unlock_path: PathBuf,
}

impl SysfsWakeLock {
    /// Create a wake lock with the given name on the standard sysfs paths.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_paths(name, WAKE_LOCK_PATH, WAKE_UNLOCK_PATH)
    }

    /// Create a wake lock writing to custom control files.
    pub fn with_paths(
        name: impl Into<String>,
        lock_path: impl AsRef<Path>,
        unlock_path: impl AsRef<Path>,
    ) -> Self {
        Self {
            name: name.into(),
            lock_path: lock_path.as_ref().to_path_buf(),
            unlock_path: unlock_path.as_ref().to_path_buf(),
        }
    }

    /// Whether the control files exist on this host.
    pub fn is_available(&self) -> bool {
        self.lock_path.exists() && self.unlock_path.exists()
    }

    fn write_name(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|e| FlingerError::io_with_path(e, path))?;
        file.write_all(self.name.as_bytes())
            .map_err(|e| FlingerError::io_with_path(e, path))?;
        debug!("Wrote wake lock {:?} to {}", self.name, path.display());
        Ok(())
    }
}

impl HeldResource for SysfsWakeLock {
    fn acquire(&self) -> Result<()> {
        self.write_name(&self.lock_path)
    }

    fn release(&self) -> Result<()> {
        self.write_name(&self.unlock_path)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release_write_name() {
        let temp_dir = TempDir::new().unwrap();
        let lock = temp_dir.path().join("wake_lock");
        let unlock = temp_dir.path().join("wake_unlock");
        std::fs::write(&lock, "").unwrap();
        std::fs::write(&unlock, "").unwrap();

        let wake_lock = SysfsWakeLock::with_paths("flinger", &lock, &unlock);
        assert!(wake_lock.is_available());

        wake_lock.acquire().unwrap();
        assert_eq!(std::fs::read_to_string(&lock).unwrap(), "flinger");

        wake_lock.release().unwrap();
        assert_eq!(std::fs::read_to_string(&unlock).unwrap(), "flinger");
    }

    #[test]
    fn test_missing_control_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let wake_lock = SysfsWakeLock::with_paths(
            "flinger",
            temp_dir.path().join("missing_lock"),
            temp_dir.path().join("missing_unlock"),
        );
        assert!(!wake_lock.is_available());
        assert!(wake_lock.acquire().is_err());
    }
}
