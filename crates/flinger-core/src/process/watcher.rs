//! One-shot notification when a named file is created in a directory.
//!
//! Used to learn that the server has written its PID file. Two
//! implementations: [`FsNotifier`] on top of OS file notifications and
//! [`PollingNotifier`] as a fallback for file systems that do not report
//! events.

use crate::cancel::CancellationToken;
use crate::config::SupervisorConfig;
use crate::error::{FlingerError, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Callback invoked once when the watched file is created.
pub type CreatedCallback = Box<dyn FnOnce() + Send + 'static>;

/// Delivers a single event when `file_name` is created inside `dir`.
pub trait DirectoryNotifier: Send + Sync {
    /// Start watching. The callback runs at most once, on a background
    /// thread, and never after the returned handle has been cancelled.
    fn watch_for_file(
        &self,
        dir: &Path,
        file_name: &OsStr,
        on_created: CreatedCallback,
    ) -> Result<WatchHandle>;
}

/// Keeps a watch alive. Cancelling or dropping it disarms the watch.
pub struct WatchHandle {
    token: CancellationToken,
    _watcher: Option<RecommendedWatcher>,
}

impl WatchHandle {
    /// Handle for a watch driven only by the token.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            _watcher: None,
        }
    }

    fn with_watcher(token: CancellationToken, watcher: RecommendedWatcher) -> Self {
        Self {
            token,
            _watcher: Some(watcher),
        }
    }

    /// Disarm the watch.
    pub fn cancel(self) {
        self.token.cancel();
    }

    /// Whether the watch already fired or was cancelled.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Whether an event reports creation of exactly `file_name`.
pub fn is_creation_of(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name))
}

/// Notifier backed by the platform's file notification API.
///
/// Falls back to [`PollingNotifier`] when the OS watch cannot be set up.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsNotifier;

impl DirectoryNotifier for FsNotifier {
    fn watch_for_file(
        &self,
        dir: &Path,
        file_name: &OsStr,
        on_created: CreatedCallback,
    ) -> Result<WatchHandle> {
        if !dir.is_dir() {
            return Err(FlingerError::Watch {
                message: format!("{} is not a directory", dir.display()),
            });
        }

        watch_or_poll(os_watch(dir), dir, file_name, on_created)
    }
}

type OsWatch = (RecommendedWatcher, mpsc::Receiver<notify::Result<Event>>);

fn os_watch(dir: &Path) -> Result<OsWatch> {
    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(event_tx).map_err(|e| FlingerError::Watch {
        message: format!("Failed to create file watcher: {}", e),
    })?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| FlingerError::Watch {
            message: format!("Failed to watch {}: {}", dir.display(), e),
        })?;

    Ok((watcher, event_rx))
}

/// Use the OS watch if it could be set up, otherwise poll.
fn watch_or_poll(
    os_watch: Result<OsWatch>,
    dir: &Path,
    file_name: &OsStr,
    on_created: CreatedCallback,
) -> Result<WatchHandle> {
    match os_watch {
        Ok((watcher, event_rx)) => watch_events(watcher, event_rx, dir, file_name, on_created),
        Err(e) => {
            // Typically an exhausted inotify watch limit
            warn!("{}, falling back to polling", e);
            PollingNotifier::default().watch_for_file(dir, file_name, on_created)
        }
    }
}

fn watch_events(
    watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Result<Event>>,
    dir: &Path,
    file_name: &OsStr,
    on_created: CreatedCallback,
) -> Result<WatchHandle> {
    info!("Watching {} for {:?}", dir.display(), file_name);

    let token = CancellationToken::new();
    let thread_token = token.clone();
    let file_name: OsString = file_name.to_os_string();

    std::thread::Builder::new()
        .name("flinger-pid-watch".into())
        .spawn(move || {
            let mut on_created = Some(on_created);
            loop {
                if thread_token.is_cancelled() {
                    debug!("PID file watch disarmed");
                    break;
                }

                match event_rx.recv_timeout(SupervisorConfig::POLL_INTERVAL) {
                    Ok(Ok(event)) => {
                        if is_creation_of(&event, &file_name) && thread_token.claim() {
                            debug!("Saw creation of {:?}", file_name);
                            if let Some(callback) = on_created.take() {
                                callback();
                            }
                            break;
                        }
                    }
                    Ok(Err(e)) => warn!("File watch error: {}", e),
                    Err(mpsc::RecvTimeoutError::Timeout) => {}
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        debug!("File watcher channel disconnected");
                        break;
                    }
                }
            }
        })
        .map_err(|e| FlingerError::Watch {
            message: format!("Failed to spawn watch thread: {}", e),
        })?;

    Ok(WatchHandle::with_watcher(token, watcher))
}

/// Notifier that checks for the file at a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct PollingNotifier {
    interval: Duration,
}

impl Default for PollingNotifier {
    fn default() -> Self {
        Self::new(SupervisorConfig::POLL_INTERVAL)
    }
}

impl PollingNotifier {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl DirectoryNotifier for PollingNotifier {
    fn watch_for_file(
        &self,
        dir: &Path,
        file_name: &OsStr,
        on_created: CreatedCallback,
    ) -> Result<WatchHandle> {
        let target: PathBuf = dir.join(file_name);
        let interval = self.interval;
        let token = CancellationToken::new();
        let thread_token = token.clone();

        debug!("Polling for {} every {:?}", target.display(), interval);

        std::thread::Builder::new()
            .name("flinger-pid-poll".into())
            .spawn(move || {
                while !thread_token.is_cancelled() {
                    if target.exists() {
                        if thread_token.claim() {
                            on_created();
                        }
                        return;
                    }
                    std::thread::sleep(interval);
                }
            })
            .map_err(|e| FlingerError::Watch {
                message: format!("Failed to spawn poll thread: {}", e),
            })?;

        Ok(WatchHandle::new(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn counter() -> (Arc<AtomicUsize>, CreatedCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn wait_for(count: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if count.load(Ordering::SeqCst) == expected {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_is_creation_of() {
        let name = OsStr::new("vncflinger.pid");
        let create = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/state/vncflinger.pid"));
        let other_file = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/state/vncflinger.auth"));
        let modify = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/state/vncflinger.pid"));

        assert!(is_creation_of(&create, name));
        assert!(!is_creation_of(&other_file, name));
        assert!(!is_creation_of(&modify, name));
    }

    #[test]
    fn test_fs_notifier_fires_once() {
        let temp_dir = TempDir::new().unwrap();
        let (count, callback) = counter();

        let handle = FsNotifier
            .watch_for_file(temp_dir.path(), OsStr::new("vncflinger.pid"), callback)
            .unwrap();

        std::fs::write(temp_dir.path().join("unrelated.txt"), "x").unwrap();
        std::fs::write(temp_dir.path().join("vncflinger.pid"), "1").unwrap();

        assert!(wait_for(&count, 1));
        assert!(handle.is_done());
    }

    #[test]
    fn test_polling_notifier_fires_once() {
        let temp_dir = TempDir::new().unwrap();
        let (count, callback) = counter();

        let _handle = PollingNotifier::new(Duration::from_millis(10))
            .watch_for_file(temp_dir.path(), OsStr::new("vncflinger.pid"), callback)
            .unwrap();
        std::fs::write(temp_dir.path().join("vncflinger.pid"), "1").unwrap();

        assert!(wait_for(&count, 1));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancelled_watch_never_fires() {
        let temp_dir = TempDir::new().unwrap();
        let (count, callback) = counter();

        let handle = PollingNotifier::new(Duration::from_millis(10))
            .watch_for_file(temp_dir.path(), OsStr::new("vncflinger.pid"), callback)
            .unwrap();
        handle.cancel();

        std::fs::write(temp_dir.path().join("vncflinger.pid"), "1").unwrap();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_os_watch_falls_back_to_polling() {
        let temp_dir = TempDir::new().unwrap();
        let (count, callback) = counter();
        let unavailable = Err(FlingerError::Watch {
            message: "inotify watch limit reached".into(),
        });

        let _handle = watch_or_poll(
            unavailable,
            temp_dir.path(),
            OsStr::new("vncflinger.pid"),
            callback,
        )
        .unwrap();
        std::fs::write(temp_dir.path().join("vncflinger.pid"), "1").unwrap();

        assert!(wait_for(&count, 1));
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (_count, callback) = counter();
        let result = FsNotifier.watch_for_file(
            &temp_dir.path().join("missing"),
            OsStr::new("vncflinger.pid"),
            callback,
        );
        assert!(matches!(result, Err(FlingerError::Watch { .. })));
    }
}
