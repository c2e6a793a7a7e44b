//! Start/stop orchestration for the single server process.
//!
//! The server detaches right after launch and only signals readiness by
//! writing its PID file. A start therefore arms two racers: a watch on the
//! state directory and a timeout task. Whichever resolves first moves the
//! state machine; the other finds the attempt already settled and does
//! nothing. All transitions go through one mutex, which is never held
//! across an `.await`.

use super::events::SupervisorEvent;
use super::launcher::{LaunchSpec, Launcher, ServerLauncher};
use super::layout::{remove_if_exists, ServerLayout};
use super::options::StartRequest;
use super::state::ServerProcessState;
use super::stop::stop_server;
use super::watcher::{DirectoryNotifier, FsNotifier, WatchHandle};
use crate::config::SupervisorSettings;
use crate::error::{FlingerError, Result};
use crate::hold::{HeldResource, NoopHold};
use crate::platform::{InterfaceReachability, Reachability};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

/// How a start request left the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The server is running; carries the PID if it could be read yet.
    Started(Option<u32>),
    /// The watcher and timeout are armed; the result arrives as an event.
    Pending,
}

/// Supervisor owning the lifecycle of one server process.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
}

struct Shared {
    layout: ServerLayout,
    settings: SupervisorSettings,
    launcher: Arc<dyn Launcher>,
    notifier: Arc<dyn DirectoryNotifier>,
    reachability: Arc<dyn Reachability>,
    hold: Arc<dyn HeldResource>,
    events: broadcast::Sender<SupervisorEvent>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    state: ServerProcessState,
    /// Identifies the current start attempt. Racers carry the value they
    /// were armed with and act only if it still matches.
    attempt: u64,
    watch: Option<WatchHandle>,
    timeout: Option<AbortHandle>,
    holding: bool,
}

impl Inner {
    fn awaiting(&self, attempt: u64) -> bool {
        self.state == ServerProcessState::StartInProgress && self.attempt == attempt
    }

    fn disarm(&mut self) {
        if let Some(timeout) = self.timeout.take() {
            timeout.abort();
        }
        if let Some(watch) = self.watch.take() {
            watch.cancel();
        }
    }
}

/// Fails a start attempt whose `start` future was dropped before the
/// attempt was handed over to the watcher and timeout.
struct PendingStart<'a> {
    shared: &'a Shared,
    attempt: u64,
    armed: bool,
}

impl PendingStart<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStart<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared
                .fail_start(self.attempt, &FlingerError::StartAbandoned);
        }
    }
}

/// Builder for [`ProcessSupervisor`].
pub struct ProcessSupervisorBuilder {
    layout: ServerLayout,
    settings: SupervisorSettings,
    launcher: Arc<dyn Launcher>,
    notifier: Arc<dyn DirectoryNotifier>,
    reachability: Arc<dyn Reachability>,
    hold: Arc<dyn HeldResource>,
}

impl ProcessSupervisorBuilder {
    pub fn settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn DirectoryNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn reachability(mut self, reachability: Arc<dyn Reachability>) -> Self {
        self.reachability = reachability;
        self
    }

    pub fn hold(mut self, hold: Arc<dyn HeldResource>) -> Self {
        self.hold = hold;
        self
    }

    /// Build the supervisor.
    ///
    /// If the PID file already exists (a server started by an earlier
    /// supervisor process), the new supervisor adopts it and starts out
    /// `Running`.
    pub fn build(self) -> ProcessSupervisor {
        let (events, _) = broadcast::channel(self.settings.event_capacity.max(1));
        let shared = Arc::new(Shared {
            layout: self.layout,
            settings: self.settings,
            launcher: self.launcher,
            notifier: self.notifier,
            reachability: self.reachability,
            hold: self.hold,
            events,
            inner: Mutex::new(Inner::default()),
        });

        if shared.layout.is_running() {
            let pid = shared.layout.read_pid();
            info!("Adopting running server (pid {:?})", pid);
            let mut inner = shared.lock();
            shared.acquire_hold(&mut inner);
            inner.state = ServerProcessState::Running { pid };
        }

        ProcessSupervisor { shared }
    }
}

impl ProcessSupervisor {
    /// Start building a supervisor for the given layout.
    pub fn builder(layout: ServerLayout) -> ProcessSupervisorBuilder {
        ProcessSupervisorBuilder {
            layout,
            settings: SupervisorSettings::default(),
            launcher: Arc::new(ServerLauncher),
            notifier: Arc::new(FsNotifier),
            reachability: Arc::new(InterfaceReachability::default()),
            hold: Arc::new(NoopHold),
        }
    }

    /// Supervisor with the default collaborators.
    pub fn new(layout: ServerLayout) -> Self {
        Self::builder(layout).build()
    }

    /// Subscribe to status and error events.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.shared.events.subscribe()
    }

    /// Current state machine state.
    ///
    /// The server creates its PID file before writing the PID into it, so a
    /// start can complete with `Running { pid: None }`. The PID is read
    /// again here until it is known.
    pub fn state(&self) -> ServerProcessState {
        let mut inner = self.shared.lock();
        if inner.state == (ServerProcessState::Running { pid: None }) {
            if let Some(pid) = self.shared.layout.read_pid() {
                inner.state = ServerProcessState::Running { pid: Some(pid) };
            }
        }
        inner.state
    }

    /// Whether the PID file exists. Says nothing about the OS process.
    pub fn is_running(&self) -> bool {
        self.shared.layout.is_running()
    }

    pub fn layout(&self) -> &ServerLayout {
        &self.shared.layout
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.shared.settings
    }

    pub fn reachability(&self) -> &dyn Reachability {
        self.shared.reachability.as_ref()
    }

    /// Start the server.
    ///
    /// Returns once the server has been launched; readiness is reported
    /// through a `started` or `start_failed` event. A call while another
    /// start or stop is unresolved, or while the server already runs, is
    /// rejected with [`FlingerError::AlreadyInProgress`] and emits nothing.
    pub async fn start(&self, request: StartRequest) -> Result<StartOutcome> {
        let attempt = {
            let mut inner = self.shared.lock();
            if inner.state != ServerProcessState::Idle || self.shared.layout.is_running() {
                debug!("Ignoring start request in state {}", inner.state);
                return Err(FlingerError::AlreadyInProgress);
            }

            if self.shared.reachability.address().is_none() {
                warn!("Not starting server: no usable network address");
                self.shared.emit(SupervisorEvent::START_FAILED);
                return Err(FlingerError::NotConnected);
            }

            inner.attempt += 1;
            inner.state = ServerProcessState::StartInProgress;
            inner.attempt
        };

        info!("Start attempt {}: {:?}", attempt, request);

        // Settles the attempt if this future is dropped mid-start
        let guard = PendingStart {
            shared: &self.shared,
            attempt,
            armed: true,
        };
        let result = self.run_start(attempt, request).await;
        guard.disarm();

        result.inspect_err(|e| self.shared.fail_start(attempt, e))
    }

    async fn run_start(&self, attempt: u64, request: StartRequest) -> Result<StartOutcome> {
        let shared = &self.shared;
        let layout = &shared.layout;

        if !layout.is_installed() {
            return Err(FlingerError::NotInstalled(layout.binary.clone()));
        }
        layout.ensure_state_dir()?;

        if let Some(password) = request.password() {
            shared
                .launcher
                .write_credential(&layout.password_tool, password, &layout.credential_file())
                .await?;
        }

        // Armed before launching so a fast server cannot slip past it
        let weak = Arc::downgrade(shared);
        let watch = shared.notifier.watch_for_file(
            &layout.state_dir,
            OsStr::new(layout.pid_file_name()),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.complete_start(attempt, "watcher");
                }
            }),
        )?;
        {
            let mut inner = shared.lock();
            if !inner.awaiting(attempt) {
                watch.cancel();
                return Ok(StartOutcome::Started(layout.read_pid()));
            }
            inner.watch = Some(watch);
        }

        shared
            .launcher
            .launch(&LaunchSpec::new(layout, request.into_args()))?;

        if layout.is_running() {
            shared.complete_start(attempt, "launch");
            return Ok(StartOutcome::Started(layout.read_pid()));
        }

        let weak = Arc::downgrade(shared);
        let delay = shared.settings.start_timeout;
        let timeout = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.expire_start(attempt, delay);
            }
        });

        let mut inner = shared.lock();
        if inner.awaiting(attempt) {
            inner.timeout = Some(timeout.abort_handle());
            Ok(StartOutcome::Pending)
        } else {
            // Watcher won before the timeout was even stored
            timeout.abort();
            Ok(StartOutcome::Started(layout.read_pid()))
        }
    }

    /// Stop the server.
    ///
    /// Returns `Ok(false)` when there is nothing to stop. While a start or
    /// another stop is unresolved the call is rejected with
    /// [`FlingerError::AlreadyInProgress`] and the in-flight work is left
    /// alone. Any other failure still ends in `Idle` with a `stop_failed`
    /// event; stops are not retried.
    pub async fn stop(&self) -> Result<bool> {
        {
            let mut inner = self.shared.lock();
            match inner.state {
                ServerProcessState::Running { .. } => {}
                ServerProcessState::Idle if self.shared.layout.is_running() => {
                    info!("PID file present while idle, stopping untracked server");
                }
                ServerProcessState::Idle => {
                    debug!("Stop requested but server is not running");
                    return Ok(false);
                }
                ServerProcessState::StartInProgress | ServerProcessState::StopInProgress => {
                    debug!("Ignoring stop request in state {}", inner.state);
                    return Err(FlingerError::AlreadyInProgress);
                }
            }

            inner.state = ServerProcessState::StopInProgress;
            // Released first, whatever happens to the rest of the teardown
            self.shared.release_hold(&mut inner);
            inner.disarm();
        }

        let layout = self.shared.layout.clone();
        let grace = self.shared.settings.stop_grace;
        let result = match tokio::task::spawn_blocking(move || stop_server(&layout, grace)).await {
            Ok(result) => result,
            Err(e) => Err(FlingerError::StopFailed {
                message: format!("Stop task failed: {}", e),
            }),
        };

        let mut inner = self.shared.lock();
        inner.state = ServerProcessState::Idle;
        match result {
            Ok(()) => {
                info!("Server stopped");
                self.shared.emit(SupervisorEvent::STOPPED);
                Ok(true)
            }
            Err(e) => {
                error!("Server stop failed: {}", e);
                self.shared.emit(SupervisorEvent::STOP_FAILED);
                Err(e)
            }
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("supervisor state lock poisoned")
    }

    fn emit(&self, event: SupervisorEvent) {
        debug!("Broadcasting {}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn acquire_hold(&self, inner: &mut Inner) {
        if inner.holding {
            return;
        }
        match self.hold.acquire() {
            Ok(()) => {
                debug!("Acquired {}", self.hold.name());
                inner.holding = true;
            }
            Err(e) => warn!("Failed to acquire {}: {}", self.hold.name(), e),
        }
    }

    fn release_hold(&self, inner: &mut Inner) {
        if !inner.holding {
            return;
        }
        inner.holding = false;
        match self.hold.release() {
            Ok(()) => debug!("Released {}", self.hold.name()),
            Err(e) => warn!("Failed to release {}: {}", self.hold.name(), e),
        }
    }

    /// Move a pending attempt to `Running`. No-op if the attempt is settled.
    fn complete_start(&self, attempt: u64, source: &str) -> bool {
        let mut inner = self.lock();
        if !inner.awaiting(attempt) {
            debug!("Start attempt {} already settled, ignoring {}", attempt, source);
            return false;
        }

        inner.disarm();
        let pid = self.layout.read_pid();
        self.acquire_hold(&mut inner);
        inner.state = ServerProcessState::Running { pid };
        info!("Server started (attempt {}, via {}, pid {:?})", attempt, source, pid);
        self.emit(SupervisorEvent::STARTED);
        true
    }

    /// Timeout fired for a pending attempt.
    fn expire_start(&self, attempt: u64, waited: Duration) {
        {
            let mut inner = self.lock();
            if !inner.awaiting(attempt) {
                debug!("Start attempt {} already settled, ignoring timeout", attempt);
                return;
            }
            // The task is finishing on its own
            inner.timeout = None;
        }

        // The PID file is the truth; a missed notification is not a failure
        if self.layout.is_running() {
            warn!("PID file present at timeout without a watch event");
            self.complete_start(attempt, "timeout check");
            return;
        }

        self.fail_start(attempt, &FlingerError::StartTimeout(waited));
    }

    /// Settle a pending attempt as failed. No-op if the attempt is settled.
    fn fail_start(&self, attempt: u64, err: &FlingerError) {
        let mut inner = self.lock();
        if !inner.awaiting(attempt) {
            debug!("Start attempt {} already settled, ignoring failure: {}", attempt, err);
            return;
        }

        inner.disarm();
        self.release_hold(&mut inner);
        if let Err(e) = remove_if_exists(&self.layout.credential_file()) {
            warn!("Failed to remove credential file after failed start: {}", e);
        }
        inner.state = ServerProcessState::Idle;
        error!("Start attempt {} failed: {}", attempt, err);
        self.emit(SupervisorEvent::START_FAILED);
    }
}
