//! Command implementations.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use flinger_core::process::ServerOptions;
use flinger_core::{
    connected_status, FlingerError, HeldResource, LayoutConfig, NoopHold, ProcessSupervisor,
    ServerConfig, ServerLayout, ServerProcessState, StartOutcome, SupervisorEvent, SysfsWakeLock,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{info, warn};

/// Arguments shared by every command that starts the server.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct StartArgs {
    /// VNC password; omit or leave empty to disable authentication
    #[arg(long)]
    pub password: Option<String>,

    /// Port the server listens on
    #[arg(long)]
    pub port: Option<u16>,

    /// Extra server parameters, split on whitespace
    #[arg(long, default_value = "")]
    pub params: String,
}

impl StartArgs {
    fn options(&self) -> ServerOptions {
        let mut options = ServerOptions::default().with_extra(self.params.clone());
        if let Some(port) = self.port {
            options = options.with_port(port);
        }
        if let Some(ref password) = self.password {
            options = options.with_password(password.clone());
        }
        options
    }
}

/// Snapshot printed by `status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub state: ServerProcessState,
    pub running: bool,
    pub pid: Option<u32>,
    /// `<address>:<port>` when the device is reachable.
    pub address: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl StatusReport {
    pub fn collect(supervisor: &ProcessSupervisor) -> Self {
        Self {
            state: supervisor.state(),
            running: supervisor.is_running(),
            pid: supervisor.layout().read_pid(),
            address: connected_status(supervisor.reachability(), None),
            checked_at: Utc::now(),
        }
    }
}

/// Work out the layout from `--layout`, `--root-dir` and `--state-dir`.
pub fn resolve_layout(
    layout_file: Option<&Path>,
    root_dir: Option<&Path>,
    state_dir: Option<&Path>,
) -> Result<ServerLayout> {
    let layout = match (layout_file, root_dir) {
        (Some(_), Some(_)) => bail!("--layout and --root-dir cannot be combined"),
        (Some(file), None) => ServerLayout::load(file)?,
        (None, Some(root)) => ServerLayout::new(root, LayoutConfig::STATE_DIR),
        (None, None) => ServerLayout::default(),
    };

    Ok(match state_dir {
        Some(dir) => layout.with_state_dir(dir),
        None => layout,
    })
}

/// The kernel wake lock when the host has one.
pub fn device_hold() -> Arc<dyn HeldResource> {
    let wake_lock = SysfsWakeLock::new(ServerConfig::WAKE_LOCK_NAME);
    if wake_lock.is_available() {
        Arc::new(wake_lock)
    } else {
        Arc::new(NoopHold)
    }
}

/// Build the supervisor for one command.
///
/// Building adopts a running server and takes the hold on its behalf, so
/// read-only commands get [`NoopHold`] instead of `hold`.
pub fn build_supervisor(
    layout: ServerLayout,
    hold: Arc<dyn HeldResource>,
    read_only: bool,
) -> ProcessSupervisor {
    let hold: Arc<dyn HeldResource> = if read_only { Arc::new(NoopHold) } else { hold };
    ProcessSupervisor::builder(layout).hold(hold).build()
}

/// Process exit status for an error returned by a command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let code = err
        .downcast_ref::<FlingerError>()
        .map(FlingerError::exit_code)
        .unwrap_or(1);
    u8::try_from(code).unwrap_or(1)
}

pub async fn start(supervisor: &ProcessSupervisor, args: StartArgs) -> Result<()> {
    let mut events = supervisor.subscribe();
    let request = args.options().into_request(supervisor.layout());

    match supervisor.start(request).await? {
        StartOutcome::Started(pid) => info!("Server started (pid {:?})", pid),
        StartOutcome::Pending => {
            info!("Waiting for the server to come up");
            wait_for_start(supervisor, &mut events).await?;
        }
    }

    report_started(supervisor, args.port);
    Ok(())
}

pub async fn stop(supervisor: &ProcessSupervisor) -> Result<()> {
    if supervisor.stop().await? {
        println!("stopped");
    } else {
        println!("not running");
    }
    Ok(())
}

pub fn status(supervisor: &ProcessSupervisor, json: bool) -> Result<()> {
    let report = StatusReport::collect(supervisor);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match report.pid {
        Some(pid) if report.running => println!("running (pid {})", pid),
        _ if report.running => println!("running"),
        _ => println!("stopped"),
    }
    match report.address {
        Some(address) => println!("address: {}", address),
        None => println!("address: not connected"),
    }
    Ok(())
}

/// Boot hook: start only when there is something to serve and nothing is
/// serving yet.
pub async fn autostart(supervisor: &ProcessSupervisor, args: StartArgs) -> Result<()> {
    if !supervisor.reachability().is_connected() {
        info!("Autostart skipped: device is not connected");
        return Ok(());
    }
    if supervisor.is_running() {
        info!("Autostart skipped: server already running");
        return Ok(());
    }

    match start(supervisor, args).await {
        Err(e)
            if e
                .downcast_ref::<FlingerError>()
                .is_some_and(FlingerError::is_rejection) =>
        {
            info!("Autostart skipped: {}", e);
            Ok(())
        }
        other => other,
    }
}

/// Foreground mode: start, print events until Ctrl-C, then stop.
pub async fn serve(supervisor: &ProcessSupervisor, args: StartArgs) -> Result<()> {
    if supervisor.is_running() {
        info!("Server already running, attaching");
    } else {
        start(supervisor, args).await?;
    }
    let mut events = supervisor.subscribe();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Shutdown signal received, stopping server");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => print_event(event)?,
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    supervisor.stop().await?;
    Ok(())
}

async fn wait_for_start(
    supervisor: &ProcessSupervisor,
    events: &mut Receiver<SupervisorEvent>,
) -> Result<()> {
    loop {
        match events.recv().await {
            Ok(event) if event.resolves_start() => {
                print_event(event)?;
                if event == SupervisorEvent::STARTED {
                    return Ok(());
                }
                return Err(FlingerError::StartTimeout(supervisor.settings().start_timeout).into());
            }
            Ok(event) => print_event(event)?,
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
            Err(RecvError::Closed) => bail!("Supervisor event channel closed"),
        }
    }
}

fn report_started(supervisor: &ProcessSupervisor, port: Option<u16>) {
    match connected_status(supervisor.reachability(), port) {
        Some(address) => println!("listening on {}", address),
        None => println!("started"),
    }
}

fn print_event(event: SupervisorEvent) -> Result<()> {
    println!(
        "{} {}",
        Utc::now().to_rfc3339(),
        serde_json::to_string(&event)?
    );
    Ok(())
}
