//! Server process supervision.
//!
//! Launches the VNC server, learns that it is ready from its PID file, and
//! tears it down again.
//!
//! # Example
//!
//! ```rust,no_run
//! use flinger_core::process::{ProcessSupervisor, ServerLayout, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> flinger_core::Result<()> {
//!     let layout = ServerLayout::default();
//!     let supervisor = ProcessSupervisor::new(layout.clone());
//!     let mut events = supervisor.subscribe();
//!
//!     let request = ServerOptions::default()
//!         .with_password("secret")
//!         .into_request(&layout);
//!     supervisor.start(request).await?;
//!     println!("{:?}", events.recv().await);
//!
//!     supervisor.stop().await?;
//!     Ok(())
//! }
//! ```

mod credential;
mod events;
mod launcher;
mod layout;
mod options;
mod state;
mod stop;
mod supervisor;
mod watcher;

pub use credential::write_credential_file;
pub use events::{ServerError, ServerStatus, SupervisorEvent};
pub use launcher::{LaunchSpec, Launcher, ServerLauncher};
pub use layout::ServerLayout;
pub use options::{ServerOptions, StartRequest, NO_AUTH_ARG, VNC_AUTH_ARG};
pub use state::ServerProcessState;
pub use stop::stop_server;
pub use supervisor::{ProcessSupervisor, ProcessSupervisorBuilder, StartOutcome};
pub use watcher::{
    is_creation_of, CreatedCallback, DirectoryNotifier, FsNotifier, PollingNotifier, WatchHandle,
};
