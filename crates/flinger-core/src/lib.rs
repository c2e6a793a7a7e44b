//! Flinger Core - supervisor for an on-device VNC server.
//!
//! Starts the `vncflinger` binary with an optional password, waits for it
//! to report readiness through its PID file, keeps the device awake while
//! it serves, and stops it again. Status is broadcast as events so a UI or
//! CLI can follow along.
//!
//! # Example
//!
//! ```rust,ignore
//! use flinger_core::{ProcessSupervisor, ServerLayout, StartRequest};
//!
//! #[tokio::main]
//! async fn main() -> flinger_core::Result<()> {
//!     let supervisor = ProcessSupervisor::new(ServerLayout::default());
//!     supervisor.start(StartRequest::new(None, vec![])).await?;
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod hold;
pub mod platform;
pub mod process;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{LayoutConfig, ServerConfig, SupervisorConfig, SupervisorSettings};
pub use error::{FlingerError, Result};
pub use hold::{HeldResource, NoopHold};
pub use platform::{connected_status, InterfaceReachability, Reachability, SysfsWakeLock};
pub use process::{
    LaunchSpec, Launcher, ProcessSupervisor, ProcessSupervisorBuilder, ServerLauncher,
    ServerLayout, ServerOptions, ServerProcessState, StartOutcome, StartRequest,
    SupervisorEvent,
};
