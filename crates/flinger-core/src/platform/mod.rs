//! Platform abstraction layer.
//!
//! OS-specific behavior lives here so the supervisor itself stays free of
//! `#[cfg]` blocks.
//!
//! - `network` - Reachability of the device from VNC clients
//! - `process` - PID files, liveness checks, termination
//! - `wakelock` - Android kernel wake locks

pub mod network;
pub mod process;
pub mod wakelock;

pub use network::{connected_status, InterfaceReachability, Reachability};
pub use process::{is_process_alive, read_pid_file, terminate_process};
pub use wakelock::SysfsWakeLock;
