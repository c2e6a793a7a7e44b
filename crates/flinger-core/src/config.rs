//! Centralized configuration for the flinger supervisor.
//!
//! Constants for timing, file layout and network discovery, plus the
//! runtime settings a supervisor is built with.

use std::time::Duration;

/// Supervisor timing configuration.
pub struct SupervisorConfig;

impl SupervisorConfig {
    /// How long a start waits for the server to create its PID file.
    pub const START_TIMEOUT: Duration = Duration::from_millis(5000);
    /// Grace period between SIGTERM and SIGKILL when stopping.
    pub const STOP_GRACE: Duration = Duration::from_secs(2);
    /// Interval used by the polling file notifier and termination waits.
    pub const POLL_INTERVAL: Duration = Duration::from_millis(100);
    /// Buffered events per subscriber before lagging ones are dropped.
    pub const EVENT_CHANNEL_CAPACITY: usize = 16;
}

/// Default on-device file layout.
pub struct LayoutConfig;

impl LayoutConfig {
    pub const ROOT_DIR: &'static str = "/system/bin";
    pub const SERVER_BINARY: &'static str = "vncflinger";
    pub const PASSWORD_TOOL: &'static str = "vncpasswd";
    pub const STATE_DIR: &'static str = "/data/local/tmp/flinger";
    pub const PID_FILE_NAME: &'static str = "vncflinger.pid";
    pub const CREDENTIAL_FILE_NAME: &'static str = "vncflinger.auth";
}

/// Server connection defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 5900;
    /// Interface name prefixes considered when looking for a reachable address.
    pub const INTERFACE_PREFIXES: &'static [&'static str] = &["wlan", "rndis", "eth"];
    pub const WAKE_LOCK_NAME: &'static str = "flinger";
}

/// Runtime settings for a supervisor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub start_timeout: Duration,
    pub stop_grace: Duration,
    pub event_capacity: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            start_timeout: SupervisorConfig::START_TIMEOUT,
            stop_grace: SupervisorConfig::STOP_GRACE,
            event_capacity: SupervisorConfig::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SupervisorSettings {
    /// Set the start timeout.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    /// Set the stop grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_use_constants() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.start_timeout, Duration::from_millis(5000));
        assert_eq!(settings.stop_grace, SupervisorConfig::STOP_GRACE);
        assert!(settings.event_capacity > 0);
    }

    #[test]
    fn test_settings_builder() {
        let settings = SupervisorSettings::default()
            .with_start_timeout(Duration::from_millis(250))
            .with_stop_grace(Duration::from_millis(100));
        assert_eq!(settings.start_timeout, Duration::from_millis(250));
        assert_eq!(settings.stop_grace, Duration::from_millis(100));
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(SupervisorConfig::START_TIMEOUT > SupervisorConfig::POLL_INTERVAL);
        assert!(SupervisorConfig::STOP_GRACE > Duration::ZERO);
    }
}
