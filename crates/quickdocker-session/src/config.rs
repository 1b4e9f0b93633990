//! Tunables for sessions and broadcasts.

use std::time::Duration;

use crate::bridge::DEFAULT_READ_TIMEOUT;

/// Default interval between state snapshots.
pub const DEFAULT_STATE_INTERVAL: Duration = Duration::from_secs(2);

/// Exec session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecConfig {
    /// Command started inside the container.
    pub command: Vec<String>,
    /// `TERM` exported to the process.
    pub term: String,
    /// Upper bound on one blocking read, and so on cancellation latency.
    pub read_timeout: Duration,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            command: vec!["/bin/sh".to_string()],
            term: "xterm-256color".to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// State broadcast settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastConfig {
    pub interval: Duration,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_STATE_INTERVAL,
        }
    }
}
