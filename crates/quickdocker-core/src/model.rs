//! Container, project and action types exchanged with the desktop UI.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Label carrying the compose project name.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label carrying the compose service name.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
/// Label carrying the compose project working directory.
pub const COMPOSE_WORKDIR_LABEL: &str = "com.docker.compose.project.working_dir";

/// Summary of one container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Short (12 character) id.
    pub id: String,
    pub full_id: String,
    /// Name without the leading slash.
    pub name: String,
    /// First image tag, or the short image id for untagged images.
    pub image: String,
    pub status: String,
    pub state: String,
    /// Container port spec (`80/tcp`) to the first bound host port.
    #[serde(default)]
    pub ports: BTreeMap<String, String>,
    #[serde(default)]
    pub compose_project: String,
    #[serde(default)]
    pub compose_service: String,
    #[serde(default)]
    pub compose_workdir: String,
}

impl ContainerInfo {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == "running"
    }
}

/// Aggregate status of a compose project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Every member is running.
    Running,
    /// Some members are running.
    Partial,
    /// No member is running.
    Stopped,
}

/// A group of containers sharing a compose project label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub workdir: String,
    pub containers: Vec<ContainerInfo>,
    pub status: ProjectStatus,
}

/// Direct lifecycle action on a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Remove,
}

impl ContainerAction {
    /// Grace period handed to the runtime for stop and restart.
    pub const GRACE_PERIOD_SECS: i64 = 10;

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "restart" => Ok(Self::Restart),
            "remove" => Ok(Self::Remove),
            other => Err(Error::invalid(format!("Invalid action: {other}"))),
        }
    }
}

/// Compose lifecycle action on a whole project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComposeAction {
    Up,
    Down,
    Restart,
}

impl ComposeAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Restart => "restart",
        }
    }

    /// Arguments passed after `docker compose`.
    #[must_use]
    pub fn args(self) -> Vec<&'static str> {
        match self {
            Self::Up => vec!["up", "-d"],
            other => vec![other.as_str()],
        }
    }
}

impl fmt::Display for ComposeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComposeAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "restart" => Ok(Self::Restart),
            other => Err(Error::invalid(format!("Invalid action: {other}"))),
        }
    }
}

/// Runtime health summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthInfo {
    pub ok: bool,
    pub containers: i64,
    pub images: i64,
    pub server_version: String,
}

/// Terminal dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    #[must_use]
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Reject zero-sized terminals.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRequest`] when either dimension is zero.
    pub fn validate(self) -> crate::Result<Self> {
        if self.cols == 0 || self.rows == 0 {
            return Err(Error::invalid(format!(
                "terminal size must be non-zero, got {}x{}",
                self.cols, self.rows
            )));
        }
        Ok(self)
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}
