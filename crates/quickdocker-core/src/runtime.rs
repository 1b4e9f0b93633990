//! Collaborator traits for the container runtime and compose tooling.

use std::{fmt, path::Path, pin::Pin, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::{
    Result,
    model::{ComposeAction, ContainerAction, ContainerInfo, HealthInfo, TermSize},
};

/// Lazy byte sequence from the runtime. `None` marks exhaustion.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Write half of a runtime socket.
pub type RemoteInput = Pin<Box<dyn AsyncWrite + Send>>;

/// Shared runtime handle injected into each component.
pub type SharedRuntime = Arc<dyn RuntimeClient>;

/// Shared compose runner handle.
pub type SharedCompose = Arc<dyn ComposeRunner>;

/// Duplex socket of an attached process.
///
/// Both halves belong to exactly one exec session.
pub struct ExecSocket {
    /// Process output (stdout and stderr, TTY-merged).
    pub output: ByteStream,
    /// Process input.
    pub input: RemoteInput,
}

impl fmt::Debug for ExecSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecSocket").finish_non_exhaustive()
    }
}

/// A freshly created interactive process.
#[derive(Debug)]
pub struct ExecAttachment {
    /// Runtime-assigned exec id.
    pub exec_id: String,
    pub socket: ExecSocket,
}

/// TTY options for an interactive process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtyOptions {
    pub size: TermSize,
    /// Value exported as `TERM`.
    pub term: String,
}

impl TtyOptions {
    #[must_use]
    pub fn new(size: TermSize) -> Self {
        Self {
            size,
            term: "xterm-256color".to_string(),
        }
    }

    /// Environment handed to the process.
    #[must_use]
    pub fn env(&self) -> Vec<String> {
        vec![
            format!("TERM={}", self.term),
            format!("COLUMNS={}", self.size.cols),
            format!("LINES={}", self.size.rows),
            format!("ROWS={}", self.size.rows),
        ]
    }
}

/// Thread-safe handle to the container runtime.
///
/// Every method may be called concurrently from independent requests.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Ping the runtime and report basic counters.
    async fn health(&self) -> Result<HealthInfo>;

    /// List all containers, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Look up one container by id or name.
    async fn get_container(&self, id: &str) -> Result<ContainerInfo>;

    /// Start a TTY-attached process and return its duplex socket.
    async fn create_interactive_session(
        &self,
        container_id: &str,
        command: &[String],
        tty: &TtyOptions,
    ) -> Result<ExecAttachment>;

    /// Resize the TTY of a running exec.
    async fn resize_session(&self, exec_id: &str, size: TermSize) -> Result<()>;

    /// Follow a container's log output, starting `tail` lines back.
    async fn tail_logs(&self, container_id: &str, tail: usize) -> Result<ByteStream>;

    /// Start, stop, restart or remove a container.
    async fn container_action(&self, id: &str, action: ContainerAction) -> Result<()>;
}

/// Runs compose lifecycle commands against a project working directory.
#[async_trait]
pub trait ComposeRunner: Send + Sync {
    /// Run `action` in `workdir`, returning captured stdout.
    async fn run(&self, workdir: &Path, action: ComposeAction) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tty_env() {
        let tty = TtyOptions::new(TermSize::new(120, 40));
        let env = tty.env();
        assert!(env.contains(&"TERM=xterm-256color".to_string()));
        assert!(env.contains(&"COLUMNS=120".to_string()));
        assert!(env.contains(&"ROWS=40".to_string()));
    }
}
