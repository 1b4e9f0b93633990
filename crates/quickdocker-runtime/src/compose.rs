//! `docker compose` lifecycle commands.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use quickdocker_core::{ComposeAction, ComposeRunner, Error, Result};
use tokio::{process::Command, sync::OnceCell};

use crate::resolve::resolve_executable_path;

/// Default limit on one compose invocation.
pub const DEFAULT_COMPOSE_TIMEOUT: Duration = Duration::from_secs(120);

/// Settings for [`DockerCompose`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeConfig {
    /// Docker CLI, by name or absolute path.
    pub program: String,
    pub timeout: Duration,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            timeout: DEFAULT_COMPOSE_TIMEOUT,
        }
    }
}

/// Runs `docker compose` as a child process.
#[derive(Debug)]
pub struct DockerCompose {
    config: ComposeConfig,
    program: OnceCell<PathBuf>,
}

impl DockerCompose {
    #[must_use]
    pub fn new(config: ComposeConfig) -> Self {
        Self {
            config,
            program: OnceCell::new(),
        }
    }

    async fn program(&self) -> Result<&Path> {
        let path = self
            .program
            .get_or_try_init(|| async {
                resolve_executable_path(&self.config.program)
                    .await
                    .ok_or_else(|| {
                        Error::ActionFailed(format!(
                            "Executable not found: {}",
                            self.config.program
                        ))
                    })
            })
            .await?;
        Ok(path.as_path())
    }
}

#[async_trait]
impl ComposeRunner for DockerCompose {
    async fn run(&self, workdir: &Path, action: ComposeAction) -> Result<String> {
        let program = self.program().await?;

        let mut cmd = Command::new(program);
        cmd.arg("compose")
            .args(action.args())
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| Error::ActionFailed(format!("Failed to run docker compose: {e}")))?;

        let output = match tokio::time::timeout(self.config.timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(Error::ActionFailed(format!("docker compose failed: {e}")));
            }
            Err(_) => {
                tracing::warn!(
                    workdir = %workdir.display(),
                    %action,
                    timeout = ?self.config.timeout,
                    "docker compose timed out"
                );
                return Err(Error::ActionFailed(format!(
                    "docker compose {action} timed out after {}s",
                    self.config.timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        tracing::warn!(
            workdir = %workdir.display(),
            %action,
            status = %output.status,
            "docker compose exited with failure"
        );
        Err(Error::ActionFailed(failure_message(&stderr, &stdout)))
    }
}

/// Prefer stderr; compose writes progress there and errors last.
fn failure_message(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        stdout.trim().to_string()
    } else {
        stderr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_failure_message_prefers_stderr() {
        assert_eq!(failure_message("no such service\n", "ignored"), "no such service");
        assert_eq!(failure_message("  ", "only stdout\n"), "only stdout");
    }

    #[tokio::test]
    async fn test_missing_program() {
        let compose = DockerCompose::new(ComposeConfig {
            program: "/nonexistent/docker".to_string(),
            ..ComposeConfig::default()
        });
        let err = assert_err!(compose.run(Path::new("/tmp"), ComposeAction::Up).await);
        assert!(matches!(err, Error::ActionFailed(msg) if msg.contains("Executable not found")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_reports_output() {
        // `false` ignores its arguments and exits 1 without output.
        let compose = DockerCompose::new(ComposeConfig {
            program: "false".to_string(),
            ..ComposeConfig::default()
        });
        if resolve_executable_path("false").await.is_none() {
            return;
        }
        let err = assert_err!(
            compose
                .run(&std::env::temp_dir(), ComposeAction::Down)
                .await
        );
        assert!(matches!(err, Error::ActionFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_success_returns_stdout() {
        // `echo` prints its arguments: "compose up -d".
        if resolve_executable_path("echo").await.is_none() {
            return;
        }
        let compose = DockerCompose::new(ComposeConfig {
            program: "echo".to_string(),
            ..ComposeConfig::default()
        });
        let out = assert_ok!(compose.run(&std::env::temp_dir(), ComposeAction::Up).await);
        assert_eq!(out.trim(), "compose up -d");
    }
}
