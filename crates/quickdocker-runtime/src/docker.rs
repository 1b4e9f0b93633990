//! Docker Engine client built on bollard.

use std::{
    collections::{BTreeMap, HashMap},
    io,
};

use async_trait::async_trait;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::{
        InspectContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
        RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults},
    models::{ContainerInspectResponse, ContainerSummary, PortBinding},
};
use futures::{StreamExt, TryStreamExt};
use quickdocker_core::{
    ByteStream, ContainerAction, ContainerInfo, Error, ExecAttachment, ExecSocket, HealthInfo,
    Result, RuntimeClient, TermSize, TtyOptions,
    model::{COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL, COMPOSE_WORKDIR_LABEL},
};

/// Seconds bollard waits on a daemon request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// [`RuntimeClient`] backed by the local Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to `host` (`unix://`, `tcp://` or `http://`), or to the local
    /// defaults, which honour `DOCKER_HOST`.
    ///
    /// The connection is lazy; an unreachable daemon surfaces on first use.
    ///
    /// # Errors
    /// Returns [`Error::RuntimeUnavailable`] when the address is malformed.
    pub fn connect(host: Option<&str>) -> Result<Self> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            #[cfg(unix)]
            Some(host) if host.starts_with("unix://") => {
                Docker::connect_with_unix(host, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION)
            }
            Some(host) => Docker::connect_with_http(host, REQUEST_TIMEOUT_SECS, API_DEFAULT_VERSION),
        }
        .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspectResponse> {
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_error(e, &format!("Container '{id}'")))
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn health(&self) -> Result<HealthInfo> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;
        let info = self
            .docker
            .info()
            .await
            .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;
        Ok(HealthInfo {
            ok: true,
            containers: info.containers.unwrap_or(0),
            images: info.images.unwrap_or(0),
            server_version: info.server_version.unwrap_or_default(),
        })
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_error(e, "Containers"))?;
        Ok(summaries.into_iter().map(from_summary).collect())
    }

    async fn get_container(&self, id: &str) -> Result<ContainerInfo> {
        Ok(from_inspect(self.inspect(id).await?))
    }

    async fn create_interactive_session(
        &self,
        container_id: &str,
        command: &[String],
        tty: &TtyOptions,
    ) -> Result<ExecAttachment> {
        let what = format!("Container '{container_id}'");
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions::<String> {
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(true),
                    env: Some(tty.env()),
                    cmd: Some(command.to_vec()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| map_error(e, &what))?;

        let started = self
            .docker
            .start_exec(
                &exec.id,
                Some(StartExecOptions {
                    detach: false,
                    tty: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| map_error(e, &what))?;

        let StartExecResults::Attached { output, input } = started else {
            return Err(Error::ActionFailed(format!(
                "Exec {} started detached",
                exec.id
            )));
        };

        if let Err(e) = self.resize_session(&exec.id, tty.size).await {
            tracing::warn!(exec_id = %exec.id, error = %e, "Initial exec resize failed");
        }

        let output: ByteStream = output
            .map_ok(bollard::container::LogOutput::into_bytes)
            .map_err(io::Error::other)
            .boxed();

        tracing::debug!(exec_id = %exec.id, container_id, "Exec attached");
        Ok(ExecAttachment {
            exec_id: exec.id,
            socket: ExecSocket { output, input },
        })
    }

    async fn resize_session(&self, exec_id: &str, size: TermSize) -> Result<()> {
        self.docker
            .resize_exec(
                exec_id,
                ResizeExecOptions {
                    height: size.rows,
                    width: size.cols,
                },
            )
            .await
            .map_err(|e| map_error(e, &format!("Exec '{exec_id}'")))
    }

    async fn tail_logs(&self, container_id: &str, tail: usize) -> Result<ByteStream> {
        self.inspect(container_id).await?;

        let options = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        Ok(self
            .docker
            .logs(container_id, Some(options))
            .map_ok(bollard::container::LogOutput::into_bytes)
            .map_err(io::Error::other)
            .boxed())
    }

    async fn container_action(&self, id: &str, action: ContainerAction) -> Result<()> {
        let what = format!("Container '{id}'");
        let result = match action {
            ContainerAction::Start => {
                self.docker
                    .start_container(id, None::<StartContainerOptions<String>>)
                    .await
            }
            ContainerAction::Stop => {
                self.docker
                    .stop_container(id, Some(StopContainerOptions { t: grace_period() }))
                    .await
            }
            ContainerAction::Restart => {
                self.docker
                    .restart_container(id, Some(RestartContainerOptions { t: grace_period() }))
                    .await
            }
            ContainerAction::Remove => {
                self.docker
                    .remove_container(
                        id,
                        Some(RemoveContainerOptions {
                            force: true,
                            ..Default::default()
                        }),
                    )
                    .await
            }
        };
        result.map_err(|e| map_error(e, &what))
    }
}

fn grace_period<T: TryFrom<i64> + Default>() -> T {
    T::try_from(ContainerAction::GRACE_PERIOD_SECS).unwrap_or_default()
}

/// Map a bollard error: 404 is `NotFound`, other daemon responses are
/// `ActionFailed`, anything that never reached the daemon is
/// `RuntimeUnavailable`.
pub fn map_error(err: bollard::errors::Error, what: &str) -> Error {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => Error::not_found(format!("{what} not found")),
        bollard::errors::Error::DockerResponseServerError { message, .. } => {
            Error::ActionFailed(message)
        }
        other => Error::RuntimeUnavailable(other.to_string()),
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

/// Tag if the image has one, else `sha256:` plus ten hex digits.
fn image_name(image: &str) -> String {
    if image.starts_with("sha256:") {
        image.chars().take(17).collect()
    } else {
        image.to_string()
    }
}

fn label(labels: Option<&HashMap<String, String>>, key: &str) -> String {
    labels
        .and_then(|l| l.get(key))
        .cloned()
        .unwrap_or_default()
}

fn from_summary(summary: ContainerSummary) -> ContainerInfo {
    let full_id = summary.id.unwrap_or_default();
    let name = summary
        .names
        .and_then(|names| names.into_iter().next())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    let state = summary.state.unwrap_or_default();

    let mut ports = BTreeMap::new();
    for port in summary.ports.unwrap_or_default() {
        let Some(public) = port.public_port else {
            continue;
        };
        let proto = port
            .typ
            .map_or_else(|| "tcp".to_string(), |t| t.to_string());
        ports
            .entry(format!("{}/{proto}", port.private_port))
            .or_insert_with(|| public.to_string());
    }

    let labels = summary.labels.as_ref();
    ContainerInfo {
        id: short_id(&full_id),
        full_id,
        name,
        image: image_name(&summary.image.unwrap_or_default()),
        status: state.clone(),
        state,
        ports,
        compose_project: label(labels, COMPOSE_PROJECT_LABEL),
        compose_service: label(labels, COMPOSE_SERVICE_LABEL),
        compose_workdir: label(labels, COMPOSE_WORKDIR_LABEL),
    }
}

fn first_host_port(bindings: Option<&Vec<PortBinding>>) -> Option<String> {
    bindings?.iter().find_map(|b| b.host_port.clone())
}

fn from_inspect(inspect: ContainerInspectResponse) -> ContainerInfo {
    let full_id = inspect.id.unwrap_or_default();
    let state = inspect
        .state
        .and_then(|s| s.status)
        .map(|s| s.to_string())
        .unwrap_or_default();

    let ports = inspect
        .network_settings
        .and_then(|n| n.ports)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(spec, bindings)| first_host_port(bindings.as_ref()).map(|p| (spec, p)))
        .collect();

    let (image, labels) = inspect
        .config
        .map(|c| (c.image.unwrap_or_default(), c.labels))
        .unwrap_or_default();

    ContainerInfo {
        id: short_id(&full_id),
        full_id,
        name: inspect
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        image: image_name(&image),
        status: state.clone(),
        state,
        ports,
        compose_project: label(labels.as_ref(), COMPOSE_PROJECT_LABEL),
        compose_service: label(labels.as_ref(), COMPOSE_SERVICE_LABEL),
        compose_workdir: label(labels.as_ref(), COMPOSE_WORKDIR_LABEL),
    }
}
