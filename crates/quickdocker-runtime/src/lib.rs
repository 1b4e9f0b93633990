//! Docker-backed collaborators for the QuickDocker control plane.
//!
//! - [`DockerRuntime`] - `RuntimeClient` over the Docker Engine API
//! - [`DockerCompose`] - `ComposeRunner` shelling out to `docker compose`

pub mod compose;
pub mod docker;
pub mod resolve;

pub use compose::{ComposeConfig, DEFAULT_COMPOSE_TIMEOUT, DockerCompose};
pub use docker::DockerRuntime;
pub use resolve::resolve_executable_path;
