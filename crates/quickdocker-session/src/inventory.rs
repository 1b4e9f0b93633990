//! Container and project queries plus lifecycle dispatch.

use std::path::Path;

use quickdocker_core::{
    ComposeAction, ContainerAction, ContainerInfo, Error, HealthInfo, Project, Result,
    SharedCompose, SharedRuntime, projects::group_projects,
};

/// Read-mostly view of the runtime used by the REST surface.
pub struct Inventory {
    runtime: SharedRuntime,
    compose: SharedCompose,
}

impl Inventory {
    #[must_use]
    pub fn new(runtime: SharedRuntime, compose: SharedCompose) -> Self {
        Self { runtime, compose }
    }

    /// # Errors
    /// Returns [`Error::RuntimeUnavailable`] when the runtime cannot be reached.
    pub async fn health(&self) -> Result<HealthInfo> {
        self.runtime.health().await
    }

    /// # Errors
    /// Returns [`Error::RuntimeUnavailable`] when the runtime cannot be reached.
    pub async fn containers(&self) -> Result<Vec<ContainerInfo>> {
        self.runtime.list_containers().await
    }

    /// # Errors
    /// Returns [`Error::RuntimeUnavailable`] when the runtime cannot be reached.
    pub async fn projects(&self) -> Result<Vec<Project>> {
        Ok(group_projects(self.runtime.list_containers().await?))
    }

    /// Apply a lifecycle action to one container.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown container.
    pub async fn container_action(&self, id: &str, action: ContainerAction) -> Result<()> {
        self.runtime.container_action(id, action).await?;
        tracing::info!(container_id = id, %action, "Container action applied");
        Ok(())
    }

    /// Run a compose action in the project's recorded working directory.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown project and
    /// [`Error::ActionFailed`] when it has no working directory or the
    /// compose command fails.
    pub async fn compose_action(&self, project: &str, action: ComposeAction) -> Result<String> {
        let projects = self.projects().await?;
        let found = projects
            .iter()
            .find(|p| p.name == project)
            .ok_or_else(|| Error::not_found(format!("Project '{project}' not found")))?;
        if found.workdir.is_empty() {
            return Err(Error::ActionFailed(format!(
                "No working directory known for project '{project}'"
            )));
        }

        tracing::info!(project, %action, workdir = %found.workdir, "Running compose action");
        self.compose.run(Path::new(&found.workdir), action).await
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Arc};

    use quickdocker_core::testing::{FakeCompose, FakeRuntime, container};
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    fn setup() -> (Arc<FakeRuntime>, Arc<FakeCompose>, Inventory) {
        let mut bare = container("api-1", "bare", "running");
        bare.compose_workdir = String::new();
        let fake = Arc::new(FakeRuntime::with_containers(vec![
            container("web-1", "shop", "running"),
            container("db-1", "shop", "running"),
            bare,
        ]));
        let compose = Arc::new(FakeCompose::new());
        let inventory = Inventory::new(fake.clone(), compose.clone());
        (fake, compose, inventory)
    }

    #[tokio::test]
    async fn test_compose_action_uses_workdir() {
        let (_fake, compose, inventory) = setup();
        let out = inventory
            .compose_action("shop", ComposeAction::Up)
            .await
            .unwrap();
        assert_eq!(out, "compose up done");
        assert_eq!(
            compose.calls(),
            vec![(PathBuf::from("/srv/shop"), ComposeAction::Up)]
        );
    }

    #[tokio::test]
    async fn test_compose_action_errors() {
        let (_fake, compose, inventory) = setup();
        let err = inventory
            .compose_action("ghost", ComposeAction::Down)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = inventory
            .compose_action("bare", ComposeAction::Down)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ActionFailed(_)));

        compose.fail_with("no such service");
        let err = inventory
            .compose_action("shop", ComposeAction::Restart)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Action failed: no such service");
    }

    #[tokio::test]
    async fn test_container_action() {
        let (fake, _compose, inventory) = setup();
        assert_ok!(
            inventory
                .container_action("web-1", ContainerAction::Stop)
                .await
        );
        assert_eq!(
            fake.actions(),
            vec![("web-1".to_string(), ContainerAction::Stop)]
        );
        let projects = inventory.projects().await.unwrap();
        let shop = projects.iter().find(|p| p.name == "shop").unwrap();
        assert_eq!(shop.status, quickdocker_core::ProjectStatus::Partial);

        let err = inventory
            .container_action("ghost", ContainerAction::Start)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_unavailable_runtime() {
        let (fake, _compose, inventory) = setup();
        fake.set_unavailable(true);
        assert!(matches!(
            inventory.health().await.unwrap_err(),
            Error::RuntimeUnavailable(_)
        ));
        assert_err!(inventory.containers().await);
    }
}
