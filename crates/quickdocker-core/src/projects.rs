//! Grouping containers into compose projects.

use std::collections::BTreeMap;

use crate::model::{ContainerInfo, Project, ProjectStatus};

/// Synthetic project holding containers without a compose label.
pub const STANDALONE_PROJECT: &str = "_standalone";

/// Group containers by compose project and aggregate their status.
///
/// Projects come back sorted by name, with the standalone bucket last.
#[must_use]
pub fn group_projects(containers: Vec<ContainerInfo>) -> Vec<Project> {
    let mut groups: BTreeMap<String, Project> = BTreeMap::new();

    for container in containers {
        let name = if container.compose_project.is_empty() {
            STANDALONE_PROJECT.to_string()
        } else {
            container.compose_project.clone()
        };
        groups
            .entry(name.clone())
            .or_insert_with(|| Project {
                name,
                workdir: container.compose_workdir.clone(),
                containers: Vec::new(),
                status: ProjectStatus::Stopped,
            })
            .containers
            .push(container);
    }

    let mut projects: Vec<Project> = groups
        .into_values()
        .map(|mut project| {
            project.status = aggregate_status(&project.containers);
            project
        })
        .collect();

    projects.sort_by(|a, b| {
        (a.name == STANDALONE_PROJECT, &a.name).cmp(&(b.name == STANDALONE_PROJECT, &b.name))
    });
    projects
}

/// `running` if all members run, `partial` if some do, `stopped` otherwise.
#[must_use]
pub fn aggregate_status(containers: &[ContainerInfo]) -> ProjectStatus {
    let running = containers.iter().filter(|c| c.is_running()).count();
    if running == 0 {
        ProjectStatus::Stopped
    } else if running == containers.len() {
        ProjectStatus::Running
    } else {
        ProjectStatus::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str, project: &str, status: &str) -> ContainerInfo {
        ContainerInfo {
            id: name.to_string(),
            full_id: name.to_string(),
            name: name.to_string(),
            image: "nginx:latest".to_string(),
            status: status.to_string(),
            state: status.to_string(),
            ports: BTreeMap::new(),
            compose_project: project.to_string(),
            compose_service: String::new(),
            compose_workdir: if project.is_empty() {
                String::new()
            } else {
                format!("/srv/{project}")
            },
        }
    }

    #[test]
    fn test_grouping_and_status() {
        let projects = group_projects(vec![
            container("web-1", "shop", "running"),
            container("db-1", "shop", "exited"),
            container("api-1", "blog", "running"),
            container("loose", "", "exited"),
            container("cache", "admin", "exited"),
        ]);

        let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["admin", "blog", "shop", STANDALONE_PROJECT]);

        assert_eq!(projects[0].status, ProjectStatus::Stopped);
        assert_eq!(projects[1].status, ProjectStatus::Running);
        assert_eq!(projects[2].status, ProjectStatus::Partial);
        assert_eq!(projects[2].containers.len(), 2);
        assert_eq!(projects[2].workdir, "/srv/shop");
        assert_eq!(projects[3].status, ProjectStatus::Stopped);
    }

    #[test]
    fn test_no_containers_no_projects() {
        assert!(group_projects(Vec::new()).is_empty());
    }
}
