//! REST handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use quickdocker_core::{ComposeAction, ContainerAction, ContainerInfo, Error, HealthInfo, Project};
use serde::Serialize;

use crate::{error::ApiError, state::AppState};

/// Body of a successful lifecycle action.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ActionResponse {
    const fn done() -> Self {
        Self {
            ok: true,
            output: None,
        }
    }
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthInfo>, ApiError> {
    Ok(Json(state.inventory.health().await?))
}

pub async fn projects(State(state): State<AppState>) -> Result<Json<Vec<Project>>, ApiError> {
    Ok(Json(state.inventory.projects().await?))
}

pub async fn containers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContainerInfo>>, ApiError> {
    Ok(Json(state.inventory.containers().await?))
}

pub async fn compose_action(
    State(state): State<AppState>,
    Path((project, action)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let action: ComposeAction = action.parse()?;
    let output = state.inventory.compose_action(&project, action).await?;
    Ok(Json(ActionResponse {
        ok: true,
        output: Some(output),
    }))
}

/// Start, stop or restart. Removal has its own `DELETE` route.
pub async fn container_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let parsed: ContainerAction = action.parse()?;
    if parsed == ContainerAction::Remove {
        return Err(Error::invalid(format!("Invalid action: {action}")).into());
    }
    state.inventory.container_action(&id, parsed).await?;
    Ok(Json(ActionResponse::done()))
}

pub async fn remove_container(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError> {
    state
        .inventory
        .container_action(&id, ContainerAction::Remove)
        .await?;
    Ok(Json(ActionResponse::done()))
}
