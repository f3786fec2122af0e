use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use taskboard_core::types::{NewWorkspace, Workspace, WorkspacePatch};

use super::{board_error, ApiResult, AuthQuery};
use crate::state::AppState;

pub async fn list_workspaces(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<Vec<Workspace>>> {
    let actor = auth.actor("taskboard.api.list_workspaces")?;
    Ok(Json(state.service.list_workspaces(actor)))
}

pub async fn create_workspace(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<NewWorkspace>,
) -> ApiResult<(StatusCode, Json<Workspace>)> {
    const TARGET: &str = "taskboard.api.create_workspace";
    let actor = auth.actor(TARGET)?;
    let workspace = state
        .service
        .create_workspace(actor, body)
        .map_err(|e| board_error(TARGET, e))?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

pub async fn get_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<Workspace>> {
    const TARGET: &str = "taskboard.api.get_workspace";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .get_workspace(actor, &workspace_id)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

pub async fn update_workspace(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<WorkspacePatch>,
) -> ApiResult<Json<Workspace>> {
    const TARGET: &str = "taskboard.api.update_workspace";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .update_workspace(actor, &workspace_id, body)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}
