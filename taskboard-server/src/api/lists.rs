use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use taskboard_core::types::{List, ListPatch, NewList};

use super::{board_error, ApiResult, AuthQuery};
use crate::state::AppState;

pub async fn create_list(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<NewList>,
) -> ApiResult<(StatusCode, Json<List>)> {
    const TARGET: &str = "taskboard.api.create_list";
    let actor = auth.actor(TARGET)?;
    let list = state
        .service
        .create_list(actor, body)
        .map_err(|e| board_error(TARGET, e))?;
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn update_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<ListPatch>,
) -> ApiResult<Json<List>> {
    const TARGET: &str = "taskboard.api.update_list";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .update_list(actor, &list_id, body)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

/// Deletes the list together with its cards and their comments.
pub async fn delete_list(
    State(state): State<AppState>,
    Path(list_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    const TARGET: &str = "taskboard.api.delete_list";
    let actor = auth.actor(TARGET)?;
    let report = state
        .service
        .delete_list(actor, &list_id)
        .map_err(|e| board_error(TARGET, e))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "List deleted",
        "deleted": report,
    })))
}
