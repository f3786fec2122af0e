use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use taskboard_core::types::{Board, BoardPatch, NewBoard, NewMember};

use super::{board_error, insert_header_safe, ApiResult, AuthQuery};
use crate::state::AppState;

fn etag_for(revision: u64) -> String {
    format!("\"{}\"", revision)
}

pub async fn list_boards(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<Vec<Board>>> {
    let actor = auth.actor("taskboard.api.list_boards")?;
    Ok(Json(state.service.list_boards(actor)))
}

pub async fn create_board(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<NewBoard>,
) -> ApiResult<(StatusCode, Json<Board>)> {
    const TARGET: &str = "taskboard.api.create_board";
    let actor = auth.actor(TARGET)?;
    let board = state
        .service
        .create_board(actor, body)
        .map_err(|e| board_error(TARGET, e))?;
    log::info!(target: TARGET, "Board {} created by {}", board.id, actor);
    Ok((StatusCode::CREATED, Json(board)))
}

/// Full board. Honors `If-None-Match` against the board revision.
pub async fn get_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    const TARGET: &str = "taskboard.api.get_board";
    let actor = auth.actor(TARGET)?;

    let revision = state
        .service
        .board_revision(actor, &board_id)
        .map_err(|e| board_error(TARGET, e))?;
    let etag = etag_for(revision);

    if let Some(if_none_match) = headers.get("if-none-match") {
        if let Ok(value) = if_none_match.to_str() {
            if value == etag {
                let mut resp_headers = HeaderMap::new();
                insert_header_safe(&mut resp_headers, "etag", &etag);
                return Ok((StatusCode::NOT_MODIFIED, resp_headers).into_response());
            }
        }
    }

    let view = state
        .service
        .get_board(actor, &board_id)
        .map_err(|e| board_error(TARGET, e))?;
    let mut resp_headers = HeaderMap::new();
    insert_header_safe(&mut resp_headers, "etag", &etag_for(view.revision));
    Ok((StatusCode::OK, resp_headers, Json(view)).into_response())
}

pub async fn update_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<BoardPatch>,
) -> ApiResult<Json<Board>> {
    const TARGET: &str = "taskboard.api.update_board";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .update_board(actor, &board_id, body)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

pub async fn delete_board(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    const TARGET: &str = "taskboard.api.delete_board";
    let actor = auth.actor(TARGET)?;
    let report = state
        .service
        .delete_board(actor, &board_id)
        .map_err(|e| board_error(TARGET, e))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Board deleted",
        "deleted": report,
    })))
}

pub async fn add_member(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<NewMember>,
) -> ApiResult<Json<Board>> {
    const TARGET: &str = "taskboard.api.add_member";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .add_member(actor, &board_id, &body.user_id)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Path((board_id, user_id)): Path<(String, String)>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<Board>> {
    const TARGET: &str = "taskboard.api.remove_member";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .remove_member(actor, &board_id, &user_id)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}
