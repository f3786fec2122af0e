use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use taskboard_core::types::{Comment, NewComment};

use super::{board_error, ApiResult, AuthQuery};
use crate::state::AppState;

pub async fn add_comment(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<NewComment>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    const TARGET: &str = "taskboard.api.add_comment";
    let actor = auth.actor(TARGET)?;
    let comment = state
        .service
        .add_comment(actor, body)
        .map_err(|e| board_error(TARGET, e))?;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<Vec<Comment>>> {
    const TARGET: &str = "taskboard.api.list_comments";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .list_comments(actor, &card_id)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}
