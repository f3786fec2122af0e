use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use taskboard_core::types::Activity;

use super::{board_error, ApiResult, AuthQuery};
use crate::state::AppState;

pub async fn board_activity(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<Vec<Activity>>> {
    const TARGET: &str = "taskboard.api.board_activity";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .recent_activity(actor, &board_id)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}
