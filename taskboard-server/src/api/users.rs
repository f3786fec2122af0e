use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use taskboard_core::types::{NewUser, User};

use super::{board_error, ApiResult};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state
        .service
        .register_user(body)
        .map_err(|e| board_error("taskboard.api.register", e))?;
    log::info!(target: "taskboard.api.register", "Registered user {}", user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<User>> {
    state
        .service
        .get_user(&user_id)
        .map(Json)
        .map_err(|e| board_error("taskboard.api.get_user", e))
}
