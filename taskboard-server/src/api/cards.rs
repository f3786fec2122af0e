use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use taskboard_core::search::CardQuery;
use taskboard_core::types::{Card, CardDetail, CardPatch, MoveCard, NewCard};

use super::{board_error, ApiResult, AuthQuery};
use crate::state::AppState;

/// `?user=&q=&label=&assignee=` in one extractor.
#[derive(Deserialize)]
pub struct SearchParams {
    user: Option<String>,
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    assignee: Option<String>,
}

pub async fn create_card(
    State(state): State<AppState>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<NewCard>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    const TARGET: &str = "taskboard.api.create_card";
    let actor = auth.actor(TARGET)?;
    let card = state
        .service
        .create_card(actor, body)
        .map_err(|e| board_error(TARGET, e))?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn get_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<CardDetail>> {
    const TARGET: &str = "taskboard.api.get_card";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .get_card(actor, &card_id)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

pub async fn update_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<CardPatch>,
) -> ApiResult<Json<Card>> {
    const TARGET: &str = "taskboard.api.update_card";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .update_card(actor, &card_id, body)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

pub async fn move_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Query(auth): Query<AuthQuery>,
    Json(body): Json<MoveCard>,
) -> ApiResult<Json<Card>> {
    const TARGET: &str = "taskboard.api.move_card";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .move_card(actor, &card_id, body)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}

pub async fn delete_card(
    State(state): State<AppState>,
    Path(card_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    const TARGET: &str = "taskboard.api.delete_card";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .delete_card(actor, &card_id)
        .map_err(|e| board_error(TARGET, e))?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Card deleted",
    })))
}

pub async fn search_cards(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<Card>>> {
    const TARGET: &str = "taskboard.api.search_cards";
    let auth = AuthQuery { user: params.user };
    let actor = auth.actor(TARGET)?;
    let query = CardQuery {
        q: params.q,
        label: params.label,
        assignee: params.assignee,
    };
    state
        .service
        .search_cards(actor, &board_id, &query)
        .map(Json)
        .map_err(|e| board_error(TARGET, e))
}
