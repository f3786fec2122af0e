use axum::{
    http::{HeaderMap, StatusCode, Uri},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use taskboard_core::service::BoardError;

mod activity;
mod boards;
mod cards;
mod comments;
mod events;
mod lists;
mod users;
mod workspaces;

use crate::state::AppState;

/// REST API routes, mounted under `/api`. Every route except user
/// registration and lookup takes the caller as `?user=<id>`.
///
///   POST /users/register                    -> register a user
///   GET  /users/{id}                        -> user profile
///   POST /workspaces | GET /workspaces      -> create / list own workspaces
///   GET  /workspaces/{id} | PUT             -> read / rename (owner)
///   POST /boards | GET /boards              -> create / list own boards
///   GET  /boards/{id}                       -> board with lists and cards (+ ETag)
///   PUT  /boards/{id} | DELETE              -> update / cascade delete (owner)
///   POST /boards/{id}/members               -> add member (owner)
///   DELETE /boards/{id}/members/{userId}    -> remove member (owner)
///   GET  /boards/{id}/events                -> SSE stream of the board channel
///   POST /lists | PUT /lists/{id} | DELETE  -> list mutations
///   POST /cards | GET /cards/{id} | PUT | DELETE -> card mutations
///   POST /cards/{id}/move                   -> move card to list + placement
///   GET  /cards/search/{boardId}            -> search cards (?q=&label=&assignee=)
///   POST /comments                          -> add comment
///   GET  /comments/card/{cardId}            -> comments of a card, oldest first
///   GET  /activity/board/{boardId}          -> latest activity, newest first
///   GET  /status | /logs | /logs/stream     -> health and server logs
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(users::register))
        .route("/users/{user_id}", get(users::get_user))
        .route(
            "/workspaces",
            get(workspaces::list_workspaces).post(workspaces::create_workspace),
        )
        .route(
            "/workspaces/{workspace_id}",
            get(workspaces::get_workspace).put(workspaces::update_workspace),
        )
        .route("/boards", get(boards::list_boards).post(boards::create_board))
        .route(
            "/boards/{board_id}",
            get(boards::get_board)
                .put(boards::update_board)
                .delete(boards::delete_board),
        )
        .route("/boards/{board_id}/members", post(boards::add_member))
        .route(
            "/boards/{board_id}/members/{user_id}",
            delete(boards::remove_member),
        )
        .route("/boards/{board_id}/events", get(events::board_events))
        .route("/lists", post(lists::create_list))
        .route(
            "/lists/{list_id}",
            axum::routing::put(lists::update_list).delete(lists::delete_list),
        )
        .route("/cards", post(cards::create_card))
        .route(
            "/cards/{card_id}",
            get(cards::get_card)
                .put(cards::update_card)
                .delete(cards::delete_card),
        )
        .route("/cards/{card_id}/move", post(cards::move_card))
        .route("/cards/search/{board_id}", get(cards::search_cards))
        .route("/comments", post(comments::add_comment))
        .route("/comments/card/{card_id}", get(comments::list_comments))
        .route("/activity/board/{board_id}", get(activity::board_activity))
        .route("/status", get(events::status))
        .route("/logs", get(events::list_logs))
        .route("/logs/stream", get(events::stream_logs))
}

// ── Shared types and helpers used across sub-modules ────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
pub struct AuthQuery {
    user: Option<String>,
}

impl AuthQuery {
    /// The calling user, or 401 when the request names none.
    fn actor(&self, target: &'static str) -> ApiResult<&str> {
        match self.user.as_deref().map(str::trim) {
            Some(user) if !user.is_empty() => Ok(user),
            _ => Err(api_error(
                StatusCode::UNAUTHORIZED,
                target,
                "Unauthorized".to_string(),
            )),
        }
    }
}

fn api_error(status: StatusCode, target: &'static str, error: String) -> ApiError {
    log_api_issue(status, target, &error);
    (status, Json(ErrorResponse { error }))
}

/// Map a service error onto a status code and a client-facing message.
fn board_error(target: &'static str, err: BoardError) -> ApiError {
    let (status, message) = match &err {
        BoardError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        BoardError::Forbidden(reason) => (StatusCode::FORBIDDEN, reason.clone()),
        BoardError::Validation(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
        BoardError::Conflict { .. } => (StatusCode::CONFLICT, err.to_string()),
        BoardError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string()),
    };
    log_api_issue(status, target, err.to_string());
    (status, Json(ErrorResponse { error: message }))
}

fn insert_header_safe(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match value.parse() {
        Ok(parsed) => {
            headers.insert(name, parsed);
        }
        Err(e) => {
            log::warn!(target: "taskboard.api", "Failed to set header {}={} ({})", name, value, e);
        }
    }
}

fn log_api_issue(status: StatusCode, target: &'static str, message: impl AsRef<str>) {
    let message = message.as_ref();
    if status.is_server_error() {
        log::error!(target: target, "{}", message);
    } else {
        log::warn!(target: target, "{}", message);
    }
}

pub async fn not_found(uri: Uri) -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "taskboard.api",
        format!("Route not found: {}", uri.path()),
    )
}
