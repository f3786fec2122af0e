use axum::{
    extract::{Path, Query, State},
    response::{sse::Event, Json, Sse},
};
use futures_util::stream;
use std::convert::Infallible;
use std::time::Duration;
use taskboard_core::channels::Connection;
use taskboard_core::events::BoardEvent;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::{Stream, StreamExt};

use super::{board_error, ApiResult, AuthQuery};
use crate::state::AppState;

const KEEP_ALIVE: Duration = Duration::from_secs(30);

fn sse_event(event: &BoardEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(event.kind()).data(json)
}

/// SSE endpoint: streams every event published to one board channel.
/// The subscription lives as long as the response body.
pub async fn board_events(
    State(state): State<AppState>,
    Path(board_id): Path<String>,
    Query(auth): Query<AuthQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    const TARGET: &str = "taskboard.api.board_events";
    let actor = auth.actor(TARGET)?;
    state
        .service
        .require_access(&board_id, actor)
        .map_err(|e| board_error(TARGET, e))?;

    let conn = state.channels.connect(actor);
    conn.join(&board_id);
    log::debug!(target: TARGET, "{} subscribed to board {} over SSE", actor, board_id);

    let events = stream::unfold(conn, |mut conn: Connection| async move {
        let event = conn.recv().await?;
        Some((Ok(sse_event(&event)), conn))
    });

    let stream = events.merge(StreamExt::map(
        IntervalStream::new(tokio::time::interval(KEEP_ALIVE)),
        |_| Ok(Event::default().comment("keep-alive")),
    ));

    Ok(Sse::new(stream))
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "running",
        "port": state.port,
        "bindAddress": state.bind_address,
        "dropPolicy": state.drop_policy,
    }))
}

pub async fn list_logs() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "entries": crate::log_bridge::recent_entries(),
        "filePath": crate::log_bridge::log_file_path(),
    }))
}

pub async fn stream_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = crate::log_bridge::subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| {
        let entry = item.ok()?;
        let payload = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(payload)))
    });
    Sse::new(stream)
}
