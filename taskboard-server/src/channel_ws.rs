/// WebSocket board channels.
///
/// Protocol:
///   Client connects to `/ws?user=<id>`.
///   `join-board { boardId }` is answered with `joined` once membership is
///   checked, or `error { message }` otherwise.
///   Events of joined boards arrive as `event { event }`.
///   Closing the socket leaves every board.
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use taskboard_core::channels::Connection;
use taskboard_core::sync::{ClientMessage, ServerMessage};

use crate::state::AppState;

const TARGET: &str = "taskboard.ws";

pub fn channel_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

#[derive(Deserialize)]
struct ChannelQuery {
    user: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ChannelQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let user_id = params
        .user
        .map(|u| u.trim().to_string())
        .unwrap_or_default();
    ws.on_upgrade(move |socket| handle_channel_session(socket, user_id, state))
}

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(msg).unwrap_or_default();
    ws_tx.send(Message::Text(text.into())).await
}

/// Handle one client message; returns the reply to send.
fn handle_client_message(
    state: &AppState,
    conn: &Connection,
    user_id: &str,
    msg: ClientMessage,
) -> ServerMessage {
    match msg {
        ClientMessage::JoinBoard { board_id } => {
            match state.service.require_access(&board_id, user_id) {
                Ok(_) => {
                    conn.join(&board_id);
                    log::info!(target: TARGET, "{} joined board {}", user_id, board_id);
                    ServerMessage::Joined { board_id }
                }
                Err(e) => {
                    log::warn!(target: TARGET, "{} refused board {}: {}", user_id, board_id, e);
                    ServerMessage::Error {
                        message: e.to_string(),
                    }
                }
            }
        }
        ClientMessage::LeaveBoard { board_id } => {
            conn.leave(&board_id);
            ServerMessage::Left { board_id }
        }
    }
}

async fn handle_channel_session(socket: WebSocket, user_id: String, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    if user_id.is_empty() {
        let _ = send_message(
            &mut ws_tx,
            &ServerMessage::Error {
                message: "Unauthorized".to_string(),
            },
        )
        .await;
        let _ = ws_tx.send(Message::Close(None)).await;
        return;
    }

    let mut conn = state.channels.connect(&user_id);
    log::debug!(target: TARGET, "{} connected as subscriber {}", user_id, conn.id());

    loop {
        tokio::select! {
            incoming = ws_rx.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                };
                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => handle_client_message(&state, &conn, &user_id, msg),
                    Err(e) => ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    },
                };
                if send_message(&mut ws_tx, &reply).await.is_err() {
                    break;
                }
            }
            event = conn.recv() => {
                let Some(event) = event else { break };
                if send_message(&mut ws_tx, &ServerMessage::Event { event }).await.is_err() {
                    break;
                }
            }
        }
    }

    log::debug!(target: TARGET, "{} disconnected (subscriber {})", user_id, conn.id());
}
