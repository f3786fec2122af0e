/// Board client over HTTP and the board channel WebSocket.
///
/// `BoardClient` wraps the REST routes. `BoardSession` keeps a local
/// `BoardReplica` of one board current: it applies channel events as they
/// arrive and sends drag-and-drop moves optimistically, refetching the board
/// when the server refuses one.
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use taskboard_core::events::BoardEvent;
use taskboard_core::reconcile::{BoardReplica, DropTarget, ListDropPolicy, Recovery};
use taskboard_core::sync::{ClientMessage, ServerMessage};
use taskboard_core::types::{Board, BoardView, Card, List, User, Workspace};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

const TARGET: &str = "taskboard.sync_client";
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of a refused request.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// REST client acting as one user.
#[derive(Clone)]
pub struct BoardClient {
    http: reqwest::Client,
    base_url: String,
    user: String,
}

impl BoardClient {
    pub fn new(base_url: &str, user: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
        }
    }

    /// Same server, different user.
    pub fn as_user(&self, user: &str) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            user: user.to_string(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn ws_url(&self) -> String {
        format!(
            "{}/ws?user={}",
            self.base_url
                .replacen("http://", "ws://", 1)
                .replacen("https://", "wss://", 1),
            self.user
        )
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.query(&[("user", &self.user)]).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(ClientError::Rejected { status, message });
        }
        Ok(resp.json().await?)
    }

    pub async fn register(&self, name: &str, email: Option<&str>) -> Result<User, ClientError> {
        let body = serde_json::json!({ "name": name, "email": email });
        self.send(self.http.post(self.url("/users/register")).json(&body))
            .await
    }

    pub async fn create_workspace(&self, name: &str) -> Result<Workspace, ClientError> {
        let body = serde_json::json!({ "name": name });
        self.send(self.http.post(self.url("/workspaces")).json(&body))
            .await
    }

    pub async fn create_board(&self, workspace: &str, title: &str) -> Result<Board, ClientError> {
        let body = serde_json::json!({ "workspace": workspace, "title": title });
        self.send(self.http.post(self.url("/boards")).json(&body)).await
    }

    pub async fn add_member(&self, board_id: &str, user_id: &str) -> Result<Board, ClientError> {
        let body = serde_json::json!({ "userId": user_id });
        self.send(
            self.http
                .post(self.url(&format!("/boards/{}/members", board_id)))
                .json(&body),
        )
        .await
    }

    pub async fn create_list(&self, board_id: &str, title: &str) -> Result<List, ClientError> {
        let body = serde_json::json!({ "board": board_id, "title": title });
        self.send(self.http.post(self.url("/lists")).json(&body)).await
    }

    pub async fn create_card(&self, list_id: &str, title: &str) -> Result<Card, ClientError> {
        let body = serde_json::json!({ "list": list_id, "title": title });
        self.send(self.http.post(self.url("/cards")).json(&body)).await
    }

    pub async fn update_card(
        &self,
        card_id: &str,
        patch: &serde_json::Value,
    ) -> Result<Card, ClientError> {
        self.send(
            self.http
                .put(self.url(&format!("/cards/{}", card_id)))
                .json(patch),
        )
        .await
    }

    pub async fn fetch_board(&self, board_id: &str) -> Result<BoardView, ClientError> {
        self.send(self.http.get(self.url(&format!("/boards/{}", board_id))))
            .await
    }

    pub async fn move_card(
        &self,
        card_id: &str,
        body: &taskboard_core::types::MoveCard,
    ) -> Result<Card, ClientError> {
        self.send(
            self.http
                .post(self.url(&format!("/cards/{}/move", card_id)))
                .json(body),
        )
        .await
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A live, joined view of one board.
pub struct BoardSession {
    client: BoardClient,
    replica: BoardReplica,
    ws: WsStream,
}

impl BoardSession {
    /// Join the board channel, then load the board. Events that race the
    /// load are applied on top of it.
    pub async fn open(
        client: BoardClient,
        board_id: &str,
        policy: ListDropPolicy,
    ) -> Result<Self, ClientError> {
        let (mut ws, _) = tokio_tungstenite::connect_async(client.ws_url()).await?;
        log::info!(target: TARGET, "Connected to {} as {}", client.base_url, client.user);

        let join = serde_json::to_string(&ClientMessage::JoinBoard {
            board_id: board_id.to_string(),
        })?;
        ws.send(Message::Text(join.into())).await?;

        match tokio::time::timeout(JOIN_TIMEOUT, read_server_message(&mut ws)).await {
            Ok(Ok(Some(ServerMessage::Joined { board_id: joined }))) if joined == board_id => {}
            Ok(Ok(Some(ServerMessage::Error { message }))) => {
                return Err(ClientError::Protocol(format!("Join refused: {}", message)));
            }
            Ok(Ok(other)) => {
                return Err(ClientError::Protocol(format!(
                    "Expected joined, got {:?}",
                    other
                )));
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(ClientError::Protocol("Timed out joining board".to_string())),
        }

        let view = client.fetch_board(board_id).await?;
        Ok(Self {
            client,
            replica: BoardReplica::new(view, policy),
            ws,
        })
    }

    pub fn replica(&self) -> &BoardReplica {
        &self.replica
    }

    /// Send moves with the card's known version; see
    /// `BoardReplica::with_versioned_moves`.
    pub fn versioned_moves(mut self, enabled: bool) -> Self {
        self.replica = self.replica.with_versioned_moves(enabled);
        self
    }

    /// Drag a card onto a target and send the resulting move.
    ///
    /// Returns the server's copy of the moved card, or `None` when the drop
    /// changed nothing. A refused move reloads the board before the error is
    /// returned.
    pub async fn drag(
        &mut self,
        card_id: &str,
        target: DropTarget,
    ) -> Result<Option<Card>, ClientError> {
        if !self.replica.begin_drag(card_id) {
            return Ok(None);
        }
        let Some(request) = self.replica.drop_on(target) else {
            return Ok(None);
        };

        match self
            .client
            .move_card(&request.card_id, &request.to_body())
            .await
        {
            Ok(card) => {
                self.replica.confirm(request.mutation, card.clone());
                Ok(Some(card))
            }
            Err(e) => {
                log::warn!(target: TARGET, "Move of card {} failed: {}", request.card_id, e);
                if self.replica.reject(request.mutation) == Recovery::Refetch {
                    if let Err(refetch) = self.refresh().await {
                        log::warn!(target: TARGET, "Refetch after failed move failed: {}", refetch);
                    }
                }
                Err(e)
            }
        }
    }

    /// Reload the board from the server.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        let view = self.client.fetch_board(self.replica.board_id()).await?;
        self.replica.replace(view);
        Ok(())
    }

    /// Wait for the next board event and apply it. `None` once the server
    /// closes the socket.
    pub async fn next_event(&mut self) -> Result<Option<BoardEvent>, ClientError> {
        loop {
            match read_server_message(&mut self.ws).await? {
                Some(ServerMessage::Event { event }) => {
                    self.replica.apply_event(&event);
                    return Ok(Some(event));
                }
                Some(ServerMessage::Error { message }) => {
                    log::warn!(target: TARGET, "Server error: {}", message);
                }
                Some(_) => continue,
                None => return Ok(None),
            }
        }
    }

    /// Leave the board and close the socket.
    pub async fn close(mut self) -> Result<(), ClientError> {
        let leave = serde_json::to_string(&ClientMessage::LeaveBoard {
            board_id: self.replica.board_id().to_string(),
        })?;
        self.ws.send(Message::Text(leave.into())).await?;
        self.ws.close(None).await?;
        Ok(())
    }
}

async fn read_server_message(ws: &mut WsStream) -> Result<Option<ServerMessage>, ClientError> {
    while let Some(msg) = ws.next().await {
        let text = match msg? {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => return Ok(None),
            Message::Ping(data) => {
                ws.send(Message::Pong(data)).await?;
                continue;
            }
            _ => continue,
        };
        return Ok(Some(serde_json::from_str(&text)?));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_follows_scheme() {
        let client = BoardClient::new("http://127.0.0.1:5000/", "ann");
        assert_eq!(client.ws_url(), "ws://127.0.0.1:5000/ws?user=ann");
        assert_eq!(client.url("/boards"), "http://127.0.0.1:5000/api/boards");

        let secure = BoardClient::new("https://boards.example.org", "bob");
        assert_eq!(secure.ws_url(), "wss://boards.example.org/ws?user=bob");
    }

    #[test]
    fn test_rejected_carries_status() {
        let err = ClientError::Rejected {
            status: StatusCode::CONFLICT,
            message: "Card was modified".into(),
        };
        assert_eq!(err.status(), Some(StatusCode::CONFLICT));
        assert!(ClientError::Protocol("x".into()).status().is_none());
    }

    #[tokio::test]
    async fn test_ping_is_answered_while_reading() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Ping(vec![7].into())).await.unwrap();
            let reply = ws.next().await.unwrap().unwrap();
            let left = serde_json::to_string(&ServerMessage::Left {
                board_id: "b1".into(),
            })
            .unwrap();
            ws.send(Message::Text(left.into())).await.unwrap();
            reply
        });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr))
            .await
            .unwrap();
        let msg = read_server_message(&mut ws).await.unwrap();
        assert_eq!(
            msg,
            Some(ServerMessage::Left {
                board_id: "b1".into()
            })
        );
        assert_eq!(peer.await.unwrap(), Message::Pong(vec![7].into()));
    }
}
