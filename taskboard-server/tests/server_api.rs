use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::StatusCode;
use taskboard_core::events::BoardEvent;
use taskboard_core::position::STEP;
use taskboard_core::reconcile::{DropTarget, ListDropPolicy};
use taskboard_core::sync::{ClientMessage, ServerMessage};
use taskboard_core::types::{Board, List};
use taskboard_server::config::ServerConfig;
use taskboard_server::server::spawn_server;
use taskboard_server::sync_client::{BoardClient, BoardSession};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

struct TestServer {
    base_url: String,
    _shutdown: watch::Sender<bool>,
}

async fn start() -> TestServer {
    let config = ServerConfig {
        port: 0,
        in_memory: true,
        ..ServerConfig::default()
    };
    let state = taskboard_server::build_state(&config).unwrap();
    let (port, shutdown) = spawn_server(state).await.unwrap();
    TestServer {
        base_url: format!("http://127.0.0.1:{}", port),
        _shutdown: shutdown,
    }
}

struct SeededBoard {
    board: Board,
    todo: List,
    done: List,
}

/// ann owns a board with Todo and Done; bob is a member.
async fn seed(ann: &BoardClient) -> SeededBoard {
    let workspace = ann.create_workspace("Team").await.unwrap();
    let board = ann.create_board(&workspace.id, "Sprint").await.unwrap();
    let todo = ann.create_list(&board.id, "Todo").await.unwrap();
    let done = ann.create_list(&board.id, "Done").await.unwrap();
    ann.add_member(&board.id, "bob").await.unwrap();
    SeededBoard { board, todo, done }
}

async fn timed<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

async fn next_message(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> ServerMessage {
    match timed(ws.next()).await {
        Some(Ok(Message::Text(text))) => serde_json::from_str(&text.to_string()).unwrap(),
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[tokio::test]
async fn test_identity_and_membership_are_enforced() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let http = reqwest::Client::new();

    let anonymous = http
        .get(format!("{}/api/boards/{}", server.base_url, seeded.board.id))
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let carl = ann.as_user("carl");
    let err = carl.fetch_board(&seeded.board.id).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));

    let err = ann.fetch_board("no-such-board").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

    let bob = ann.as_user("bob");
    let view = bob.fetch_board(&seeded.board.id).await.unwrap();
    let titles: Vec<&str> = view.lists.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, vec!["Todo", "Done"]);
}

#[tokio::test]
async fn test_register_and_unknown_route() {
    let server = start().await;
    let anon = BoardClient::new(&server.base_url, "");
    let user = anon.register("Ann", Some("Ann@Example.org")).await.unwrap();
    assert_eq!(user.email.as_deref(), Some("ann@example.org"));

    let err = anon.register("Imposter", Some("ann@example.org")).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    let resp = reqwest::get(format!("{}/api/nothing-here", server.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_board_etag_revalidation() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let http = reqwest::Client::new();
    let url = format!("{}/api/boards/{}?user=ann", server.base_url, seeded.board.id);

    let first = http.get(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let etag = first.headers()["etag"].to_str().unwrap().to_string();

    let unchanged = http
        .get(&url)
        .header("if-none-match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(unchanged.status(), StatusCode::NOT_MODIFIED);

    ann.create_card(&seeded.todo.id, "Write tests").await.unwrap();
    let changed = http
        .get(&url)
        .header("if-none-match", &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(changed.status(), StatusCode::OK);
    assert_ne!(changed.headers()["etag"].to_str().unwrap(), etag);
}

#[tokio::test]
async fn test_stale_card_update_conflicts() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let card = ann.create_card(&seeded.todo.id, "Draft").await.unwrap();

    let renamed = ann
        .update_card(&card.id, &serde_json::json!({ "title": "Final", "expectedVersion": card.version }))
        .await
        .unwrap();
    assert_eq!(renamed.title, "Final");

    let err = ann
        .update_card(&card.id, &serde_json::json!({ "title": "Stale", "expectedVersion": card.version }))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
}

#[tokio::test]
async fn test_websocket_join_receives_board_events() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let ws_url = format!("{}/ws?user=bob", server.base_url.replacen("http://", "ws://", 1));
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await.unwrap();

    let join = serde_json::to_string(&ClientMessage::JoinBoard {
        board_id: seeded.board.id.clone(),
    })
    .unwrap();
    ws.send(Message::Text(join.into())).await.unwrap();

    assert_eq!(
        next_message(&mut ws).await,
        ServerMessage::Joined {
            board_id: seeded.board.id.clone()
        }
    );

    let card = ann.create_card(&seeded.todo.id, "Ship it").await.unwrap();
    match next_message(&mut ws).await {
        ServerMessage::Event {
            event: BoardEvent::CardCreated(created),
        } => assert_eq!(created.id, card.id),
        other => panic!("expected card-created, got {:?}", other),
    }
}

#[tokio::test]
async fn test_removed_member_socket_goes_quiet() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let ws_url = format!("{}/ws?user=bob", server.base_url.replacen("http://", "ws://", 1));
    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await.unwrap();
    let join = serde_json::to_string(&ClientMessage::JoinBoard {
        board_id: seeded.board.id.clone(),
    })
    .unwrap();
    ws.send(Message::Text(join.into())).await.unwrap();
    assert!(matches!(next_message(&mut ws).await, ServerMessage::Joined { .. }));

    let removed = reqwest::Client::new()
        .delete(format!(
            "{}/api/boards/{}/members/bob",
            server.base_url, seeded.board.id
        ))
        .query(&[("user", "ann")])
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);

    ann.create_card(&seeded.todo.id, "After removal").await.unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(quiet.is_err(), "removed member received {:?}", quiet);

    // Rejoining is refused now that bob is not a member.
    let join = serde_json::to_string(&ClientMessage::JoinBoard {
        board_id: seeded.board.id.clone(),
    })
    .unwrap();
    ws.send(Message::Text(join.into())).await.unwrap();
    assert!(matches!(next_message(&mut ws).await, ServerMessage::Error { .. }));
}

#[tokio::test]
async fn test_websocket_join_refused_for_outsider() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;

    let carl = ann.as_user("carl");
    let err = BoardSession::open(carl, &seeded.board.id, ListDropPolicy::Top)
        .await
        .err()
        .expect("outsider must not join");
    assert!(err.to_string().contains("Join refused"));
}

#[tokio::test]
async fn test_drag_between_lists_reaches_other_member() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let card = ann.create_card(&seeded.todo.id, "Review").await.unwrap();

    let mut ann_session = BoardSession::open(ann.clone(), &seeded.board.id, ListDropPolicy::Top)
        .await
        .unwrap();
    let mut bob_session =
        BoardSession::open(ann.as_user("bob"), &seeded.board.id, ListDropPolicy::Top)
            .await
            .unwrap();

    let moved = ann_session
        .drag(
            &card.id,
            DropTarget::List {
                list_id: seeded.done.id.clone(),
            },
        )
        .await
        .unwrap()
        .expect("drop onto another list moves the card");
    assert_eq!(moved.list, seeded.done.id);
    assert_eq!(moved.position, STEP);
    assert_eq!(ann_session.replica().pending(), 0);

    match timed(bob_session.next_event()).await.unwrap() {
        Some(BoardEvent::CardUpdated(updated)) => assert_eq!(updated.id, card.id),
        other => panic!("expected card-updated, got {:?}", other),
    }
    let seen = bob_session.replica().card(&card.id).unwrap();
    assert_eq!(seen.list, seeded.done.id);

    // Dropping onto its own list is a no-op.
    let noop = ann_session
        .drag(
            &card.id,
            DropTarget::List {
                list_id: seeded.done.id.clone(),
            },
        )
        .await
        .unwrap();
    assert!(noop.is_none());

    bob_session.close().await.unwrap();
}

#[tokio::test]
async fn test_refused_drag_refetches_board() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    let card = ann.create_card(&seeded.todo.id, "Estimate").await.unwrap();

    let mut session = BoardSession::open(ann.clone(), &seeded.board.id, ListDropPolicy::Top)
        .await
        .unwrap()
        .versioned_moves(true);

    ann.as_user("bob")
        .update_card(&card.id, &serde_json::json!({ "title": "Estimate (bob)" }))
        .await
        .unwrap();

    let err = session
        .drag(
            &card.id,
            DropTarget::List {
                list_id: seeded.done.id.clone(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));

    let local = session.replica().card(&card.id).unwrap();
    assert_eq!(local.list, seeded.todo.id);
    assert_eq!(local.title, "Estimate (bob)");
}

#[tokio::test]
async fn test_board_delete_cascades() {
    let server = start().await;
    let ann = BoardClient::new(&server.base_url, "ann");
    let seeded = seed(&ann).await;
    ann.create_card(&seeded.todo.id, "One").await.unwrap();
    ann.create_card(&seeded.done.id, "Two").await.unwrap();

    let http = reqwest::Client::new();
    let url = format!("{}/api/boards/{}", server.base_url, seeded.board.id);

    let refused = http.delete(&url).query(&[("user", "bob")]).send().await.unwrap();
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);

    let resp = http.delete(&url).query(&[("user", "ann")]).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["deleted"]["cards"], 2);
    assert_eq!(body["deleted"]["lists"], 2);
    assert_eq!(body["deleted"]["boards"], 1);

    let err = ann.fetch_board(&seeded.board.id).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
}
