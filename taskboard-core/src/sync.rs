/// Board channel message types shared between the server and board clients.
///
/// Protocol:
///   Client connects to `/ws?user=<id>` and sends `join-board { boardId }`.
///   Server replies `joined { boardId }` or `error { message }`.
///   Every event published to a joined board arrives as `event { boardId, event }`.
///   `leave-board { boardId }` stops delivery; closing the socket leaves all boards.
use serde::{Deserialize, Serialize};

use crate::events::BoardEvent;

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinBoard {
        #[serde(rename = "boardId")]
        board_id: String,
    },
    LeaveBoard {
        #[serde(rename = "boardId")]
        board_id: String,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Joined {
        #[serde(rename = "boardId")]
        board_id: String,
    },
    Left {
        #[serde(rename = "boardId")]
        board_id: String,
    },
    Event {
        event: BoardEvent,
    },
    Error {
        message: String,
    },
}
