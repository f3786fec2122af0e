use serde::{Deserialize, Serialize};

use crate::types::{Board, Card, Comment, List};

/// Event published to a board channel after a successful mutation.
///
/// Wire form is `{"kind": "...", "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum BoardEvent {
    CardCreated(Card),
    CardUpdated(Card),
    CardDeleted {
        #[serde(rename = "cardId")]
        card_id: String,
    },
    ListCreated(List),
    ListUpdated(List),
    ListDeleted {
        #[serde(rename = "listId")]
        list_id: String,
    },
    CommentAdded(Comment),
    BoardUpdated(Board),
    BoardDeleted {
        #[serde(rename = "boardId")]
        board_id: String,
    },
}

impl BoardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BoardEvent::CardCreated(_) => "card-created",
            BoardEvent::CardUpdated(_) => "card-updated",
            BoardEvent::CardDeleted { .. } => "card-deleted",
            BoardEvent::ListCreated(_) => "list-created",
            BoardEvent::ListUpdated(_) => "list-updated",
            BoardEvent::ListDeleted { .. } => "list-deleted",
            BoardEvent::CommentAdded(_) => "comment-added",
            BoardEvent::BoardUpdated(_) => "board-updated",
            BoardEvent::BoardDeleted { .. } => "board-deleted",
        }
    }
}
