/// Board and workspace membership checks.
use crate::service::BoardError;
use crate::types::{Board, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardRole {
    Owner,
    Member,
}

impl BoardRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoardRole::Owner => "owner",
            BoardRole::Member => "member",
        }
    }
}

/// Role of `user_id` on `board`, if any.
pub fn role_of(board: &Board, user_id: &str) -> Option<BoardRole> {
    if board.owner == user_id {
        Some(BoardRole::Owner)
    } else if board.members.iter().any(|m| m == user_id) {
        Some(BoardRole::Member)
    } else {
        None
    }
}

/// Members may read and edit lists, cards and comments.
pub fn require_member(board: &Board, user_id: &str) -> Result<BoardRole, BoardError> {
    role_of(board, user_id).ok_or_else(|| {
        log::warn!(
            target: "taskboard.access",
            "User {} denied access to board {}",
            user_id,
            board.id
        );
        BoardError::Forbidden("Access denied".to_string())
    })
}

/// Only the owner may change board settings, membership, or delete it.
pub fn require_owner(board: &Board, user_id: &str, action: &str) -> Result<(), BoardError> {
    match require_member(board, user_id)? {
        BoardRole::Owner => Ok(()),
        role => {
            log::warn!(
                target: "taskboard.access",
                "User {} ({}) may not {} on board {}",
                user_id,
                role.as_str(),
                action,
                board.id
            );
            Err(BoardError::Forbidden(format!(
                "Only board owner can {}",
                action
            )))
        }
    }
}

pub fn require_workspace_member(workspace: &Workspace, user_id: &str) -> Result<(), BoardError> {
    if workspace.is_member(user_id) {
        Ok(())
    } else {
        Err(BoardError::Forbidden("Access denied".to_string()))
    }
}
