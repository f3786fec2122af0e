/// Board operations as seen by an authenticated caller.
///
/// Every mutation follows the same sequence: authorize, validate, write to the
/// store, record activity (best effort), publish to the board channel.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::access::{require_member, require_owner, require_workspace_member};
use crate::cascade::{self, CascadeReport};
use crate::channels::ChannelRegistry;
use crate::events::BoardEvent;
use crate::position::{self, Placement, PositionError};
use crate::search::{self, CardQuery};
use crate::storage::{StorageError, Store};
use crate::types::*;

/// Most activity entries returned for a board.
pub const ACTIVITY_LIMIT: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("{resource} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("{resource} {id} was modified by someone else (expected version {expected}, found {actual})")]
    Conflict {
        resource: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for BoardError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, id } => BoardError::NotFound { resource: kind, id },
            StorageError::VersionConflict {
                kind,
                id,
                expected,
                actual,
            } => BoardError::Conflict {
                resource: kind,
                id,
                expected,
                actual,
            },
            StorageError::Rejected { reason, .. } => BoardError::Validation(reason),
            other => BoardError::Storage(other),
        }
    }
}

impl From<PositionError> for BoardError {
    fn from(err: PositionError) -> Self {
        BoardError::Validation(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BoardCreated,
    BoardUpdated,
    MemberAdded,
    MemberRemoved,
    ListCreated,
    ListDeleted,
    CardCreated,
    CardMoved,
    CardCompleted,
    CardReopened,
    CardUpdated,
    CardDeleted,
    CommentAdded,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::BoardCreated => "board_created",
            Action::BoardUpdated => "board_updated",
            Action::MemberAdded => "member_added",
            Action::MemberRemoved => "member_removed",
            Action::ListCreated => "list_created",
            Action::ListDeleted => "list_deleted",
            Action::CardCreated => "card_created",
            Action::CardMoved => "card_moved",
            Action::CardCompleted => "card_completed",
            Action::CardReopened => "card_reopened",
            Action::CardUpdated => "card_updated",
            Action::CardDeleted => "card_deleted",
            Action::CommentAdded => "comment_added",
        }
    }
}

/// Change a card's list and position in a single store write.
///
/// This is the only path that changes which list a card belongs to. The
/// card's board is taken from the target list, so the two always agree. A
/// missing target list fails with `NotFound` before anything is written.
pub fn move_to_container(
    store: &Store,
    card_id: &str,
    list_id: &str,
    position: f64,
    expected_version: Option<u64>,
) -> Result<Card, StorageError> {
    let list = store.require::<List>(list_id)?;
    store.update::<Card>(card_id, expected_version, |card| {
        relocate(card, &list, position);
        Ok(())
    })
}

fn relocate(card: &mut Card, list: &List, position: f64) {
    card.list = list.id.clone();
    card.board = list.board.clone();
    card.position = position;
}

fn required(value: &str, message: &str) -> Result<String, BoardError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(BoardError::Validation(message.to_string()))
    } else {
        Ok(trimmed.to_string())
    }
}

fn non_empty(value: Option<String>, message: &str) -> Result<Option<String>, BoardError> {
    value.map(|v| required(&v, message)).transpose()
}

pub struct BoardService {
    store: Arc<Store>,
    channels: Arc<ChannelRegistry>,
}

impl BoardService {
    pub fn new(store: Arc<Store>, channels: Arc<ChannelRegistry>) -> Self {
        Self { store, channels }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn channels(&self) -> &Arc<ChannelRegistry> {
        &self.channels
    }

    // ── Users ───────────────────────────────────────────────────────────

    pub fn register_user(&self, req: NewUser) -> Result<User, BoardError> {
        let name = required(&req.name, "Name is required")?;
        let email = req
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        if let Some(email) = &email {
            let taken = !self
                .store
                .find::<User>(|u| u.email.as_deref() == Some(email.as_str()))
                .is_empty();
            if taken {
                return Err(BoardError::Validation("User already exists".to_string()));
            }
        }
        let user = self.store.create(User {
            id: new_id(),
            name,
            email,
        })?;
        log::info!(target: "taskboard.service", "Registered user {}", user.id);
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> Result<User, BoardError> {
        Ok(self.store.require::<User>(user_id)?)
    }

    // ── Workspaces ──────────────────────────────────────────────────────

    pub fn create_workspace(&self, actor: &str, req: NewWorkspace) -> Result<Workspace, BoardError> {
        let name = required(&req.name, "Workspace name is required")?;
        Ok(self.store.create(Workspace::new(&name, actor))?)
    }

    pub fn list_workspaces(&self, actor: &str) -> Vec<Workspace> {
        let mut workspaces = self.store.find::<Workspace>(|w| w.is_member(actor));
        workspaces.sort_by_key(|w| w.created_at);
        workspaces
    }

    pub fn get_workspace(&self, actor: &str, workspace_id: &str) -> Result<Workspace, BoardError> {
        let workspace = self.store.require::<Workspace>(workspace_id)?;
        require_workspace_member(&workspace, actor)?;
        Ok(workspace)
    }

    pub fn update_workspace(
        &self,
        actor: &str,
        workspace_id: &str,
        patch: WorkspacePatch,
    ) -> Result<Workspace, BoardError> {
        let workspace = self.store.require::<Workspace>(workspace_id)?;
        if workspace.owner != actor {
            return Err(BoardError::Forbidden(
                "Only owner can update workspace".to_string(),
            ));
        }
        let name = non_empty(patch.name, "Workspace name cannot be empty")?;
        Ok(self.store.update::<Workspace>(workspace_id, None, |w| {
            if let Some(name) = name {
                w.name = name;
            }
            Ok(())
        })?)
    }

    // ── Boards ──────────────────────────────────────────────────────────

    pub fn create_board(&self, actor: &str, req: NewBoard) -> Result<Board, BoardError> {
        let title = required(&req.title, "Board title is required")?;
        let workspace_id = required(&req.workspace, "Workspace is required")?;
        let workspace = self.store.require::<Workspace>(&workspace_id)?;
        require_workspace_member(&workspace, actor)?;

        let now = Utc::now();
        let board = self.store.create(Board {
            id: new_id(),
            title: title.clone(),
            workspace: workspace.id,
            visibility: req.visibility.unwrap_or_default(),
            color: req
                .color
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BOARD_COLOR.to_string()),
            owner: actor.to_string(),
            members: vec![actor.to_string()],
            created_at: now,
            updated_at: now,
            version: 1,
        })?;
        log::info!(target: "taskboard.service", "Board {} created by {}", board.id, actor);
        self.record(&board.id, Action::BoardCreated, actor, json!({ "title": title }));
        Ok(board)
    }

    pub fn list_boards(&self, actor: &str) -> Vec<Board> {
        let mut boards = self.store.find::<Board>(|b| b.is_member(actor));
        boards.sort_by_key(|b| b.created_at);
        boards
    }

    /// Board with its lists and cards, each in position order.
    pub fn get_board(&self, actor: &str, board_id: &str) -> Result<BoardView, BoardError> {
        let board = self.require_access(board_id, actor)?;
        // Read the revision first so the view is never older than its tag.
        let revision = self.store.board_revision(board_id);
        let lists = self.store.siblings::<List>(|l| l.board == board_id);
        let cards = self.store.siblings::<Card>(|c| c.board == board_id);
        Ok(BoardView {
            board,
            lists,
            cards,
            revision,
        })
    }

    /// Current revision of a board, for conditional requests.
    pub fn board_revision(&self, actor: &str, board_id: &str) -> Result<u64, BoardError> {
        self.require_access(board_id, actor)?;
        Ok(self.store.board_revision(board_id))
    }

    pub fn update_board(
        &self,
        actor: &str,
        board_id: &str,
        patch: BoardPatch,
    ) -> Result<Board, BoardError> {
        let board = self.store.require::<Board>(board_id)?;
        require_owner(&board, actor, "update board")?;
        let title = non_empty(patch.title, "Board title cannot be empty")?;
        let color = patch.color.filter(|c| !c.trim().is_empty());

        let metadata = json!({
            "title": title,
            "visibility": patch.visibility,
            "color": color,
        });
        let updated = self.store.update::<Board>(board_id, None, |b| {
            if let Some(title) = title {
                b.title = title;
            }
            if let Some(visibility) = patch.visibility {
                b.visibility = visibility;
            }
            if let Some(color) = color {
                b.color = color;
            }
            Ok(())
        })?;
        self.record(board_id, Action::BoardUpdated, actor, metadata);
        self.publish(board_id, BoardEvent::BoardUpdated(updated.clone()));
        Ok(updated)
    }

    /// Delete a board and everything under it.
    pub fn delete_board(&self, actor: &str, board_id: &str) -> Result<CascadeReport, BoardError> {
        let board = self.store.require::<Board>(board_id)?;
        require_owner(&board, actor, "delete the board")?;
        log::info!(target: "taskboard.service", "Deleting board {}: {}", board.id, board.title);
        let report = cascade::delete_board(&self.store, board_id)?;
        self.publish(
            board_id,
            BoardEvent::BoardDeleted {
                board_id: board_id.to_string(),
            },
        );
        self.channels.close_channel(board_id);
        Ok(report)
    }

    pub fn add_member(&self, actor: &str, board_id: &str, user_id: &str) -> Result<Board, BoardError> {
        let board = self.store.require::<Board>(board_id)?;
        require_owner(&board, actor, "add members")?;
        let user_id = required(user_id, "User id is required")?;
        if board.is_member(&user_id) {
            return Ok(board);
        }
        let updated = self.store.update::<Board>(board_id, None, |b| {
            b.members.push(user_id.clone());
            Ok(())
        })?;
        self.record(
            board_id,
            Action::MemberAdded,
            actor,
            json!({ "newMemberId": user_id }),
        );
        self.publish(board_id, BoardEvent::BoardUpdated(updated.clone()));
        Ok(updated)
    }

    pub fn remove_member(
        &self,
        actor: &str,
        board_id: &str,
        user_id: &str,
    ) -> Result<Board, BoardError> {
        let board = self.store.require::<Board>(board_id)?;
        require_owner(&board, actor, "remove members")?;
        if board.owner == user_id {
            return Err(BoardError::Validation(
                "Cannot remove the board owner".to_string(),
            ));
        }
        if !board.members.iter().any(|m| m == user_id) {
            return Ok(board);
        }
        let updated = self.store.update::<Board>(board_id, None, |b| {
            b.members.retain(|m| m != user_id);
            Ok(())
        })?;
        // Cut the removed user off before anything else reaches the channel.
        self.channels.evict(board_id, user_id);
        self.record(
            board_id,
            Action::MemberRemoved,
            actor,
            json!({ "removedMemberId": user_id }),
        );
        self.publish(board_id, BoardEvent::BoardUpdated(updated.clone()));
        Ok(updated)
    }

    // ── Lists ───────────────────────────────────────────────────────────

    pub fn create_list(&self, actor: &str, req: NewList) -> Result<List, BoardError> {
        let title = required(&req.title, "List title is required")?;
        let board_id = required(&req.board, "Board is required")?;
        self.require_access(&board_id, actor)?;

        let position = match req.position {
            Some(p) => position::validate(p)?,
            None => {
                let siblings = self.store.siblings::<List>(|l| l.board == board_id);
                position::resolve(&Placement::End, &siblings)?
            }
        };
        let list = self.store.create(List::new(&title, &board_id, position))?;
        self.record(&board_id, Action::ListCreated, actor, json!({ "title": title }));
        self.publish(&board_id, BoardEvent::ListCreated(list.clone()));
        Ok(list)
    }

    pub fn update_list(&self, actor: &str, list_id: &str, patch: ListPatch) -> Result<List, BoardError> {
        let list = self.store.require::<List>(list_id)?;
        self.require_access(&list.board, actor)?;
        let title = non_empty(patch.title, "List title cannot be empty")?;
        let position = patch.position.map(position::validate).transpose()?;

        let updated = self.store.update::<List>(list_id, patch.expected_version, |l| {
            if let Some(title) = title {
                l.title = title;
            }
            if let Some(position) = position {
                l.position = position;
            }
            Ok(())
        })?;
        self.publish(&updated.board, BoardEvent::ListUpdated(updated.clone()));
        Ok(updated)
    }

    /// Delete a list together with its cards and their comments.
    pub fn delete_list(&self, actor: &str, list_id: &str) -> Result<CascadeReport, BoardError> {
        let list = self.store.require::<List>(list_id)?;
        self.require_access(&list.board, actor)?;
        let report = cascade::delete_list(&self.store, list_id)?;
        self.record(
            &list.board,
            Action::ListDeleted,
            actor,
            json!({ "title": list.title }),
        );
        self.publish(
            &list.board,
            BoardEvent::ListDeleted {
                list_id: list.id.clone(),
            },
        );
        Ok(report)
    }

    // ── Cards ───────────────────────────────────────────────────────────

    pub fn create_card(&self, actor: &str, req: NewCard) -> Result<Card, BoardError> {
        let title = required(&req.title, "Card title is required")?;
        let list_id = required(&req.list, "List is required")?;
        let list = self.store.require::<List>(&list_id)?;
        if let Some(board) = req.board.as_deref().filter(|b| !b.is_empty()) {
            if board != list.board {
                return Err(BoardError::Validation(
                    "Card board must match its list's board".to_string(),
                ));
            }
        }
        self.require_access(&list.board, actor)?;

        let position = match req.position {
            Some(p) => position::validate(p)?,
            None => {
                let siblings = self.store.siblings::<Card>(|c| c.list == list.id);
                position::resolve(&Placement::End, &siblings)?
            }
        };
        let mut card = Card::new(&title, &list, position);
        card.description = req.description.unwrap_or_default();
        card.labels = req.labels;
        card.assignees = req.assignees;
        card.due_date = req.due_date;

        let card = self.store.create(card)?;
        self.record(
            &card.board,
            Action::CardCreated,
            actor,
            json!({ "cardTitle": card.title }),
        );
        self.publish(&card.board, BoardEvent::CardCreated(card.clone()));
        Ok(card)
    }

    /// Card with its comments, oldest first.
    pub fn get_card(&self, actor: &str, card_id: &str) -> Result<CardDetail, BoardError> {
        let card = self.store.require::<Card>(card_id)?;
        self.require_access(&card.board, actor)?;
        let comments = self.comments_of(&card.id);
        Ok(CardDetail { card, comments })
    }

    /// Partial update. A changed `list` moves the card; without an explicit
    /// position it lands at the end of the new list.
    pub fn update_card(&self, actor: &str, card_id: &str, patch: CardPatch) -> Result<Card, BoardError> {
        let card = self.store.require::<Card>(card_id)?;
        self.require_access(&card.board, actor)?;

        let title = non_empty(patch.title, "Card title cannot be empty")?;
        let explicit_position = patch.position.map(position::validate).transpose()?;
        let target = match patch.list.as_deref().filter(|l| *l != card.list) {
            Some(list_id) => {
                let list = self.store.require::<List>(list_id)?;
                self.require_access(&list.board, actor)?;
                Some(list)
            }
            None => None,
        };
        let position = match (explicit_position, &target) {
            (Some(p), _) => Some(p),
            (None, Some(list)) => {
                let siblings = self.store.siblings::<Card>(|c| c.list == list.id);
                Some(position::resolve(&Placement::End, &siblings)?)
            }
            (None, None) => None,
        };
        let completion = patch.is_completed;

        let updated = self.store.update::<Card>(card_id, patch.expected_version, |c| {
            if let Some(title) = title {
                c.title = title;
            }
            if let Some(description) = patch.description {
                c.description = description;
            }
            if let Some(labels) = patch.labels {
                c.labels = labels;
            }
            if let Some(assignees) = patch.assignees {
                c.assignees = assignees;
            }
            if let Some(due_date) = patch.due_date {
                c.due_date = due_date;
            }
            if let Some(done) = patch.is_completed {
                c.is_completed = done;
            }
            if let Some(attachments) = patch.attachments {
                c.attachments = attachments;
            }
            match (&target, position) {
                (Some(list), Some(p)) => relocate(c, list, p),
                (None, Some(p)) => c.position = p,
                _ => {}
            }
            Ok(())
        })?;

        let (action, metadata) = if target.is_some() {
            (
                Action::CardMoved,
                json!({ "cardTitle": updated.title, "fromList": card.list, "toList": updated.list }),
            )
        } else {
            let action = match completion {
                Some(true) => Action::CardCompleted,
                Some(false) => Action::CardReopened,
                None => Action::CardUpdated,
            };
            (action, json!({ "cardTitle": updated.title }))
        };
        self.record(&updated.board, action, actor, metadata);
        self.publish_card_change(&card, &updated);
        Ok(updated)
    }

    /// Move a card to `req.list`, placing it per `req.placement` among the
    /// cards already there.
    pub fn move_card(&self, actor: &str, card_id: &str, req: MoveCard) -> Result<Card, BoardError> {
        let card = self.store.require::<Card>(card_id)?;
        self.require_access(&card.board, actor)?;
        if matches!(&req.placement, Placement::Card { card_id: target } if target == card_id) {
            return Ok(card);
        }
        let list = self.store.require::<List>(&req.list)?;
        self.require_access(&list.board, actor)?;

        let siblings = self
            .store
            .siblings::<Card>(|c| c.list == list.id && c.id != card_id);
        let position = position::resolve(&req.placement, &siblings)?;
        let moved = move_to_container(&self.store, card_id, &list.id, position, req.expected_version)?;

        let action = if moved.list != card.list {
            Action::CardMoved
        } else {
            Action::CardUpdated
        };
        self.record(
            &moved.board,
            action,
            actor,
            json!({ "cardTitle": moved.title, "fromList": card.list, "toList": moved.list }),
        );
        self.publish_card_change(&card, &moved);
        Ok(moved)
    }

    /// Delete a card and its comments.
    pub fn delete_card(&self, actor: &str, card_id: &str) -> Result<(), BoardError> {
        let card = self.store.require::<Card>(card_id)?;
        self.require_access(&card.board, actor)?;
        self.store.delete_many::<Comment>(|c| c.card == card.id)?;
        self.store.delete::<Card>(&card.id)?;
        self.record(
            &card.board,
            Action::CardDeleted,
            actor,
            json!({ "cardTitle": card.title }),
        );
        self.publish(
            &card.board,
            BoardEvent::CardDeleted {
                card_id: card.id.clone(),
            },
        );
        Ok(())
    }

    /// Cards on a board matching `query`, ordered by list then position.
    pub fn search_cards(
        &self,
        actor: &str,
        board_id: &str,
        query: &CardQuery,
    ) -> Result<Vec<Card>, BoardError> {
        self.require_access(board_id, actor)?;
        let list_order: HashMap<String, usize> = self
            .store
            .siblings::<List>(|l| l.board == board_id)
            .into_iter()
            .enumerate()
            .map(|(index, list)| (list.id, index))
            .collect();
        let mut cards = self.store.find::<Card>(|c| c.board == board_id);
        cards.sort_by(|a, b| {
            let la = list_order.get(&a.list).copied().unwrap_or(usize::MAX);
            let lb = list_order.get(&b.list).copied().unwrap_or(usize::MAX);
            la.cmp(&lb).then(a.position.total_cmp(&b.position))
        });
        Ok(search::search(&cards, query))
    }

    // ── Comments ────────────────────────────────────────────────────────

    pub fn add_comment(&self, actor: &str, req: NewComment) -> Result<Comment, BoardError> {
        let text = required(&req.text, "Comment text is required")?;
        let card = self.store.require::<Card>(&req.card)?;
        self.require_access(&card.board, actor)?;

        let now = Utc::now();
        let comment = self.store.create(Comment {
            id: new_id(),
            text,
            card: card.id.clone(),
            author: actor.to_string(),
            created_at: now,
            updated_at: now,
        })?;
        self.record(
            &card.board,
            Action::CommentAdded,
            actor,
            json!({ "cardTitle": card.title }),
        );
        self.publish(&card.board, BoardEvent::CommentAdded(comment.clone()));
        Ok(comment)
    }

    pub fn list_comments(&self, actor: &str, card_id: &str) -> Result<Vec<Comment>, BoardError> {
        let card = self.store.require::<Card>(card_id)?;
        self.require_access(&card.board, actor)?;
        Ok(self.comments_of(&card.id))
    }

    // ── Activity ────────────────────────────────────────────────────────

    /// Latest activity on a board, newest first.
    pub fn recent_activity(&self, actor: &str, board_id: &str) -> Result<Vec<Activity>, BoardError> {
        self.require_access(board_id, actor)?;
        let mut entries = self.store.find::<Activity>(|a| a.board == board_id);
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(ACTIVITY_LIMIT);
        Ok(entries)
    }

    // ── Helpers ─────────────────────────────────────────────────────────

    /// The board, provided `actor` may see it.
    pub fn require_access(&self, board_id: &str, actor: &str) -> Result<Board, BoardError> {
        let board = self.store.require::<Board>(board_id)?;
        require_member(&board, actor)?;
        Ok(board)
    }

    fn comments_of(&self, card_id: &str) -> Vec<Comment> {
        let mut comments = self.store.find::<Comment>(|c| c.card == card_id);
        comments.sort_by_key(|c| c.created_at);
        comments
    }

    fn record(&self, board_id: &str, action: Action, actor: &str, metadata: serde_json::Value) {
        let entry = Activity {
            id: new_id(),
            board: board_id.to_string(),
            action: action.as_str().to_string(),
            actor: actor.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create(entry) {
            log::warn!(
                target: "taskboard.activity",
                "Failed to record {} on board {}: {}",
                action.as_str(),
                board_id,
                e
            );
        }
    }

    fn publish(&self, board_id: &str, event: BoardEvent) {
        self.channels.publish(board_id, &event);
    }

    /// A card that changed boards disappears from the old board's channel and
    /// shows up as an update on the new one.
    fn publish_card_change(&self, before: &Card, after: &Card) {
        if before.board != after.board {
            self.publish(
                &before.board,
                BoardEvent::CardDeleted {
                    card_id: before.id.clone(),
                },
            );
        }
        self.publish(&after.board, BoardEvent::CardUpdated(after.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        service: BoardService,
        board: Board,
        todo: List,
        done: List,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Store::in_memory());
        let service = BoardService::new(store, Arc::new(ChannelRegistry::new()));
        let ws = service
            .create_workspace(
                "ann",
                NewWorkspace {
                    name: "Team".into(),
                },
            )
            .unwrap();
        let board = service
            .create_board(
                "ann",
                NewBoard {
                    title: "Sprint".into(),
                    workspace: ws.id,
                    ..NewBoard::default()
                },
            )
            .unwrap();
        let todo = service.create_list("ann", new_list("Todo", &board.id)).unwrap();
        let done = service.create_list("ann", new_list("Done", &board.id)).unwrap();
        Fixture {
            service,
            board,
            todo,
            done,
        }
    }

    fn new_list(title: &str, board: &str) -> NewList {
        NewList {
            title: title.into(),
            board: board.into(),
            position: None,
        }
    }

    fn new_card(title: &str, list: &str) -> NewCard {
        NewCard {
            title: title.into(),
            list: list.into(),
            ..NewCard::default()
        }
    }

    fn positions(service: &BoardService, list: &str) -> Vec<f64> {
        service
            .store()
            .siblings::<Card>(|c| c.list == list)
            .iter()
            .map(|c| c.position)
            .collect()
    }

    #[test]
    fn test_board_defaults_and_creation_activity() {
        let f = fixture();
        assert_eq!(f.board.color, DEFAULT_BOARD_COLOR);
        assert_eq!(f.board.visibility, Visibility::Workspace);
        assert_eq!(f.board.members, vec!["ann".to_string()]);
        assert_eq!(f.todo.position, 1024.0);
        assert_eq!(f.done.position, 2048.0);

        let activity = f.service.recent_activity("ann", &f.board.id).unwrap();
        assert_eq!(activity.last().unwrap().action, "board_created");
    }

    #[test]
    fn test_board_requires_title_and_workspace_membership() {
        let f = fixture();
        let err = f
            .service
            .create_board("ann", NewBoard::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Board title is required");

        let ws = f.service.list_workspaces("ann").remove(0);
        let err = f
            .service
            .create_board(
                "mallory",
                NewBoard {
                    title: "Mine".into(),
                    workspace: ws.id,
                    ..NewBoard::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BoardError::Forbidden(_)));
    }

    #[test]
    fn test_cards_append_in_order() {
        let f = fixture();
        for title in ["a", "b", "c"] {
            f.service.create_card("ann", new_card(title, &f.todo.id)).unwrap();
        }
        assert_eq!(positions(&f.service, &f.todo.id), vec![1024.0, 2048.0, 3072.0]);
    }

    #[test]
    fn test_card_board_must_match_list() {
        let f = fixture();
        let mut req = new_card("x", &f.todo.id);
        req.board = Some("elsewhere".into());
        assert!(matches!(
            f.service.create_card("ann", req),
            Err(BoardError::Validation(_))
        ));
    }

    #[test]
    fn test_non_member_is_forbidden() {
        let f = fixture();
        let err = f
            .service
            .create_card("mallory", new_card("sneaky", &f.todo.id))
            .unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Access denied");
        assert!(f.service.get_board("mallory", &f.board.id).is_err());
    }

    #[test]
    fn test_move_between_neighbours() {
        let f = fixture();
        let cards: Vec<Card> = ["a", "b", "c"]
            .iter()
            .map(|t| f.service.create_card("ann", new_card(t, &f.todo.id)).unwrap())
            .collect();
        let extra = f.service.create_card("ann", new_card("d", &f.done.id)).unwrap();

        let moved = f
            .service
            .move_card(
                "ann",
                &extra.id,
                MoveCard {
                    list: f.todo.id.clone(),
                    placement: Placement::Position {
                        position: position::insert_between(cards[0].position, cards[1].position),
                    },
                    expected_version: None,
                },
            )
            .unwrap();
        assert_eq!(moved.position, 1536.0);
        assert_eq!(moved.list, f.todo.id);
        assert_eq!(
            positions(&f.service, &f.todo.id),
            vec![1024.0, 1536.0, 2048.0, 3072.0]
        );
        assert!(positions(&f.service, &f.done.id).is_empty());
    }

    #[test]
    fn test_move_to_missing_list_leaves_card() {
        let f = fixture();
        let card = f.service.create_card("ann", new_card("a", &f.todo.id)).unwrap();
        let err = move_to_container(f.service.store(), &card.id, "ghost", 5.0, None).unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "List", .. }));
        let stored = f.service.store().require::<Card>(&card.id).unwrap();
        assert_eq!(stored.list, f.todo.id);
        assert_eq!(stored.version, 1);
    }

    #[test]
    fn test_move_to_other_board_takes_its_id() {
        let f = fixture();
        let ws = f.service.list_workspaces("ann").remove(0);
        let other = f
            .service
            .create_board(
                "ann",
                NewBoard {
                    title: "Backlog".into(),
                    workspace: ws.id,
                    ..NewBoard::default()
                },
            )
            .unwrap();
        let inbox = f.service.create_list("ann", new_list("Inbox", &other.id)).unwrap();
        let card = f.service.create_card("ann", new_card("a", &f.todo.id)).unwrap();

        let mut old_view = f.service.channels().connect("ann");
        let mut new_view = f.service.channels().connect("ann");
        old_view.join(&f.board.id);
        new_view.join(&other.id);

        let updated = f
            .service
            .update_card(
                "ann",
                &card.id,
                CardPatch {
                    list: Some(inbox.id.clone()),
                    ..CardPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.board, other.id);
        assert_eq!(updated.position, position::STEP);

        assert_eq!(
            old_view.try_recv(),
            Some(BoardEvent::CardDeleted {
                card_id: card.id.clone()
            })
        );
        assert!(matches!(new_view.try_recv(), Some(BoardEvent::CardUpdated(c)) if c.board == other.id));
    }

    #[test]
    fn test_expected_version_conflict() {
        let f = fixture();
        let card = f.service.create_card("ann", new_card("a", &f.todo.id)).unwrap();
        f.service
            .update_card(
                "ann",
                &card.id,
                CardPatch {
                    title: Some("first".into()),
                    expected_version: Some(1),
                    ..CardPatch::default()
                },
            )
            .unwrap();
        let err = f
            .service
            .update_card(
                "ann",
                &card.id,
                CardPatch {
                    title: Some("stale".into()),
                    expected_version: Some(1),
                    ..CardPatch::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, BoardError::Conflict { actual: 2, .. }));
        assert_eq!(f.service.store().require::<Card>(&card.id).unwrap().title, "first");
    }

    #[test]
    fn test_completion_activity() {
        let f = fixture();
        let card = f.service.create_card("ann", new_card("a", &f.todo.id)).unwrap();
        f.service
            .update_card(
                "ann",
                &card.id,
                CardPatch {
                    is_completed: Some(true),
                    ..CardPatch::default()
                },
            )
            .unwrap();
        let latest = f.service.recent_activity("ann", &f.board.id).unwrap();
        assert_eq!(latest[0].action, "card_completed");
    }

    #[test]
    fn test_activity_newest_first_and_capped() {
        let f = fixture();
        for n in 0..25 {
            f.service
                .create_card("ann", new_card(&format!("c{}", n), &f.todo.id))
                .unwrap();
        }
        let entries = f.service.recent_activity("ann", &f.board.id).unwrap();
        assert_eq!(entries.len(), ACTIVITY_LIMIT);
        assert!(entries.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[test]
    fn test_delete_list_cascades_and_publishes() {
        let f = fixture();
        let card = f.service.create_card("ann", new_card("a", &f.todo.id)).unwrap();
        f.service
            .add_comment(
                "ann",
                NewComment {
                    text: "hi".into(),
                    card: card.id.clone(),
                },
            )
            .unwrap();
        let mut viewer = f.service.channels().connect("ann");
        viewer.join(&f.board.id);

        let report = f.service.delete_list("ann", &f.todo.id).unwrap();
        assert_eq!((report.lists, report.cards, report.comments), (1, 1, 1));
        assert!(f.service.store().find::<Card>(|c| c.list == f.todo.id).is_empty());
        assert_eq!(
            viewer.try_recv(),
            Some(BoardEvent::ListDeleted {
                list_id: f.todo.id.clone()
            })
        );
    }

    #[test]
    fn test_originator_receives_own_event() {
        let f = fixture();
        let mut me = f.service.channels().connect("ann");
        me.join(&f.board.id);
        let card = f.service.create_card("ann", new_card("a", &f.todo.id)).unwrap();
        assert_eq!(me.try_recv(), Some(BoardEvent::CardCreated(card)));
    }

    #[test]
    fn test_membership_management() {
        let f = fixture();
        let board = f.service.add_member("ann", &f.board.id, "bob").unwrap();
        assert!(board.is_member("bob"));
        f.service.create_card("bob", new_card("mine", &f.todo.id)).unwrap();

        let err = f.service.add_member("bob", &f.board.id, "eve").unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Only board owner can add members");
        assert!(matches!(
            f.service.remove_member("ann", &f.board.id, "ann"),
            Err(BoardError::Validation(_))
        ));

        let board = f.service.remove_member("ann", &f.board.id, "bob").unwrap();
        assert!(!board.is_member("bob"));
    }

    #[test]
    fn test_search_orders_by_list_then_position() {
        let f = fixture();
        f.service.create_card("ann", new_card("deploy api", &f.done.id)).unwrap();
        f.service.create_card("ann", new_card("deploy web", &f.todo.id)).unwrap();
        f.service.create_card("ann", new_card("write docs", &f.todo.id)).unwrap();

        let query = CardQuery {
            q: Some("deploy".into()),
            ..CardQuery::default()
        };
        let found = f.service.search_cards("ann", &f.board.id, &query).unwrap();
        let titles: Vec<&str> = found.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["deploy web", "deploy api"]);
    }

    #[test]
    fn test_delete_board_owner_only() {
        let f = fixture();
        f.service.add_member("ann", &f.board.id, "bob").unwrap();
        let err = f.service.delete_board("bob", &f.board.id).unwrap_err();
        assert_eq!(err.to_string(), "Forbidden: Only board owner can delete the board");

        let report = f.service.delete_board("ann", &f.board.id).unwrap();
        assert_eq!(report.lists, 2);
        assert!(matches!(
            f.service.get_board("ann", &f.board.id),
            Err(BoardError::NotFound { resource: "Board", .. })
        ));
    }

    #[test]
    fn test_removed_member_stops_receiving_events() {
        let f = fixture();
        f.service.add_member("ann", &f.board.id, "bob").unwrap();
        let mut owner = f.service.channels().connect("ann");
        let mut bob = f.service.channels().connect("bob");
        owner.join(&f.board.id);
        bob.join(&f.board.id);

        f.service.remove_member("ann", &f.board.id, "bob").unwrap();
        f.service.create_card("ann", new_card("secret", &f.todo.id)).unwrap();

        assert_eq!(bob.try_recv(), None);
        assert!(matches!(owner.try_recv(), Some(BoardEvent::BoardUpdated(_))));
        assert!(matches!(owner.try_recv(), Some(BoardEvent::CardCreated(_))));
    }

    #[test]
    fn test_deleted_board_channel_is_closed() {
        let f = fixture();
        let mut viewer = f.service.channels().connect("ann");
        viewer.join(&f.board.id);

        f.service.delete_board("ann", &f.board.id).unwrap();
        assert_eq!(
            viewer.try_recv(),
            Some(BoardEvent::BoardDeleted {
                board_id: f.board.id.clone()
            })
        );
        assert_eq!(f.service.channels().subscriber_count(&f.board.id), 0);
    }

    #[test]
    fn test_register_rejects_duplicate_email() {
        let f = fixture();
        let user = f
            .service
            .register_user(NewUser {
                name: "Ann".into(),
                email: Some("Ann@Example.com".into()),
            })
            .unwrap();
        assert_eq!(f.service.get_user(&user.id).unwrap().name, "Ann");
        assert!(f
            .service
            .register_user(NewUser {
                name: "Other".into(),
                email: Some("ann@example.com".into()),
            })
            .is_err());
    }
}
