/// Client-side board replica with optimistic drag-and-drop moves.
///
/// A drop is applied to the local view immediately and handed back as a
/// `MoveRequest` for the caller to send. Each request is tracked until the
/// server confirms or rejects it. A rejection never rolls back a single move;
/// the caller refetches the whole board and calls `replace`.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::events::BoardEvent;
use crate::position::{self, Placement, STEP};
use crate::types::{BoardView, Card, MoveCard};

/// Position a card receives when dropped onto a list under `ListDropPolicy::Legacy`.
pub const LEGACY_DROP_POSITION: f64 = 1024.0;

/// Where a card dropped onto a list (rather than onto a card) lands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDropPolicy {
    /// Ahead of the list's current first card.
    #[default]
    Top,
    /// Always the fixed position 1024, whatever the list holds.
    Legacy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { card_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropTarget {
    List { list_id: String },
    Card { card_id: String },
    Nowhere,
}

pub type MutationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationStatus {
    Pending,
    Confirmed,
    Rejected,
}

/// What the caller must do after feeding a result into the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    None,
    /// Local state can no longer be trusted; fetch the full board.
    Refetch,
}

/// An optimistic move awaiting its authoritative request.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveRequest {
    pub mutation: MutationId,
    pub card_id: String,
    pub list_id: String,
    pub position: f64,
    pub expected_version: Option<u64>,
}

impl MoveRequest {
    /// Request body for the card move endpoint.
    pub fn to_body(&self) -> MoveCard {
        MoveCard {
            list: self.list_id.clone(),
            placement: Placement::Position {
                position: self.position,
            },
            expected_version: self.expected_version,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoardReplica {
    view: BoardView,
    drag: DragState,
    policy: ListDropPolicy,
    mutations: BTreeMap<MutationId, MutationStatus>,
    next_mutation: MutationId,
    /// Version precondition sent with moves.
    versioned_moves: bool,
    deleted: bool,
}

impl BoardReplica {
    pub fn new(mut view: BoardView, policy: ListDropPolicy) -> Self {
        view.sort();
        Self {
            view,
            drag: DragState::Idle,
            policy,
            mutations: BTreeMap::new(),
            next_mutation: 0,
            versioned_moves: false,
            deleted: false,
        }
    }

    /// Send each move with the card's known version, so a concurrent edit on
    /// the server rejects it instead of silently winning.
    pub fn with_versioned_moves(mut self, enabled: bool) -> Self {
        self.versioned_moves = enabled;
        self
    }

    pub fn view(&self) -> &BoardView {
        &self.view
    }

    pub fn board_id(&self) -> &str {
        &self.view.board.id
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.view.cards.iter().find(|c| c.id == card_id)
    }

    pub fn cards_in(&self, list_id: &str) -> Vec<&Card> {
        self.view.cards_in(list_id)
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    /// True once a `board-deleted` event has been applied.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Start dragging a card. Returns false for a card not on this board.
    pub fn begin_drag(&mut self, card_id: &str) -> bool {
        if self.card(card_id).is_none() {
            return false;
        }
        self.drag = DragState::Dragging {
            card_id: card_id.to_string(),
        };
        true
    }

    pub fn cancel_drag(&mut self) {
        self.drag = DragState::Idle;
    }

    /// Finish the current drag. Applies the move locally and returns the
    /// request to send, or `None` when the drop changes nothing.
    pub fn drop_on(&mut self, target: DropTarget) -> Option<MoveRequest> {
        let DragState::Dragging { card_id } = std::mem::replace(&mut self.drag, DragState::Idle)
        else {
            return None;
        };
        let card = self.card(&card_id)?.clone();

        let (list_id, position) = match target {
            DropTarget::Nowhere => return None,
            DropTarget::List { list_id } => {
                if list_id == card.list || !self.view.lists.iter().any(|l| l.id == list_id) {
                    return None;
                }
                let position = match self.policy {
                    ListDropPolicy::Legacy => LEGACY_DROP_POSITION,
                    ListDropPolicy::Top => self
                        .cards_in(&list_id)
                        .first()
                        .map_or(STEP, |first| position::insert_before(first.position)),
                };
                (list_id, position)
            }
            DropTarget::Card { card_id: target_id } => {
                if target_id == card.id {
                    return None;
                }
                let target = self.card(&target_id)?;
                let list_id = target.list.clone();
                let siblings = self.cards_in(&list_id);
                let index = siblings.iter().position(|c| c.id == target_id)?;
                match position::drop_on_index(&siblings, index) {
                    Ok(position) => (list_id, position),
                    Err(e) => {
                        log::warn!(target: "taskboard.reconcile", "Drop on card {} ignored: {}", target_id, e);
                        return None;
                    }
                }
            }
        };

        if let Some(local) = self.view.cards.iter_mut().find(|c| c.id == card_id) {
            local.list = list_id.clone();
            local.position = position;
        }
        self.view.sort();

        self.next_mutation += 1;
        let mutation = self.next_mutation;
        self.mutations.insert(mutation, MutationStatus::Pending);
        Some(MoveRequest {
            mutation,
            card_id,
            list_id,
            position,
            expected_version: self.versioned_moves.then_some(card.version),
        })
    }

    pub fn status(&self, mutation: MutationId) -> Option<MutationStatus> {
        self.mutations.get(&mutation).copied()
    }

    pub fn pending(&self) -> usize {
        self.mutations
            .values()
            .filter(|s| **s == MutationStatus::Pending)
            .count()
    }

    /// The server accepted the move; adopt its copy of the card.
    pub fn confirm(&mut self, mutation: MutationId, card: Card) {
        if let Some(status) = self.mutations.get_mut(&mutation) {
            *status = MutationStatus::Confirmed;
        }
        self.upsert_card(card);
    }

    /// The server refused the move. The optimistic state is discarded by a
    /// full refetch.
    pub fn reject(&mut self, mutation: MutationId) -> Recovery {
        match self.mutations.get_mut(&mutation) {
            Some(status) => {
                *status = MutationStatus::Rejected;
                log::info!(
                    target: "taskboard.reconcile",
                    "Move {} rejected, refetching board {}",
                    mutation,
                    self.view.board.id
                );
                Recovery::Refetch
            }
            None => Recovery::None,
        }
    }

    /// Replace local state with a fresh board snapshot.
    pub fn replace(&mut self, mut view: BoardView) {
        view.sort();
        self.view = view;
        self.drag = DragState::Idle;
        self.deleted = false;
    }

    /// Merge a broadcast event into the view.
    pub fn apply_event(&mut self, event: &BoardEvent) {
        match event {
            BoardEvent::CardCreated(card) | BoardEvent::CardUpdated(card) => {
                if card.board == self.view.board.id {
                    self.upsert_card(card.clone());
                } else {
                    self.view.cards.retain(|c| c.id != card.id);
                }
            }
            BoardEvent::CardDeleted { card_id } => {
                self.view.cards.retain(|c| c.id != *card_id);
            }
            BoardEvent::ListCreated(list) | BoardEvent::ListUpdated(list) => {
                if list.board == self.view.board.id {
                    match self.view.lists.iter_mut().find(|l| l.id == list.id) {
                        Some(existing) => *existing = list.clone(),
                        None => self.view.lists.push(list.clone()),
                    }
                    position::sort_by_position(&mut self.view.lists);
                }
            }
            BoardEvent::ListDeleted { list_id } => {
                self.view.lists.retain(|l| l.id != *list_id);
                self.view.cards.retain(|c| c.list != *list_id);
            }
            BoardEvent::BoardUpdated(board) => {
                if board.id == self.view.board.id {
                    self.view.board = board.clone();
                }
            }
            BoardEvent::BoardDeleted { board_id } => {
                if *board_id == self.view.board.id {
                    self.deleted = true;
                    self.view.lists.clear();
                    self.view.cards.clear();
                }
            }
            BoardEvent::CommentAdded(_) => {}
        }
    }

    fn upsert_card(&mut self, card: Card) {
        match self.view.cards.iter_mut().find(|c| c.id == card.id) {
            Some(existing) => *existing = card,
            None => self.view.cards.push(card),
        }
        position::sort_by_position(&mut self.view.cards);
    }
}
