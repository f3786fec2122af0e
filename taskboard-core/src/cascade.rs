/// Cascading deletes for lists and boards.
///
/// Board deletion runs as a saga of idempotent steps. A deletion marker is
/// written before the first step and records every completed step; it is
/// removed only after the board document itself is gone. When a step fails
/// the marker stays behind and `resume_pending` (run at startup) or a retried
/// delete picks up from the first unfinished step. Nothing is rolled back.
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{StorageError, Store};
use crate::types::{Activity, Board, Card, Comment, Document, List};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CascadeStep {
    Comments,
    Cards,
    Lists,
    Activities,
    Board,
}

/// Order in which a board's dependents are removed.
pub const BOARD_CASCADE: [CascadeStep; 5] = [
    CascadeStep::Comments,
    CascadeStep::Cards,
    CascadeStep::Lists,
    CascadeStep::Activities,
    CascadeStep::Board,
];

/// Persisted record of an in-progress board deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionMarker {
    /// Id of the board being deleted.
    pub board: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed: Vec<CascadeStep>,
}

impl Document for DeletionMarker {
    fn id(&self) -> &str {
        &self.board
    }
}

/// Documents removed by a cascade run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub comments: usize,
    pub cards: usize,
    pub lists: usize,
    pub activities: usize,
    pub boards: usize,
}

/// Delete a board and everything under it, resuming an earlier attempt if a
/// marker for this board exists.
pub fn delete_board(store: &Store, board_id: &str) -> Result<CascadeReport, StorageError> {
    let marker = match store.get::<DeletionMarker>(board_id) {
        Some(marker) => {
            log::info!(
                target: "taskboard.cascade",
                "Resuming deletion of board {} after {:?}",
                board_id,
                marker.completed
            );
            marker
        }
        None => store.create(DeletionMarker {
            board: board_id.to_string(),
            started_at: Utc::now(),
            completed: Vec::new(),
        })?,
    };
    run_board_saga(store, marker)
}

/// Finish every board deletion left unfinished by an earlier failure.
pub fn resume_pending(store: &Store) -> Vec<(String, Result<CascadeReport, StorageError>)> {
    store
        .find::<DeletionMarker>(|_| true)
        .into_iter()
        .map(|marker| {
            let board = marker.board.clone();
            log::warn!(
                target: "taskboard.cascade",
                "Found unfinished deletion of board {}",
                board
            );
            (board, run_board_saga(store, marker))
        })
        .collect()
}

fn run_board_saga(store: &Store, marker: DeletionMarker) -> Result<CascadeReport, StorageError> {
    let board_id = marker.board.clone();
    let mut report = CascadeReport::default();

    for step in BOARD_CASCADE {
        if marker.completed.contains(&step) {
            continue;
        }
        match step {
            CascadeStep::Comments => {
                let card_ids = board_card_ids(store, &board_id);
                report.comments = store.delete_many::<Comment>(|c| card_ids.contains(&c.card))?;
            }
            CascadeStep::Cards => {
                let list_ids = board_list_ids(store, &board_id);
                report.cards = store
                    .delete_many::<Card>(|c| c.board == board_id || list_ids.contains(&c.list))?;
            }
            CascadeStep::Lists => {
                report.lists = store.delete_many::<List>(|l| l.board == board_id)?;
            }
            CascadeStep::Activities => {
                report.activities = store.delete_many::<Activity>(|a| a.board == board_id)?;
            }
            CascadeStep::Board => {
                report.boards = store.delete::<Board>(&board_id)?;
            }
        }
        store.update::<DeletionMarker>(&board_id, None, |m| {
            m.completed.push(step);
            Ok(())
        })?;
    }

    store.delete::<DeletionMarker>(&board_id)?;
    log::info!(
        target: "taskboard.cascade",
        "Deleted board {}: {} lists, {} cards, {} comments, {} activities",
        board_id,
        report.lists,
        report.cards,
        report.comments,
        report.activities
    );
    Ok(report)
}

/// Delete a list, its cards and those cards' comments.
///
/// Each step is idempotent, so a failed delete can simply be retried.
pub fn delete_list(store: &Store, list_id: &str) -> Result<CascadeReport, StorageError> {
    let card_ids: HashSet<String> = store
        .find::<Card>(|c| c.list == list_id)
        .into_iter()
        .map(|c| c.id)
        .collect();
    Ok(CascadeReport {
        comments: store.delete_many::<Comment>(|c| card_ids.contains(&c.card))?,
        cards: store.delete_many::<Card>(|c| c.list == list_id)?,
        lists: store.delete::<List>(list_id)?,
        ..CascadeReport::default()
    })
}

fn board_list_ids(store: &Store, board_id: &str) -> HashSet<String> {
    store
        .find::<List>(|l| l.board == board_id)
        .into_iter()
        .map(|l| l.id)
        .collect()
}

fn board_card_ids(store: &Store, board_id: &str) -> HashSet<String> {
    let list_ids = board_list_ids(store, board_id);
    store
        .find::<Card>(|c| c.board == board_id || list_ids.contains(&c.list))
        .into_iter()
        .map(|c| c.id)
        .collect()
}
