/// Fractional ordering of lists within a board and cards within a list.
///
/// Siblings are ordered by ascending `position`. New positions are derived
/// from neighbouring values only; existing siblings are never renumbered, so
/// repeated midpoint insertions between the same two neighbours eventually run
/// out of floating-point precision. `precision_exhausted` reports that case.
use serde::{Deserialize, Serialize};

/// Gap between consecutive appended siblings, and the position of the first one.
pub const STEP: f64 = 1024.0;

/// Anything ordered by a numeric position.
pub trait Positioned {
    fn key(&self) -> &str;
    fn position(&self) -> f64;
}

impl<T: Positioned + ?Sized> Positioned for &T {
    fn key(&self) -> &str {
        (**self).key()
    }

    fn position(&self) -> f64 {
        (**self).position()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PositionError {
    #[error("Neighbours out of order: {prev} is not below {next}")]
    OutOfOrder { prev: f64, next: f64 },

    #[error("Position {0} is not a finite number")]
    NotFinite(f64),

    #[error("Drop target not found among siblings: {0}")]
    UnknownTarget(String),
}

/// Where a caller wants an item to land among its new siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "at", rename_all = "camelCase")]
pub enum Placement {
    /// Before the first sibling.
    Start,
    /// After the last sibling.
    End,
    /// Dropped onto a sibling card: before it when it is first, after it otherwise.
    Card {
        #[serde(rename = "cardId")]
        card_id: String,
    },
    /// A position computed by the caller.
    Position { position: f64 },
}

/// Position after every existing sibling: `max + STEP`, or `STEP` when empty.
pub fn append_to_end(positions: &[f64]) -> f64 {
    positions
        .iter()
        .copied()
        .fold(None, |max: Option<f64>, p| Some(max.map_or(p, |m| m.max(p))))
        .map_or(STEP, |max| max + STEP)
}

/// Position ahead of the current first sibling.
pub fn insert_before(first: f64) -> f64 {
    first / 2.0
}

/// Midpoint of two neighbours. The caller guarantees `prev < next`.
pub fn insert_between(prev: f64, next: f64) -> f64 {
    (prev + next) / 2.0
}

/// `insert_between` with the neighbour ordering checked.
pub fn checked_between(prev: f64, next: f64) -> Result<f64, PositionError> {
    if !prev.is_finite() {
        return Err(PositionError::NotFinite(prev));
    }
    if !next.is_finite() {
        return Err(PositionError::NotFinite(next));
    }
    if prev >= next {
        return Err(PositionError::OutOfOrder { prev, next });
    }
    Ok(insert_between(prev, next))
}

/// True when the midpoint of `prev` and `next` no longer falls strictly between them.
pub fn precision_exhausted(prev: f64, next: f64) -> bool {
    let mid = insert_between(prev, next);
    !(mid > prev && mid < next)
}

/// Reject NaN and infinities supplied by callers.
pub fn validate(position: f64) -> Result<f64, PositionError> {
    if position.is_finite() {
        Ok(position)
    } else {
        Err(PositionError::NotFinite(position))
    }
}

pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by(|a, b| a.position().total_cmp(&b.position()));
}

/// Resolve a placement against siblings already sorted by position.
///
/// Dropping onto a card follows the board drag-and-drop rule: onto the first
/// card halves its position, onto the last card appends, onto any other card
/// takes the midpoint between it and its successor.
pub fn resolve<T: Positioned>(placement: &Placement, siblings: &[T]) -> Result<f64, PositionError> {
    match placement {
        Placement::Start => Ok(siblings
            .first()
            .map_or(STEP, |first| insert_before(first.position()))),
        Placement::End => {
            let positions: Vec<f64> = siblings.iter().map(|s| s.position()).collect();
            Ok(append_to_end(&positions))
        }
        Placement::Position { position } => validate(*position),
        Placement::Card { card_id } => {
            let index = siblings
                .iter()
                .position(|s| s.key() == card_id)
                .ok_or_else(|| PositionError::UnknownTarget(card_id.clone()))?;
            drop_on_index(siblings, index)
        }
    }
}

/// Position for an item dropped onto the sibling at `index`.
pub fn drop_on_index<T: Positioned>(siblings: &[T], index: usize) -> Result<f64, PositionError> {
    let target = siblings
        .get(index)
        .ok_or_else(|| PositionError::UnknownTarget(format!("index {}", index)))?;
    if index == 0 {
        return Ok(insert_before(target.position()));
    }
    match siblings.get(index + 1) {
        None => Ok(target.position() + STEP),
        Some(next) => {
            let prev = target.position();
            let next = next.position();
            if precision_exhausted(prev, next) {
                log::warn!(
                    target: "taskboard.position",
                    "Position precision exhausted between {} and {}",
                    prev,
                    next
                );
            }
            checked_between(prev, next)
        }
    }
}
