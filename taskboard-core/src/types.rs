use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::position::{self, Positioned};

/// Default color assigned to new boards.
pub const DEFAULT_BOARD_COLOR: &str = "#0079bf";

/// Generate a fresh document identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A stored document: addressable by id, with a version bumped on every write.
pub trait Document: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;

    /// Board this document belongs to, used to track per-board revisions.
    fn board_scope(&self) -> Option<&str> {
        None
    }

    /// Record a modification: bump version and update timestamp.
    fn touch(&mut self) {}

    fn version(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Document for User {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Workspace {
    pub fn new(name: &str, owner: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.trim().to_string(),
            owner: owner.to_string(),
            members: vec![owner.to_string()],
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.owner == user_id || self.members.iter().any(|m| m == user_id)
    }
}

impl Document for Workspace {
    fn id(&self) -> &str {
        &self.id
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    #[default]
    Workspace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: String,
    pub title: String,
    pub workspace: String,
    #[serde(default)]
    pub visibility: Visibility,
    pub color: String,
    pub owner: String,
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Board {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.owner == user_id || self.members.iter().any(|m| m == user_id)
    }
}

impl Document for Board {
    fn id(&self) -> &str {
        &self.id
    }

    fn board_scope(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: String,
    pub title: String,
    pub board: String,
    pub position: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl List {
    pub fn new(title: &str, board: &str, position: f64) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.trim().to_string(),
            board: board.to_string(),
            position,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

impl Document for List {
    fn id(&self) -> &str {
        &self.id
    }

    fn board_scope(&self) -> Option<&str> {
        Some(&self.board)
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Positioned for List {
    fn key(&self) -> &str {
        &self.id
    }

    fn position(&self) -> f64 {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub list: String,
    pub board: String,
    pub position: f64,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Card {
    pub fn new(title: &str, list: &List, position: f64) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            title: title.trim().to_string(),
            description: String::new(),
            list: list.id.clone(),
            board: list.board.clone(),
            position,
            labels: Vec::new(),
            assignees: Vec::new(),
            due_date: None,
            is_completed: false,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

impl Document for Card {
    fn id(&self) -> &str {
        &self.id
    }

    fn board_scope(&self) -> Option<&str> {
        Some(&self.board)
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Positioned for Card {
    fn key(&self) -> &str {
        &self.id
    }

    fn position(&self) -> f64 {
        self.position
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub text: String,
    pub card: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Comment {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub board: String,
    pub action: String,
    pub actor: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Document for Activity {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Full board state as served to a client: the board, its lists and its cards,
/// both sorted by position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardView {
    #[serde(flatten)]
    pub board: Board,
    pub lists: Vec<List>,
    pub cards: Vec<Card>,
    /// Store revision of this board, served as the ETag.
    #[serde(default)]
    pub revision: u64,
}

impl BoardView {
    /// Cards of one list in display order.
    pub fn cards_in(&self, list_id: &str) -> Vec<&Card> {
        let mut cards: Vec<&Card> = self.cards.iter().filter(|c| c.list == list_id).collect();
        cards.sort_by(|a, b| a.position.total_cmp(&b.position));
        cards
    }

    pub fn sort(&mut self) {
        position::sort_by_position(&mut self.lists);
        position::sort_by_position(&mut self.cards);
    }
}

/// Card together with its comments, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDetail {
    #[serde(flatten)]
    pub card: Card,
    pub comments: Vec<Comment>,
}

// ── Request bodies ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMember {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWorkspace {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePatch {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBoard {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub workspace: String,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewList {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub board: String,
    #[serde(default)]
    pub position: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub list: String,
    /// Optional; when present it must match the list's board.
    #[serde(default)]
    pub board: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub position: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Option<Vec<String>>,
    #[serde(default)]
    pub assignees: Option<Vec<String>>,
    /// `null` clears the due date, absence leaves it alone.
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub is_completed: Option<bool>,
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default)]
    pub list: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCard {
    pub list: String,
    pub placement: position::Placement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub card: String,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
