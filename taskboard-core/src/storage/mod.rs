pub mod snapshot;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::cascade::DeletionMarker;
use crate::position::{self, Positioned};
use crate::types::*;
pub use snapshot::{JsonFile, MemoryOnly, Persistence, Snapshot};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Version conflict on {kind} {id}: expected {expected}, found {actual}")]
    VersionConflict {
        kind: &'static str,
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Rejected update of {kind} {id}: {reason}")]
    Rejected {
        kind: &'static str,
        id: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One document collection, keyed by id.
pub struct Collection<T> {
    docs: RwLock<HashMap<String, T>>,
}

impl<T: Document> Collection<T> {
    fn new(docs: Vec<T>) -> Self {
        Self {
            docs: RwLock::new(docs.into_iter().map(|d| (d.id().to_string(), d)).collect()),
        }
    }

    fn get(&self, id: &str) -> Option<T> {
        read(&self.docs).get(id).cloned()
    }

    fn find(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        read(&self.docs).values().filter(|d| filter(d)).cloned().collect()
    }

    fn insert(&self, doc: T) {
        write(&self.docs).insert(doc.id().to_string(), doc);
    }

    fn remove(&self, id: &str) -> Option<T> {
        write(&self.docs).remove(id)
    }

    fn retain(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        let mut docs = write(&self.docs);
        let doomed: Vec<String> = docs
            .values()
            .filter(|d| filter(d))
            .map(|d| d.id().to_string())
            .collect();
        doomed.iter().filter_map(|id| docs.remove(id)).collect()
    }

    fn all(&self) -> Vec<T> {
        read(&self.docs).values().cloned().collect()
    }
}

/// Maps a document type to its collection inside the store.
pub trait Stored: Document {
    const KIND: &'static str;
    fn collection(store: &Store) -> &Collection<Self>;
}

macro_rules! stored {
    ($ty:ty, $kind:literal, $field:ident) => {
        impl Stored for $ty {
            const KIND: &'static str = $kind;
            fn collection(store: &Store) -> &Collection<Self> {
                &store.$field
            }
        }
    };
}

stored!(User, "User", users);
stored!(Workspace, "Workspace", workspaces);
stored!(Board, "Board", boards);
stored!(List, "List", lists);
stored!(Card, "Card", cards);
stored!(Comment, "Comment", comments);
stored!(Activity, "Activity", activities);
stored!(DeletionMarker, "DeletionMarker", deletions);

/// Document store: in-memory collections with a pluggable snapshot sink.
///
/// Reads go straight to the collections. Every write is serialized by a single
/// write mutex and followed by a snapshot save; when the save fails the error
/// is returned but the in-memory change stays applied, so the running process
/// remains the source of truth until the next successful save.
pub struct Store {
    users: Collection<User>,
    workspaces: Collection<Workspace>,
    boards: Collection<Board>,
    lists: Collection<List>,
    cards: Collection<Card>,
    comments: Collection<Comment>,
    activities: Collection<Activity>,
    deletions: Collection<DeletionMarker>,
    /// board_id -> revision of the last write touching that board
    revisions: RwLock<HashMap<String, u64>>,
    next_revision: AtomicU64,
    write_lock: Mutex<()>,
    persistence: Box<dyn Persistence>,
}

impl Store {
    /// Store without persistence, for tests and ephemeral servers.
    pub fn in_memory() -> Self {
        Self::from_snapshot(Snapshot::default(), Box::new(MemoryOnly))
    }

    /// Open a store backed by `persistence`, loading its last snapshot if any.
    pub fn open(persistence: Box<dyn Persistence>) -> Result<Self, StorageError> {
        let snapshot = persistence.load()?.unwrap_or_default();
        log::info!(
            target: "taskboard.storage",
            "Loaded snapshot: {} boards, {} lists, {} cards",
            snapshot.boards.len(),
            snapshot.lists.len(),
            snapshot.cards.len()
        );
        Ok(Self::from_snapshot(snapshot, persistence))
    }

    fn from_snapshot(snapshot: Snapshot, persistence: Box<dyn Persistence>) -> Self {
        let highest = snapshot.revisions.values().copied().max().unwrap_or(0);
        let next_revision = snapshot.next_revision.max(highest + 1);
        Self {
            users: Collection::new(snapshot.users),
            workspaces: Collection::new(snapshot.workspaces),
            boards: Collection::new(snapshot.boards),
            lists: Collection::new(snapshot.lists),
            cards: Collection::new(snapshot.cards),
            comments: Collection::new(snapshot.comments),
            activities: Collection::new(snapshot.activities),
            deletions: Collection::new(snapshot.deletions),
            next_revision: AtomicU64::new(next_revision),
            revisions: RwLock::new(snapshot.revisions),
            write_lock: Mutex::new(()),
            persistence,
        }
    }

    pub fn get<T: Stored>(&self, id: &str) -> Option<T> {
        T::collection(self).get(id)
    }

    /// Fetch a document or fail with `NotFound`.
    pub fn require<T: Stored>(&self, id: &str) -> Result<T, StorageError> {
        self.get(id).ok_or_else(|| StorageError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    pub fn find<T: Stored>(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        T::collection(self).find(filter)
    }

    /// Matching documents ordered by ascending position.
    pub fn siblings<T: Stored + Positioned>(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        let mut docs = self.find(filter);
        position::sort_by_position(&mut docs);
        docs
    }

    pub fn create<T: Stored>(&self, doc: T) -> Result<T, StorageError> {
        let _guard = lock(&self.write_lock);
        let collection = T::collection(self);
        if collection.get(doc.id()).is_some() {
            return Err(StorageError::AlreadyExists {
                kind: T::KIND,
                id: doc.id().to_string(),
            });
        }
        self.bump(doc.board_scope());
        collection.insert(doc.clone());
        self.save()?;
        Ok(doc)
    }

    /// Apply `change` to a copy of the document and store the result.
    ///
    /// `expected_version`, when given, must equal the stored version or the
    /// update is refused without writing. `change` may itself refuse the
    /// update by returning an error.
    pub fn update<T: Stored>(
        &self,
        id: &str,
        expected_version: Option<u64>,
        change: impl FnOnce(&mut T) -> Result<(), String>,
    ) -> Result<T, StorageError> {
        let _guard = lock(&self.write_lock);
        let collection = T::collection(self);
        let mut doc = collection.get(id).ok_or_else(|| StorageError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })?;
        if let Some(expected) = expected_version {
            if doc.version() != expected {
                return Err(StorageError::VersionConflict {
                    kind: T::KIND,
                    id: id.to_string(),
                    expected,
                    actual: doc.version(),
                });
            }
        }
        let previous_scope = doc.board_scope().map(str::to_string);
        change(&mut doc).map_err(|reason| StorageError::Rejected {
            kind: T::KIND,
            id: id.to_string(),
            reason,
        })?;
        doc.touch();
        self.bump(previous_scope.as_deref());
        self.bump(doc.board_scope());
        collection.insert(doc.clone());
        self.save()?;
        Ok(doc)
    }

    /// Delete one document. Returns the number deleted (0 or 1).
    pub fn delete<T: Stored>(&self, id: &str) -> Result<usize, StorageError> {
        let _guard = lock(&self.write_lock);
        let Some(doc) = T::collection(self).remove(id) else {
            return Ok(0);
        };
        self.bump(doc.board_scope());
        self.save()?;
        Ok(1)
    }

    /// Delete every matching document. Returns the number deleted.
    pub fn delete_many<T: Stored>(&self, filter: impl Fn(&T) -> bool) -> Result<usize, StorageError> {
        let _guard = lock(&self.write_lock);
        let removed = T::collection(self).retain(filter);
        if removed.is_empty() {
            return Ok(0);
        }
        for doc in &removed {
            self.bump(doc.board_scope());
        }
        self.save()?;
        Ok(removed.len())
    }

    /// Revision of the last write that touched `board_id`.
    pub fn board_revision(&self, board_id: &str) -> u64 {
        read(&self.revisions).get(board_id).copied().unwrap_or(0)
    }

    fn bump(&self, board_id: Option<&str>) {
        if let Some(board_id) = board_id {
            let revision = self.next_revision.fetch_add(1, Ordering::Relaxed);
            write(&self.revisions).insert(board_id.to_string(), revision);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            users: self.users.all(),
            workspaces: self.workspaces.all(),
            boards: self.boards.all(),
            lists: self.lists.all(),
            cards: self.cards.all(),
            comments: self.comments.all(),
            activities: self.activities.all(),
            deletions: self.deletions.all(),
            revisions: read(&self.revisions).clone(),
            next_revision: self.next_revision.load(Ordering::Relaxed),
        }
    }

    fn save(&self) -> Result<(), StorageError> {
        self.persistence.save(&self.snapshot()).map_err(|e| {
            log::error!(target: "taskboard.storage", "Failed to save snapshot: {}", e);
            e
        })
    }
}
