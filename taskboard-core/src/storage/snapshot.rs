/// Snapshot persistence for the document store.
///
/// `JsonFile` writes the whole store as one JSON document using an atomic
/// write (tmp file, fsync, rename, fsync directory).
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::StorageError;
use crate::cascade::DeletionMarker;
use crate::types::*;

/// Serialized form of every collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub workspaces: Vec<Workspace>,
    #[serde(default)]
    pub boards: Vec<Board>,
    #[serde(default)]
    pub lists: Vec<List>,
    #[serde(default)]
    pub cards: Vec<Card>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub deletions: Vec<DeletionMarker>,
    /// board id -> revision of the last write touching it
    #[serde(default)]
    pub revisions: HashMap<String, u64>,
    /// Next revision to hand out. Revisions never repeat across restarts.
    #[serde(default)]
    pub next_revision: u64,
}

/// Where store snapshots go. Implementations: `JsonFile`, `MemoryOnly`.
pub trait Persistence: Send + Sync {
    /// Load the last saved snapshot, `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<Snapshot>, StorageError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError>;
}

/// Keeps nothing; the store lives only as long as the process.
pub struct MemoryOnly;

impl Persistence for MemoryOnly {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        Ok(None)
    }

    fn save(&self, _snapshot: &Snapshot) -> Result<(), StorageError> {
        Ok(())
    }
}

pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for JsonFile {
    fn load(&self) -> Result<Option<Snapshot>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        let json = serde_json::to_string(snapshot)?;
        atomic_write(&self.path, &json)?;
        Ok(())
    }
}

/// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let tmp_path = path.with_extension("taskboard.tmp");
    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;

    // fsync directory for rename durability
    if let Some(dir) = path.parent() {
        if let Ok(d) = fs::File::open(dir) {
            let _ = d.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFile::new(dir.path().join("store.json"));
        assert!(sink.load().unwrap().is_none());
    }

    #[test]
    fn test_store_reopens_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = Store::open(Box::new(JsonFile::new(&path))).unwrap();
        let list = store.create(List::new("Backlog", "b1", 1024.0)).unwrap();
        drop(store);

        let reopened = Store::open(Box::new(JsonFile::new(&path))).unwrap();
        let loaded = reopened.get::<List>(&list.id).unwrap();
        assert_eq!(loaded.title, "Backlog");
        assert_eq!(loaded.position, 1024.0);
        assert!(!path.with_extension("taskboard.tmp").exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            JsonFile::new(&path).load(),
            Err(StorageError::Encoding(_))
        ));
    }

    #[test]
    fn test_board_revision_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = Store::open(Box::new(JsonFile::new(&path))).unwrap();
        store.create(List::new("Todo", "b1", 1024.0)).unwrap();
        store.create(List::new("Done", "b1", 2048.0)).unwrap();
        let before = store.board_revision("b1");
        assert!(before > 0);
        drop(store);

        let reopened = Store::open(Box::new(JsonFile::new(&path))).unwrap();
        assert_eq!(reopened.board_revision("b1"), before);

        // New writes after a restart never reuse a revision served before it.
        let other = reopened.create(List::new("Elsewhere", "b2", 1024.0)).unwrap();
        assert!(reopened.board_revision(&other.board) > before);
        reopened.create(List::new("Later", "b1", 4096.0)).unwrap();
        assert!(reopened.board_revision("b1") > before);
    }
}
