//! Persistent key-value store shared by every context.
//!
//! Values are JSON documents addressed by a handful of well-known keys. Each
//! key carries a revision counter that is bumped on every write or removal so
//! callers can detect that a snapshot went stale.
use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, trace, warn};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::{Result, StorimpError, Versioned};

/// Key of the notes collection
pub const KEY_NOTES: &str = "data";
/// Key of the folders collection
pub const KEY_FOLDERS: &str = "folders";
/// Key of the auto-capture flag
pub const KEY_AUTO_CAPTURE: &str = "isAutoCaptureEnabled";
/// Key of the last captured clipboard text
pub const KEY_LAST_COPIED_TEXT: &str = "lastCopiedText";
/// Key of the colour theme
pub const KEY_THEME: &str = "theme";
/// Key of the search bar visibility flag
pub const KEY_SEARCH_VISIBLE: &str = "isSearchVisible";

/// Document key holding the per-key revisions of a [`FileStore`]
const REVISIONS_KEY: &str = "$revisions";

/// Store handle shared by every context
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Asynchronous key-value storage with per-key revisions.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value together with the revision of its key.
    /// An absent key reads as `None`.
    async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Value>>>;

    /// Writes a value unconditionally and returns the new revision.
    async fn set(&self, key: &str, value: Value) -> Result<u64>;

    /// Writes a value only if the key is still at `expected_revision`.
    async fn set_if_revision(&self, key: &str, expected_revision: u64, value: Value)
        -> Result<u64>;

    /// Removes the given keys entirely. Absent keys are ignored.
    async fn remove(&self, keys: &[&str]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_versioned(key).await?.value)
    }
}

/// Values and revisions behind both store implementations
#[derive(Debug, Default)]
struct StoreState {
    values: Map<String, Value>,
    revisions: BTreeMap<String, u64>,
}

impl StoreState {
    /// Splits a stored document into values and revisions
    fn from_document(mut values: Map<String, Value>) -> Self {
        let revisions = match values.remove(REVISIONS_KEY) {
            None => BTreeMap::new(),
            Some(raw) => serde_json::from_value(raw).unwrap_or_else(|e| {
                warn!("Ignoring malformed store revisions: {}", e);
                BTreeMap::new()
            }),
        };
        Self { values, revisions }
    }

    fn to_document(&self) -> Result<Map<String, Value>> {
        let mut document = self.values.clone();
        document.insert(
            REVISIONS_KEY.to_string(),
            serde_json::to_value(&self.revisions)?,
        );
        Ok(document)
    }

    fn revision(&self, key: &str) -> u64 {
        self.revisions.get(key).copied().unwrap_or(0)
    }

    fn read(&self, key: &str) -> Versioned<Option<Value>> {
        Versioned {
            value: self.values.get(key).cloned(),
            revision: self.revision(key),
        }
    }

    fn bump(&mut self, key: &str) -> u64 {
        let revision = self.revisions.entry(key.to_string()).or_insert(0);
        *revision += 1;
        *revision
    }

    fn check_revision(&self, key: &str, expected_revision: u64) -> Result<()> {
        let actual_revision = self.revision(key);
        if actual_revision != expected_revision {
            warn!(
                "Rejecting stale write to '{}': expected revision {}, found {}",
                key, expected_revision, actual_revision
            );
            return Err(StorimpError::ConcurrentModification {
                key: key.to_string(),
                expected_revision,
                actual_revision,
            });
        }
        Ok(())
    }

    /// Values after removing `keys`, or `None` when nothing would change
    fn without(&self, keys: &[&str]) -> Option<Map<String, Value>> {
        if !keys.iter().any(|key| self.values.contains_key(*key)) {
            return None;
        }
        let mut values = self.values.clone();
        for key in keys {
            values.remove(*key);
        }
        Some(values)
    }

    fn commit_removal(&mut self, keys: &[&str], values: Map<String, Value>) {
        for key in keys {
            if self.values.contains_key(*key) {
                self.bump(key);
            }
        }
        self.values = values;
    }
}

/// Store kept only in memory, for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Value>>> {
        Ok(self.state.lock().await.read(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.values.insert(key.to_string(), value);
        Ok(state.bump(key))
    }

    async fn set_if_revision(
        &self,
        key: &str,
        expected_revision: u64,
        value: Value,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.check_revision(key, expected_revision)?;
        state.values.insert(key.to_string(), value);
        Ok(state.bump(key))
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(values) = state.without(keys) {
            state.commit_removal(keys, values);
        }
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk, shared with other processes.
///
/// Nothing is cached: every operation reads the file, and every mutation
/// writes the whole document back through a temporary file in the same
/// directory, so a crash leaves either the old or the new document. Key
/// revisions are kept in the document, so a stale conditional write is
/// detected whichever process made the intervening change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes this handle's read-modify-write cycles
    lock: Mutex<()>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file is an empty store; a file that
    /// is not a JSON object is moved aside and the store starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        info!("Opening store at {}", store.path.display());

        let state = store.load_state()?;
        debug!("Store holds {} keys", state.values.len());
        Ok(store)
    }

    fn load_state(&self) -> Result<StoreState> {
        if !self.path.exists() {
            trace!("Store file does not exist yet: {}", self.path.display());
            return Ok(StoreState::default());
        }
        Ok(StoreState::from_document(Self::read_document(&self.path)?))
    }

    fn read_document(path: &Path) -> Result<Map<String, Value>> {
        let content = fs::read_to_string(path).map_err(|e| {
            error!("Failed to read store file {}: {}", path.display(), e);
            StorimpError::Io(e)
        })?;

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(values)) => {
                trace!("Loaded {} keys from {}", values.len(), path.display());
                Ok(values)
            }
            Ok(_) | Err(_) => {
                let aside = path.with_extension(format!("corrupt-{}", Utc::now().timestamp()));
                warn!(
                    "Store file {} is not a JSON object, moving it to {} and starting empty",
                    path.display(),
                    aside.display()
                );
                fs::rename(path, &aside).map_err(|e| {
                    error!("Failed to move corrupt store file aside: {}", e);
                    StorimpError::Io(e)
                })?;
                Ok(Map::new())
            }
        }
    }

    /// Atomically replaces the store file with `state`
    fn save_state(&self, state: &StoreState) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !dir.exists() {
            debug!("Creating store directory: {}", dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                error!("Failed to create directory {}: {}", dir.display(), e);
                StorimpError::Io(e)
            })?;
        }

        let mut temp_file = NamedTempFile::new_in(dir).map_err(|e| {
            error!("Failed to create temporary file: {}", e);
            StorimpError::Io(e)
        })?;

        let json = serde_json::to_string_pretty(&state.to_document()?)?;
        temp_file.write_all(json.as_bytes()).map_err(|e| {
            error!("Failed to write to temporary file: {}", e);
            StorimpError::Io(e)
        })?;
        temp_file.flush()?;

        temp_file.persist(&self.path).map_err(|e| {
            error!("Failed to persist file {}: {}", self.path.display(), e.error);
            StorimpError::Io(e.error)
        })?;

        trace!("Store written to {}", self.path.display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get_versioned(&self, key: &str) -> Result<Versioned<Option<Value>>> {
        let _guard = self.lock.lock().await;
        Ok(self.load_state()?.read(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<u64> {
        let _guard = self.lock.lock().await;
        let mut state = self.load_state()?;
        state.values.insert(key.to_string(), value);
        let revision = state.bump(key);
        self.save_state(&state)?;
        Ok(revision)
    }

    async fn set_if_revision(
        &self,
        key: &str,
        expected_revision: u64,
        value: Value,
    ) -> Result<u64> {
        let _guard = self.lock.lock().await;
        let mut state = self.load_state()?;
        state.check_revision(key, expected_revision)?;
        state.values.insert(key.to_string(), value);
        let revision = state.bump(key);
        self.save_state(&state)?;
        Ok(revision)
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut state = self.load_state()?;
        if let Some(values) = state.without(keys) {
            state.commit_removal(keys, values);
            self.save_state(&state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn absent_key_reads_as_none_at_revision_zero() {
        let store = MemoryStore::new();
        let read = store.get_versioned(KEY_NOTES).await.unwrap();
        assert_eq!(read.value, None);
        assert_eq!(read.revision, 0);
    }

    #[tokio::test]
    async fn writes_bump_revisions() {
        let store = MemoryStore::new();
        assert_eq!(store.set(KEY_THEME, json!("dark")).await.unwrap(), 1);
        assert_eq!(store.set(KEY_THEME, json!("light")).await.unwrap(), 2);
        assert_eq!(store.get(KEY_THEME).await.unwrap(), Some(json!("light")));

        store.remove(&[KEY_THEME, KEY_NOTES]).await.unwrap();
        let read = store.get_versioned(KEY_THEME).await.unwrap();
        assert_eq!(read.value, None);
        assert_eq!(read.revision, 3);
        assert_eq!(store.get_versioned(KEY_NOTES).await.unwrap().revision, 0);
    }

    #[tokio::test]
    async fn stale_conditional_write_is_rejected() {
        let store = MemoryStore::new();
        store.set(KEY_FOLDERS, json!(["a"])).await.unwrap();

        let err = store
            .set_if_revision(KEY_FOLDERS, 0, json!(["b"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StorimpError::ConcurrentModification {
                expected_revision: 0,
                actual_revision: 1,
                ..
            }
        ));
        assert_eq!(store.get(KEY_FOLDERS).await.unwrap(), Some(json!(["a"])));

        assert_eq!(
            store.set_if_revision(KEY_FOLDERS, 1, json!(["b"])).await.unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        {
            let store = FileStore::open(&path).unwrap();
            store.set(KEY_FOLDERS, json!(["work"])).await.unwrap();
            store.set(KEY_THEME, json!("dark")).await.unwrap();
            store.remove(&[KEY_THEME]).await.unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get(KEY_FOLDERS).await.unwrap(), Some(json!(["work"])));
        assert_eq!(reopened.get(KEY_THEME).await.unwrap(), None);
    }

    #[tokio::test]
    async fn handles_on_one_file_see_each_others_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let watcher = FileStore::open(&path).unwrap();
        let cli = FileStore::open(&path).unwrap();

        watcher.set(KEY_AUTO_CAPTURE, json!(true)).await.unwrap();
        cli.set(KEY_AUTO_CAPTURE, json!(false)).await.unwrap();
        cli.set(KEY_NOTES, json!([{"content": "manual"}])).await.unwrap();

        assert_eq!(watcher.get(KEY_AUTO_CAPTURE).await.unwrap(), Some(json!(false)));

        watcher.set(KEY_LAST_COPIED_TEXT, json!("copied")).await.unwrap();

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(
            reopened.get(KEY_NOTES).await.unwrap(),
            Some(json!([{"content": "manual"}]))
        );
        assert_eq!(reopened.get(KEY_AUTO_CAPTURE).await.unwrap(), Some(json!(false)));
        assert_eq!(
            reopened.get(KEY_LAST_COPIED_TEXT).await.unwrap(),
            Some(json!("copied"))
        );
    }

    #[tokio::test]
    async fn revisions_are_shared_through_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let first = FileStore::open(&path).unwrap();
        let second = FileStore::open(&path).unwrap();

        first.set(KEY_NOTES, json!([])).await.unwrap();
        let snapshot = second.get_versioned(KEY_NOTES).await.unwrap();
        assert_eq!(snapshot.revision, 1);

        first.set(KEY_NOTES, json!([{"content": "a"}])).await.unwrap();
        assert!(matches!(
            second
                .set_if_revision(KEY_NOTES, snapshot.revision, json!([]))
                .await,
            Err(StorimpError::ConcurrentModification {
                expected_revision: 1,
                actual_revision: 2,
                ..
            })
        ));

        first.remove(&[KEY_NOTES]).await.unwrap();
        assert_eq!(second.get_versioned(KEY_NOTES).await.unwrap().revision, 3);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[REVISIONS_KEY][KEY_NOTES], json!(3));
        assert!(raw.get(KEY_NOTES).is_none());
    }

    #[tokio::test]
    async fn revisions_key_is_not_a_value() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).unwrap();
        store.set(KEY_THEME, json!("dark")).await.unwrap();

        assert_eq!(store.get(REVISIONS_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{ not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(KEY_NOTES).await.unwrap(), None);
        assert!(!path.exists());

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);

        store.set(KEY_NOTES, json!([])).await.unwrap();
        assert!(path.exists());
    }
}
