//! Read-modify-write access to the notes and folders collections.
//!
//! Each collection is stored as one JSON array. Every mutation loads the whole
//! array, changes it in memory and writes the whole array back. Two contexts
//! doing this at the same time can lose an update: the later write wins. The
//! `*_versioned` operations reject such stale writes instead.
use std::collections::BTreeSet;

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use log::{debug, info, trace, warn};
use serde_json::Value;

use crate::{
    validate_folder_name, Collections, FolderFilter, Note, Result, SharedStore,
    StorimpError, Versioned, KEY_FOLDERS, KEY_NOTES,
};

/// Repository over the two primary collections. Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct NoteRepository {
    store: SharedStore,
}

impl NoteRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Decodes the notes array. Anything that is not an array reads as empty,
    /// and entries that are not notes are dropped.
    fn parse_notes(value: Option<Value>) -> Vec<Note> {
        match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .enumerate()
                .filter_map(|(index, item)| match serde_json::from_value::<Note>(item) {
                    Ok(note) => Some(note),
                    Err(e) => {
                        warn!("Dropping malformed note at index {}: {}", index, e);
                        None
                    }
                })
                .collect(),
            Some(other) => {
                warn!(
                    "Notes collection is not an array ({}), resetting to empty",
                    other
                );
                Vec::new()
            }
        }
    }

    fn parse_folders(value: Option<Value>) -> Vec<String> {
        match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(name) => Some(name),
                    other => {
                        warn!("Dropping malformed folder entry: {}", other);
                        None
                    }
                })
                .collect(),
            Some(other) => {
                warn!(
                    "Folders collection is not an array ({}), resetting to empty",
                    other
                );
                Vec::new()
            }
        }
    }

    pub async fn load_notes(&self) -> Result<Vec<Note>> {
        let notes = Self::parse_notes(self.store.get(KEY_NOTES).await?);
        trace!("Loaded {} notes", notes.len());
        Ok(notes)
    }

    pub async fn load_folders(&self) -> Result<Vec<String>> {
        Ok(Self::parse_folders(self.store.get(KEY_FOLDERS).await?))
    }

    /// Loads both collections; absent collections read as empty.
    pub async fn load_all(&self) -> Result<Collections> {
        Ok(Collections {
            notes: self.load_notes().await?,
            folders: self.load_folders().await?,
        })
    }

    async fn save_notes(&self, notes: &[Note]) -> Result<()> {
        self.store
            .set(KEY_NOTES, serde_json::to_value(notes)?)
            .await?;
        debug!("Saved {} notes", notes.len());
        Ok(())
    }

    async fn save_folders(&self, folders: &[String]) -> Result<()> {
        self.store
            .set(KEY_FOLDERS, serde_json::to_value(folders)?)
            .await?;
        debug!("Saved {} folders", folders.len());
        Ok(())
    }

    /// Appends a note to the end of the collection.
    pub async fn append_note(&self, note: Note) -> Result<()> {
        let mut notes = self.load_notes().await?;
        info!("Appending note '{}' to folder '{}'", note.display_title(), note.folder);
        notes.push(note);
        self.save_notes(&notes).await
    }

    /// Removes the notes at `indices`, keeping the others in order.
    /// Out-of-range indices are ignored. Returns how many notes were removed.
    pub async fn delete_notes(&self, indices: &BTreeSet<usize>) -> Result<usize> {
        let notes = self.load_notes().await?;
        let before = notes.len();
        let kept = Self::without_indices(notes, indices);

        let removed = before - kept.len();
        self.save_notes(&kept).await?;
        info!("Deleted {} of {} selected notes", removed, indices.len());
        Ok(removed)
    }

    /// Removes the notes at `indices` of `snapshot`, failing with
    /// [`StorimpError::ConcurrentModification`] if the collection changed since
    /// the snapshot was read. Indices then still address the notes the caller saw.
    pub async fn delete_notes_versioned(
        &self,
        snapshot: &Versioned<Vec<Note>>,
        indices: &BTreeSet<usize>,
    ) -> Result<usize> {
        let kept = Self::without_indices(snapshot.value.clone(), indices);
        let removed = snapshot.value.len() - kept.len();

        self.replace_notes_versioned(&kept, snapshot.revision).await?;
        info!(
            "Deleted {} of {} selected notes at revision {}",
            removed,
            indices.len(),
            snapshot.revision
        );
        Ok(removed)
    }

    fn without_indices(notes: Vec<Note>, indices: &BTreeSet<usize>) -> Vec<Note> {
        notes
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !indices.contains(index))
            .map(|(_, note)| note)
            .collect()
    }

    /// Removes every note matching `predicate`. Returns how many were removed.
    pub async fn delete_notes_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&Note) -> bool + Send,
    {
        let mut notes = self.load_notes().await?;
        let before = notes.len();
        notes.retain(|note| !predicate(note));

        let removed = before - notes.len();
        self.save_notes(&notes).await?;
        info!("Deleted {} matching notes", removed);
        Ok(removed)
    }

    /// Removes the single note at `index` and returns it.
    pub async fn delete_note(&self, index: usize) -> Result<Note> {
        let mut notes = self.load_notes().await?;
        if index >= notes.len() {
            warn!(
                "Cannot delete note at index {}: only {} notes",
                index,
                notes.len()
            );
            return Err(StorimpError::NoteNotFound { index });
        }

        let removed = notes.remove(index);
        self.save_notes(&notes).await?;
        info!("Deleted note '{}' at index {}", removed.display_title(), index);
        Ok(removed)
    }

    /// Empties the notes collection. Folders are untouched.
    pub async fn clear_notes(&self) -> Result<()> {
        info!("Deleting all notes");
        self.save_notes(&[]).await
    }

    /// Removes both collections from the store, as on a fresh install.
    pub async fn clear_all(&self) -> Result<()> {
        info!("Removing all notes and folders");
        self.store.remove(&[KEY_NOTES, KEY_FOLDERS]).await
    }

    /// Creates a folder and returns its (trimmed) name.
    pub async fn create_folder(&self, name: &str) -> Result<String> {
        let mut folders = self.load_folders().await?;
        let name = validate_folder_name(name, &folders).map_err(|e| {
            warn!("Refusing to create folder '{}': {}", name, e);
            StorimpError::InvalidFolderName(e)
        })?;

        folders.push(name.clone());
        self.save_folders(&folders).await?;
        info!("Created folder '{}'", name);
        Ok(name)
    }

    /// Notes visible under `filter`, each with its index in the whole collection.
    pub async fn notes_in_folder(&self, filter: &FolderFilter) -> Result<Vec<(usize, Note)>> {
        let notes = self.load_notes().await?;
        Ok(filter.apply(&notes))
    }

    /// Fuzzy search within a folder view, best match first.
    ///
    /// Titles weigh twice as much as content. Link notes match their URL by
    /// case-insensitive substring only. An empty query returns the whole view.
    pub async fn search(&self, query: &str, filter: &FolderFilter) -> Result<Vec<(usize, Note)>> {
        let candidates = self.notes_in_folder(filter).await?;
        let query = query.trim();
        if query.is_empty() {
            return Ok(candidates);
        }

        info!("Searching {} notes with query: '{}'", candidates.len(), query);
        let matcher = SkimMatcherV2::default();
        let lowered = query.to_lowercase();

        let mut scored: Vec<(i64, usize, Note)> = candidates
            .into_iter()
            .filter_map(|(index, note)| {
                let title_score = matcher.fuzzy_match(&note.title, query).unwrap_or(0);
                let content_score = if note.is_link {
                    if note.content.to_lowercase().contains(&lowered) {
                        matcher.fuzzy_match(&note.content, query).unwrap_or(1).max(1)
                    } else {
                        0
                    }
                } else {
                    matcher.fuzzy_match(&note.content, query).unwrap_or(0)
                };

                let score = title_score * 2 + content_score;
                if score > 0 {
                    trace!("Note {} matched with score {}", index, score);
                    Some((score, index, note))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        debug!("Search matched {} notes", scored.len());
        Ok(scored
            .into_iter()
            .map(|(_, index, note)| (index, note))
            .collect())
    }

    /// Loads the notes together with the revision they were read at.
    pub async fn load_notes_versioned(&self) -> Result<Versioned<Vec<Note>>> {
        let read = self.store.get_versioned(KEY_NOTES).await?;
        Ok(Versioned {
            value: Self::parse_notes(read.value),
            revision: read.revision,
        })
    }

    /// Writes `notes` only if nobody wrote the collection since `expected_revision`.
    /// On [`StorimpError::ConcurrentModification`] the caller reloads and retries.
    pub async fn replace_notes_versioned(
        &self,
        notes: &[Note],
        expected_revision: u64,
    ) -> Result<u64> {
        let revision = self
            .store
            .set_if_revision(KEY_NOTES, expected_revision, serde_json::to_value(notes)?)
            .await?;
        debug!("Saved {} notes at revision {}", notes.len(), revision);
        Ok(revision)
    }
}
