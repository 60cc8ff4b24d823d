//! Core data structures for captured notes and the folders that group them.
//!
//! A note is never edited after creation; it is appended to the notes
//! collection and later deleted. Folders are plain names.
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FolderNameError;

/// Implicit folder of every note saved without an explicit folder.
pub const DEFAULT_FOLDER: &str = "uncategorized";

/// View selector meaning "no folder filter". Not a real folder.
pub const ALL_NOTES_FOLDER: &str = "all";

/// Title given to notes created from the clipboard.
pub const CLIPBOARD_NOTE_TITLE: &str = "Copied Text";

/// Title shown for notes saved without one.
pub const UNTITLED_PLACEHOLDER: &str = "No Title";

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

/// Represents a single captured item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Note title, possibly empty
    #[serde(default)]
    pub title: String,
    /// Plain text, or the URL of a link note
    #[serde(default)]
    pub content: String,
    /// Folder name, or [`DEFAULT_FOLDER`]
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Whether `content` is a URL
    #[serde(default)]
    pub is_link: bool,
    /// Creation time; always set on clipboard captures
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Note {
    /// Creates a text note in `folder`. The all-notes selector resolves to the default folder.
    pub fn text(title: impl Into<String>, content: impl Into<String>, folder: &str) -> Self {
        Note {
            title: title.into(),
            content: content.into(),
            folder: folder_for_save(folder),
            is_link: false,
            timestamp: None,
        }
    }

    /// Creates a link note for a page. An empty page title falls back to the URL.
    pub fn link(page_title: &str, url: impl Into<String>, folder: &str) -> Self {
        let url = url.into();
        let page_title = if page_title.trim().is_empty() {
            url.as_str()
        } else {
            page_title
        };

        Note {
            title: format!("Link: {}", page_title),
            content: url,
            folder: folder_for_save(folder),
            is_link: true,
            timestamp: None,
        }
    }

    /// Creates the note recorded for a clipboard capture.
    pub fn clipboard_capture(text: impl Into<String>) -> Self {
        Note {
            title: CLIPBOARD_NOTE_TITLE.to_string(),
            content: text.into(),
            folder: default_folder(),
            is_link: false,
            timestamp: Some(Utc::now()),
        }
    }

    /// Title for display, with a placeholder for untitled notes
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            UNTITLED_PLACEHOLDER
        } else {
            &self.title
        }
    }

    /// Whether the note belongs to the implicit default folder
    pub fn is_uncategorized(&self) -> bool {
        self.folder.is_empty() || self.folder == DEFAULT_FOLDER
    }

    /// A manual note is worth saving only if it has a title or non-blank content.
    pub fn has_substance(&self) -> bool {
        !self.title.trim().is_empty() || !self.content.trim().is_empty()
    }
}

/// Resolves the folder a new note is saved into.
pub fn folder_for_save(selected: &str) -> String {
    let selected = selected.trim();
    if selected.is_empty() || selected == ALL_NOTES_FOLDER {
        default_folder()
    } else {
        selected.to_string()
    }
}

/// Whether `name` is one of the two reserved folder identifiers
pub fn is_reserved_folder_name(name: &str) -> bool {
    name == ALL_NOTES_FOLDER || name == DEFAULT_FOLDER
}

/// Validates a new folder name against the existing folders, returning the trimmed name.
pub fn validate_folder_name(
    name: &str,
    existing: &[String],
) -> std::result::Result<String, FolderNameError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FolderNameError::Empty);
    }
    if is_reserved_folder_name(name) {
        return Err(FolderNameError::Reserved(name.to_string()));
    }
    if existing.iter().any(|folder| folder == name) {
        return Err(FolderNameError::Duplicate(name.to_string()));
    }
    Ok(name.to_string())
}

/// Selects which notes a view shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FolderFilter {
    /// Every note, whatever its folder
    #[default]
    All,
    /// Notes in the implicit default folder
    Uncategorized,
    /// Notes tagged with exactly this folder name
    Named(String),
}

impl FolderFilter {
    pub fn parse(selector: &str) -> Self {
        match selector.trim() {
            "" | ALL_NOTES_FOLDER => FolderFilter::All,
            DEFAULT_FOLDER => FolderFilter::Uncategorized,
            name => FolderFilter::Named(name.to_string()),
        }
    }

    pub fn matches(&self, note: &Note) -> bool {
        match self {
            FolderFilter::All => true,
            FolderFilter::Uncategorized => note.is_uncategorized(),
            FolderFilter::Named(name) => note.folder == *name,
        }
    }

    /// Applies the filter, pairing each kept note with its index in `notes`.
    pub fn apply(&self, notes: &[Note]) -> Vec<(usize, Note)> {
        notes
            .iter()
            .enumerate()
            .filter(|(_, note)| self.matches(note))
            .map(|(index, note)| (index, note.clone()))
            .collect()
    }
}

impl fmt::Display for FolderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderFilter::All => f.write_str(ALL_NOTES_FOLDER),
            FolderFilter::Uncategorized => f.write_str(DEFAULT_FOLDER),
            FolderFilter::Named(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let note: Note = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(note.title, "");
        assert_eq!(note.folder, DEFAULT_FOLDER);
        assert!(!note.is_link);
        assert!(note.timestamp.is_none());
        assert_eq!(note.display_title(), UNTITLED_PLACEHOLDER);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let note = Note::link("Rust", "https://www.rust-lang.org", "reading");
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["isLink"], true);
        assert_eq!(value["title"], "Link: Rust");
        assert_eq!(value["folder"], "reading");
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn parses_browser_iso_timestamps() {
        let note: Note = serde_json::from_str(
            r#"{"title":"Copied Text","content":"x","folder":"uncategorized","isLink":false,"timestamp":"2024-05-01T10:20:30.123Z"}"#,
        )
        .unwrap();
        assert!(note.timestamp.is_some());
    }

    #[test]
    fn link_without_page_title_uses_url() {
        let note = Note::link("  ", "https://example.com", ALL_NOTES_FOLDER);
        assert_eq!(note.title, "Link: https://example.com");
        assert_eq!(note.folder, DEFAULT_FOLDER);
    }

    #[test]
    fn clipboard_capture_shape() {
        let note = Note::clipboard_capture("T");
        assert_eq!(note.title, CLIPBOARD_NOTE_TITLE);
        assert_eq!(note.content, "T");
        assert_eq!(note.folder, DEFAULT_FOLDER);
        assert!(!note.is_link);
        assert!(note.timestamp.is_some());
    }

    #[test]
    fn folder_name_validation() {
        let existing = vec!["work".to_string()];
        assert_eq!(validate_folder_name("  ", &existing), Err(FolderNameError::Empty));
        assert_eq!(
            validate_folder_name("all", &existing),
            Err(FolderNameError::Reserved("all".to_string()))
        );
        assert_eq!(
            validate_folder_name("uncategorized", &existing),
            Err(FolderNameError::Reserved("uncategorized".to_string()))
        );
        assert_eq!(
            validate_folder_name(" work ", &existing),
            Err(FolderNameError::Duplicate("work".to_string()))
        );
        assert_eq!(validate_folder_name(" home ", &existing), Ok("home".to_string()));
    }

    #[test]
    fn filters_keep_original_indices() {
        let mut orphan = Note::text("a", "1", "gone");
        orphan.folder = "deleted-folder".to_string();
        let mut legacy = Note::text("b", "2", "");
        legacy.folder = String::new();
        let notes = vec![orphan, legacy, Note::text("c", "3", "work")];

        let uncategorized = FolderFilter::parse("uncategorized").apply(&notes);
        assert_eq!(uncategorized.len(), 1);
        assert_eq!(uncategorized[0].0, 1);

        let work = FolderFilter::parse("work").apply(&notes);
        assert_eq!(work.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![2]);

        assert_eq!(FolderFilter::parse("all").apply(&notes).len(), 3);
    }
}
