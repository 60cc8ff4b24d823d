//! Error types for the storimp note store.
//!
//! This module defines the error types that categorize the failures which can
//! occur while storing notes, validating folders and capturing the clipboard.

use std::io;

use thiserror::Error;

/// The main error type for the storimp library.
#[derive(Error, Debug)]
pub enum StorimpError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A folder name was rejected during creation.
    #[error("Invalid folder name: {0}")]
    InvalidFolderName(#[from] FolderNameError),

    /// No note exists at the given position of the notes collection.
    #[error("Note not found at index {index}")]
    NoteNotFound { index: usize },

    /// A versioned write lost the race against another writer.
    #[error("Concurrent modification detected for '{key}': expected revision {expected_revision}, found {actual_revision}")]
    ConcurrentModification {
        key: String,
        expected_revision: u64,
        actual_revision: u64,
    },

    /// The clipboard could not be read.
    #[error("Clipboard error: {message}")]
    Clipboard { message: String },

    /// Nobody is listening for clipboard requests.
    #[error("Clipboard bridge unavailable: {message}")]
    BridgeUnavailable { message: String },

    /// The clipboard bridge did not answer in time.
    #[error("Clipboard bridge did not respond within {timeout_ms} ms")]
    BridgeTimeout { timeout_ms: u64 },

    /// Errors related to configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}

/// Reasons a folder name can be refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FolderNameError {
    #[error("folder name cannot be empty")]
    Empty,

    #[error("'{0}' is a reserved name")]
    Reserved(String),

    #[error("folder '{0}' already exists")]
    Duplicate(String),
}
