//! Shared types for the storimp application.
//!
//! This module contains the result alias, the versioned snapshot used for
//! optimistic writes and the command-line subcommands.
use chrono::{DateTime, Utc};
use clap::Subcommand;

use crate::{Note, StorimpError};

/// A specialized Result type for storimp operations.
pub type Result<T> = std::result::Result<T, StorimpError>;

/// A collection snapshot together with the store revision it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// The snapshot itself
    pub value: T,
    /// Revision of the store key when the snapshot was taken
    pub revision: u64,
}

/// Both primary collections as loaded from the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collections {
    pub notes: Vec<Note>,
    pub folders: Vec<String>,
}

/// Outcome of a single clipboard poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Auto-capture is off; the bridge was not asked
    Disabled,
    /// Another clipboard request is still outstanding
    Busy,
    /// The bridge reported an error or did not answer
    ReadFailed(String),
    /// Auto-capture was switched off while the read was in flight
    DisabledMidFlight,
    /// The clipboard held nothing but whitespace
    Empty,
    /// The clipboard still holds the last captured text
    Duplicate,
    /// A new note was stored
    Captured,
}

/// Status of the background clipboard poller
#[derive(Debug, Clone, Default)]
pub struct PollerStatus {
    /// Whether the poll loop is running
    pub is_running: bool,
    /// When the last note was captured
    pub last_capture_time: Option<DateTime<Utc>>,
    /// Number of notes captured since start
    pub captures: u64,
}

/// Available subcommands for the storimp application
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a text note
    Add {
        /// Text of the note
        content: String,

        /// Title of the note
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// Folder to save into (defaults to uncategorized)
        #[clap(short, long, default_value = "uncategorized")]
        folder: String,
    },

    /// Save a link note
    SaveLink {
        /// URL to save
        url: String,

        /// Page title shown next to the link
        #[clap(short = 'T', long)]
        title: Option<String>,

        /// Folder to save into (defaults to uncategorized)
        #[clap(short, long, default_value = "uncategorized")]
        folder: String,
    },

    /// List notes in a folder
    List {
        /// Folder to show; "all" shows every note
        #[clap(short, long, default_value = "all")]
        folder: String,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,

        /// Show full content instead of a preview
        #[clap(short, long)]
        detailed: bool,
    },

    /// Search notes by title or content
    Search {
        /// Search query text
        query: String,

        /// Restrict the search to one folder
        #[clap(short, long, default_value = "all")]
        folder: String,

        /// Limit the number of search results
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Delete notes by their index in `list --folder all`
    Delete {
        /// Indices of the notes to delete
        #[clap(required = true)]
        indices: Vec<usize>,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Delete every note, keeping folders
    DeleteAll {
        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Remove all notes and folders
    ClearAll {
        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Create a folder
    CreateFolder {
        /// Name of the new folder
        name: String,
    },

    /// List folders
    Folders,

    /// Show or change settings
    Settings {
        /// Set the theme
        #[clap(long, value_parser = ["light", "dark"])]
        theme: Option<String>,

        /// Show or hide the search bar
        #[clap(long)]
        search_visible: Option<bool>,

        /// Turn clipboard auto-capture on or off
        #[clap(long)]
        auto_capture: Option<bool>,
    },

    /// Run the clipboard bridge and poller until interrupted
    Watch {
        /// Poll interval in milliseconds (overrides configuration)
        #[clap(short, long)]
        interval_ms: Option<u64>,

        /// Turn auto-capture on before watching
        #[clap(short, long)]
        enable: bool,
    },
}
