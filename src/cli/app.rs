//! CLI application handler
//!
//! Turns parsed subcommands into repository and settings calls and prints the
//! results. The `watch` command hosts the clipboard bridge and the poller in
//! this process until Ctrl-C.
use std::{collections::BTreeSet, str::FromStr, sync::Arc};

use console::style;
use log::{debug, info, warn};
use serde_json::Value;

use crate::{
    confirm, content_preview, plural, ClipboardBridge, ClipboardPoller, Commands,
    CommandClipboard, Config, FolderFilter, MessageBus, Note, NoteRepository, PollerConfig,
    Result, SettingsStore, SharedStore, StorimpError, Theme, Versioned, ALL_NOTES_FOLDER,
    DEFAULT_FOLDER,
};

const PREVIEW_CHARS: usize = 100;

/// CLI Application handler - processes CLI commands against the store
pub struct App {
    repository: NoteRepository,
    settings: SettingsStore,
    config: Config,
    verbose: bool,
}

impl App {
    pub fn new(store: SharedStore, config: Config, verbose: bool) -> Self {
        Self {
            repository: NoteRepository::new(Arc::clone(&store)),
            settings: SettingsStore::new(store),
            config,
            verbose,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        debug!("Running command: {:?}", command);
        match command {
            Commands::Add {
                content,
                title,
                folder,
            } => self.handle_add(title.unwrap_or_default(), content, &folder).await,

            Commands::SaveLink { url, title, folder } => {
                self.handle_save_link(&url, title.as_deref().unwrap_or(""), &folder)
                    .await
            }

            Commands::List {
                folder,
                json,
                detailed,
            } => self.handle_list(&folder, json, detailed).await,

            Commands::Search {
                query,
                folder,
                limit,
                json,
            } => self.handle_search(&query, &folder, limit, json).await,

            Commands::Delete { indices, force } => self.handle_delete(indices, force).await,

            Commands::DeleteAll { force } => self.handle_delete_all(force).await,

            Commands::ClearAll { force } => self.handle_clear_all(force).await,

            Commands::CreateFolder { name } => self.handle_create_folder(&name).await,

            Commands::Folders => self.handle_folders().await,

            Commands::Settings {
                theme,
                search_visible,
                auto_capture,
            } => {
                self.handle_settings(theme, search_visible, auto_capture)
                    .await
            }

            Commands::Watch {
                interval_ms,
                enable,
            } => self.handle_watch(interval_ms, enable).await,
        }
    }

    async fn warn_if_unknown_folder(&self, folder: &str) -> Result<()> {
        let folder = folder.trim();
        if folder.is_empty() || folder == ALL_NOTES_FOLDER || folder == DEFAULT_FOLDER {
            return Ok(());
        }
        let folders = self.repository.load_folders().await?;
        if !folders.iter().any(|f| f == folder) {
            warn!(
                "Folder '{}' does not exist; the note will only show under '{}'",
                folder, ALL_NOTES_FOLDER
            );
        }
        Ok(())
    }

    async fn handle_add(&self, title: String, content: String, folder: &str) -> Result<()> {
        let note = Note::text(title, content, folder);
        if !note.has_substance() {
            return Err(StorimpError::ApplicationError {
                message: "Nothing to save: both title and content are empty".to_string(),
            });
        }

        self.warn_if_unknown_folder(folder).await?;
        let saved_folder = note.folder.clone();
        self.repository.append_note(note).await?;
        println!("Note saved to {}", style(saved_folder).cyan());
        Ok(())
    }

    async fn handle_save_link(&self, url: &str, page_title: &str, folder: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(StorimpError::ApplicationError {
                message: "Cannot save an empty URL".to_string(),
            });
        }

        self.warn_if_unknown_folder(folder).await?;
        let note = Note::link(page_title, url.trim(), folder);
        let saved = format!(
            "Saved {} to {}",
            style(note.display_title()).bold(),
            style(&note.folder).cyan()
        );
        self.repository.append_note(note).await?;
        println!("{}", saved);
        Ok(())
    }

    async fn handle_list(&self, folder: &str, json: bool, detailed: bool) -> Result<()> {
        let filter = FolderFilter::parse(folder);
        let notes = self.repository.notes_in_folder(&filter).await?;

        if json {
            return self.display_notes_json(&notes);
        }

        if notes.is_empty() {
            println!("No notes in {}.", style(&filter).cyan());
            return Ok(());
        }

        self.display_notes_text(&notes, detailed);
        println!("\n{} note{} in {}", notes.len(), plural(notes.len()), filter);
        Ok(())
    }

    async fn handle_search(&self, query: &str, folder: &str, limit: usize, json: bool) -> Result<()> {
        let filter = FolderFilter::parse(folder);
        let mut results = self.repository.search(query, &filter).await?;
        let total = results.len();

        // 0 means no limit
        if limit > 0 {
            results.truncate(limit);
        }

        if json {
            return self.display_notes_json(&results);
        }

        if results.is_empty() {
            println!("No notes found matching query: \"{}\"", query);
            return Ok(());
        }

        self.display_notes_text(&results, false);
        if results.len() < total {
            println!(
                "\nShowing {} of {} matching notes. Use --limit to show more.",
                results.len(),
                total
            );
        } else {
            println!("\nFound {} matching note{}.", total, plural(total));
        }
        Ok(())
    }

    async fn handle_delete(&self, indices: Vec<usize>, force: bool) -> Result<()> {
        let snapshot = self.repository.load_notes_versioned().await?;
        let notes = &snapshot.value;
        let selected: BTreeSet<usize> = indices.into_iter().collect();

        let (existing, missing): (Vec<usize>, Vec<usize>) =
            selected.iter().partition(|&&index| index < notes.len());
        for index in &missing {
            warn!("No note at index {}", index);
        }
        if let Some(&index) = missing.first() {
            if existing.is_empty() {
                return Err(StorimpError::NoteNotFound { index });
            }
        }

        if !force {
            println!("You are about to delete the following notes:");
            for &index in &existing {
                println!(
                    "  [{}] {} {}",
                    index,
                    style(notes[index].display_title()).bold(),
                    style(content_preview(&notes[index].content, 40)).dim()
                );
            }
            println!("\nThis action cannot be undone!");
            if !confirm("Are you sure?")? {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.commit_delete(&snapshot, &selected).await
    }

    /// Deletes from the notes the user was shown, unless they changed meanwhile.
    async fn commit_delete(
        &self,
        snapshot: &Versioned<Vec<Note>>,
        selected: &BTreeSet<usize>,
    ) -> Result<()> {
        match self
            .repository
            .delete_notes_versioned(snapshot, selected)
            .await
        {
            Ok(removed) => {
                println!("Deleted {} note{}.", removed, plural(removed));
                Ok(())
            }
            Err(e @ StorimpError::ConcurrentModification { .. }) => {
                println!(
                    "Notes changed since they were listed; nothing was deleted. \
                     List them again and retry."
                );
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_delete_all(&self, force: bool) -> Result<()> {
        let count = self.repository.load_notes().await?.len();
        if count == 0 {
            println!("There are no notes to delete.");
            return Ok(());
        }

        if !force && !confirm(&format!("Delete all {} note{}?", count, plural(count)))? {
            println!("Deletion cancelled.");
            return Ok(());
        }

        self.repository.clear_notes().await?;
        println!("Deleted {} note{}. Folders were kept.", count, plural(count));
        Ok(())
    }

    async fn handle_clear_all(&self, force: bool) -> Result<()> {
        if !force && !confirm("Remove ALL notes and folders?")? {
            println!("Cancelled.");
            return Ok(());
        }

        self.repository.clear_all().await?;
        println!("All notes and folders removed.");
        Ok(())
    }

    async fn handle_create_folder(&self, name: &str) -> Result<()> {
        let created = self.repository.create_folder(name).await?;
        println!("Folder {} created.", style(created).cyan());
        Ok(())
    }

    async fn handle_folders(&self) -> Result<()> {
        let collections = self.repository.load_all().await?;
        let count = |filter: FolderFilter| {
            collections
                .notes
                .iter()
                .filter(|note| filter.matches(note))
                .count()
        };

        println!("{} ({})", style(DEFAULT_FOLDER).cyan(), count(FolderFilter::Uncategorized));
        for folder in &collections.folders {
            println!(
                "{} ({})",
                style(folder).cyan(),
                count(FolderFilter::Named(folder.clone()))
            );
        }

        if self.verbose {
            println!(
                "\n{} folder{}, {} note{} in total",
                collections.folders.len(),
                plural(collections.folders.len()),
                collections.notes.len(),
                plural(collections.notes.len())
            );
        }
        Ok(())
    }

    async fn handle_settings(
        &self,
        theme: Option<String>,
        search_visible: Option<bool>,
        auto_capture: Option<bool>,
    ) -> Result<()> {
        if let Some(theme) = theme {
            self.settings.set_theme(Theme::from_str(&theme)?).await?;
        }
        if let Some(visible) = search_visible {
            self.settings.set_search_visible(visible).await?;
        }
        if let Some(enabled) = auto_capture {
            self.settings.set_auto_capture(enabled).await?;
        }

        let current = self.settings.load().await?;
        println!("Theme:          {}", current.theme);
        println!("Search bar:     {}", on_off(current.search_visible));
        println!("Auto-capture:   {}", on_off(current.auto_capture_enabled));
        if self.verbose && !current.last_copied_text.is_empty() {
            println!(
                "Last captured:  {}",
                content_preview(&current.last_copied_text, 60)
            );
        }
        Ok(())
    }

    async fn handle_watch(&self, interval_ms: Option<u64>, enable: bool) -> Result<()> {
        let mut poller_config = PollerConfig::from(&self.config);
        if let Some(interval_ms) = interval_ms {
            if interval_ms == 0 {
                return Err(StorimpError::ApplicationError {
                    message: "--interval-ms must be greater than zero".to_string(),
                });
            }
            poller_config.interval = std::time::Duration::from_millis(interval_ms);
        }

        let source = CommandClipboard::detect(self.config.clipboard_command.as_deref())?;
        info!("Reading clipboard with '{}'", source.program());

        let bus = MessageBus::new();
        let store = Arc::clone(self.repository.store());
        let settings = SettingsStore::with_bus(store, bus.clone());

        if enable {
            settings.set_auto_capture(true).await?;
        } else if !settings.is_auto_capture_enabled().await? {
            warn!("Auto-capture is off; run with --enable or `settings --auto-capture true`");
        }

        let bridge = ClipboardBridge::new(bus.clone(), Arc::new(source)).spawn();
        let mut poller =
            ClipboardPoller::new(self.repository.clone(), settings, bus, poller_config);
        poller.start()?;

        println!(
            "Watching the clipboard every {} ms. Press Ctrl-C to stop.",
            poller_config.interval.as_millis()
        );
        let signal = tokio::signal::ctrl_c().await;

        poller.stop().await?;
        bridge.stop().await;
        signal?;

        let status = poller.get_status();
        println!(
            "Captured {} note{}.",
            status.captures,
            plural(status.captures as usize)
        );
        Ok(())
    }

    /// Display notes in JSON format, each with its index in the whole collection
    fn display_notes_json(&self, notes: &[(usize, Note)]) -> Result<()> {
        let entries = notes
            .iter()
            .map(|(index, note)| -> Result<Value> {
                let mut entry = serde_json::to_value(note)?;
                if let Value::Object(fields) = &mut entry {
                    fields.insert("index".to_string(), Value::from(*index));
                }
                Ok(entry)
            })
            .collect::<Result<Vec<Value>>>()?;

        println!("{}", serde_json::to_string_pretty(&entries)?);
        Ok(())
    }

    /// Display notes in text format
    fn display_notes_text(&self, notes: &[(usize, Note)], detailed: bool) {
        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (position, (index, note)) in notes.iter().enumerate() {
            if position > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            let mut header = format!("[{}] {}", index, style(note.display_title()).bold());
            if !note.is_uncategorized() {
                header.push_str(&format!(" {}", style(format!("({})", note.folder)).cyan()));
            }
            if let Some(timestamp) = note.timestamp {
                header.push_str(&format!(
                    " {}",
                    style(timestamp.format("%Y-%m-%d %H:%M")).dim()
                ));
            }
            println!("{}", header);

            if note.is_link {
                println!("{}", style(&note.content).underlined().blue());
            } else if detailed {
                println!("{}", note.content);
            } else {
                let preview = content_preview(&note.content, PREVIEW_CHARS.min(term_width));
                if !preview.is_empty() {
                    println!("{}", preview);
                }
            }
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}
