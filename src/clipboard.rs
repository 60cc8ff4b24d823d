//! Sources of clipboard text for the bridge.
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use log::{debug, error, trace};
use shell_words::split;
use tokio::{process::Command, sync::Mutex};
use which::which;

use crate::{Result, StorimpError};

/// Environment variable naming the clipboard read command
pub const CLIPBOARD_COMMAND_ENV: &str = "STORIMP_CLIPBOARD_CMD";

/// Something that can read the current clipboard text.
#[async_trait]
pub trait ClipboardSource: Send + Sync {
    async fn read_text(&self) -> Result<String>;
}

/// Clipboard kept in memory. Clones share the same contents.
#[derive(Debug, Clone)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<std::result::Result<String, String>>>,
    reads: Arc<AtomicUsize>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self {
            contents: Arc::new(Mutex::new(Ok(String::new()))),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            contents: Arc::new(Mutex::new(Ok(text.into()))),
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn set_text(&self, text: impl Into<String>) {
        *self.contents.lock().await = Ok(text.into());
    }

    /// Makes subsequent reads fail with `message`
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.contents.lock().await = Err(message.into());
    }

    /// How many times the clipboard was read
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClipboardSource for MemoryClipboard {
    async fn read_text(&self) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.contents
            .lock()
            .await
            .clone()
            .map_err(|message| StorimpError::Clipboard { message })
    }
}

/// Reads the clipboard by running an external command and taking its stdout.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
}

impl CommandClipboard {
    /// Parses a shell-like command line such as `xclip -selection clipboard -o`.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = split(command).map_err(|e| StorimpError::ConfigError {
            message: format!("Failed to parse clipboard command '{}': {}", command, e),
        })?;

        if parts.is_empty() {
            return Err(StorimpError::ConfigError {
                message: "Empty clipboard command".to_string(),
            });
        }

        let program = parts.remove(0);
        Ok(Self {
            program,
            args: parts,
        })
    }

    /// Picks a clipboard command: the configured one, then the environment,
    /// then the first platform tool found on the PATH.
    pub fn detect(configured: Option<&str>) -> Result<Self> {
        if let Some(command) = configured {
            return Self::new(command);
        }

        if let Ok(command) = std::env::var(CLIPBOARD_COMMAND_ENV) {
            if !command.trim().is_empty() {
                return Self::new(&command);
            }
        }

        let candidates: &[&str] = if cfg!(windows) {
            &["powershell -noprofile -command Get-Clipboard"]
        } else if cfg!(target_os = "macos") {
            &["pbpaste"]
        } else {
            &[
                "wl-paste --no-newline",
                "xclip -selection clipboard -o",
                "xsel --clipboard --output",
            ]
        };

        for candidate in candidates {
            let program = candidate.split_whitespace().next().unwrap_or_default();
            if which(program).is_ok() {
                debug!("Using clipboard command: {}", candidate);
                return Self::new(candidate);
            }
        }

        Err(StorimpError::ConfigError {
            message: format!(
                "No clipboard command found; set clipboard_command or {}",
                CLIPBOARD_COMMAND_ENV
            ),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl ClipboardSource for CommandClipboard {
    async fn read_text(&self) -> Result<String> {
        trace!("Running clipboard command: {} {:?}", self.program, self.args);
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| {
                error!("Failed to run clipboard command {}: {}", self.program, e);
                StorimpError::Clipboard {
                    message: format!("Failed to run {}: {}", self.program, e),
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StorimpError::Clipboard {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
