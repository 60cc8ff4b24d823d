//! Messages exchanged between contexts.
//!
//! Every message is a JSON object with a `type` field; requests and replies
//! between the poller and the clipboard bridge also name the context they are
//! meant for in `target`. Contexts ignore messages addressed elsewhere.
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::StorimpError;

/// Context a message is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// The clipboard bridge
    Offscreen,
    /// The background poller
    Background,
}

/// Colour theme of the user interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = StorimpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(StorimpError::ApplicationError {
                message: format!("Unknown theme '{}', expected light or dark", other),
            }),
        }
    }
}

/// Which setting a `settingChanged` broadcast refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKind {
    Theme,
    SearchVisibility,
    AutoCapture,
}

/// New value carried by a `settingChanged` broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Theme(Theme),
    Flag(bool),
}

/// A typed setting change, convertible to and from the wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange {
    Theme(Theme),
    SearchVisibility(bool),
    AutoCapture(bool),
}

impl SettingChange {
    pub fn kind(&self) -> SettingKind {
        match self {
            SettingChange::Theme(_) => SettingKind::Theme,
            SettingChange::SearchVisibility(_) => SettingKind::SearchVisibility,
            SettingChange::AutoCapture(_) => SettingKind::AutoCapture,
        }
    }

    pub fn value(&self) -> SettingValue {
        match *self {
            SettingChange::Theme(theme) => SettingValue::Theme(theme),
            SettingChange::SearchVisibility(flag) | SettingChange::AutoCapture(flag) => {
                SettingValue::Flag(flag)
            }
        }
    }
}

/// Envelope of every cross-context message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Poller asks the bridge for the clipboard text
    #[serde(rename = "read-clipboard")]
    ReadClipboard {
        target: Target,
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
    },

    /// Bridge answers with the text, or an error description
    #[serde(rename = "clipboard-data")]
    ClipboardData {
        target: Target,
        /// Echo of the request being answered
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        #[serde(default)]
        data: String,
        #[serde(default)]
        error: Option<String>,
    },

    /// A setting was changed and persisted by some context
    #[serde(rename = "settingChanged", rename_all = "camelCase")]
    SettingChanged {
        setting: SettingKind,
        new_value: SettingValue,
    },
}

impl Message {
    pub fn read_clipboard() -> Self {
        Message::ReadClipboard {
            target: Target::Offscreen,
            request_id: None,
        }
    }

    /// Tags a clipboard request or reply with `id`. Other messages are unchanged.
    pub fn with_request_id(mut self, id: u64) -> Self {
        match &mut self {
            Message::ReadClipboard { request_id, .. }
            | Message::ClipboardData { request_id, .. } => *request_id = Some(id),
            Message::SettingChanged { .. } => {}
        }
        self
    }

    pub fn request_id(&self) -> Option<u64> {
        match self {
            Message::ReadClipboard { request_id, .. }
            | Message::ClipboardData { request_id, .. } => *request_id,
            Message::SettingChanged { .. } => None,
        }
    }

    /// Builds the bridge's reply to a clipboard read
    pub fn clipboard_reply(read: std::result::Result<String, String>) -> Self {
        match read {
            Ok(data) => Message::ClipboardData {
                target: Target::Background,
                request_id: None,
                data,
                error: None,
            },
            Err(error) => Message::ClipboardData {
                target: Target::Background,
                request_id: None,
                data: String::new(),
                error: Some(error),
            },
        }
    }

    pub fn setting_changed(change: SettingChange) -> Self {
        Message::SettingChanged {
            setting: change.kind(),
            new_value: change.value(),
        }
    }

    /// The addressed context; broadcasts have none.
    pub fn target(&self) -> Option<Target> {
        match self {
            Message::ReadClipboard { target, .. } | Message::ClipboardData { target, .. } => {
                Some(*target)
            }
            Message::SettingChanged { .. } => None,
        }
    }

    /// Whether a context of kind `target` should handle this message
    pub fn is_for(&self, target: Target) -> bool {
        self.target().map_or(true, |t| t == target)
    }

    /// Interprets a `settingChanged` broadcast, rejecting mismatched values.
    pub fn as_setting_change(&self) -> Option<SettingChange> {
        match self {
            Message::SettingChanged { setting, new_value } => match (setting, new_value) {
                (SettingKind::Theme, SettingValue::Theme(theme)) => {
                    Some(SettingChange::Theme(*theme))
                }
                (SettingKind::SearchVisibility, SettingValue::Flag(flag)) => {
                    Some(SettingChange::SearchVisibility(*flag))
                }
                (SettingKind::AutoCapture, SettingValue::Flag(flag)) => {
                    Some(SettingChange::AutoCapture(*flag))
                }
                _ => None,
            },
            _ => None,
        }
    }
}
