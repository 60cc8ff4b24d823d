//! Scalar settings and their propagation to other contexts.
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    Message, MessageBus, Result, SettingChange, SharedStore, Theme, KEY_AUTO_CAPTURE,
    KEY_LAST_COPIED_TEXT, KEY_SEARCH_VISIBLE, KEY_THEME,
};

/// Snapshot of every setting, with defaults filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub auto_capture_enabled: bool,
    pub last_copied_text: String,
    pub theme: Theme,
    pub search_visible: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_capture_enabled: false,
            last_copied_text: String::new(),
            theme: Theme::Light,
            search_visible: true,
        }
    }
}

/// Reads and writes settings, broadcasting user-facing changes.
#[derive(Clone)]
pub struct SettingsStore {
    store: SharedStore,
    bus: Option<MessageBus>,
}

impl SettingsStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store, bus: None }
    }

    /// Announces changes on `bus` after they are persisted
    pub fn with_bus(store: SharedStore, bus: MessageBus) -> Self {
        Self {
            store,
            bus: Some(bus),
        }
    }

    /// Reads a setting, falling back to `default` when absent or malformed
    async fn read_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T> {
        match self.store.get(key).await? {
            None => Ok(default),
            Some(value) => match serde_json::from_value::<T>(value.clone()) {
                Ok(parsed) => Ok(parsed),
                Err(e) => {
                    warn!("Ignoring malformed setting '{}' ({}): {}", key, value, e);
                    Ok(default)
                }
            },
        }
    }

    pub async fn load(&self) -> Result<Settings> {
        let defaults = Settings::default();
        Ok(Settings {
            auto_capture_enabled: self
                .read_or(KEY_AUTO_CAPTURE, defaults.auto_capture_enabled)
                .await?,
            last_copied_text: self
                .read_or(KEY_LAST_COPIED_TEXT, defaults.last_copied_text)
                .await?,
            theme: self.read_or(KEY_THEME, defaults.theme).await?,
            search_visible: self
                .read_or(KEY_SEARCH_VISIBLE, defaults.search_visible)
                .await?,
        })
    }

    pub async fn is_auto_capture_enabled(&self) -> Result<bool> {
        self.read_or(KEY_AUTO_CAPTURE, false).await
    }

    pub async fn last_copied_text(&self) -> Result<String> {
        self.read_or(KEY_LAST_COPIED_TEXT, String::new()).await
    }

    /// Records the text of the latest clipboard capture. Not broadcast.
    pub async fn set_last_copied_text(&self, text: &str) -> Result<()> {
        self.store
            .set(KEY_LAST_COPIED_TEXT, Value::String(text.to_string()))
            .await?;
        Ok(())
    }

    pub async fn theme(&self) -> Result<Theme> {
        self.read_or(KEY_THEME, Theme::Light).await
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<()> {
        self.apply(SettingChange::Theme(theme)).await
    }

    pub async fn set_search_visible(&self, visible: bool) -> Result<()> {
        self.apply(SettingChange::SearchVisibility(visible)).await
    }

    pub async fn set_auto_capture(&self, enabled: bool) -> Result<()> {
        self.apply(SettingChange::AutoCapture(enabled)).await
    }

    /// Persists a change, then tells whoever is listening.
    pub async fn apply(&self, change: SettingChange) -> Result<()> {
        let (key, value) = match change {
            SettingChange::Theme(theme) => (KEY_THEME, Value::String(theme.as_str().to_string())),
            SettingChange::SearchVisibility(visible) => (KEY_SEARCH_VISIBLE, Value::Bool(visible)),
            SettingChange::AutoCapture(enabled) => (KEY_AUTO_CAPTURE, Value::Bool(enabled)),
        };

        self.store.set(key, value).await?;
        info!("Setting '{}' changed: {:?}", key, change);

        if let Some(bus) = &self.bus {
            let listeners = bus.publish(Message::setting_changed(change));
            debug!("Setting change delivered to {} listeners", listeners);
        }
        Ok(())
    }
}
