use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{Result, StorimpError};

const STORE_FILE_NAME: &str = "store.json";
const CONFIG_FILE_NAME: &str = "config.json";

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// File holding notes, folders and settings
    pub store_path: PathBuf,

    /// How often the clipboard is polled (in milliseconds)
    pub poll_interval_ms: u64,

    /// How long the poller waits for the clipboard bridge (in milliseconds)
    pub bridge_timeout_ms: u64,

    /// Command printing the clipboard text on stdout, e.g. `xclip -selection clipboard -o`
    pub clipboard_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let store_path = project_dirs()
            .map(|dirs| dirs.data_dir().join(STORE_FILE_NAME))
            .unwrap_or_else(|| PathBuf::from(STORE_FILE_NAME));

        Self {
            store_path,
            poll_interval_ms: 1000,
            bridge_timeout_ms: 750,
            clipboard_command: None,
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "storimp", "storimp")
}

impl Config {
    /// Where the configuration file lives when no path is given
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads the configuration from `path`, or from the default location.
    /// A missing file yields the defaults; missing fields take their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    debug!("No configuration directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!(
                "Configuration file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| StorimpError::ConfigError {
                message: format!("Invalid configuration in {}: {}", path.display(), e),
            })?;

        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(StorimpError::ConfigError {
                message: "poll_interval_ms must be greater than zero".to_string(),
            });
        }
        if self.bridge_timeout_ms == 0 {
            return Err(StorimpError::ConfigError {
                message: "bridge_timeout_ms must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(Some(dir.path().join("absent.json").as_path())).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"poll_interval_ms": 250, "clipboard_command": "pbpaste"}"#,
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.bridge_timeout_ms, 750);
        assert_eq!(config.clipboard_command.as_deref(), Some("pbpaste"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        fs::write(&path, r#"{"poll_interval_ms": 0}"#).unwrap();
        assert!(matches!(
            Config::load(Some(path.as_path())),
            Err(StorimpError::ConfigError { .. })
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Config::load(Some(path.as_path())),
            Err(StorimpError::ConfigError { .. })
        ));
    }
}
