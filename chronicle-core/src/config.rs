//! Save-slot configuration.

use crate::state::DEFAULT_MAX_HISTORY_ITEMS;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default file name of the canonical save.
pub const DEFAULT_SAVE_FILE: &str = "story_state.json";

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// Where and how the story is saved.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding the save and its backup.
    pub save_dir: PathBuf,

    /// File name of the canonical save inside `save_dir`.
    pub file_name: String,

    /// Bound on the narrative and conversation logs of a fresh state.
    pub max_history_items: usize,

    /// Attempts for the rename and backup-copy steps.
    pub retry_attempts: u32,

    /// Delay between attempts.
    pub retry_delay: Duration,
}

impl StoreConfig {
    /// Create a config saving into `save_dir`.
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            file_name: DEFAULT_SAVE_FILE.to_string(),
            max_history_items: DEFAULT_MAX_HISTORY_ITEMS,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(50),
        }
    }

    /// Build a config from `CHRONICLE_SAVE_DIR`, `CHRONICLE_SAVE_FILE` and
    /// `CHRONICLE_MAX_HISTORY`. The save directory defaults to `./saves`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var("CHRONICLE_SAVE_DIR").unwrap_or_else(|_| "saves".to_string());
        let mut config = Self::new(dir);

        if let Ok(file_name) = std::env::var("CHRONICLE_SAVE_FILE") {
            if !file_name.trim().is_empty() {
                config.file_name = file_name;
            }
        }

        if let Ok(value) = std::env::var("CHRONICLE_MAX_HISTORY") {
            config.max_history_items = parse_history_bound(&value)?;
        }

        Ok(config)
    }

    /// Set the canonical save file name.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Set the history bound used for fresh states.
    pub fn with_max_history_items(mut self, max: usize) -> Self {
        self.max_history_items = max.max(1);
        self
    }

    /// Set how many times rename and copy are attempted.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Set the delay between attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Path of the canonical save.
    pub fn save_path(&self) -> PathBuf {
        self.save_dir.join(&self.file_name)
    }

    /// Path of the backup copy (`<canonical>.bak`).
    pub fn backup_path(&self) -> PathBuf {
        self.save_dir.join(format!("{}.bak", self.file_name))
    }

    /// Where an unreadable canonical save is copied before it is replaced
    /// (`<canonical>.corrupt`).
    pub fn corrupt_path(&self) -> PathBuf {
        self.save_dir.join(format!("{}.corrupt", self.file_name))
    }
}

fn parse_history_bound(value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: "CHRONICLE_MAX_HISTORY",
            value: value.to_string(),
        }),
    }
}
