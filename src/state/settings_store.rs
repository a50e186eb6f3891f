//! JSON file persistence for timer settings

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

use super::TimerSettings;

/// Settings store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the settings file failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The settings file exists but is not valid
    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for settings store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Stores a single `TimerSettings` record in a JSON file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Create a store backed by the file at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, falling back to defaults when the file does not exist yet
    pub fn load(&self) -> Result<TimerSettings> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", self.path.display());
                return Ok(TimerSettings::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_str(&contents).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Save settings, creating parent directories as needed
    pub fn save(&self, settings: &TimerSettings) -> Result<()> {
        let io_err = |source: io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(settings).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(io_err)?;

        info!("Timer settings saved to {}", self.path.display());
        Ok(())
    }
}
