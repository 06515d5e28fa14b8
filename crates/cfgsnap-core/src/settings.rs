//! Persistent user settings
//!
//! Stored as JSON at `<config dir>/cfgsnap/settings.json`. A missing file
//! means defaults; unknown keys are ignored and missing keys take their
//! default, so older files keep loading.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading or saving settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Could not determine the {0} directory")]
    NoDirectory(&'static str),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Where snapshots are written and enumerated
    pub backup_root: PathBuf,
    /// Offer the built-in application catalogue
    pub include_presets: bool,
    /// Reuse unchanged content from the newest snapshot
    pub incremental: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backup_root: default_backup_root(),
            include_presets: true,
            incremental: true,
        }
    }
}

fn default_backup_root() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("Documents"))
        .join("cfgsnap")
}

impl Settings {
    /// Default settings file location
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|d| d.join("cfgsnap").join("settings.json"))
            .ok_or(SettingsError::NoDirectory("config"))
    }

    /// Load settings, falling back to defaults if the file does not exist
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write settings as pretty JSON, creating parent directories
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_err = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(io_err)
    }
}
