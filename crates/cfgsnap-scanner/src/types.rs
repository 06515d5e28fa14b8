//! Snapshot model shared by the scanner and the backup engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::probe::ProbeTarget;

/// Application category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Browser,
    Development,
    Editor,
    Terminal,
    Shell,
    Productivity,
    Communication,
    Design,
    Media,
    Utility,
    #[default]
    Other,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Browser => "browser",
            Category::Development => "development",
            Category::Editor => "editor",
            Category::Terminal => "terminal",
            Category::Shell => "shell",
            Category::Productivity => "productivity",
            Category::Communication => "communication",
            Category::Design => "design",
            Category::Media => "media",
            Category::Utility => "utility",
            Category::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "browser" => Ok(Category::Browser),
            "development" => Ok(Category::Development),
            "editor" => Ok(Category::Editor),
            "terminal" => Ok(Category::Terminal),
            "shell" => Ok(Category::Shell),
            "productivity" => Ok(Category::Productivity),
            "communication" => Ok(Category::Communication),
            "design" => Ok(Category::Design),
            "media" => Ok(Category::Media),
            "utility" => Ok(Category::Utility),
            "other" => Ok(Category::Other),
            _ => Err(format!("Invalid category: {s}")),
        }
    }
}

/// An application whose configuration can be backed up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDescriptor {
    /// Unique identifier
    pub id: Uuid,
    /// Display name
    pub name: String,
    /// Stable key used to match the app across runs and snapshots
    pub bundle_identifier: String,
    /// Configuration path patterns, possibly starting with `~`
    pub config_paths: Vec<String>,
    pub category: Category,
    /// Defined by the user rather than the preset catalogue
    #[serde(default)]
    pub is_user_defined: bool,
    pub created_at: DateTime<Utc>,
    /// Recomputed on every resolution pass
    #[serde(skip)]
    pub is_installed: bool,
    /// Recomputed on every resolution pass
    #[serde(skip)]
    pub is_selected: bool,
}

impl ApplicationDescriptor {
    /// Create a new user-defined application
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        bundle_identifier: impl Into<String>,
        config_paths: Vec<String>,
        category: Category,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            bundle_identifier: bundle_identifier.into(),
            config_paths,
            category,
            is_user_defined: true,
            created_at: Utc::now(),
            is_installed: false,
            is_selected: false,
        }
    }

    /// Identity handed to an [`InstallProbe`](crate::InstallProbe)
    #[must_use]
    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget {
            name: self.name.clone(),
            bundle_identifier: self.bundle_identifier.clone(),
        }
    }

    /// Manifest recorded for this app when it is backed up
    #[must_use]
    pub fn manifest(&self) -> AppManifest {
        AppManifest {
            name: self.name.clone(),
            bundle_identifier: self.bundle_identifier.clone(),
            config_paths: self.config_paths.clone(),
            category: self.category,
        }
    }
}

/// Per-app record persisted inside a snapshot.
///
/// Installation and selection state are never written; they are recomputed
/// whenever the snapshot is read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub name: String,
    pub bundle_identifier: String,
    pub config_paths: Vec<String>,
    #[serde(default)]
    pub category: Category,
}

/// One application captured in a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotAppEntry {
    /// Unique identifier, regenerated on every enumeration
    pub id: Uuid,
    pub name: String,
    pub bundle_identifier: String,
    /// Config path patterns as captured at backup time
    pub config_paths: Vec<String>,
    pub category: Category,
    /// Directory inside the snapshot holding this app's copied entries
    pub dir: PathBuf,
    pub is_currently_installed: bool,
    pub is_selected: bool,
}

impl SnapshotAppEntry {
    /// Build an entry from a manifest read out of `dir`
    #[must_use]
    pub fn from_manifest(manifest: AppManifest, dir: PathBuf, is_currently_installed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: manifest.name,
            bundle_identifier: manifest.bundle_identifier,
            config_paths: manifest.config_paths,
            category: manifest.category,
            dir,
            is_currently_installed,
            is_selected: is_currently_installed,
        }
    }

    #[must_use]
    pub fn probe_target(&self) -> ProbeTarget {
        ProbeTarget {
            name: self.name.clone(),
            bundle_identifier: self.bundle_identifier.clone(),
        }
    }
}

/// One complete backup on disk
#[derive(Debug, Clone, PartialEq)]
pub struct BackupSnapshot {
    /// Unique identifier, regenerated on every enumeration
    pub id: Uuid,
    /// The snapshot directory
    pub root_path: PathBuf,
    /// Directory name, e.g. `Backup_2026-10-19_14-03-22`
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub apps: Vec<SnapshotAppEntry>,
}

impl BackupSnapshot {
    /// Find the entry captured for a bundle identifier
    #[must_use]
    pub fn app(&self, bundle_identifier: &str) -> Option<&SnapshotAppEntry> {
        self.apps
            .iter()
            .find(|a| a.bundle_identifier == bundle_identifier)
    }

    /// Entries the user has selected for restore
    pub fn selected_apps(&self) -> impl Iterator<Item = &SnapshotAppEntry> {
        self.apps.iter().filter(|a| a.is_selected)
    }
}
