//! User-defined application storage

use crate::events::{EventChannel, StoreChange};
use async_trait::async_trait;
use cfgsnap_scanner::ApplicationDescriptor;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors from an application store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("An application with identifier {0} already exists")]
    DuplicateIdentifier(String),

    #[error("Application not found: {0}")]
    NotFound(Uuid),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of the user-defined applications
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn load_user_defined(&self) -> Result<Vec<ApplicationDescriptor>, StoreError>;
}

/// Combine presets with user-defined apps.
///
/// Bundle identifiers are unique in the result: a user-defined app whose
/// identifier is already taken is dropped.
#[must_use]
pub fn merge_applications(
    presets: Vec<ApplicationDescriptor>,
    user_defined: Vec<ApplicationDescriptor>,
) -> Vec<ApplicationDescriptor> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(presets.len() + user_defined.len());
    for app in presets.into_iter().chain(user_defined) {
        if seen.insert(app.bundle_identifier.clone()) {
            merged.push(app);
        } else {
            warn!(
                app = %app.name,
                identifier = %app.bundle_identifier,
                "duplicate bundle identifier, ignoring"
            );
        }
    }
    merged
}

/// In-memory store, announcing every mutation on an optional channel
#[derive(Debug, Default)]
pub struct MemoryApplicationStore {
    apps: RwLock<Vec<ApplicationDescriptor>>,
    reserved: HashSet<String>,
    changes: Option<EventChannel<StoreChange>>,
}

impl MemoryApplicationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers user-defined apps may not take, typically the presets'
    #[must_use]
    pub fn with_reserved(mut self, identifiers: impl IntoIterator<Item = String>) -> Self {
        self.reserved = identifiers.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_changes(mut self, changes: EventChannel<StoreChange>) -> Self {
        self.changes = Some(changes);
        self
    }

    /// Add a user-defined application
    ///
    /// # Errors
    /// Returns [`StoreError::DuplicateIdentifier`] if the bundle identifier is
    /// taken by a preset or another stored app.
    pub async fn add(&self, mut app: ApplicationDescriptor) -> Result<Uuid, StoreError> {
        let mut apps = self.apps.write().await;
        if self.is_taken(&apps, &app.bundle_identifier, None) {
            return Err(StoreError::DuplicateIdentifier(app.bundle_identifier));
        }
        app.is_user_defined = true;
        let id = app.id;
        apps.push(app);
        drop(apps);

        self.announce(StoreChange::Added(id));
        Ok(id)
    }

    /// Replace a stored application with the same id
    ///
    /// # Errors
    /// Returns an error if no app has that id or the new identifier collides.
    pub async fn update(&self, app: ApplicationDescriptor) -> Result<(), StoreError> {
        let mut apps = self.apps.write().await;
        if self.is_taken(&apps, &app.bundle_identifier, Some(app.id)) {
            return Err(StoreError::DuplicateIdentifier(app.bundle_identifier));
        }
        let slot = apps
            .iter_mut()
            .find(|a| a.id == app.id)
            .ok_or(StoreError::NotFound(app.id))?;
        let id = app.id;
        *slot = ApplicationDescriptor {
            is_user_defined: true,
            ..app
        };
        drop(apps);

        self.announce(StoreChange::Updated(id));
        Ok(())
    }

    /// Remove applications by id; unknown ids are ignored
    pub async fn remove(&self, ids: &[Uuid]) {
        let mut apps = self.apps.write().await;
        let before = apps.len();
        apps.retain(|a| !ids.contains(&a.id));
        let removed = before - apps.len();
        drop(apps);

        if removed > 0 {
            self.announce(StoreChange::Removed(ids.to_vec()));
        }
    }

    /// Replace the whole set, e.g. after an import
    pub async fn replace_all(&self, apps: Vec<ApplicationDescriptor>) {
        *self.apps.write().await = apps;
        self.announce(StoreChange::BatchUpdated);
    }

    fn is_taken(&self, apps: &[ApplicationDescriptor], identifier: &str, except: Option<Uuid>) -> bool {
        self.reserved.contains(identifier)
            || apps
                .iter()
                .any(|a| a.bundle_identifier == identifier && Some(a.id) != except)
    }

    fn announce(&self, change: StoreChange) {
        debug!(?change, "user applications changed");
        if let Some(changes) = &self.changes {
            changes.publish(change);
        }
    }
}

#[async_trait]
impl ApplicationStore for MemoryApplicationStore {
    async fn load_user_defined(&self) -> Result<Vec<ApplicationDescriptor>, StoreError> {
        Ok(self.apps.read().await.clone())
    }
}

/// Store persisted as a JSON array on disk
#[derive(Debug, Clone)]
pub struct JsonApplicationStore {
    path: PathBuf,
}

impl JsonApplicationStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `apps`, replacing the file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub async fn save(&self, apps: &[ApplicationDescriptor]) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(apps)?;
        tokio::fs::write(&self.path, json).await.map_err(io_err)
    }
}

#[async_trait]
impl ApplicationStore for JsonApplicationStore {
    async fn load_user_defined(&self) -> Result<Vec<ApplicationDescriptor>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let mut apps: Vec<ApplicationDescriptor> = serde_json::from_str(&content)?;
        for app in &mut apps {
            app.is_user_defined = true;
        }
        Ok(apps)
    }
}
