//! Snapshot creation

use crate::apply::{EntryCopier, FsCopier};
use crate::diff::{plan_app, AppPlan, DiffError, EntryKind};
use crate::operation::{OperationKind, OperationResult, ProgressReporter, ProgressSink};
use cfgsnap_scanner::manifest::write_manifest;
use cfgsnap_scanner::paths::{sanitize_dir_name, snapshot_name};
use cfgsnap_scanner::{ApplicationDescriptor, BackupSnapshot, ScanError, SnapshotAppEntry};
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How many same-second snapshot names are tried before giving up
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Errors during snapshot creation
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Failed to create snapshot directory {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to plan copy: {0}")]
    Plan(#[from] DiffError),

    #[error("Failed to write manifest: {0}")]
    Manifest(#[from] ScanError),

    #[error("Backup task failed: {0}")]
    Task(String),
}

/// Backup behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupOptions {
    /// Reuse unchanged content from the base snapshot
    pub incremental: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self { incremental: true }
    }
}

/// What was written for one app
#[derive(Debug, Default, Clone, Copy)]
struct AppStats {
    copied: usize,
    copied_bytes: u64,
    reused: usize,
}

/// Writes new snapshots under a backup root
#[derive(Clone)]
pub struct BackupOrchestrator {
    root: PathBuf,
    home: PathBuf,
    copier: Arc<dyn EntryCopier>,
    options: BackupOptions,
}

impl std::fmt::Debug for BackupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupOrchestrator")
            .field("root", &self.root)
            .field("home", &self.home)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl BackupOrchestrator {
    /// Create an orchestrator writing under `root`, expanding `~` to `home`
    #[must_use]
    pub fn new(root: PathBuf, home: PathBuf) -> Self {
        Self {
            root,
            home,
            copier: Arc::new(FsCopier),
            options: BackupOptions::default(),
        }
    }

    #[must_use]
    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    #[must_use]
    pub fn with_copier(mut self, copier: Arc<dyn EntryCopier>) -> Self {
        self.copier = copier;
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Back up every app that is both selected and installed into a new
    /// snapshot, reusing unchanged content from `base`.
    ///
    /// One app failing never stops the others. With nothing to back up no
    /// snapshot directory is created.
    ///
    /// # Errors
    /// Returns an error only if the snapshot directory itself cannot be
    /// created.
    pub async fn perform_backup(
        &self,
        apps: &[ApplicationDescriptor],
        base: Option<&BackupSnapshot>,
        on_progress: &ProgressSink<'_>,
    ) -> Result<OperationResult, BackupError> {
        let mut progress = ProgressReporter::new(on_progress);
        let mut result = OperationResult::default();

        let selected: Vec<&ApplicationDescriptor> = apps
            .iter()
            .filter(|a| a.is_selected && a.is_installed)
            .collect();

        if selected.is_empty() {
            info!("nothing selected for backup");
            progress.report(1.0, Some(result.summary(OperationKind::Backup)));
            return Ok(result);
        }

        let total = selected.len();
        progress.report(0.0, Some(format!("Backing up {total} apps")));

        let base = base.filter(|_| self.options.incremental);
        let snapshot_dir = match self.create_snapshot_dir().await {
            Ok(dir) => dir,
            Err(e) => {
                progress.report(1.0, Some("Could not create the backup folder.".to_string()));
                return Err(e);
            }
        };
        info!(
            snapshot = %snapshot_dir.display(),
            base = base.map_or("none", |b| b.name.as_str()),
            apps = total,
            "backup started"
        );

        for (i, app) in selected.iter().enumerate() {
            let base_entry = base.and_then(|b| b.app(&app.bundle_identifier)).cloned();
            match self.backup_app(app, base_entry, &snapshot_dir).await {
                Ok(stats) => {
                    info!(
                        app = %app.name,
                        copied = stats.copied,
                        bytes = stats.copied_bytes,
                        reused = stats.reused,
                        "app backed up"
                    );
                    result.record_success();
                }
                Err(e) => {
                    warn!(app = %app.name, "backup failed: {e}");
                    result.record_failure(app.name.clone(), e);
                }
            }
            progress.step(i + 1, total, format!("Backed up {}", app.name));
        }

        if result.success_count == 0 {
            if let Err(e) = tokio::fs::remove_dir_all(&snapshot_dir).await {
                warn!(snapshot = %snapshot_dir.display(), "failed to remove empty snapshot: {e}");
            }
        }

        let summary = result.summary(OperationKind::Backup);
        info!("{summary}");
        progress.report(1.0, Some(summary));
        Ok(result)
    }

    async fn create_snapshot_dir(&self) -> Result<PathBuf, BackupError> {
        let create_root = |source| BackupError::CreateRoot {
            path: self.root.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(create_root)?;

        let name = snapshot_name(Utc::now());
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = if attempt == 0 {
                name.clone()
            } else {
                format!("{name}_{attempt:02}")
            };
            let path = self.root.join(candidate);
            match tokio::fs::create_dir(&path).await {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(BackupError::CreateRoot { path, source }),
            }
        }
        Err(create_root(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "no free snapshot name",
        )))
    }

    async fn backup_app(
        &self,
        app: &ApplicationDescriptor,
        base: Option<SnapshotAppEntry>,
        snapshot_dir: &Path,
    ) -> Result<AppStats, BackupError> {
        let app = app.clone();
        let snapshot_dir = snapshot_dir.to_path_buf();
        let home = self.home.clone();
        let copier = Arc::clone(&self.copier);

        tokio::task::spawn_blocking(move || {
            write_app(&app, base.as_ref(), &snapshot_dir, &home, copier.as_ref())
        })
        .await
        .map_err(|e| BackupError::Task(e.to_string()))?
    }
}

/// Write one app into the snapshot. A failed app leaves no directory behind.
fn write_app(
    app: &ApplicationDescriptor,
    base: Option<&SnapshotAppEntry>,
    snapshot_dir: &Path,
    home: &Path,
    copier: &dyn EntryCopier,
) -> Result<AppStats, BackupError> {
    let app_dir = snapshot_dir.join(app_dir_name(snapshot_dir, app));
    fs::create_dir(&app_dir).map_err(|source| BackupError::Io {
        path: app_dir.clone(),
        source,
    })?;

    let written = plan_app(&app.config_paths, base, home)
        .map_err(BackupError::from)
        .and_then(|plan| execute_plan(&plan, &app_dir, copier))
        .and_then(|stats| {
            write_manifest(&app_dir, &app.manifest())?;
            Ok(stats)
        });

    if written.is_err() {
        if let Err(e) = fs::remove_dir_all(&app_dir) {
            warn!(dir = %app_dir.display(), "failed to clean up partial app directory: {e}");
        }
    }
    written
}

fn execute_plan(
    plan: &AppPlan,
    app_dir: &Path,
    copier: &dyn EntryCopier,
) -> Result<AppStats, BackupError> {
    let mut stats = AppStats::default();

    for copy in &plan.copies {
        let dest = app_dir.join(&copy.relative);
        match copy.kind {
            EntryKind::Directory => create_dir(&dest)?,
            EntryKind::File => {
                create_parent(&dest)?;
                copier
                    .copy_file(&copy.source, &dest)
                    .map_err(|source| BackupError::Io {
                        path: copy.source.clone(),
                        source,
                    })?;
                stats.copied += 1;
                stats.copied_bytes += copy.size;
            }
        }
    }

    for reused in &plan.reused {
        let dest = app_dir.join(&reused.relative);
        match reused.kind {
            EntryKind::Directory => create_dir(&dest)?,
            EntryKind::File => {
                create_parent(&dest)?;
                link_or_copy(&reused.base, &dest, copier)?;
                stats.reused += 1;
            }
        }
    }

    Ok(stats)
}

/// Share content with the base snapshot through a hard link, falling back to
/// a copy where links are not supported
fn link_or_copy(base: &Path, dest: &Path, copier: &dyn EntryCopier) -> Result<(), BackupError> {
    if let Err(e) = fs::hard_link(base, dest) {
        debug!(base = %base.display(), "hard link failed ({e}), copying");
        copier
            .copy_file(base, dest)
            .map_err(|source| BackupError::Io {
                path: base.to_path_buf(),
                source,
            })?;
    }
    Ok(())
}

fn create_dir(path: &Path) -> Result<(), BackupError> {
    fs::create_dir_all(path).map_err(|source| BackupError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn create_parent(path: &Path) -> Result<(), BackupError> {
    match path.parent() {
        Some(parent) => create_dir(parent),
        None => Ok(()),
    }
}

/// Per-app directory name: the app name, disambiguated by bundle identifier
/// when two apps share a name
fn app_dir_name(snapshot_dir: &Path, app: &ApplicationDescriptor) -> String {
    let plain = sanitize_dir_name(&app.name);
    if !snapshot_dir.join(&plain).exists() {
        return plain;
    }
    let qualified = sanitize_dir_name(&format!("{} ({})", app.name, app.bundle_identifier));
    let mut candidate = qualified.clone();
    let mut n = 2;
    while snapshot_dir.join(&candidate).exists() {
        candidate = format!("{qualified} {n}");
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsnap_scanner::Category;
    use tempfile::TempDir;

    fn installed(name: &str, id: &str) -> ApplicationDescriptor {
        let mut app = ApplicationDescriptor::new(name, id, vec![], Category::Other);
        app.is_installed = true;
        app.is_selected = true;
        app
    }

    #[test]
    fn test_app_dir_name_collision() {
        let tmp = TempDir::new().unwrap();
        let a = installed("Notes", "com.a.notes");
        let b = installed("Notes", "com.b.notes");

        let first = app_dir_name(tmp.path(), &a);
        assert_eq!(first, "Notes");
        fs::create_dir(tmp.path().join(&first)).unwrap();

        let second = app_dir_name(tmp.path(), &b);
        assert_eq!(second, "Notes (com.b.notes)");
    }

    #[tokio::test]
    async fn test_same_second_snapshots_get_distinct_names() {
        let tmp = TempDir::new().unwrap();
        let orchestrator = BackupOrchestrator::new(tmp.path().join("root"), tmp.path().to_path_buf());

        let a = orchestrator.create_snapshot_dir().await.unwrap();
        let b = orchestrator.create_snapshot_dir().await.unwrap();
        assert_ne!(a, b);
        for dir in [a, b] {
            let name = dir.file_name().unwrap().to_str().unwrap().to_string();
            assert!(cfgsnap_scanner::paths::parse_snapshot_name(&name).is_some());
        }
    }
}
