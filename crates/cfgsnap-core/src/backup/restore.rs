//! Restore of a snapshot onto the live filesystem

use crate::apply::{FileMutator, MutationError, MutationOutcome};
use crate::operation::{OperationKind, OperationResult, ProgressReporter, ProgressSink};
use cfgsnap_scanner::paths::{entry_names, expand_path, home_dir};
use cfgsnap_scanner::{BackupSnapshot, ScanError, SnapshotAppEntry};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors during restore
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Snapshot directory not found: {0}")]
    SnapshotMissing(PathBuf),

    #[error("Could not determine home directory: {0}")]
    Home(#[from] ScanError),
}

/// Every path of one app that failed to restore
#[derive(Debug)]
struct AppRestoreFailure(Vec<(PathBuf, MutationError)>);

impl fmt::Display for AppRestoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (path, err)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}: {err}", path.display())?;
        }
        Ok(())
    }
}

/// Restores selected snapshot entries into a home directory
#[derive(Debug, Clone)]
pub struct RestoreOrchestrator {
    mutator: FileMutator,
    home: PathBuf,
}

impl RestoreOrchestrator {
    /// Restore into `home`
    #[must_use]
    pub fn new(home: PathBuf) -> Self {
        Self {
            mutator: FileMutator::default(),
            home,
        }
    }

    /// Restore into the current user's home directory
    pub fn for_current_user() -> Result<Self, RestoreError> {
        Ok(Self::new(home_dir()?))
    }

    #[must_use]
    pub fn with_mutator(mut self, mutator: FileMutator) -> Self {
        self.mutator = mutator;
        self
    }

    /// Expand `~` against another home directory
    #[must_use]
    pub fn with_home(mut self, home: PathBuf) -> Self {
        self.home = home;
        self
    }

    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Restore every selected entry of `snapshot`.
    ///
    /// Existing live files are moved to `.bak` before being replaced. One app
    /// failing never stops the others.
    ///
    /// # Errors
    /// Returns an error if the snapshot directory no longer exists.
    pub async fn perform_restore(
        &self,
        snapshot: &BackupSnapshot,
        on_progress: &ProgressSink<'_>,
    ) -> Result<OperationResult, RestoreError> {
        let mut progress = ProgressReporter::new(on_progress);
        let mut result = OperationResult::default();

        let selected: Vec<&SnapshotAppEntry> = snapshot.selected_apps().collect();
        if selected.is_empty() {
            info!(snapshot = %snapshot.name, "nothing selected for restore");
            progress.report(1.0, Some(result.summary(OperationKind::Restore)));
            return Ok(result);
        }

        if !tokio::fs::try_exists(&snapshot.root_path)
            .await
            .unwrap_or(false)
        {
            progress.report(1.0, Some("The backup no longer exists.".to_string()));
            return Err(RestoreError::SnapshotMissing(snapshot.root_path.clone()));
        }

        let total = selected.len();
        progress.report(0.0, Some(format!("Restoring {total} apps")));
        info!(
            snapshot = %snapshot.name,
            home = %self.home.display(),
            apps = total,
            "restore started"
        );

        for (i, entry) in selected.iter().enumerate() {
            match self.restore_app(entry).await {
                Ok(restored) => {
                    info!(app = %entry.name, paths = restored, "app restored");
                    result.record_success();
                }
                Err(e) => {
                    warn!(app = %entry.name, "restore failed: {e}");
                    result.record_failure(entry.name.clone(), e);
                }
            }
            progress.step(i + 1, total, format!("Restored {}", entry.name));
        }

        let summary = result.summary(OperationKind::Restore);
        info!("{summary}");
        progress.report(1.0, Some(summary));
        Ok(result)
    }

    /// Restore each config path of one app, continuing past failed paths
    async fn restore_app(&self, entry: &SnapshotAppEntry) -> Result<usize, AppRestoreFailure> {
        let mut restored = 0;
        let mut failures = Vec::new();

        let names = entry_names(&entry.config_paths);
        for (pattern, name) in entry.config_paths.iter().zip(names) {
            let Some(name) = name else {
                debug!(pattern = %pattern, "pattern has no entry of its own, skipping");
                continue;
            };
            let source = entry.dir.join(name);
            let destination = expand_path(pattern, &self.home);

            match self.mutator.restore_one(&source, &destination).await {
                Ok(MutationOutcome::Restored { .. }) => restored += 1,
                Ok(MutationOutcome::Skipped) => {}
                Err(e) => failures.push((destination, e)),
            }
        }

        if failures.is_empty() {
            Ok(restored)
        } else {
            Err(AppRestoreFailure(failures))
        }
    }
}
