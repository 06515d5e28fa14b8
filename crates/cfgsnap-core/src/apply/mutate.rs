//! Conflict-safe restore of a single path
//!
//! An existing destination is moved to `<destination>.bak` before anything is
//! copied over it. If the copy then fails the `.bak` is left where it is: the
//! previous content is never silently lost, and a half-written destination is
//! never clobbered by an automatic rollback.

use crate::apply::copier::{copy_entry, EntryCopier, FsCopier};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors while restoring one path
#[derive(Error, Debug)]
pub enum MutationError {
    #[error("Permission denied: {path}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to create parent directory {path}: {source}")]
    CreateParent {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move {path} aside: {source}")]
    Preserve {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Restore task failed: {0}")]
    Task(String),
}

/// What happened to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Nothing to restore from
    Skipped,
    /// Source copied into place; `previous` holds the moved-aside original
    Restored { previous: Option<PathBuf> },
}

/// Path the previous content of `destination` is preserved under
#[must_use]
pub fn backup_path(destination: &Path) -> PathBuf {
    let mut s = destination.as_os_str().to_os_string();
    s.push(".bak");
    PathBuf::from(s)
}

/// Restores captured entries onto live paths
#[derive(Clone)]
pub struct FileMutator {
    copier: Arc<dyn EntryCopier>,
}

impl Default for FileMutator {
    fn default() -> Self {
        Self::new(Arc::new(FsCopier))
    }
}

impl std::fmt::Debug for FileMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMutator").finish_non_exhaustive()
    }
}

impl FileMutator {
    #[must_use]
    pub fn new(copier: Arc<dyn EntryCopier>) -> Self {
        Self { copier }
    }

    /// Copy `source` over `destination`, preserving any existing destination
    /// as `destination.bak`.
    ///
    /// # Errors
    /// Returns an error if the parent cannot be created, the original cannot be
    /// moved aside, or the copy fails.
    pub async fn restore_one(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<MutationOutcome, MutationError> {
        let copier = Arc::clone(&self.copier);
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();
        tokio::task::spawn_blocking(move || restore_one_blocking(copier.as_ref(), &source, &destination))
            .await
            .map_err(|e| MutationError::Task(e.to_string()))?
    }
}

/// Blocking body of [`FileMutator::restore_one`]
///
/// # Errors
/// See [`FileMutator::restore_one`].
pub fn restore_one_blocking(
    copier: &dyn EntryCopier,
    source: &Path,
    destination: &Path,
) -> Result<MutationOutcome, MutationError> {
    if !source.exists() {
        debug!(source = %source.display(), "nothing captured, skipping");
        return Ok(MutationOutcome::Skipped);
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                MutationError::PermissionDenied {
                    path: parent.to_path_buf(),
                    source: e,
                }
            } else {
                MutationError::CreateParent {
                    path: parent.to_path_buf(),
                    source: e,
                }
            }
        })?;
    }

    let mut previous = None;
    if fs::symlink_metadata(destination).is_ok() {
        let bak = backup_path(destination);
        let preserve = |e: io::Error| MutationError::Preserve {
            path: destination.to_path_buf(),
            source: e,
        };
        if fs::symlink_metadata(&bak).is_ok() {
            remove_path(&bak).map_err(preserve)?;
        }
        fs::rename(destination, &bak).map_err(preserve)?;
        debug!(original = %destination.display(), bak = %bak.display(), "moved existing entry aside");
        previous = Some(bak);
    }

    copy_entry(copier, source, destination).map_err(|e| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            MutationError::PermissionDenied {
                path: destination.to_path_buf(),
                source: e,
            }
        } else {
            MutationError::Copy {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
                source: e,
            }
        }
    })?;

    info!(to = %destination.display(), "restored");
    Ok(MutationOutcome::Restored { previous })
}

fn remove_path(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}
