//! Snapshot enumeration
//!
//! Lists the snapshot directories under a backup root, newest first, and
//! reads back the apps captured in each. Installation state is re-resolved
//! on every read; it is never taken from disk.

use crate::error::{ScanError, ScanResult};
use crate::manifest::read_manifest;
use crate::paths::parse_snapshot_name;
use crate::probe::InstallProbe;
use crate::types::{BackupSnapshot, SnapshotAppEntry};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Enumerate the snapshots under `root`, most recent first.
///
/// A missing root is an empty list. Snapshots without a single readable app
/// are left out.
pub fn scan_snapshots(root: &Path, probe: &dyn InstallProbe) -> ScanResult<Vec<BackupSnapshot>> {
    if !root.exists() {
        debug!(root = %root.display(), "backup root does not exist yet");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).map_err(|source| ScanError::UnreadableRoot {
        path: root.to_path_buf(),
        source,
    })?;

    let mut candidates: Vec<(String, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            parse_snapshot_name(&name)?;
            Some((name, e.path()))
        })
        .collect();

    candidates.sort_by(|a, b| b.0.cmp(&a.0));

    let snapshots = candidates
        .into_par_iter()
        .filter_map(|(name, path)| {
            let created_at = parse_snapshot_name(&name)?;
            let apps = match scan_snapshot_apps(&path, probe) {
                Ok(apps) => apps,
                Err(e) => {
                    warn!(snapshot = %name, "failed to read snapshot: {e}");
                    return None;
                }
            };
            if apps.is_empty() {
                debug!(snapshot = %name, "skipping snapshot with no apps");
                return None;
            }
            Some(BackupSnapshot {
                id: Uuid::new_v4(),
                root_path: path,
                name,
                created_at,
                apps,
            })
        })
        .collect();

    Ok(snapshots)
}

/// Read the apps captured in one snapshot directory, sorted by name
pub fn scan_snapshot_apps(
    snapshot_dir: &Path,
    probe: &dyn InstallProbe,
) -> ScanResult<Vec<SnapshotAppEntry>> {
    let mut apps = Vec::new();

    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let dir = entry.path();
        match read_manifest(&dir) {
            Ok(manifest) => {
                let mut app = SnapshotAppEntry::from_manifest(manifest, dir, false);
                app.is_currently_installed = probe.is_installed(&app.probe_target());
                app.is_selected = app.is_currently_installed;
                apps.push(app);
            }
            Err(e) => {
                warn!(dir = %dir.display(), "skipping unreadable app entry: {e}");
            }
        }
    }

    apps.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(apps)
}
