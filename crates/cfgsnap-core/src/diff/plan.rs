//! Copy plan generation
//!
//! Live entries are compared with their counterpart in the base snapshot by
//! size, then by SHA-256 of the content. Modification times are never
//! consulted: too many tools touch files without changing them.

use crate::diff::{AppPlan, CopyInstruction, CopyReason, EntryKind, ReusedEntry};
use cfgsnap_scanner::paths::{entry_names, expand_path};
use cfgsnap_scanner::SnapshotAppEntry;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors during plan generation
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> DiffError + '_ {
    move |source| DiffError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Live entries that must be copied for a new snapshot of one app.
///
/// With no `base` this is every existing entry. With a `base` only new and
/// changed entries are listed.
///
/// # Errors
/// Returns an error if a live path or a base entry cannot be read
pub fn compute_copy_set(
    config_paths: &[String],
    base: Option<&SnapshotAppEntry>,
    home: &Path,
) -> Result<Vec<CopyInstruction>, DiffError> {
    Ok(plan_app(config_paths, base, home)?.copies)
}

/// Full plan for one app: live copies plus base entries to carry forward.
///
/// Carrying forward keeps every snapshot independently restorable, including
/// files since deleted from a still-existing live directory. A config path
/// that no longer exists at all contributes nothing.
///
/// Entries are named by [`entry_names`], so config paths sharing a final
/// component are captured side by side. Each path is compared with the base
/// entry captured for the same pattern.
///
/// # Errors
/// Returns an error if a live path or a base entry cannot be read
pub fn plan_app(
    config_paths: &[String],
    base: Option<&SnapshotAppEntry>,
    home: &Path,
) -> Result<AppPlan, DiffError> {
    let mut plan = AppPlan::default();
    let base_names: HashMap<&str, String> = base
        .map(|b| {
            b.config_paths
                .iter()
                .zip(entry_names(&b.config_paths))
                .filter_map(|(p, n)| Some((p.trim_end_matches('/'), n?)))
                .collect()
        })
        .unwrap_or_default();

    for (pattern, name) in config_paths.iter().zip(entry_names(config_paths)) {
        let Some(name) = name else {
            warn!(pattern = %pattern, "config path has no usable final component or repeats another");
            continue;
        };

        let live = expand_path(pattern, home);
        let base_root = base
            .zip(base_names.get(pattern.trim_end_matches('/')))
            .map(|(b, base_name)| b.dir.join(base_name))
            .filter(|p| fs::symlink_metadata(p).is_ok());

        plan_path(&live, Path::new(&name), base_root.as_deref(), &mut plan)?;
    }

    plan.copies.sort_by(|a, b| a.relative.cmp(&b.relative));
    plan.reused.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(plan)
}

struct LiveEntry {
    path: PathBuf,
    /// Path below the config path root; empty for the root itself
    sub: PathBuf,
    kind: EntryKind,
    size: u64,
}

fn plan_path(
    live: &Path,
    name: &Path,
    base_root: Option<&Path>,
    plan: &mut AppPlan,
) -> Result<(), DiffError> {
    let meta = match fs::metadata(live) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %live.display(), "config path does not exist, skipping");
            return Ok(());
        }
        Err(e) => return Err(io_err(live)(e)),
    };

    let entries = collect_live(live, &meta)?;

    let Some(base_root) = base_root else {
        plan.copies.extend(entries.into_iter().map(|e| CopyInstruction {
            source: e.path,
            relative: join_sub(name, &e.sub),
            kind: e.kind,
            reason: CopyReason::New,
            size: e.size,
        }));
        return Ok(());
    };

    let decisions = entries
        .par_iter()
        .map(|e| decide(e, &join_sub(base_root, &e.sub)))
        .collect::<Result<Vec<_>, _>>()?;

    let live_kinds: HashMap<&Path, EntryKind> =
        entries.iter().map(|e| (e.sub.as_path(), e.kind)).collect();
    let mut copied = HashSet::new();

    for (entry, reason) in entries.iter().zip(decisions) {
        if let Some(reason) = reason {
            copied.insert(entry.sub.clone());
            plan.copies.push(CopyInstruction {
                source: entry.path.clone(),
                relative: join_sub(name, &entry.sub),
                kind: entry.kind,
                reason,
                size: entry.size,
            });
        }
    }

    for base_entry in WalkDir::new(base_root).follow_links(false) {
        let base_entry = base_entry?;
        let file_type = base_entry.file_type();
        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            continue;
        };
        let sub = base_entry
            .path()
            .strip_prefix(base_root)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        if copied.contains(&sub) {
            continue;
        }
        if live_kinds.get(sub.as_path()).is_some_and(|k| *k != kind) {
            continue;
        }
        // Anything below a path that is now a plain file is gone
        let under_live_file = sub
            .ancestors()
            .skip(1)
            .any(|a| live_kinds.get(a) == Some(&EntryKind::File));
        if under_live_file {
            continue;
        }

        plan.reused.push(ReusedEntry {
            base: base_entry.path().to_path_buf(),
            relative: join_sub(name, &sub),
            kind,
        });
    }

    Ok(())
}

fn collect_live(live: &Path, meta: &fs::Metadata) -> Result<Vec<LiveEntry>, DiffError> {
    if !meta.is_dir() {
        return Ok(vec![LiveEntry {
            path: live.to_path_buf(),
            sub: PathBuf::new(),
            kind: EntryKind::File,
            size: meta.len(),
        }]);
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(live).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let sub = entry
            .path()
            .strip_prefix(live)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let kind = if entry.depth() == 0 || entry.file_type().is_dir() {
            EntryKind::Directory
        } else if entry.file_type().is_file() {
            EntryKind::File
        } else {
            debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        };
        let size = match kind {
            EntryKind::File => entry.metadata()?.len(),
            EntryKind::Directory => 0,
        };

        entries.push(LiveEntry {
            path: entry.path().to_path_buf(),
            sub,
            kind,
            size,
        });
    }
    Ok(entries)
}

/// `root` joined with `sub`, without the trailing separator `Path::join`
/// leaves for an empty `sub`
fn join_sub(root: &Path, sub: &Path) -> PathBuf {
    if sub.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(sub)
    }
}

/// Compare one live entry with its base counterpart
fn decide(entry: &LiveEntry, base: &Path) -> Result<Option<CopyReason>, DiffError> {
    let base_meta = match fs::symlink_metadata(base) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Some(CopyReason::New)),
        Err(e) => return Err(io_err(base)(e)),
    };

    match entry.kind {
        EntryKind::Directory => Ok((!base_meta.is_dir()).then_some(CopyReason::New)),
        EntryKind::File => {
            if !base_meta.is_file() {
                return Ok(Some(CopyReason::New));
            }
            if base_meta.len() != entry.size {
                return Ok(Some(CopyReason::Modified));
            }
            let live_hash = hash_file(&entry.path).map_err(io_err(&entry.path))?;
            let base_hash = hash_file(base).map_err(io_err(base))?;
            Ok((live_hash != base_hash).then_some(CopyReason::Modified))
        }
    }
}

/// SHA-256 of a file's content, hex encoded
///
/// # Errors
/// Returns an error if the file cannot be read
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
