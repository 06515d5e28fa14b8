//! Path pattern expansion and snapshot naming

use crate::error::{ScanError, ScanResult};
use crate::manifest::MANIFEST_FILE;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Prefix of every snapshot directory name
pub const SNAPSHOT_PREFIX: &str = "Backup_";

/// `chrono` format of the timestamp part of a snapshot name, always in UTC.
/// Zero-padded and most-significant first, so names sort chronologically.
pub const SNAPSHOT_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Home directory of the current user
pub fn home_dir() -> ScanResult<PathBuf> {
    dirs::home_dir().ok_or(ScanError::HomeNotFound)
}

/// Expand a config path pattern against `home`.
///
/// `~` and `~/...` are replaced by `home`; anything else is taken literally.
/// Trailing slashes are dropped.
#[must_use]
pub fn expand_path(pattern: &str, home: &Path) -> PathBuf {
    let trimmed = pattern.trim_end_matches('/');
    let pattern = if trimmed.is_empty() { pattern } else { trimmed };
    if pattern == "~" {
        home.to_path_buf()
    } else if let Some(rest) = pattern.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(pattern)
    }
}

/// Final path component of a pattern, used to name its copy inside a snapshot
#[must_use]
pub fn entry_name(pattern: &str) -> Option<String> {
    let trimmed = pattern.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "~" {
        return None;
    }
    Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}

/// Entry names for every config path of one app, in pattern order.
///
/// The first pattern with a given final component keeps it as is; later ones
/// get `name (2)`, `name (3)` and so on, never clashing with another
/// pattern's plain name or the manifest file. A repeat of an earlier pattern,
/// or a pattern with no usable final component, maps to `None`.
///
/// Backup and restore both derive names from the manifest's ordered
/// `config_paths` through this function, so they always agree.
#[must_use]
pub fn entry_names(patterns: &[String]) -> Vec<Option<String>> {
    let plain: HashSet<String> = patterns.iter().filter_map(|p| entry_name(p)).collect();
    let mut taken = HashSet::from([MANIFEST_FILE.to_string()]);
    let mut seen = HashSet::new();
    let mut names = Vec::with_capacity(patterns.len());

    for pattern in patterns {
        let first = seen.insert(pattern.trim_end_matches('/'));
        let Some(name) = entry_name(pattern).filter(|_| first) else {
            names.push(None);
            continue;
        };
        if taken.insert(name.clone()) {
            names.push(Some(name));
            continue;
        }
        let mut n = 2;
        let renamed = loop {
            let candidate = format!("{name} ({n})");
            if !plain.contains(&candidate) && !taken.contains(&candidate) {
                break candidate;
            }
            n += 1;
        };
        taken.insert(renamed.clone());
        names.push(Some(renamed));
    }
    names
}

/// Snapshot directory name for a creation time
#[must_use]
pub fn snapshot_name(at: DateTime<Utc>) -> String {
    format!("{SNAPSHOT_PREFIX}{}", at.format(SNAPSHOT_TIME_FORMAT))
}

/// Parse the UTC creation time out of a snapshot directory name.
///
/// Accepts `Backup_<timestamp>` and the collision form `Backup_<timestamp>_<n>`.
/// Returns `None` for anything else.
#[must_use]
pub fn parse_snapshot_name(name: &str) -> Option<DateTime<Utc>> {
    let rest = name.strip_prefix(SNAPSHOT_PREFIX)?;
    let (stamp, suffix) = match (rest.get(..19), rest.get(19..)) {
        (Some(stamp), Some(suffix)) => (stamp, suffix),
        _ => (rest, ""),
    };
    if !suffix.is_empty() {
        let n = suffix.strip_prefix('_')?;
        if n.is_empty() || !n.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    let naive = NaiveDateTime::parse_from_str(stamp, SNAPSHOT_TIME_FORMAT).ok()?;
    Some(naive.and_utc())
}

/// Turn an app name into a single safe directory component
#[must_use]
pub fn sanitize_dir_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned
    }
}
