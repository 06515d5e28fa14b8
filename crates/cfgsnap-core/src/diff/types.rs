//! Copy plan types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Why an entry has to be copied from the live filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyReason {
    /// Not present in the base snapshot
    New,
    /// Present in the base snapshot with different content
    Modified,
}

/// One live entry to copy into the new snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopyInstruction {
    /// Live path to read from
    pub source: PathBuf,
    /// Destination relative to the app's snapshot directory
    pub relative: PathBuf,
    pub kind: EntryKind,
    pub reason: CopyReason,
    /// Byte size for files, zero for directories
    pub size: u64,
}

/// One entry carried over unchanged from the base snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReusedEntry {
    /// Path inside the base snapshot
    pub base: PathBuf,
    /// Destination relative to the app's snapshot directory
    pub relative: PathBuf,
    pub kind: EntryKind,
}

/// Everything needed to write one app into a new snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppPlan {
    /// Entries read from the live filesystem
    pub copies: Vec<CopyInstruction>,
    /// Entries carried forward from the base snapshot
    pub reused: Vec<ReusedEntry>,
}

impl AppPlan {
    /// Check if nothing at all would be written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.copies.is_empty() && self.reused.is_empty()
    }

    /// Bytes that have to be read from the live filesystem
    #[must_use]
    pub fn bytes_to_copy(&self) -> u64 {
        self.copies.iter().map(|c| c.size).sum()
    }
}
