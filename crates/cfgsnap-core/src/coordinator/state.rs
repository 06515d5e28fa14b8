//! Observable coordinator state

use crate::operation::OperationKind;
use cfgsnap_scanner::{ApplicationDescriptor, BackupSnapshot};
use std::path::PathBuf;

/// Everything a front end needs to render
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Presets plus user-defined apps with resolved installation state
    pub apps: Vec<ApplicationDescriptor>,
    /// Snapshots under the backup root, newest first
    pub snapshots: Vec<BackupSnapshot>,
    pub selected_snapshot: Option<BackupSnapshot>,
    /// The write operation in flight, if any
    pub running: Option<OperationKind>,
    pub backup_root: PathBuf,
}

impl ViewState {
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.running.is_some()
    }

    /// Apps that a backup would include
    pub fn backup_candidates(&self) -> impl Iterator<Item = &ApplicationDescriptor> {
        self.apps.iter().filter(|a| a.is_selected && a.is_installed)
    }

    /// Re-point the selection at the snapshot with the same directory, or
    /// clear it if that snapshot is gone. Returns whether a selection existed.
    pub(crate) fn follow_selection(&mut self) -> bool {
        let Some(previous) = self.selected_snapshot.take() else {
            return false;
        };
        self.selected_snapshot = self
            .snapshots
            .iter()
            .find(|s| s.root_path == previous.root_path)
            .cloned();
        true
    }
}
