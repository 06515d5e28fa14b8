//! Snapshot creation and restore

pub mod create;
pub mod restore;

pub use create::{BackupError, BackupOptions, BackupOrchestrator};
pub use restore::{RestoreError, RestoreOrchestrator};
