//! cfgsnap Scanner - application and snapshot discovery
//!
//! This crate provides the snapshot model, path pattern expansion,
//! installation probing, and read-only enumeration of snapshot
//! directories. Nothing here writes to the filesystem except the
//! manifest writer used by the backup engine.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::map_unwrap_or
)]

pub mod error;
pub mod manifest;
pub mod paths;
pub mod presets;
pub mod probe;
pub mod snapshots;
pub mod types;

pub use error::{ScanError, ScanResult};
pub use probe::{InstallProbe, ProbeTarget, SystemProbe};
pub use snapshots::{scan_snapshot_apps, scan_snapshots};
pub use types::{
    AppManifest, ApplicationDescriptor, BackupSnapshot, Category, SnapshotAppEntry,
};
