//! cfgsnap Core - backup engine, restore, and coordination
//!
//! This crate provides incremental snapshot creation, conflict-safe restore,
//! concurrent installation resolution, typed event channels, and the
//! coordinator task that ties them together.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::must_use_candidate,
    clippy::module_name_repetitions
)]

pub mod apply;
pub mod backup;
pub mod catalog;
pub mod coordinator;
pub mod diff;
pub mod events;
pub mod operation;
pub mod resolve;
pub mod settings;
pub mod store;

pub use cfgsnap_scanner;

pub use backup::{BackupOptions, BackupOrchestrator, RestoreOrchestrator};
pub use coordinator::{Coordinator, CoordinatorError, CoordinatorHandle, Services, ViewState};
pub use diff::{compute_copy_set, AppPlan, CopyInstruction};
pub use events::{EventBus, OperationCompleted, StoreChange};
pub use operation::{OperationKind, OperationResult, OperationStatus, ProgressUpdate};
pub use settings::Settings;
