//! Conflict-safe writes back onto the live filesystem

pub mod copier;
pub mod mutate;

pub use copier::{copy_entry, EntryCopier, FsCopier};
pub use mutate::{backup_path, FileMutator, MutationError, MutationOutcome};
