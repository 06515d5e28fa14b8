//! Incremental backup planning

pub mod plan;
mod types;

pub use plan::{compute_copy_set, hash_file, plan_app, DiffError};
pub use types::*;
