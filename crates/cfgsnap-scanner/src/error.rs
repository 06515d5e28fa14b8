//! Error types for the cfgsnap scanner

use std::path::PathBuf;
use thiserror::Error;

/// Result type for scanner operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur during discovery
#[derive(Error, Debug)]
pub enum ScanError {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// The backup root exists but cannot be listed
    #[error("Cannot read backup root {path}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No manifest in a per-app directory
    #[error("Missing manifest in {0}")]
    MissingManifest(PathBuf),

    /// Home directory not found
    #[error("Home directory not found")]
    HomeNotFound,
}
