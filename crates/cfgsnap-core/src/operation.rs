//! Operation results and progress reporting shared by backup and restore

use serde::{Deserialize, Serialize};
use std::fmt;

/// The write operations the engine performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Backup,
    Restore,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Backup => write!(f, "backup"),
            OperationKind::Restore => write!(f, "restore"),
        }
    }
}

/// One app that failed inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    /// App display name
    pub name: String,
    /// Underlying error, kept for diagnostics only
    pub error: String,
}

/// Aggregate outcome of a backup or restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success_count: usize,
    pub failed_entries: Vec<FailedEntry>,
    pub total_processed: usize,
}

/// Status derived from an [`OperationResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Everything processed succeeded
    Success,
    /// Nothing was processed
    NoOp,
    /// Some apps succeeded, some failed
    Partial,
    /// Every processed app failed
    Failed,
}

impl OperationResult {
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.total_processed += 1;
    }

    pub fn record_failure(&mut self, name: impl Into<String>, error: impl fmt::Display) {
        self.failed_entries.push(FailedEntry {
            name: name.into(),
            error: error.to_string(),
        });
        self.total_processed += 1;
    }

    #[must_use]
    pub fn status(&self) -> OperationStatus {
        if self.total_processed == 0 {
            OperationStatus::NoOp
        } else if self.failed_entries.is_empty() && self.success_count > 0 {
            OperationStatus::Success
        } else if self.success_count == 0 {
            OperationStatus::Failed
        } else {
            OperationStatus::Partial
        }
    }

    /// Names of the apps that failed, in processing order
    #[must_use]
    pub fn failed_names(&self) -> Vec<&str> {
        self.failed_entries.iter().map(|f| f.name.as_str()).collect()
    }

    /// User-facing status line.
    ///
    /// Names failed apps but never includes the underlying error text.
    #[must_use]
    pub fn summary(&self, kind: OperationKind) -> String {
        let verb = match kind {
            OperationKind::Backup => "Backed up",
            OperationKind::Restore => "Restored",
        };
        let failed = self.failed_names().join(", ");
        match self.status() {
            OperationStatus::NoOp => match kind {
                OperationKind::Backup => "No installed apps selected for backup.".to_string(),
                OperationKind::Restore => "No apps selected for restore.".to_string(),
            },
            OperationStatus::Success => format!("{verb} {}.", apps(self.success_count)),
            OperationStatus::Partial => format!(
                "{verb} {} of {}. Failed: {failed}.",
                self.success_count,
                apps(self.total_processed)
            ),
            OperationStatus::Failed => {
                let noun = match kind {
                    OperationKind::Backup => "Backup",
                    OperationKind::Restore => "Restore",
                };
                format!("{noun} failed for {failed}.")
            }
        }
    }
}

fn apps(n: usize) -> String {
    if n == 1 {
        "1 app".to_string()
    } else {
        format!("{n} apps")
    }
}

/// A progress notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Between 0.0 and 1.0, never decreasing within one operation
    pub fraction: f64,
    pub message: Option<String>,
}

/// Caller-supplied progress sink
pub type ProgressSink<'s> = dyn Fn(ProgressUpdate) + Send + Sync + 's;

/// Enforces the progress contract on top of a sink: fractions are clamped
/// into range and never go backwards.
pub(crate) struct ProgressReporter<'a> {
    sink: &'a ProgressSink<'a>,
    last: f64,
}

impl<'a> ProgressReporter<'a> {
    pub(crate) fn new(sink: &'a ProgressSink<'a>) -> Self {
        Self { sink, last: 0.0 }
    }

    pub(crate) fn report(&mut self, fraction: f64, message: Option<String>) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        (self.sink)(ProgressUpdate { fraction, message });
    }

    pub(crate) fn step(&mut self, done: usize, total: usize, message: String) {
        #[allow(clippy::cast_precision_loss)]
        let fraction = if total == 0 {
            1.0
        } else {
            done as f64 / total as f64
        };
        // 1.0 is reserved for the final update carrying the summary
        self.report(fraction.min(0.99), Some(message));
    }
}
