//! Concurrent installation resolution
//!
//! One blocking probe per descriptor runs on the blocking pool; results are
//! collected in completion order. A cancelled pass yields nothing at all.

use cfgsnap_scanner::{ApplicationDescriptor, InstallProbe};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors from a resolution pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Resolution pass was cancelled")]
    Cancelled,
}

/// Fans installation probes out over the blocking pool
#[derive(Clone)]
pub struct InstallationResolver {
    probe: Arc<dyn InstallProbe>,
}

impl std::fmt::Debug for InstallationResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationResolver").finish_non_exhaustive()
    }
}

impl InstallationResolver {
    #[must_use]
    pub fn new(probe: Arc<dyn InstallProbe>) -> Self {
        Self { probe }
    }

    /// The probe, shared with snapshot enumeration
    #[must_use]
    pub fn probe(&self) -> Arc<dyn InstallProbe> {
        Arc::clone(&self.probe)
    }

    /// Resolve the installation state of every descriptor.
    ///
    /// # Errors
    /// Returns [`ResolveError::Cancelled`] if `cancel` fires before every probe
    /// has completed. Outstanding probes are aborted and no partial result is
    /// returned.
    pub async fn resolve_all(
        &self,
        descriptors: &[ApplicationDescriptor],
        cancel: &CancellationToken,
    ) -> Result<HashMap<Uuid, bool>, ResolveError> {
        let mut probes = JoinSet::new();
        for descriptor in descriptors {
            let probe = Arc::clone(&self.probe);
            let id = descriptor.id;
            let target = descriptor.probe_target();
            probes.spawn_blocking(move || (id, probe.is_installed(&target)));
        }

        let mut resolved = HashMap::with_capacity(descriptors.len());
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    probes.abort_all();
                    debug!(pending = probes.len(), "resolution pass cancelled");
                    return Err(ResolveError::Cancelled);
                }
                next = probes.join_next() => match next {
                    Some(Ok((id, installed))) => {
                        resolved.insert(id, installed);
                    }
                    Some(Err(e)) => {
                        warn!("installation probe failed: {e}");
                    }
                    None => break,
                },
            }
        }

        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        Ok(resolved)
    }

    /// Write a resolution result into the descriptors.
    ///
    /// Selection is reset to follow installation state. Descriptors whose probe
    /// did not report are treated as not installed.
    pub fn apply(descriptors: &mut [ApplicationDescriptor], resolved: &HashMap<Uuid, bool>) {
        for descriptor in descriptors {
            let installed = resolved.get(&descriptor.id).copied().unwrap_or(false);
            descriptor.is_installed = installed;
            descriptor.is_selected = installed;
        }
    }
}
