//! Client side of the coordinator task

use super::state::ViewState;
use super::CoordinatorError;
use crate::operation::ProgressUpdate;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

pub(crate) type Reply = oneshot::Sender<Result<(), CoordinatorError>>;

#[derive(Debug)]
pub(crate) enum Command {
    LoadApplications,
    ScanSnapshots,
    SelectSnapshot(Option<Uuid>),
    SetAppSelected(Uuid, bool),
    SetSnapshotAppSelected(Uuid, bool),
    Backup(Reply),
    Restore(Reply),
    Shutdown(oneshot::Sender<()>),
}

/// Cheap, cloneable access to a running coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
    state: watch::Receiver<ViewState>,
    progress: watch::Receiver<Option<ProgressUpdate>>,
}

impl CoordinatorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<Command>,
        state: watch::Receiver<ViewState>,
        progress: watch::Receiver<Option<ProgressUpdate>>,
    ) -> Self {
        Self {
            tx,
            state,
            progress,
        }
    }

    /// Watch the view state
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Watch progress of the running write operation
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<Option<ProgressUpdate>> {
        self.progress.clone()
    }

    /// Current view state
    #[must_use]
    pub fn current_state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// Rebuild the application list, superseding any load in flight
    pub async fn load_applications(&self) -> Result<(), CoordinatorError> {
        self.send(Command::LoadApplications).await
    }

    /// Re-enumerate the backup root, superseding any scan in flight
    pub async fn scan_snapshots(&self) -> Result<(), CoordinatorError> {
        self.send(Command::ScanSnapshots).await
    }

    pub async fn select_snapshot(&self, id: Option<Uuid>) -> Result<(), CoordinatorError> {
        self.send(Command::SelectSnapshot(id)).await
    }

    pub async fn set_app_selected(&self, id: Uuid, selected: bool) -> Result<(), CoordinatorError> {
        self.send(Command::SetAppSelected(id, selected)).await
    }

    pub async fn set_snapshot_app_selected(
        &self,
        entry_id: Uuid,
        selected: bool,
    ) -> Result<(), CoordinatorError> {
        self.send(Command::SetSnapshotAppSelected(entry_id, selected))
            .await
    }

    /// Start a backup of the selected installed apps.
    ///
    /// Resolves once the backup has started; completion is published on the
    /// event bus.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Busy`] while another write is running.
    pub async fn backup(&self) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Backup(reply)).await?;
        rx.await.map_err(|_| CoordinatorError::Closed)?
    }

    /// Start restoring the selected snapshot's selected entries.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Busy`] while another write is running, or
    /// [`CoordinatorError::NoSnapshotSelected`].
    pub async fn restore(&self) -> Result<(), CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Restore(reply)).await?;
        rx.await.map_err(|_| CoordinatorError::Closed)?
    }

    /// Stop the coordinator, cancelling pending reads
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.tx.send(Command::Shutdown(done)).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn send(&self, command: Command) -> Result<(), CoordinatorError> {
        self.tx
            .send(command)
            .await
            .map_err(|_| CoordinatorError::Closed)
    }
}
