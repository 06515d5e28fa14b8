//! The coordinator task
//!
//! A single task owns the view state and is the only place it changes.
//! Commands arrive from [`CoordinatorHandle`]s, results of background work
//! arrive as completions, and store or settings changes arrive over the
//! [`EventBus`]. Reads supersede each other: starting a load or scan cancels
//! the previous one of the same kind, and a completion is committed only if
//! it belongs to the newest pass. Writes are exclusive.

mod handle;
mod state;

pub use handle::CoordinatorHandle;
pub use state::ViewState;

use crate::backup::{
    BackupError, BackupOptions, BackupOrchestrator, RestoreError, RestoreOrchestrator,
};
use crate::catalog;
use crate::events::{EventBus, OperationCompleted, StoreChange, Subscription};
use crate::operation::{OperationKind, OperationResult, ProgressUpdate};
use crate::resolve::{InstallationResolver, ResolveError};
use crate::settings::Settings;
use crate::store::{merge_applications, ApplicationStore, StoreError};
use cfgsnap_scanner::paths::home_dir;
use cfgsnap_scanner::presets::preset_applications;
use cfgsnap_scanner::{ApplicationDescriptor, BackupSnapshot, InstallProbe, ScanError, SystemProbe};
use handle::{Command, Reply};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const COMMAND_BUFFER: usize = 32;

/// Errors surfaced by the coordinator
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Coordinator is not running")]
    Closed,

    #[error("A {0} is already running")]
    Busy(OperationKind),

    #[error("No snapshot selected")]
    NoSnapshotSelected,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error(transparent)]
    Restore(#[from] RestoreError),
}

/// Collaborators the coordinator drives
#[derive(Clone)]
pub struct Services {
    pub resolver: InstallationResolver,
    /// Root and options are replaced per operation from the current settings
    pub backup: BackupOrchestrator,
    pub restore: RestoreOrchestrator,
    pub store: Arc<dyn ApplicationStore>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("resolver", &self.resolver)
            .field("backup", &self.backup)
            .field("restore", &self.restore)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Wire default orchestrators for `home` around a probe and a store
    #[must_use]
    pub fn new(probe: Arc<dyn InstallProbe>, home: PathBuf, store: Arc<dyn ApplicationStore>) -> Self {
        Self {
            resolver: InstallationResolver::new(probe),
            backup: BackupOrchestrator::new(Settings::default().backup_root, home.clone()),
            restore: RestoreOrchestrator::new(home),
            store,
        }
    }

    /// Services for the current user with the system installation probe
    pub fn for_current_user(store: Arc<dyn ApplicationStore>) -> Result<Self, CoordinatorError> {
        let home = home_dir()?;
        let probe = Arc::new(SystemProbe::new(home.clone()));
        Ok(Self::new(probe, home, store))
    }
}

/// Result of background work, delivered back to the coordinator task
enum Completion {
    Apps {
        generation: u64,
        result: Result<Vec<ApplicationDescriptor>, CoordinatorError>,
    },
    Snapshots {
        generation: u64,
        result: Result<Vec<BackupSnapshot>, CoordinatorError>,
    },
    Operation {
        kind: OperationKind,
        result: Result<OperationResult, CoordinatorError>,
    },
}

/// Supersession bookkeeping for one kind of read
#[derive(Debug, Default)]
struct ReadPass {
    generation: u64,
    token: Option<CancellationToken>,
}

impl ReadPass {
    /// Invalidate whatever is in flight
    fn supersede(&mut self) -> u64 {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
        self.generation += 1;
        self.generation
    }

    fn begin(&mut self) -> (u64, CancellationToken) {
        let generation = self.supersede();
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        (generation, token)
    }

    /// Claim a completion; false if it was superseded
    fn accept(&mut self, generation: u64) -> bool {
        let current = generation == self.generation
            && self.token.as_ref().is_some_and(|t| !t.is_cancelled());
        if current {
            self.token = None;
        }
        current
    }
}

/// Coordinator built but not yet running
pub struct Coordinator {
    actor: Actor,
    commands: mpsc::Receiver<Command>,
    completions: mpsc::UnboundedReceiver<Completion>,
    inputs: BusInputs,
    handle: CoordinatorHandle,
}

impl Coordinator {
    #[must_use]
    pub fn new(services: Services, bus: EventBus, settings: Settings) -> Self {
        let state = ViewState {
            backup_root: settings.backup_root.clone(),
            ..ViewState::default()
        };
        let (state_tx, state_rx) = watch::channel(state.clone());
        let (progress_tx, progress_rx) = watch::channel(None);
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (completion_tx, completions) = mpsc::unbounded_channel();

        // Subscribe before the task starts so no input is missed
        let inputs = BusInputs {
            user_apps_changed: bus.user_apps_changed.subscribe(),
            settings_window_closed: bus.settings_window_closed.subscribe(),
            preferences_directory_changed: bus.preferences_directory_changed.subscribe(),
        };

        Self {
            actor: Actor {
                services,
                bus,
                settings,
                state,
                state_tx,
                progress_tx: Arc::new(progress_tx),
                completion_tx,
                apps_pass: ReadPass::default(),
                scan_pass: ReadPass::default(),
            },
            commands,
            completions,
            inputs,
            handle: CoordinatorHandle::new(command_tx, state_rx, progress_rx),
        }
    }

    /// Start the coordinator task
    #[must_use]
    pub fn spawn(self) -> CoordinatorHandle {
        let Self {
            actor,
            commands,
            completions,
            inputs,
            handle,
        } = self;
        tokio::spawn(actor.run(commands, completions, inputs));
        handle
    }
}

struct BusInputs {
    user_apps_changed: Subscription<StoreChange>,
    settings_window_closed: Subscription<()>,
    preferences_directory_changed: Subscription<PathBuf>,
}

struct Actor {
    services: Services,
    bus: EventBus,
    settings: Settings,
    state: ViewState,
    state_tx: watch::Sender<ViewState>,
    progress_tx: Arc<watch::Sender<Option<ProgressUpdate>>>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    apps_pass: ReadPass,
    scan_pass: ReadPass,
}

impl Actor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
        mut inputs: BusInputs,
    ) {
        info!(root = %self.state.backup_root.display(), "coordinator started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown(done)) => {
                        self.apps_pass.supersede();
                        self.scan_pass.supersede();
                        let _ = done.send(());
                        break;
                    }
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some(completion) = completions.recv() => self.handle_completion(completion).await,
                Some(change) = inputs.user_apps_changed.recv() => {
                    debug!(?change, "user applications changed, reloading");
                    self.load_applications();
                }
                Some(()) = inputs.settings_window_closed.recv() => {
                    debug!("settings closed, reloading applications");
                    self.load_applications();
                }
                Some(root) = inputs.preferences_directory_changed.recv() => {
                    self.change_backup_root(root);
                }
            }
        }
        info!("coordinator stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::LoadApplications => self.load_applications(),
            Command::ScanSnapshots => self.scan_snapshots(),
            Command::SelectSnapshot(id) => self.select_snapshot(id),
            Command::SetAppSelected(id, selected) => self.set_app_selected(id, selected),
            Command::SetSnapshotAppSelected(id, selected) => {
                self.set_snapshot_app_selected(id, selected);
            }
            Command::Backup(reply) => self.start_backup(reply),
            Command::Restore(reply) => self.start_restore(reply),
            Command::Shutdown(_) => {}
        }
    }

    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Apps { generation, result } => {
                if !self.apps_pass.accept(generation) {
                    debug!(generation, "discarding superseded application list");
                    return;
                }
                match result {
                    Ok(apps) => self.commit_apps(apps),
                    Err(CoordinatorError::Resolve(ResolveError::Cancelled)) => {
                        debug!(generation, "application load cancelled");
                    }
                    Err(e) => error!("failed to load applications: {e}"),
                }
            }
            Completion::Snapshots { generation, result } => {
                if !self.scan_pass.accept(generation) {
                    debug!(generation, "discarding superseded snapshot list");
                    return;
                }
                match result {
                    Ok(snapshots) => self.commit_snapshots(snapshots),
                    Err(e) => {
                        error!("failed to scan snapshots: {e}");
                        self.commit_snapshots(Vec::new());
                    }
                }
            }
            Completion::Operation { kind, result } => self.finish_operation(kind, result).await,
        }
    }

    fn load_applications(&mut self) {
        let (generation, token) = self.apps_pass.begin();
        let store = Arc::clone(&self.services.store);
        let resolver = self.services.resolver.clone();
        let include_presets = self.settings.include_presets;
        let tx = self.completion_tx.clone();
        debug!(generation, "loading applications");

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return,
                r = resolve_applications(store.as_ref(), &resolver, include_presets, &token) => r,
            };
            let _ = tx.send(Completion::Apps { generation, result });
        });
    }

    fn scan_snapshots(&mut self) {
        let (generation, token) = self.scan_pass.begin();
        let root = self.state.backup_root.clone();
        let probe = self.services.resolver.probe();
        let tx = self.completion_tx.clone();
        debug!(generation, root = %root.display(), "scanning snapshots");

        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return,
                r = catalog::scan_snapshots(root, probe) => r.map_err(CoordinatorError::from),
            };
            let _ = tx.send(Completion::Snapshots { generation, result });
        });
    }

    /// Rescan inline so the new list is published before anything else.
    ///
    /// Commands queue behind this scan: `operation_completed` must never reach
    /// a subscriber ahead of the snapshot list it implies.
    async fn rescan_now(&mut self) {
        self.scan_pass.supersede();
        let root = self.state.backup_root.clone();
        match catalog::scan_snapshots(root, self.services.resolver.probe()).await {
            Ok(snapshots) => self.commit_snapshots(snapshots),
            Err(e) => {
                error!("failed to rescan snapshots: {e}");
                self.commit_snapshots(Vec::new());
            }
        }
    }

    fn commit_apps(&mut self, apps: Vec<ApplicationDescriptor>) {
        info!(
            count = apps.len(),
            installed = apps.iter().filter(|a| a.is_installed).count(),
            "applications loaded"
        );
        self.state.apps = apps;
        self.bus.apps_updated.publish(self.state.apps.clone());
        self.publish_view();
    }

    fn commit_snapshots(&mut self, snapshots: Vec<BackupSnapshot>) {
        info!(count = snapshots.len(), "snapshots loaded");
        self.state.snapshots = snapshots;
        let had_selection = self.state.follow_selection();

        self.bus.snapshots_updated.publish(self.state.snapshots.clone());
        if had_selection {
            self.bus
                .selected_snapshot_updated
                .publish(self.state.selected_snapshot.clone());
        }
        self.publish_view();
    }

    fn select_snapshot(&mut self, id: Option<Uuid>) {
        let selected = id.and_then(|id| self.state.snapshots.iter().find(|s| s.id == id).cloned());
        if id.is_some() && selected.is_none() {
            warn!(?id, "unknown snapshot, clearing selection");
        }
        self.state.selected_snapshot = selected;
        self.bus
            .selected_snapshot_updated
            .publish(self.state.selected_snapshot.clone());
        self.publish_view();
    }

    fn set_app_selected(&mut self, id: Uuid, selected: bool) {
        let Some(app) = self.state.apps.iter_mut().find(|a| a.id == id) else {
            warn!(%id, "unknown application");
            return;
        };
        app.is_selected = selected;
        self.bus.apps_updated.publish(self.state.apps.clone());
        self.publish_view();
    }

    fn set_snapshot_app_selected(&mut self, entry_id: Uuid, selected: bool) {
        let entry = self
            .state
            .selected_snapshot
            .as_mut()
            .and_then(|s| s.apps.iter_mut().find(|e| e.id == entry_id));
        let Some(entry) = entry else {
            warn!(%entry_id, "entry not in the selected snapshot");
            return;
        };
        entry.is_selected = selected;
        self.bus
            .selected_snapshot_updated
            .publish(self.state.selected_snapshot.clone());
        self.publish_view();
    }

    fn change_backup_root(&mut self, root: PathBuf) {
        info!(root = %root.display(), "backup root changed");
        self.settings.backup_root.clone_from(&root);
        self.state.backup_root = root;
        self.state.selected_snapshot = None;
        self.bus.selected_snapshot_updated.publish(None);
        // Nothing from the old root stays selectable or serves as a base
        self.commit_snapshots(Vec::new());
        self.scan_snapshots();
    }

    /// Claim the write slot, or reject with the operation holding it
    fn begin_operation(&mut self, kind: OperationKind, reply: Reply) -> Option<Reply> {
        if let Some(running) = self.state.running {
            warn!(%running, requested = %kind, "write operation already running, ignoring");
            let _ = reply.send(Err(CoordinatorError::Busy(running)));
            return None;
        }
        self.state.running = Some(kind);
        self.progress_tx.send_replace(None);
        self.bus.operation_started.publish(kind);
        self.publish_view();
        Some(reply)
    }

    fn progress_sink(&self) -> impl Fn(ProgressUpdate) + Send + Sync + 'static {
        let tx = Arc::clone(&self.progress_tx);
        move |update| {
            tx.send_replace(Some(update));
        }
    }

    fn start_backup(&mut self, reply: Reply) {
        let Some(reply) = self.begin_operation(OperationKind::Backup, reply) else {
            return;
        };
        let orchestrator = self
            .services
            .backup
            .clone()
            .with_root(self.state.backup_root.clone())
            .with_options(BackupOptions {
                incremental: self.settings.incremental,
            });
        let apps = self.state.apps.clone();
        let base = self.state.snapshots.first().cloned();
        let sink = self.progress_sink();
        let tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let result = orchestrator
                .perform_backup(&apps, base.as_ref(), &sink)
                .await
                .map_err(CoordinatorError::from);
            let _ = tx.send(Completion::Operation {
                kind: OperationKind::Backup,
                result,
            });
        });
        let _ = reply.send(Ok(()));
    }

    fn start_restore(&mut self, reply: Reply) {
        let Some(snapshot) = self.state.selected_snapshot.clone() else {
            warn!("restore requested without a selected snapshot");
            let _ = reply.send(Err(CoordinatorError::NoSnapshotSelected));
            return;
        };
        let Some(reply) = self.begin_operation(OperationKind::Restore, reply) else {
            return;
        };
        let orchestrator = self.services.restore.clone();
        let sink = self.progress_sink();
        let tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let result = orchestrator
                .perform_restore(&snapshot, &sink)
                .await
                .map_err(CoordinatorError::from);
            let _ = tx.send(Completion::Operation {
                kind: OperationKind::Restore,
                result,
            });
        });
        let _ = reply.send(Ok(()));
    }

    async fn finish_operation(
        &mut self,
        kind: OperationKind,
        result: Result<OperationResult, CoordinatorError>,
    ) {
        self.state.running = None;
        let (result, summary) = match result {
            Ok(result) => {
                let summary = result.summary(kind);
                (result, summary)
            }
            Err(e) => {
                error!(%kind, "operation failed: {e}");
                (
                    OperationResult::default(),
                    format!("The {kind} could not be completed."),
                )
            }
        };

        if kind == OperationKind::Backup {
            self.rescan_now().await;
        }
        self.publish_view();
        self.bus.operation_completed.publish(OperationCompleted {
            kind,
            result,
            summary,
        });

        if kind == OperationKind::Restore {
            self.load_applications();
        }
    }

    fn publish_view(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

/// Build the application list and resolve installation state
async fn resolve_applications(
    store: &dyn ApplicationStore,
    resolver: &InstallationResolver,
    include_presets: bool,
    cancel: &CancellationToken,
) -> Result<Vec<ApplicationDescriptor>, CoordinatorError> {
    let user_defined = store.load_user_defined().await?;
    let presets = if include_presets {
        preset_applications()
    } else {
        Vec::new()
    };
    let mut apps = merge_applications(presets, user_defined);
    let resolved = resolver.resolve_all(&apps, cancel).await?;
    InstallationResolver::apply(&mut apps, &resolved);
    Ok(apps)
}
