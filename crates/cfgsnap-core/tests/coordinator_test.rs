//! Coordinator tests
//!
//! Supersession of reads, exclusive writes, and the event sequence around a
//! backup.

use cfgsnap_core::apply::{EntryCopier, FsCopier};
use cfgsnap_core::cfgsnap_scanner::{ApplicationDescriptor, Category, InstallProbe, ProbeTarget};
use cfgsnap_core::store::MemoryApplicationStore;
use cfgsnap_core::{
    Coordinator, CoordinatorError, CoordinatorHandle, EventBus, OperationKind, OperationStatus,
    Services, Settings, ViewState,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn app(name: &str, id: &str, paths: &[&str]) -> ApplicationDescriptor {
    ApplicationDescriptor::new(
        name,
        id,
        paths.iter().map(ToString::to_string).collect(),
        Category::Utility,
    )
}

fn settings(root: &Path) -> Settings {
    Settings {
        backup_root: root.to_path_buf(),
        include_presets: false,
        incremental: true,
    }
}

struct Fixture {
    home: TempDir,
    root: TempDir,
    bus: EventBus,
    store: Arc<MemoryApplicationStore>,
}

impl Fixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt::try_init();
        let bus = EventBus::new();
        let store = Arc::new(MemoryApplicationStore::new().with_changes(bus.user_apps_changed.clone()));
        Self {
            home: TempDir::new().unwrap(),
            root: TempDir::new().unwrap(),
            bus,
            store,
        }
    }

    fn services(&self, probe: Arc<dyn InstallProbe>) -> Services {
        Services::new(probe, self.home.path().to_path_buf(), self.store.clone())
    }

    fn start(&self, services: Services) -> CoordinatorHandle {
        Coordinator::new(services, self.bus.clone(), settings(self.root.path())).spawn()
    }
}

async fn wait_until(handle: &CoordinatorHandle, condition: impl Fn(&ViewState) -> bool) -> ViewState {
    let mut state = handle.state();
    let result = timeout(WAIT, state.wait_for(|s| condition(s)))
        .await
        .expect("timed out waiting for state")
        .expect("coordinator gone");
    result.clone()
}

/// Copies slowly so a write stays in flight
struct SlowCopier;

impl EntryCopier for SlowCopier {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        std::thread::sleep(Duration::from_millis(300));
        FsCopier.copy_file(from, to)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_superseded_load_is_discarded() {
    let fixture = Fixture::new();
    fixture.store.add(app("First", "com.example.first", &[])).await.unwrap();

    // The first pass is slow and would report everything installed
    let slow = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&slow);
    let probe = move |_: &ProbeTarget| {
        if flag.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(400));
            true
        } else {
            false
        }
    };
    let handle = fixture.start(fixture.services(Arc::new(probe)));

    handle.load_applications().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // A store change starts a second, fast pass
    slow.store(false, Ordering::SeqCst);
    fixture.store.add(app("Second", "com.example.second", &[])).await.unwrap();

    let state = wait_until(&handle, |s| s.apps.len() == 2).await;
    assert!(state.apps.iter().all(|a| !a.is_installed));

    // Give the abandoned probes time to finish; their answer never lands
    tokio::time::sleep(Duration::from_millis(600)).await;
    let state = handle.current_state();
    assert_eq!(state.apps.len(), 2);
    assert!(state.apps.iter().all(|a| !a.is_installed && !a.is_selected));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_backup_publishes_snapshots_before_completion() {
    let fixture = Fixture::new();
    fs::write(fixture.home.path().join(".gitconfig"), "[core]\n").unwrap();
    fixture
        .store
        .add(app("Git", "cli.git", &["~/.gitconfig"]))
        .await
        .unwrap();

    let handle = fixture.start(fixture.services(Arc::new(|_: &ProbeTarget| true)));
    handle.load_applications().await.unwrap();
    wait_until(&handle, |s| s.apps.len() == 1).await;

    let mut started = fixture.bus.operation_started.subscribe();
    let mut snapshots = fixture.bus.snapshots_updated.subscribe();
    let mut completed = fixture.bus.operation_completed.subscribe();

    handle.backup().await.unwrap();
    assert_eq!(
        timeout(WAIT, started.recv()).await.unwrap(),
        Some(OperationKind::Backup)
    );

    let done = timeout(WAIT, completed.recv()).await.unwrap().unwrap();
    assert_eq!(done.kind, OperationKind::Backup);
    assert_eq!(done.result.status(), OperationStatus::Success);
    assert_eq!(done.summary, "Backed up 1 app.");

    // Already delivered by the time the completion arrives
    let published = timeout(Duration::from_millis(50), snapshots.recv())
        .await
        .expect("snapshot list published before completion")
        .unwrap();
    assert_eq!(published.len(), 1);

    let state = handle.current_state();
    assert_eq!(state.snapshots.len(), 1);
    assert!(state.running.is_none());
    assert_eq!(handle.progress().borrow().as_ref().map(|p| p.fraction), Some(1.0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_write_rejected_while_busy() {
    let fixture = Fixture::new();
    fs::write(fixture.home.path().join(".gitconfig"), "[core]\n").unwrap();
    fixture
        .store
        .add(app("Git", "cli.git", &["~/.gitconfig"]))
        .await
        .unwrap();

    let mut services = fixture.services(Arc::new(|_: &ProbeTarget| true));
    services.backup = services.backup.clone().with_copier(Arc::new(SlowCopier));
    let handle = fixture.start(services);

    assert!(matches!(
        handle.restore().await,
        Err(CoordinatorError::NoSnapshotSelected)
    ));

    handle.load_applications().await.unwrap();
    wait_until(&handle, |s| s.apps.len() == 1).await;

    let mut completed = fixture.bus.operation_completed.subscribe();
    handle.backup().await.unwrap();
    assert!(matches!(
        handle.backup().await,
        Err(CoordinatorError::Busy(OperationKind::Backup))
    ));

    let done = timeout(WAIT, completed.recv()).await.unwrap().unwrap();
    assert_eq!(done.result.success_count, 1);
    // Exactly one snapshot was written
    assert_eq!(fs::read_dir(fixture.root.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn test_selection_follows_rescan_and_root_change_clears_it() {
    let fixture = Fixture::new();
    fs::write(fixture.home.path().join(".vimrc"), "set number").unwrap();
    fixture
        .store
        .add(app("Vim", "cli.vim", &["~/.vimrc"]))
        .await
        .unwrap();

    let handle = fixture.start(fixture.services(Arc::new(|_: &ProbeTarget| true)));
    handle.load_applications().await.unwrap();
    wait_until(&handle, |s| s.apps.len() == 1).await;

    let mut completed = fixture.bus.operation_completed.subscribe();
    handle.backup().await.unwrap();
    timeout(WAIT, completed.recv()).await.unwrap();

    let state = handle.current_state();
    let chosen = state.snapshots[0].clone();
    handle.select_snapshot(Some(chosen.id)).await.unwrap();
    wait_until(&handle, |s| s.selected_snapshot.is_some()).await;

    // Ids are regenerated by a rescan; the selection follows the directory
    handle.scan_snapshots().await.unwrap();
    let state = wait_until(&handle, |s| {
        s.selected_snapshot
            .as_ref()
            .is_some_and(|sel| sel.id != chosen.id)
    })
    .await;
    assert_eq!(
        state.selected_snapshot.map(|s| s.root_path),
        Some(chosen.root_path.clone())
    );

    let elsewhere: PathBuf = fixture.home.path().join("other-root");
    fixture
        .bus
        .preferences_directory_changed
        .publish(elsewhere.clone());
    let state = wait_until(&handle, |s| s.backup_root == elsewhere).await;
    assert!(state.selected_snapshot.is_none());
    let state = wait_until(&handle, |s| s.snapshots.is_empty()).await;
    assert!(state.selected_snapshot.is_none());
}

/// Start a coordinator with one backed-up app and return it once the
/// snapshot is listed
async fn backed_up(fixture: &Fixture) -> CoordinatorHandle {
    fs::write(fixture.home.path().join(".vimrc"), "set number").unwrap();
    fixture
        .store
        .add(app("Vim", "cli.vim", &["~/.vimrc"]))
        .await
        .unwrap();

    let handle = fixture.start(fixture.services(Arc::new(|_: &ProbeTarget| true)));
    handle.load_applications().await.unwrap();
    wait_until(&handle, |s| s.apps.len() == 1).await;

    let mut completed = fixture.bus.operation_completed.subscribe();
    handle.backup().await.unwrap();
    timeout(WAIT, completed.recv()).await.unwrap();
    assert_eq!(handle.current_state().snapshots.len(), 1);
    handle
}

#[tokio::test]
async fn test_unreadable_new_root_lists_no_snapshots() {
    let fixture = Fixture::new();
    let handle = backed_up(&fixture).await;
    let mut snapshots = fixture.bus.snapshots_updated.subscribe();

    let not_a_dir = fixture.home.path().join("not-a-dir");
    fs::write(&not_a_dir, "plain file").unwrap();
    fixture
        .bus
        .preferences_directory_changed
        .publish(not_a_dir.clone());

    let state = wait_until(&handle, |s| s.backup_root == not_a_dir).await;
    assert!(state.snapshots.is_empty());
    let published = timeout(WAIT, snapshots.recv()).await.unwrap().unwrap();
    assert!(published.is_empty());

    // The failed scan of the new root leaves the list empty
    let published = timeout(WAIT, snapshots.recv()).await.unwrap().unwrap();
    assert!(published.is_empty());
    assert!(handle.current_state().snapshots.is_empty());
}

#[tokio::test]
async fn test_failed_rescan_clears_snapshot_list() {
    let fixture = Fixture::new();
    let handle = backed_up(&fixture).await;
    let id = handle.current_state().snapshots[0].id;
    handle.select_snapshot(Some(id)).await.unwrap();
    wait_until(&handle, |s| s.selected_snapshot.is_some()).await;

    // The root turns into something that cannot be listed
    fs::remove_dir_all(fixture.root.path()).unwrap();
    fs::write(fixture.root.path(), "plain file").unwrap();

    let mut snapshots = fixture.bus.snapshots_updated.subscribe();
    handle.scan_snapshots().await.unwrap();
    let published = timeout(WAIT, snapshots.recv()).await.unwrap().unwrap();
    assert!(published.is_empty());

    let state = wait_until(&handle, |s| s.snapshots.is_empty()).await;
    assert!(state.selected_snapshot.is_none());
    assert!(matches!(
        handle.restore().await,
        Err(CoordinatorError::NoSnapshotSelected)
    ));
    fs::remove_file(fixture.root.path()).unwrap();
}

#[tokio::test]
async fn test_restore_reloads_applications() {
    let fixture = Fixture::new();
    fs::write(fixture.home.path().join(".zshrc"), "captured").unwrap();
    fixture
        .store
        .add(app("Zsh", "cli.zsh", &["~/.zshrc"]))
        .await
        .unwrap();

    let handle = fixture.start(fixture.services(Arc::new(|_: &ProbeTarget| true)));
    handle.load_applications().await.unwrap();
    wait_until(&handle, |s| s.apps.len() == 1).await;

    let mut completed = fixture.bus.operation_completed.subscribe();
    handle.backup().await.unwrap();
    timeout(WAIT, completed.recv()).await.unwrap();

    fs::write(fixture.home.path().join(".zshrc"), "edited").unwrap();
    let id = handle.current_state().snapshots[0].id;
    handle.select_snapshot(Some(id)).await.unwrap();
    wait_until(&handle, |s| s.selected_snapshot.is_some()).await;

    let mut apps = fixture.bus.apps_updated.subscribe();
    handle.restore().await.unwrap();
    let done = timeout(WAIT, completed.recv()).await.unwrap().unwrap();
    assert_eq!(done.kind, OperationKind::Restore);
    assert_eq!(done.summary, "Restored 1 app.");

    let reloaded = timeout(WAIT, apps.recv()).await.unwrap().unwrap();
    assert_eq!(reloaded.len(), 1);
    assert_eq!(
        fs::read_to_string(fixture.home.path().join(".zshrc")).unwrap(),
        "captured"
    );
    assert_eq!(
        fs::read_to_string(fixture.home.path().join(".zshrc.bak")).unwrap(),
        "edited"
    );
}

#[tokio::test]
async fn test_closing_settings_reloads_applications() {
    let fixture = Fixture::new();
    let handle = fixture.start(fixture.services(Arc::new(|_: &ProbeTarget| false)));
    let mut apps = fixture.bus.apps_updated.subscribe();

    fixture.bus.settings_window_closed.publish(());
    let loaded = timeout(WAIT, apps.recv()).await.unwrap().unwrap();
    assert!(loaded.is_empty());
    assert!(handle.current_state().apps.is_empty());
}
