//! Backup engine tests
//!
//! Snapshot creation, incremental reuse, and per-app failure isolation.

use cfgsnap_core::apply::{EntryCopier, FsCopier};
use cfgsnap_core::backup::{BackupOptions, BackupOrchestrator};
use cfgsnap_core::diff::compute_copy_set;
use cfgsnap_core::operation::{OperationKind, OperationStatus, ProgressUpdate};
use cfgsnap_core::cfgsnap_scanner::{
    scan_snapshots, ApplicationDescriptor, BackupSnapshot, Category, ProbeTarget,
};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

fn app(name: &str, id: &str, paths: &[&str]) -> ApplicationDescriptor {
    let mut app = ApplicationDescriptor::new(
        name,
        id,
        paths.iter().map(ToString::to_string).collect(),
        Category::Development,
    );
    app.is_installed = true;
    app.is_selected = true;
    app
}

fn rescan(root: &Path) -> Vec<BackupSnapshot> {
    scan_snapshots(root, &|_: &ProbeTarget| true).unwrap()
}

fn write_home(home: &Path) {
    fs::write(home.join(".gitconfig"), "[user]\n\tname = a\n").unwrap();
    fs::create_dir_all(home.join(".config/nvim/lua")).unwrap();
    fs::write(home.join(".config/nvim/init.lua"), "require('a')").unwrap();
    fs::write(home.join(".config/nvim/lua/a.lua"), "return {}").unwrap();
}

/// Fails every copy whose source path mentions `needle`
struct FailOn(&'static str);

impl EntryCopier for FailOn {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        if from.to_string_lossy().contains(self.0) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        }
        FsCopier.copy_file(from, to)
    }
}

// =============================================================================
// Snapshot creation
// =============================================================================

#[tokio::test]
async fn test_backup_writes_entries_and_manifests() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write_home(home.path());

    let apps = vec![
        app("Git", "cli.git", &["~/.gitconfig"]),
        app("Neovim", "cli.nvim", &["~/.config/nvim"]),
    ];
    let orchestrator = BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf());
    let result = orchestrator.perform_backup(&apps, None, &|_| {}).await.unwrap();

    assert_eq!(result.status(), OperationStatus::Success);
    assert_eq!(result.summary(OperationKind::Backup), "Backed up 2 apps.");

    let snapshots = rescan(root.path());
    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert!(snapshot.name.starts_with("Backup_"));

    let nvim = snapshot.app("cli.nvim").unwrap();
    assert_eq!(
        fs::read_to_string(nvim.dir.join("nvim/lua/a.lua")).unwrap(),
        "return {}"
    );
    assert_eq!(nvim.config_paths, vec!["~/.config/nvim".to_string()]);
}

#[tokio::test]
async fn test_empty_selection_creates_nothing() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    let backup_root = root.path().join("backups");

    let mut not_installed = app("Git", "cli.git", &["~/.gitconfig"]);
    not_installed.is_installed = false;
    let mut unselected = app("Vim", "cli.vim", &["~/.vimrc"]);
    unselected.is_selected = false;

    let updates = Mutex::new(Vec::new());
    let sink = |u: ProgressUpdate| updates.lock().unwrap().push(u);
    let result = BackupOrchestrator::new(backup_root.clone(), home.path().to_path_buf())
        .perform_backup(&[not_installed, unselected], None, &sink)
        .await
        .unwrap();

    assert_eq!(result.status(), OperationStatus::NoOp);
    assert_eq!(result.total_processed, 0);
    assert!(!backup_root.exists());

    let updates = updates.into_inner().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].fraction, 1.0);
    assert_eq!(
        updates[0].message.as_deref(),
        Some("No installed apps selected for backup.")
    );
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_one() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write_home(home.path());

    let apps = vec![
        app("Git", "cli.git", &["~/.gitconfig"]),
        app("Neovim", "cli.nvim", &["~/.config/nvim"]),
        app("Ghost", "com.example.ghost", &["~/.ghostrc"]),
    ];
    let updates = Mutex::new(Vec::new());
    let sink = |u: ProgressUpdate| updates.lock().unwrap().push(u.fraction);
    BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf())
        .perform_backup(&apps, None, &sink)
        .await
        .unwrap();

    let fractions = updates.into_inner().unwrap();
    assert_eq!(fractions.first(), Some(&0.0));
    assert_eq!(fractions.last(), Some(&1.0));
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    // start, one per app, final
    assert_eq!(fractions.len(), 5);
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test]
async fn test_one_failing_app_does_not_stop_the_others() {
    let _ = tracing_subscriber::fmt::try_init();
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::write(home.path().join(".alpharc"), "a").unwrap();
    fs::write(home.path().join(".brokenrc"), "b").unwrap();
    fs::write(home.path().join(".gammarc"), "c").unwrap();

    let apps = vec![
        app("Alpha", "com.example.alpha", &["~/.alpharc"]),
        app("Broken", "com.example.broken", &["~/.brokenrc"]),
        app("Gamma", "com.example.gamma", &["~/.gammarc"]),
    ];
    let orchestrator = BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf())
        .with_copier(Arc::new(FailOn(".brokenrc")));
    let result = orchestrator.perform_backup(&apps, None, &|_| {}).await.unwrap();

    assert_eq!(result.success_count, 2);
    assert_eq!(result.total_processed, 3);
    assert_eq!(result.failed_names(), vec!["Broken"]);
    assert_eq!(result.status(), OperationStatus::Partial);
    assert_eq!(
        result.summary(OperationKind::Backup),
        "Backed up 2 of 3 apps. Failed: Broken."
    );

    let snapshots = rescan(root.path());
    let captured: Vec<&str> = snapshots[0].apps.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(captured, vec!["Alpha", "Gamma"]);
    assert!(!snapshots[0].root_path.join("Broken").exists());
}

#[tokio::test]
async fn test_all_apps_failing_leaves_no_snapshot() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    fs::write(home.path().join(".brokenrc"), "b").unwrap();

    let apps = vec![app("Broken", "com.example.broken", &["~/.brokenrc"])];
    let result = BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf())
        .with_copier(Arc::new(FailOn(".brokenrc")))
        .perform_backup(&apps, None, &|_| {})
        .await
        .unwrap();

    assert_eq!(result.status(), OperationStatus::Failed);
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);
}

// =============================================================================
// Incremental backups
// =============================================================================

#[tokio::test]
async fn test_incremental_backup_skips_unchanged_content() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write_home(home.path());

    let git = app("Git", "cli.git", &["~/.gitconfig"]);
    let nvim = app("Neovim", "cli.nvim", &["~/.config/nvim"]);
    let orchestrator = BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf());
    orchestrator
        .perform_backup(&[git.clone(), nvim.clone()], None, &|_| {})
        .await
        .unwrap();
    let base = rescan(root.path()).remove(0);

    // Nothing changed: nothing has to be read from the live filesystem
    for descriptor in [&git, &nvim] {
        let copies = compute_copy_set(
            &descriptor.config_paths,
            base.app(&descriptor.bundle_identifier),
            home.path(),
        )
        .unwrap();
        assert!(copies.is_empty(), "{} should need no copies", descriptor.name);
    }

    // A new app is copied in full even with a base
    fs::write(home.path().join(".tmux.conf"), "set -g mouse on").unwrap();
    let tmux = app("tmux", "cli.tmux", &["~/.tmux.conf"]);
    let copies = compute_copy_set(&tmux.config_paths, base.app("cli.tmux"), home.path()).unwrap();
    assert_eq!(copies.len(), 1);

    orchestrator
        .perform_backup(&[git, nvim, tmux], Some(&base), &|_| {})
        .await
        .unwrap();

    // The incremental snapshot restores on its own
    let snapshots = rescan(root.path());
    assert_eq!(snapshots.len(), 2);
    let latest = &snapshots[0];
    assert_ne!(latest.root_path, base.root_path);
    let nvim_dir = &latest.app("cli.nvim").unwrap().dir;
    assert_eq!(
        fs::read_to_string(nvim_dir.join("nvim/init.lua")).unwrap(),
        "require('a')"
    );
    assert_eq!(
        fs::read_to_string(latest.app("cli.tmux").unwrap().dir.join(".tmux.conf")).unwrap(),
        "set -g mouse on"
    );
}

#[tokio::test]
async fn test_modified_file_copied_again() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write_home(home.path());

    let nvim = app("Neovim", "cli.nvim", &["~/.config/nvim"]);
    let orchestrator = BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf());
    orchestrator.perform_backup(&[nvim.clone()], None, &|_| {}).await.unwrap();
    let base = rescan(root.path()).remove(0);

    fs::write(home.path().join(".config/nvim/init.lua"), "require('b')").unwrap();
    let copies = compute_copy_set(&nvim.config_paths, base.app("cli.nvim"), home.path()).unwrap();
    let relatives: Vec<_> = copies.iter().map(|c| c.relative.clone()).collect();
    assert_eq!(relatives, vec![Path::new("nvim/init.lua").to_path_buf()]);

    orchestrator
        .perform_backup(&[nvim], Some(&base), &|_| {})
        .await
        .unwrap();
    let latest = rescan(root.path()).remove(0);
    let dir = &latest.app("cli.nvim").unwrap().dir;
    assert_eq!(fs::read_to_string(dir.join("nvim/init.lua")).unwrap(), "require('b')");
    assert_eq!(fs::read_to_string(dir.join("nvim/lua/a.lua")).unwrap(), "return {}");

    // The base snapshot is untouched
    let base_dir = &base.app("cli.nvim").unwrap().dir;
    assert_eq!(
        fs::read_to_string(base_dir.join("nvim/init.lua")).unwrap(),
        "require('a')"
    );
}

#[tokio::test]
async fn test_full_backup_ignores_base() {
    let home = TempDir::new().unwrap();
    let root = TempDir::new().unwrap();
    write_home(home.path());

    let git = app("Git", "cli.git", &["~/.gitconfig"]);
    let orchestrator = BackupOrchestrator::new(root.path().to_path_buf(), home.path().to_path_buf())
        .with_options(BackupOptions { incremental: false });
    orchestrator.perform_backup(&[git.clone()], None, &|_| {}).await.unwrap();
    let base = rescan(root.path()).remove(0);

    let result = orchestrator
        .perform_backup(&[git], Some(&base), &|_| {})
        .await
        .unwrap();
    assert_eq!(result.success_count, 1);
    assert_eq!(rescan(root.path()).len(), 2);
}
