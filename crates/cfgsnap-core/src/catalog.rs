//! Async snapshot enumeration

use cfgsnap_scanner::{BackupSnapshot, InstallProbe, ScanError, ScanResult};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Enumerate the snapshots under `root` on the blocking pool.
///
/// # Errors
/// Returns an error if the root exists but cannot be listed.
pub async fn scan_snapshots(
    root: PathBuf,
    probe: Arc<dyn InstallProbe>,
) -> ScanResult<Vec<BackupSnapshot>> {
    tokio::task::spawn_blocking(move || cfgsnap_scanner::scan_snapshots(&root, probe.as_ref()))
        .await
        .map_err(|e| ScanError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgsnap_scanner::manifest::write_manifest;
    use cfgsnap_scanner::{AppManifest, Category, ProbeTarget};
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_scan_on_blocking_pool() {
        let tmp = TempDir::new().unwrap();
        let app_dir = tmp.path().join("Backup_2026-03-01_10-00-00/Git");
        fs::create_dir_all(&app_dir).unwrap();
        write_manifest(
            &app_dir,
            &AppManifest {
                name: "Git".to_string(),
                bundle_identifier: "cli.git".to_string(),
                config_paths: vec!["~/.gitconfig".to_string()],
                category: Category::Development,
            },
        )
        .unwrap();

        let probe: Arc<dyn InstallProbe> = Arc::new(|_: &ProbeTarget| false);
        let snapshots = scan_snapshots(tmp.path().to_path_buf(), probe).await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(!snapshots[0].apps[0].is_currently_installed);
        assert!(!snapshots[0].apps[0].is_selected);
    }
}
