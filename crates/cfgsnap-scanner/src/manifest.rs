//! Per-app manifest codec

use crate::error::{ScanError, ScanResult};
use crate::types::AppManifest;
use std::fs;
use std::path::Path;

/// File name of the manifest inside each per-app snapshot directory
pub const MANIFEST_FILE: &str = ".cfgsnap-app.json";

/// Read the manifest stored in a per-app directory
pub fn read_manifest(app_dir: &Path) -> ScanResult<AppManifest> {
    let path = app_dir.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(ScanError::MissingManifest(app_dir.to_path_buf()));
    }
    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write the manifest into a per-app directory
pub fn write_manifest(app_dir: &Path, manifest: &AppManifest) -> ScanResult<()> {
    let json = serde_json::to_string_pretty(manifest)?;
    fs::write(app_dir.join(MANIFEST_FILE), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_uses_camel_case_keys() {
        let dir = TempDir::new().unwrap();
        let manifest = AppManifest {
            name: "Git".to_string(),
            bundle_identifier: "cli.git".to_string(),
            config_paths: vec!["~/.gitconfig".to_string()],
            category: Category::Development,
        };
        write_manifest(dir.path(), &manifest).unwrap();

        let raw = fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(raw.contains("\"bundleIdentifier\""));
        assert!(raw.contains("\"configPaths\""));
        assert!(!raw.contains("installed"));

        assert_eq!(read_manifest(dir.path()).unwrap(), manifest);
    }

    #[test]
    fn test_missing_manifest() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            read_manifest(dir.path()),
            Err(ScanError::MissingManifest(_))
        ));
    }
}
