//! Installation probing
//!
//! A probe answers one question for one application: is it present on this
//! host? Probes are synchronous and may touch the filesystem, so async
//! callers run them on a blocking pool.

use crate::paths::expand_path;
use crate::presets::CLI_MARKERS;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Prefix of the synthetic identifiers given to command-line tools
pub const CLI_IDENTIFIER_PREFIX: &str = "cli.";

/// The identity a probe needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    pub name: String,
    pub bundle_identifier: String,
}

impl ProbeTarget {
    /// Whether the identifier names a command-line tool rather than a bundled app
    #[must_use]
    pub fn is_command_line_tool(&self) -> bool {
        self.bundle_identifier.starts_with(CLI_IDENTIFIER_PREFIX)
    }
}

/// Decides whether an application is installed
pub trait InstallProbe: Send + Sync {
    fn is_installed(&self, target: &ProbeTarget) -> bool;
}

impl<F> InstallProbe for F
where
    F: Fn(&ProbeTarget) -> bool + Send + Sync,
{
    fn is_installed(&self, target: &ProbeTarget) -> bool {
        self(target)
    }
}

/// Probe backed by the host's application registry.
///
/// Command-line tools are detected through marker paths. Everything else is
/// looked up as `<Name>.app` in the macOS application folders or as
/// `<bundle identifier>.desktop` in the XDG application directories.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    home: PathBuf,
    app_dirs: Vec<PathBuf>,
    desktop_dirs: Vec<PathBuf>,
    markers: HashMap<String, Vec<String>>,
}

impl SystemProbe {
    /// Probe for the current user with the standard search locations
    #[must_use]
    pub fn new(home: PathBuf) -> Self {
        let app_dirs = vec![
            PathBuf::from("/Applications"),
            PathBuf::from("/System/Applications"),
            PathBuf::from("/Applications/Utilities"),
            home.join("Applications"),
        ];

        let mut desktop_dirs = Vec::new();
        if let Some(data) = dirs::data_dir() {
            desktop_dirs.push(data.join("applications"));
            desktop_dirs.push(data.join("flatpak/exports/share/applications"));
        }
        desktop_dirs.push(PathBuf::from("/usr/share/applications"));
        desktop_dirs.push(PathBuf::from("/usr/local/share/applications"));
        desktop_dirs.push(PathBuf::from("/var/lib/flatpak/exports/share/applications"));
        desktop_dirs.push(PathBuf::from("/var/lib/snapd/desktop/applications"));

        let markers = CLI_MARKERS
            .iter()
            .map(|(id, paths)| {
                (
                    (*id).to_string(),
                    paths.iter().map(|p| (*p).to_string()).collect(),
                )
            })
            .collect();

        Self {
            home,
            app_dirs,
            desktop_dirs,
            markers,
        }
    }

    /// Replace the macOS application folders searched
    #[must_use]
    pub fn with_app_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.app_dirs = dirs;
        self
    }

    /// Replace the XDG application directories searched
    #[must_use]
    pub fn with_desktop_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.desktop_dirs = dirs;
        self
    }

    /// Register (or replace) the marker paths of a command-line tool
    #[must_use]
    pub fn with_marker(mut self, bundle_identifier: &str, paths: Vec<String>) -> Self {
        self.markers.insert(bundle_identifier.to_string(), paths);
        self
    }

    fn has_marker(&self, target: &ProbeTarget) -> bool {
        self.markers
            .get(&target.bundle_identifier)
            .is_some_and(|paths| {
                paths
                    .iter()
                    .any(|p| expand_path(p, &self.home).exists())
            })
    }

    fn in_registry(&self, target: &ProbeTarget) -> bool {
        let bundle = format!("{}.app", target.name);
        if self.app_dirs.iter().any(|d| d.join(&bundle).is_dir()) {
            return true;
        }
        let desktop = format!("{}.desktop", target.bundle_identifier);
        self.desktop_dirs
            .iter()
            .any(|d| is_file(&d.join(&desktop)))
    }
}

impl InstallProbe for SystemProbe {
    fn is_installed(&self, target: &ProbeTarget) -> bool {
        let found = if target.is_command_line_tool() || self.markers.contains_key(&target.bundle_identifier) {
            self.has_marker(target)
        } else {
            self.in_registry(target)
        };
        trace!(app = %target.name, id = %target.bundle_identifier, found, "probed");
        found
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn target(name: &str, id: &str) -> ProbeTarget {
        ProbeTarget {
            name: name.to_string(),
            bundle_identifier: id.to_string(),
        }
    }

    #[test]
    fn test_marker_probe() {
        let home = TempDir::new().unwrap();
        let probe = SystemProbe::new(home.path().to_path_buf())
            .with_marker("cli.tool", vec!["~/.toolrc".to_string()]);

        assert!(!probe.is_installed(&target("Tool", "cli.tool")));
        fs::write(home.path().join(".toolrc"), "x").unwrap();
        assert!(probe.is_installed(&target("Tool", "cli.tool")));
    }

    #[test]
    fn test_unknown_cli_is_not_installed() {
        let home = TempDir::new().unwrap();
        let probe = SystemProbe::new(home.path().to_path_buf());
        assert!(!probe.is_installed(&target("Mystery", "cli.does-not-exist")));
    }

    #[test]
    fn test_registry_probe() {
        let home = TempDir::new().unwrap();
        let apps = home.path().join("Applications");
        let desktop = home.path().join("applications");
        fs::create_dir_all(apps.join("Editor.app")).unwrap();
        fs::create_dir_all(&desktop).unwrap();
        fs::write(desktop.join("org.example.Viewer.desktop"), "[Desktop Entry]").unwrap();

        let probe = SystemProbe::new(home.path().to_path_buf())
            .with_app_dirs(vec![apps])
            .with_desktop_dirs(vec![desktop]);

        assert!(probe.is_installed(&target("Editor", "com.example.editor")));
        assert!(probe.is_installed(&target("Viewer", "org.example.Viewer")));
        assert!(!probe.is_installed(&target("Missing", "com.example.missing")));
    }

    #[test]
    fn test_closure_probe() {
        let probe = |t: &ProbeTarget| t.name == "Yes";
        assert!(probe.is_installed(&target("Yes", "a")));
        assert!(!probe.is_installed(&target("No", "b")));
    }
}
