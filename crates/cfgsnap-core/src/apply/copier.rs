//! File copying seam

use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Copies a single regular file.
///
/// Every byte the engine writes, into a snapshot or back onto the live
/// filesystem, goes through this trait.
pub trait EntryCopier: Send + Sync {
    /// Copy `from` to `to`, returning the number of bytes written.
    /// The parent of `to` already exists.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

/// Plain whole-file copy
#[derive(Debug, Default, Clone, Copy)]
pub struct FsCopier;

impl EntryCopier for FsCopier {
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }
}

/// Copy a file, or a directory tree file by file.
///
/// Symlinks inside a directory are skipped; a symlink passed as `from` is
/// followed.
pub fn copy_entry(copier: &dyn EntryCopier, from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::metadata(from)?;

    if !meta.is_dir() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        copier.copy_file(from, to)?;
        return Ok(());
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        let target = to.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            copier.copy_file(entry.path(), &target)?;
        } else {
            debug!(path = %entry.path().display(), "skipping symlink");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_file_creates_parent() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.txt");
        fs::write(&src, "hello").unwrap();
        let dst = tmp.path().join("deep/er/a.txt");

        copy_entry(&FsCopier, &src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst).unwrap(), "hello");
    }

    #[test]
    fn test_copy_tree_keeps_empty_dirs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("conf");
        fs::create_dir_all(src.join("empty")).unwrap();
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/x.toml"), "x = 1").unwrap();
        fs::write(src.join("zero"), "").unwrap();

        let dst = tmp.path().join("out");
        copy_entry(&FsCopier, &src, &dst).unwrap();

        assert!(dst.join("empty").is_dir());
        assert_eq!(fs::read_to_string(dst.join("nested/x.toml")).unwrap(), "x = 1");
        assert_eq!(fs::metadata(dst.join("zero")).unwrap().len(), 0);
    }

    #[test]
    fn test_missing_source_errors() {
        let tmp = TempDir::new().unwrap();
        let err = copy_entry(&FsCopier, &tmp.path().join("nope"), &tmp.path().join("out"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
