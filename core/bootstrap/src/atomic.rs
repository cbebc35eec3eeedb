//! Atomic filesystem mutation for install roots.
//!
//! Everything a concurrent reader can observe under an install root is
//! published by `rename`: files are staged next to their destination and
//! renamed over it, directory trees are built in scratch space and renamed
//! into place. A reader polling a path sees either the old content or the new
//! content, never a partially written file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::errors::{IoContext, Result};

/// Creates `path` and all of its parents.
///
/// If an existing segment of the path is a regular file (for instance a stale
/// artifact from an older install layout), it is removed first. An existing
/// directory is not an error.
///
/// # Errors
///
/// Returns an error if an obstruction cannot be removed or directory creation
/// fails.
pub fn ensure_directory(path: &Path) -> Result<()> {
    let mut prefix = PathBuf::new();
    for component in path.components() {
        prefix.push(component);
        match std::fs::metadata(&prefix) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                tracing::warn!(path = %prefix.display(), "removing file that obstructs directory");
                std::fs::remove_file(&prefix)
                    .fs_context(|| format!("failed to remove file: {}", prefix.display()))?;
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(crate::BootstrapError::filesystem(
                    format!("failed to inspect {}", prefix.display()),
                    e,
                ));
            }
        }
    }

    std::fs::create_dir_all(path)
        .fs_context(|| format!("failed to create directory: {}", path.display()))
}

/// A file written next to its destination but not yet published.
///
/// Dropping a `StagedFile` without calling [`StagedFile::commit`] deletes the
/// temporary file and leaves the destination untouched.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    dest: PathBuf,
}

impl StagedFile {
    /// Path of the temporary file holding the staged content.
    #[cfg(test)]
    pub(crate) fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Renames the staged file over its destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the rename fails.
    pub fn commit(self) -> Result<()> {
        let dest = self.dest;
        self.temp
            .persist(&dest)
            .map_err(|e| e.error)
            .fs_context(|| format!("failed to rename into {}", dest.display()))?;
        Ok(())
    }
}

/// Writes `data` to a fresh temporary file in the parent directory of `path`.
///
/// The parent is created with [`ensure_directory`], so a file obstructing it
/// is removed. Only use this under an install root.
///
/// # Errors
///
/// Returns an error if the parent cannot be created or the write fails.
pub fn stage_file(path: &Path, data: &[u8]) -> Result<StagedFile> {
    let parent = parent_dir(path);
    ensure_directory(parent)?;
    stage_in(parent, path, data)
}

/// Writes a file so that readers never observe partial content.
///
/// # Errors
///
/// Returns an error if staging or the final rename fails.
pub fn write_file_atomically(path: &Path, data: &[u8]) -> Result<()> {
    stage_file(path, data)?.commit()
}

/// Like [`write_file_atomically`], for paths outside an install root.
///
/// Missing parents are created but nothing existing is ever removed; a file
/// in the way of a parent directory is an error.
///
/// # Errors
///
/// Returns an error if a parent cannot be created, or staging or the final
/// rename fails.
pub fn write_output_file(path: &Path, data: &[u8]) -> Result<()> {
    let parent = parent_dir(path);
    std::fs::create_dir_all(parent)
        .fs_context(|| format!("failed to create directory: {}", parent.display()))?;
    stage_in(parent, path, data)?.commit()
}

fn stage_in(parent: &Path, path: &Path, data: &[u8]) -> Result<StagedFile> {
    let mut temp = tempfile::Builder::new()
        .prefix(".tmp")
        .tempfile_in(parent)
        .fs_context(|| format!("failed to create temporary file in {}", parent.display()))?;

    temp.write_all(data)
        .fs_context(|| format!("failed to write {}", temp.path().display()))?;
    temp.as_file()
        .sync_all()
        .fs_context(|| format!("failed to sync {}", temp.path().display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp.path(), std::fs::Permissions::from_mode(0o644))
            .fs_context(|| format!("failed to set permissions: {}", temp.path().display()))?;
    }

    Ok(StagedFile {
        temp,
        dest: path.to_path_buf(),
    })
}

/// Reads a whole file, returning `None` when it does not exist.
///
/// # Errors
///
/// Returns an error for any failure other than the file being absent.
pub fn read_file_or_none(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(crate::BootstrapError::filesystem(
            format!("failed to read {}", path.display()),
            e,
        )),
    }
}

/// Moves `src` into place at `dst`, replacing whatever was there.
///
/// An existing directory at `dst` is removed recursively first. A file at
/// `dst` is replaced by the rename itself, so readers of a single binary never
/// see it missing.
///
/// # Errors
///
/// Returns an error if removal or the rename fails.
pub fn promote(src: &Path, dst: &Path) -> Result<()> {
    let src_is_dir = std::fs::symlink_metadata(src)
        .fs_context(|| format!("failed to inspect {}", src.display()))?
        .is_dir();

    match std::fs::symlink_metadata(dst) {
        Ok(meta) if meta.is_dir() => {
            std::fs::remove_dir_all(dst)
                .fs_context(|| format!("failed to remove directory: {}", dst.display()))?;
        }
        Ok(_) if src_is_dir => {
            std::fs::remove_file(dst)
                .fs_context(|| format!("failed to remove file: {}", dst.display()))?;
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(crate::BootstrapError::filesystem(
                format!("failed to inspect {}", dst.display()),
                e,
            ));
        }
    }

    ensure_directory(parent_dir(dst))?;
    std::fs::rename(src, dst)
        .fs_context(|| format!("failed to rename {} to {}", src.display(), dst.display()))
}

/// Marks a file as executable (mode 0755). No-op on Windows.
///
/// # Errors
///
/// Returns an error if the permissions cannot be changed.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .fs_context(|| format!("failed to set permissions: {}", path.display()))
}

/// Marks a file as executable (mode 0755). No-op on Windows.
///
/// # Errors
///
/// Never fails on Windows.
#[cfg(windows)]
pub fn set_executable(_path: &Path) -> Result<()> {
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_directory_creates_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("c");

        ensure_directory(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn ensure_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("root");

        ensure_directory(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();
        ensure_directory(&target).unwrap();

        assert!(target.join("keep").is_file());
    }

    #[test]
    fn ensure_directory_replaces_file_obstruction() {
        let dir = tempfile::tempdir().unwrap();
        let obstruction = dir.path().join("tools");
        std::fs::write(&obstruction, b"stale").unwrap();

        let target = obstruction.join("go");
        ensure_directory(&target).unwrap();

        assert!(obstruction.is_dir());
        assert!(target.is_dir());
    }

    #[test]
    fn write_file_atomically_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("VERSION");

        write_file_atomically(&path, b"first\n").unwrap();
        write_file_atomically(&path, b"second\n").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second\n");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name() != "VERSION")
            .collect();
        assert!(leftovers.is_empty(), "temporary files left behind");
    }

    #[test]
    fn output_file_never_removes_obstructions() {
        let dir = tempfile::tempdir().unwrap();
        let user_file = dir.path().join("reports");
        std::fs::write(&user_file, b"keep me").unwrap();

        let err = write_output_file(&user_file.join("result.json"), b"{}").unwrap_err();

        assert_eq!(err.kind(), "filesystem");
        assert_eq!(std::fs::read(&user_file).unwrap(), b"keep me");
    }

    #[test]
    fn output_file_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("result.json");

        write_output_file(&path, b"{}").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn interrupted_write_leaves_destination_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VERSION");
        write_file_atomically(&path, b"old\n").unwrap();

        let staged = stage_file(&path, b"new content that never lands\n").unwrap();
        let temp_path = staged.temp_path().to_path_buf();
        assert!(temp_path.exists());
        drop(staged);

        assert_eq!(std::fs::read(&path).unwrap(), b"old\n");
        assert!(!temp_path.exists());
    }

    #[test]
    fn interrupted_write_leaves_missing_destination_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VERSION");

        drop(stage_file(&path, b"partial").unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn read_file_or_none_handles_absent_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_file_or_none(&dir.path().join("missing")).unwrap().is_none());

        let path = dir.path().join("present");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(read_file_or_none(&path).unwrap().unwrap(), b"abc");
    }

    #[test]
    fn read_file_or_none_propagates_other_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_file_or_none(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "filesystem");
    }

    #[test]
    fn promote_replaces_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("scratch").join("go");
        std::fs::create_dir_all(staged.join("bin")).unwrap();
        std::fs::write(staged.join("bin").join("go"), b"new").unwrap();

        let dest = dir.path().join("go");
        std::fs::create_dir_all(dest.join("old")).unwrap();

        promote(&staged, &dest).unwrap();

        assert!(!staged.exists());
        assert!(!dest.join("old").exists());
        assert_eq!(std::fs::read(dest.join("bin").join("go")).unwrap(), b"new");
    }

    #[test]
    fn promote_replaces_file_with_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        std::fs::create_dir(&staged).unwrap();
        let dest = dir.path().join("go");
        std::fs::write(&dest, b"stale file").unwrap();

        promote(&staged, &dest).unwrap();
        assert!(dest.is_dir());
    }

    #[test]
    fn promote_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("cipd.new");
        std::fs::write(&staged, b"v2").unwrap();
        let dest = dir.path().join("cipd");
        std::fs::write(&dest, b"v1").unwrap();

        promote(&staged, &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"v2");
        assert!(!staged.exists());
    }

    #[cfg(unix)]
    #[test]
    fn set_executable_sets_mode_0755() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();

        set_executable(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
