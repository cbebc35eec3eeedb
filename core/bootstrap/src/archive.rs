//! Archive extraction for distribution installs.
//!
//! Distribution archives are gzip compressed tarballs with a single top-level
//! directory (`go/` for the Go distribution). They are always extracted into
//! private scratch space and never directly into an install root.

use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};

use crate::errors::{BootstrapError, IoContext, Result};

/// Extracts a tar.gz archive into `dest_dir`, preserving entry paths.
///
/// Creates `dest_dir` if it does not exist. Nothing is ever written outside
/// `dest_dir`: entries are unpacked with [`tar::Entry::unpack_in`], which
/// refuses to write through symlinks that leave the destination, and link
/// entries whose target points outside the archive are rejected up front.
///
/// # Errors
///
/// Returns an error if:
/// - The archive cannot be opened or is not a valid gzip tarball
/// - An entry path is absolute or contains `..`
/// - A symlink or hard link points outside the archive
/// - Directory or file creation fails
pub fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dest_dir)
        .fs_context(|| format!("failed to create directory: {}", dest_dir.display()))?;

    let file = std::fs::File::open(archive_path).map_err(|e| {
        BootstrapError::archive_io(format!("failed to open archive: {}", archive_path.display()), e)
    })?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let entries = archive.entries().map_err(|e| {
        BootstrapError::archive_io(
            format!("failed to read tar entries: {}", archive_path.display()),
            e,
        )
    })?;

    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| {
            BootstrapError::archive_io(
                format!("failed to read tar entry: {}", archive_path.display()),
                e,
            )
        })?;

        let entry_path = entry
            .path()
            .map_err(|e| BootstrapError::archive_io("failed to get entry path", e))?
            .into_owned();

        // Reject "../../etc/passwd" style paths before touching the disk.
        if entry_path.is_absolute() || escapes(Path::new(""), &entry_path) {
            return Err(BootstrapError::archive(format!(
                "refusing to extract path outside destination: {}",
                entry_path.display()
            )));
        }

        let entry_type = entry.header().entry_type();
        if matches!(entry_type, EntryType::Symlink | EntryType::Link) {
            let target = entry
                .link_name()
                .map_err(|e| BootstrapError::archive_io("failed to get link target", e))?
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_default();
            // Symlinks resolve against their own directory, hard links
            // against the archive root.
            let base = if entry_type == EntryType::Symlink {
                entry_path.parent().unwrap_or(Path::new(""))
            } else {
                Path::new("")
            };
            if target.as_os_str().is_empty() || escapes(base, &target) {
                return Err(BootstrapError::archive(format!(
                    "refusing to extract link pointing outside destination: {} -> {}",
                    entry_path.display(),
                    target.display()
                )));
            }
        }

        let unpacked = entry.unpack_in(dest_dir).map_err(|e| {
            BootstrapError::archive_io(format!("failed to extract: {}", entry_path.display()), e)
        })?;
        if !unpacked {
            return Err(BootstrapError::archive(format!(
                "refusing to extract path outside destination: {}",
                entry_path.display()
            )));
        }
        count += 1;
    }

    if count == 0 {
        return Err(BootstrapError::archive(format!(
            "archive is empty: {}",
            archive_path.display()
        )));
    }

    tracing::debug!(archive = %archive_path.display(), entries = count, "archive extracted");
    Ok(())
}

/// Returns whether `path`, taken relative to `base`, leaves the extraction
/// root. Both are archive-relative.
fn escapes(base: &Path, path: &Path) -> bool {
    let mut depth = base
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();

    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}
