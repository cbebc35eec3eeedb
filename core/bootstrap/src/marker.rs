//! Install cache gate.
//!
//! The `VERSION` file at the install root records the resolved version of
//! whatever is currently installed there. It is written only after the
//! installed files were published, so a marker never points at a partial
//! install.

use std::path::{Path, PathBuf};

use crate::atomic;
use crate::errors::Result;
use crate::resolver::ResolvedVersion;

/// Name of the marker file inside the install root.
pub const MARKER_FILE: &str = "VERSION";

/// The persisted "currently installed version" marker of an install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMarker {
    path: PathBuf,
}

impl VersionMarker {
    /// Marker for the given install root.
    #[must_use]
    pub fn for_root(install_root: &Path) -> Self {
        Self {
            path: install_root.join(MARKER_FILE),
        }
    }

    /// Path of the marker file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the recorded version. Missing or blank markers read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker exists but cannot be read.
    pub fn read(&self) -> Result<Option<String>> {
        let Some(data) = atomic::read_file_or_none(&self.path)? else {
            return Ok(None);
        };
        let version = String::from_utf8_lossy(&data).trim().to_string();
        Ok((!version.is_empty()).then_some(version))
    }

    /// Returns whether `version` is installed and its executable is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be read.
    pub fn is_current(&self, version: &ResolvedVersion, executable: &Path) -> Result<bool> {
        let installed = self.read()?;
        Ok(installed.as_deref() == Some(version.as_str()) && executable.exists())
    }

    /// Records `version` as installed.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn write(&self, version: &ResolvedVersion) -> Result<()> {
        atomic::write_file_atomically(&self.path, format!("{version}\n").as_bytes())
    }
}
