//! End-to-end bootstrap flow.
//!
//! ```text
//! RESOLVE_VERSION ─┬─ cache hit ──────────────────────────────────────────────> DONE
//!                  └─ cache miss ─> FETCH ─> VERIFY ─> PROMOTE ─> WRITE_MARKER ─> DONE
//! ```
//!
//! Any failing step ends the run with the step's error. The scratch directory
//! holding the download lives from FETCH until the run returns and is removed
//! on every path, and the marker is written only after PROMOTE succeeded.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::archive;
use crate::atomic;
use crate::errors::{BootstrapError, IoContext, Result};
use crate::fetch::{Fetcher, HttpClient};
use crate::marker::{MARKER_FILE, VersionMarker};
use crate::resolver::{ResolvedVersion, VersionResolver};

/// Name of the directory archives are extracted into inside the scratch dir.
const EXTRACT_DIR: &str = "extract";

/// Input of one bootstrap run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Directory the tool is installed into.
    pub install_root: PathBuf,
    /// Platform string, e.g. `linux-amd64`.
    pub platform: String,
    /// Requested version; `None` selects the resolver's default.
    pub requested_version: Option<String>,
    /// Skip the install cache and always download.
    pub force: bool,
}

impl InstallRequest {
    /// Creates a request that uses the install cache.
    #[must_use]
    pub fn new(
        install_root: impl Into<PathBuf>,
        platform: impl Into<String>,
        requested_version: Option<String>,
    ) -> Self {
        Self {
            install_root: install_root.into(),
            platform: platform.into(),
            requested_version,
            force: false,
        }
    }

    /// Sets whether the install cache is bypassed.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapResult {
    /// Absolute or root-relative path of the installed executable.
    pub executable: PathBuf,
    /// The installed version.
    pub version: ResolvedVersion,
}

impl BootstrapResult {
    /// Writes the result as a JSON object `{"executable": .., "version": ..}`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(std::io::Error::other)
            .fs_context(|| "failed to serialize bootstrap result".to_string())?;
        atomic::write_output_file(path, &json)
    }
}

/// How a downloaded artifact becomes the installed toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packaging {
    /// The artifact is the executable itself, installed as `root/<name>`.
    Binary {
        /// File name of the executable.
        name: String,
    },
    /// The artifact is a tar.gz with a single top-level directory that is
    /// installed as `root/<dir>`.
    Archive {
        /// Name of the top-level directory inside the archive.
        dir: String,
        /// Executable path relative to `dir`.
        executable: PathBuf,
    },
}

impl Packaging {
    /// Single binary packaging.
    #[must_use]
    pub fn binary(name: impl Into<String>) -> Self {
        Self::Binary { name: name.into() }
    }

    /// Archive packaging.
    #[must_use]
    pub fn archive(dir: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self::Archive {
            dir: dir.into(),
            executable: executable.into(),
        }
    }

    /// Short tool name, used as the scratch directory prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Binary { name } => name,
            Self::Archive { dir, .. } => dir,
        }
    }

    /// Where the published artifact lives under `install_root`.
    #[must_use]
    pub fn install_target(&self, install_root: &Path) -> PathBuf {
        install_root.join(self.name())
    }

    /// Path of the installed executable.
    #[must_use]
    pub fn executable_path(&self, install_root: &Path) -> PathBuf {
        match self {
            Self::Binary { name } => install_root.join(name),
            Self::Archive { dir, executable } => install_root.join(dir).join(executable),
        }
    }

    /// Turns a verified download into the path that gets promoted.
    fn prepare(&self, download: &Path, scratch: &Path, version: &ResolvedVersion) -> Result<PathBuf> {
        match self {
            Self::Binary { .. } => {
                atomic::set_executable(download)?;
                Ok(download.to_path_buf())
            }
            Self::Archive { dir, executable } => {
                let extract_root = scratch.join(EXTRACT_DIR);
                archive::extract_tar_gz(download, &extract_root)?;

                let tree = extract_root.join(dir);
                if !tree.is_dir() {
                    return Err(BootstrapError::archive(format!(
                        "archive has no top-level {dir}/ directory"
                    )));
                }

                let reported = atomic::read_file_or_none(&tree.join(MARKER_FILE))?
                    .map(|data| {
                        String::from_utf8_lossy(&data)
                            .lines()
                            .next()
                            .unwrap_or_default()
                            .trim()
                            .to_string()
                    })
                    .unwrap_or_default();
                if reported != version.as_str() {
                    return Err(BootstrapError::VersionMismatch {
                        expected: version.to_string(),
                        actual: reported,
                    });
                }

                if !tree.join(executable).is_file() {
                    return Err(BootstrapError::archive(format!(
                        "archive does not contain {}",
                        Path::new(dir).join(executable).display()
                    )));
                }

                Ok(tree)
            }
        }
    }
}

/// Steps of a bootstrap run, used in log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolving the requested version.
    ResolveVersion,
    /// The requested version is already installed.
    CacheHit,
    /// Downloading the artifact.
    Fetch,
    /// Verifying the artifact checksum.
    Verify,
    /// Publishing the artifact into the install root.
    Promote,
    /// Recording the installed version.
    WriteMarker,
    /// Finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResolveVersion => "RESOLVE_VERSION",
            Self::CacheHit => "CACHE_HIT",
            Self::Fetch => "FETCH",
            Self::Verify => "VERIFY",
            Self::Promote => "PROMOTE",
            Self::WriteMarker => "WRITE_MARKER",
            Self::Done => "DONE",
        })
    }
}

/// Installs a toolchain by composing a resolver, a fetcher and a packaging.
#[derive(Debug, Clone)]
pub struct Bootstrapper<R, C> {
    resolver: R,
    fetcher: Fetcher<C>,
    packaging: Packaging,
}

impl<R: VersionResolver, C: HttpClient> Bootstrapper<R, C> {
    /// Creates a bootstrapper.
    #[must_use]
    pub fn new(resolver: R, fetcher: Fetcher<C>, packaging: Packaging) -> Self {
        Self {
            resolver,
            fetcher,
            packaging,
        }
    }

    /// Returns the fetcher.
    #[must_use]
    pub fn fetcher(&self) -> &Fetcher<C> {
        &self.fetcher
    }

    /// Returns the packaging.
    #[must_use]
    pub fn packaging(&self) -> &Packaging {
        &self.packaging
    }

    /// Runs one bootstrap.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step; the install root is then
    /// left as it was, apart from obstructing files removed while creating
    /// the root.
    pub async fn install(&self, request: &InstallRequest) -> Result<BootstrapResult> {
        let result = self.run(request).await;
        if let Err(e) = &result {
            tracing::debug!(kind = e.kind(), "bootstrap failed");
        }
        result
    }

    async fn run(&self, request: &InstallRequest) -> Result<BootstrapResult> {
        let root = &request.install_root;
        let tool = self.packaging.name();
        let marker = VersionMarker::for_root(root);
        let executable = self.packaging.executable_path(root);

        enter(Stage::ResolveVersion);
        let version = self
            .resolver
            .resolve(
                &self.fetcher,
                &request.platform,
                request.requested_version.as_deref(),
            )
            .await?;

        if request.force {
            tracing::info!(tool, "forcing a fresh download");
        } else if marker.is_current(&version, &executable)? {
            enter(Stage::CacheHit);
            tracing::info!(tool, version = %version, "already installed");
            return Ok(BootstrapResult {
                executable,
                version,
            });
        }

        let artifact = self
            .resolver
            .locate(&self.fetcher, &request.platform, &version)
            .await?;

        enter(Stage::Fetch);
        atomic::ensure_directory(root)?;
        let scratch = tempfile::Builder::new()
            .prefix(tool)
            .tempdir_in(root)
            .fs_context(|| format!("failed to create scratch directory in {}", root.display()))?;

        let download = scratch.path().join(&artifact.filename);
        tracing::info!(tool, version = %version, url = %artifact.url, "downloading");
        self.fetcher.fetch_to_file(&artifact.url, &download).await?;

        enter(Stage::Verify);
        artifact.checksum.check(&download)?;
        let staged = self.packaging.prepare(&download, scratch.path(), &version)?;

        enter(Stage::Promote);
        atomic::promote(&staged, &self.packaging.install_target(root))?;

        enter(Stage::WriteMarker);
        marker.write(&version)?;

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            tracing::warn!(path = %scratch_path.display(), error = %e, "failed to remove scratch directory");
        }

        enter(Stage::Done);
        tracing::info!(tool, version = %version, executable = %executable.display(), "installed");
        Ok(BootstrapResult {
            executable,
            version,
        })
    }
}

fn enter(stage: Stage) {
    tracing::debug!(stage = %stage, "bootstrap stage");
}
