//! Error types for toolchain bootstrapping.
//!
//! Every failure of a bootstrap run is classified into one of the
//! [`BootstrapError`] variants at the point where it arises. All variants are
//! fatal to the run; the only distinction that matters to the retry loop is
//! whether a network failure was transient, and that decision is made inside
//! [`crate::fetch`] before an error of this type is ever produced.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Consolidated error type for a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A request kept failing with transient errors until the retry bound was hit.
    #[error("giving up on {url} after {attempts} attempt(s): {message}")]
    TransientNetwork {
        /// The URL that was being fetched.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// The server answered 401, 403 or 404. Never retried.
    #[error("HTTP {status} fetching {url}")]
    PermanentHttp {
        /// The URL that was rejected.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The package service replied with a non-success status.
    #[error("server replied with error {status}: {message}")]
    Backend {
        /// The status reported in the response body.
        status: String,
        /// The server supplied error message.
        message: String,
    },

    /// The downloaded artifact does not hash to the expected value.
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        /// The artifact that failed verification.
        path: PathBuf,
        /// The expected digest.
        expected: String,
        /// The computed digest.
        actual: String,
    },

    /// The downloaded artifact reports a different version than was resolved.
    #[error("downloaded version {actual} does not match requested version {expected}")]
    VersionMismatch {
        /// The resolved version.
        expected: String,
        /// The version found inside the artifact.
        actual: String,
    },

    /// A local filesystem operation failed.
    #[error("{message}")]
    Filesystem {
        /// Description of the operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The downloaded archive is corrupt or contains unsafe entries.
    #[error("archive error: {message}")]
    Archive {
        /// Description of the problem.
        message: String,
        /// The underlying I/O error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// A response body could not be understood.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        /// The URL that produced the response.
        url: String,
        /// Description of what was wrong.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to set up HTTP client: {message}")]
    ClientSetup {
        /// Description of the problem.
        message: String,
    },
}

impl BootstrapError {
    /// Creates a new `Filesystem` error.
    #[must_use]
    pub fn filesystem(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem {
            message: message.into(),
            source,
        }
    }

    /// Creates a new `Archive` error without an I/O source.
    #[must_use]
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Archive` error wrapping an I/O error.
    #[must_use]
    pub fn archive_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new `InvalidResponse` error.
    #[must_use]
    pub fn invalid_response(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Short, stable name of the error kind, used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientNetwork { .. } => "transient_network",
            Self::PermanentHttp { .. } => "permanent_http",
            Self::Backend { .. } => "backend",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::VersionMismatch { .. } => "version_mismatch",
            Self::Filesystem { .. } => "filesystem",
            Self::Archive { .. } => "archive",
            Self::InvalidResponse { .. } => "invalid_response",
            Self::ClientSetup { .. } => "client_setup",
        }
    }
}

/// Attaches a lazily built message to I/O results, producing a
/// [`BootstrapError::Filesystem`].
pub(crate) trait IoContext<T> {
    fn fs_context<F>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn fs_context<F>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|source| BootstrapError::filesystem(message(), source))
    }
}
