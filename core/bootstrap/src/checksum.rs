//! Checksum verification for downloaded artifacts.
//!
//! The package client is published with a SHA-1 digest while distribution
//! archives carry SHA-256 sidecars, so the algorithm is chosen per artifact.

use std::io::Read;
use std::path::Path;

use sha2::Digest;

use crate::errors::{BootstrapError, IoContext, Result};

/// Size of the read buffer used while hashing.
const CHUNK_SIZE: usize = 8192;

/// Hash algorithm used to verify an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// SHA-1, used by the package service for client binaries.
    Sha1,
    /// SHA-256, used for distribution archives.
    Sha256,
}

impl ChecksumAlgorithm {
    /// Returns the lowercase algorithm name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    /// Computes the digest of a file as a lowercase hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn digest(self, file_path: &Path) -> Result<String> {
        match self {
            Self::Sha1 => digest_file::<sha1::Sha1>(file_path),
            Self::Sha256 => digest_file::<sha2::Sha256>(file_path),
        }
    }

    /// Returns whether the file hashes to `expected`.
    ///
    /// The comparison ignores case and surrounding whitespace in `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub fn verify(self, file_path: &Path, expected: &str) -> Result<bool> {
        let computed = self.digest(file_path)?;
        Ok(computed == expected.trim().to_lowercase())
    }
}

/// Expected digest of an artifact together with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedChecksum {
    /// Algorithm the digest was produced with.
    pub algorithm: ChecksumAlgorithm,
    /// Hex encoded digest.
    pub hex: String,
}

impl ExpectedChecksum {
    /// Creates an expected SHA-1 checksum.
    #[must_use]
    pub fn sha1(hex: impl Into<String>) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Sha1,
            hex: hex.into(),
        }
    }

    /// Creates an expected SHA-256 checksum.
    #[must_use]
    pub fn sha256(hex: impl Into<String>) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Sha256,
            hex: hex.into(),
        }
    }

    /// Verifies the file, failing with [`BootstrapError::ChecksumMismatch`]
    /// when the digest differs.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the digest differs.
    pub fn check(&self, file_path: &Path) -> Result<()> {
        if !self.algorithm.verify(file_path, &self.hex)? {
            return Err(BootstrapError::ChecksumMismatch {
                path: file_path.to_path_buf(),
                expected: self.hex.trim().to_lowercase(),
                actual: self.algorithm.digest(file_path)?,
            });
        }

        tracing::debug!(
            algorithm = self.algorithm.name(),
            digest = %self.hex.trim(),
            "checksum verified"
        );
        Ok(())
    }
}

fn digest_file<D: Digest>(file_path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(file_path)
        .fs_context(|| format!("failed to open file for checksum: {}", file_path.display()))?;

    let mut hasher = D::new();
    let mut buffer = [0u8; CHUNK_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .fs_context(|| format!("failed to read file for checksum: {}", file_path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}
