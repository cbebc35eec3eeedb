#![warn(clippy::pedantic)]

//! Toolchain bootstrap library.
//!
//! Resolves a requested tool version, skips the work when that version is
//! already installed, and otherwise downloads, verifies and atomically
//! publishes the artifact into an install root.
//!
//! ## Module Structure
//!
//! - [`checksum`] - SHA-1 and SHA-256 file verification
//! - [`atomic`] - Crash-safe file writes and install promotion
//! - [`fetch`] - HTTP client seam and bounded retry
//! - [`resolver`] - Service-lookup and direct-URL version resolution
//! - [`marker`] - The `VERSION` install cache gate
//! - [`archive`] - tar.gz extraction for distribution installs
//! - [`orchestrator`] - The end-to-end install flow
//! - [`config`] - Presets for the supported tools

pub mod archive;
pub mod atomic;
pub mod checksum;
pub mod config;
pub mod errors;
pub mod fetch;
pub mod marker;
pub mod orchestrator;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use checksum::{ChecksumAlgorithm, ExpectedChecksum};
pub use config::{BootstrapConfig, GoDistributionConfig, PackageClientConfig};
pub use errors::{BootstrapError, Result};
pub use fetch::{Fetcher, HttpClient, HttpConfig, ReqwestClient, RetryPolicy};
pub use marker::VersionMarker;
pub use orchestrator::{BootstrapResult, Bootstrapper, InstallRequest, Packaging, Stage};
pub use resolver::{DirectUrlResolver, ResolvedVersion, ServiceResolver, VersionResolver};
