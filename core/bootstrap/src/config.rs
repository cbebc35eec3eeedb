//! Presets for the supported tools.
//!
//! Every constant the install flow depends on lives in a config value that is
//! handed to the components at construction time, so tests and callers can
//! point the installers at other servers.

use std::path::PathBuf;

use crate::errors::Result;
use crate::fetch::{Fetcher, HttpClient, HttpConfig, ReqwestClient, RetryPolicy};
use crate::orchestrator::{Bootstrapper, Packaging};
use crate::resolver::{DirectUrlResolver, ServiceResolver};

/// Default package-metadata service.
pub const DEFAULT_PACKAGE_BACKEND: &str = "https://chrome-infra-packages.appspot.com";

/// Package name prefix of the package client; the platform is appended.
pub const DEFAULT_PACKAGE_PREFIX: &str = "infra/tools/cipd";

/// File name of the installed package client.
pub const PACKAGE_CLIENT_BINARY: &str = "cipd";

/// Default base URL of the Go distribution archives.
pub const DEFAULT_GO_BASE_URL: &str = "https://storage.googleapis.com/golang/";

/// Go version installed when none (or `latest`) is requested.
pub const DEFAULT_GO_VERSION: &str = "go1.7";

/// Network settings shared by every installer.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    /// Retry bound and backoff.
    pub retry: RetryPolicy,
    /// Timeouts and headers.
    pub http: HttpConfig,
}

impl BootstrapConfig {
    /// Builds a fetcher backed by the real HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn fetcher(&self) -> Result<Fetcher<ReqwestClient>> {
        Ok(Fetcher::new(
            ReqwestClient::new(self.http.clone())?,
            self.retry,
        ))
    }
}

/// Settings of the package client installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageClientConfig {
    /// Package-metadata service URL.
    pub backend_url: String,
    /// Package name prefix.
    pub package_prefix: String,
    /// Installed binary name.
    pub binary_name: String,
}

impl Default for PackageClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_PACKAGE_BACKEND.to_string(),
            package_prefix: DEFAULT_PACKAGE_PREFIX.to_string(),
            binary_name: PACKAGE_CLIENT_BINARY.to_string(),
        }
    }
}

impl PackageClientConfig {
    /// Overrides the backend URL when one is given.
    #[must_use]
    pub fn with_backend(mut self, backend_url: Option<String>) -> Self {
        if let Some(url) = backend_url.filter(|u| !u.trim().is_empty()) {
            self.backend_url = url.trim().to_string();
        }
        self
    }

    /// Assembles the installer.
    #[must_use]
    pub fn bootstrapper<C: HttpClient>(
        &self,
        fetcher: Fetcher<C>,
    ) -> Bootstrapper<ServiceResolver, C> {
        Bootstrapper::new(
            ServiceResolver::new(
                &self.backend_url,
                &self.package_prefix,
                &self.binary_name,
            ),
            fetcher,
            Packaging::binary(&self.binary_name),
        )
    }
}

/// Settings of the Go distribution installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoDistributionConfig {
    /// Base URL the archives and their `.sha256` sidecars live under.
    pub base_url: String,
    /// Version used for `latest` and empty requests.
    pub fallback_version: String,
}

impl Default for GoDistributionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GO_BASE_URL.to_string(),
            fallback_version: DEFAULT_GO_VERSION.to_string(),
        }
    }
}

impl GoDistributionConfig {
    /// Overrides the base URL when one is given.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        self
    }

    /// Assembles the installer.
    #[must_use]
    pub fn bootstrapper<C: HttpClient>(
        &self,
        fetcher: Fetcher<C>,
    ) -> Bootstrapper<DirectUrlResolver, C> {
        Bootstrapper::new(
            DirectUrlResolver::new(&self.base_url, &self.fallback_version),
            fetcher,
            Packaging::archive("go", PathBuf::from("bin").join("go")),
        )
    }
}
