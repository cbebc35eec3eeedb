//! Version resolution.
//!
//! A [`VersionResolver`] turns a symbolic version request into a concrete
//! [`ResolvedVersion`], and a resolved version into a downloadable
//! [`Artifact`]. The two steps are separate so that the install cache can be
//! consulted in between: a warm install never pays for the second lookup.
//!
//! ## Variants
//!
//! - [`ServiceResolver`] asks a package-metadata service. `resolve` maps a
//!   version or tag to an instance id; `locate` asks for a signed fetch URL
//!   and the SHA-1 of the client binary.
//! - [`DirectUrlResolver`] treats the version as part of a fixed download
//!   URL. `resolve` only substitutes the fallback version; `locate` reads the
//!   SHA-256 from a `.sha256` sidecar next to the archive.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum::ExpectedChecksum;
use crate::errors::{BootstrapError, Result};
use crate::fetch::{Fetcher, HttpClient};

/// Version keyword that asks for the newest release.
pub const LATEST: &str = "latest";

/// Concrete version or instance identifier produced by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ResolvedVersion(String);

impl ResolvedVersion {
    /// Wraps a resolved identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A downloadable artifact for a resolved version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Where to download the artifact from.
    pub url: String,
    /// File name to store the download under.
    pub filename: String,
    /// Digest the downloaded file must match.
    pub checksum: ExpectedChecksum,
}

/// Maps version requests to concrete versions and artifacts.
#[allow(async_fn_in_trait)]
pub trait VersionResolver {
    /// Resolves `requested` (`None` meaning the variant's default) for
    /// `platform`.
    async fn resolve<C: HttpClient>(
        &self,
        fetcher: &Fetcher<C>,
        platform: &str,
        requested: Option<&str>,
    ) -> Result<ResolvedVersion>;

    /// Looks up the artifact to download for a resolved version.
    async fn locate<C: HttpClient>(
        &self,
        fetcher: &Fetcher<C>,
        platform: &str,
        version: &ResolvedVersion,
    ) -> Result<Artifact>;
}

/// Status value of a successful package-service response.
const SUCCESS: &str = "SUCCESS";

/// Common fields of every package-service response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    status: Option<String>,
    error_message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

#[derive(Debug, Deserialize)]
struct ResolvePayload {
    instance_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientPayload {
    client_binary: Option<ClientBinary>,
}

#[derive(Debug, Deserialize)]
struct ClientBinary {
    fetch_url: String,
    sha1: String,
}

/// Resolver backed by a package-metadata service.
#[derive(Debug, Clone)]
pub struct ServiceResolver {
    backend_url: String,
    package_prefix: String,
    binary_name: String,
}

impl ServiceResolver {
    /// Creates a resolver for packages named `{package_prefix}/{platform}`.
    ///
    /// `binary_name` is used as the download file name.
    #[must_use]
    pub fn new(
        backend_url: impl Into<String>,
        package_prefix: impl Into<String>,
        binary_name: impl Into<String>,
    ) -> Self {
        Self {
            backend_url: backend_url.into(),
            package_prefix: package_prefix.into(),
            binary_name: binary_name.into(),
        }
    }

    /// Full package name for a platform, e.g. `infra/tools/cipd/linux-amd64`.
    #[must_use]
    pub fn package_name(&self, platform: &str) -> String {
        format!("{}/{platform}", self.package_prefix.trim_end_matches('/'))
    }

    /// URL of a service endpoint.
    #[must_use]
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/_ah/api/{endpoint}",
            self.backend_url.trim_end_matches('/')
        )
    }

    async fn call_api<C, T>(
        &self,
        fetcher: &Fetcher<C>,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T>
    where
        C: HttpClient,
        T: for<'de> Deserialize<'de>,
    {
        let url = self.endpoint_url(endpoint);
        let response = fetcher.fetch(&url, query).await?;

        let body: ApiResponse<T> = serde_json::from_slice(&response.body)
            .map_err(|e| BootstrapError::invalid_response(&url, e.to_string()))?;

        let status = body.status.unwrap_or_default();
        if status != SUCCESS {
            return Err(BootstrapError::Backend {
                status,
                message: body
                    .error_message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "<no error message>".to_string()),
            });
        }

        Ok(body.payload)
    }
}

impl VersionResolver for ServiceResolver {
    async fn resolve<C: HttpClient>(
        &self,
        fetcher: &Fetcher<C>,
        platform: &str,
        requested: Option<&str>,
    ) -> Result<ResolvedVersion> {
        let package = self.package_name(platform);
        let version = requested.filter(|v| !v.is_empty()).unwrap_or(LATEST);

        let payload: ResolvePayload = self
            .call_api(
                fetcher,
                "repo/v1/instance/resolve",
                &[("package_name", package.as_str()), ("version", version)],
            )
            .await?;

        let instance_id = payload
            .instance_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BootstrapError::Backend {
                status: SUCCESS.to_string(),
                message: format!("no instance_id returned for {package}@{version}"),
            })?;

        tracing::info!(package = %package, version, instance_id = %instance_id, "resolved version");
        Ok(ResolvedVersion::new(instance_id))
    }

    async fn locate<C: HttpClient>(
        &self,
        fetcher: &Fetcher<C>,
        platform: &str,
        version: &ResolvedVersion,
    ) -> Result<Artifact> {
        let package = self.package_name(platform);

        let payload: ClientPayload = self
            .call_api(
                fetcher,
                "repo/v1/client",
                &[("package_name", package.as_str()), ("instance_id", version.as_str())],
            )
            .await?;

        let binary = payload.client_binary.ok_or_else(|| BootstrapError::Backend {
            status: SUCCESS.to_string(),
            message: format!("no client_binary returned for {package}@{version}"),
        })?;

        Ok(Artifact {
            url: binary.fetch_url,
            filename: self.binary_name.clone(),
            checksum: ExpectedChecksum::sha1(binary.sha1),
        })
    }
}

/// Resolver for artifacts served from a fixed download location.
#[derive(Debug, Clone)]
pub struct DirectUrlResolver {
    base_url: String,
    fallback_version: String,
}

impl DirectUrlResolver {
    /// Creates a resolver for archives at `{base_url}{version}.{platform}.tar.gz`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, fallback_version: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            fallback_version: fallback_version.into(),
        }
    }

    /// Archive file name for a version and platform.
    #[must_use]
    pub fn archive_name(version: &str, platform: &str) -> String {
        format!("{version}.{platform}.tar.gz")
    }

    /// Download URL for a file under the base URL.
    #[must_use]
    pub fn file_url(&self, filename: &str) -> String {
        if self.base_url.ends_with('/') {
            format!("{}{filename}", self.base_url)
        } else {
            format!("{}/{filename}", self.base_url)
        }
    }
}

impl VersionResolver for DirectUrlResolver {
    async fn resolve<C: HttpClient>(
        &self,
        _fetcher: &Fetcher<C>,
        _platform: &str,
        requested: Option<&str>,
    ) -> Result<ResolvedVersion> {
        let version = match requested {
            None | Some("" | LATEST) => self.fallback_version.as_str(),
            Some(v) => v,
        };
        Ok(ResolvedVersion::new(version))
    }

    async fn locate<C: HttpClient>(
        &self,
        fetcher: &Fetcher<C>,
        platform: &str,
        version: &ResolvedVersion,
    ) -> Result<Artifact> {
        let filename = Self::archive_name(version.as_str(), platform);
        let url = self.file_url(&filename);
        let sidecar_url = format!("{url}.sha256");

        let response = fetcher.fetch(&sidecar_url, &[]).await?;
        let digest = response
            .text()
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| BootstrapError::invalid_response(&sidecar_url, "empty checksum"))?;

        Ok(Artifact {
            url,
            filename,
            checksum: ExpectedChecksum::sha256(digest),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::testing::{FakeClient, FakeReply, fast_policy};
    use serde_json::json;

    const BACKEND: &str = "https://packages.example.com";

    fn service() -> ServiceResolver {
        ServiceResolver::new(BACKEND, "infra/tools/cipd", "cipd")
    }

    fn resolve_url() -> String {
        format!("{BACKEND}/_ah/api/repo/v1/instance/resolve")
    }

    fn client_url() -> String {
        format!("{BACKEND}/_ah/api/repo/v1/client")
    }

    #[tokio::test]
    async fn service_resolves_instance_id() {
        let client = FakeClient::new();
        client.on(
            &resolve_url(),
            FakeReply::json(&json!({"status": "SUCCESS", "instance_id": "abc123"})),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        let version = service()
            .resolve(&fetcher, "linux-amd64", Some("git_revision:deadbeef"))
            .await
            .unwrap();

        assert_eq!(version.as_str(), "abc123");
        let requests = fetcher.client().requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].query.contains(&(
            "package_name".to_string(),
            "infra/tools/cipd/linux-amd64".to_string()
        )));
        assert!(requests[0].query.contains(&(
            "version".to_string(),
            "git_revision:deadbeef".to_string()
        )));
    }

    #[tokio::test]
    async fn service_defaults_to_latest() {
        let client = FakeClient::new();
        client.on(
            &resolve_url(),
            FakeReply::json(&json!({"status": "SUCCESS", "instance_id": "abc123"})),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        service().resolve(&fetcher, "mac-amd64", None).await.unwrap();

        let requests = fetcher.client().requests();
        assert!(
            requests[0]
                .query
                .contains(&("version".to_string(), "latest".to_string()))
        );
    }

    #[tokio::test]
    async fn service_error_status_is_backend_error() {
        let client = FakeClient::new();
        client.on(
            &resolve_url(),
            FakeReply::json(&json!({"status": "ERROR", "error_message": "no such tag"})),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        let err = service()
            .resolve(&fetcher, "linux-amd64", Some("bogus"))
            .await
            .unwrap_err();

        match err {
            BootstrapError::Backend { status, message } => {
                assert_eq!(status, "ERROR");
                assert_eq!(message, "no such tag");
            }
            other => panic!("expected Backend, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_error_without_message_uses_placeholder() {
        let client = FakeClient::new();
        client.on(
            &resolve_url(),
            FakeReply::json(&json!({"status": "INSTANCE_NOT_FOUND"})),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        let err = service()
            .resolve(&fetcher, "linux-amd64", None)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "server replied with error INSTANCE_NOT_FOUND: <no error message>"
        );
    }

    #[tokio::test]
    async fn service_rejects_malformed_json() {
        let client = FakeClient::new();
        client.on(&resolve_url(), FakeReply::ok(b"<html>oops</html>"));
        let fetcher = Fetcher::new(client, fast_policy(3));

        let err = service()
            .resolve(&fetcher, "linux-amd64", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
    }

    #[tokio::test]
    async fn service_locates_client_binary() {
        let client = FakeClient::new();
        client.on(
            &client_url(),
            FakeReply::json(&json!({
                "status": "SUCCESS",
                "client_binary": {
                    "fetch_url": "https://storage.example.com/cipd?sig=1",
                    "sha1": "0123abcd"
                }
            })),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        let artifact = service()
            .locate(&fetcher, "linux-amd64", &ResolvedVersion::new("abc123"))
            .await
            .unwrap();

        assert_eq!(artifact.url, "https://storage.example.com/cipd?sig=1");
        assert_eq!(artifact.filename, "cipd");
        assert_eq!(artifact.checksum.algorithm, ChecksumAlgorithm::Sha1);
        assert_eq!(artifact.checksum.hex, "0123abcd");

        let requests = fetcher.client().requests();
        assert!(
            requests[0]
                .query
                .contains(&("instance_id".to_string(), "abc123".to_string()))
        );
    }

    #[tokio::test]
    async fn service_missing_client_binary_is_backend_error() {
        let client = FakeClient::new();
        client.on(&client_url(), FakeReply::json(&json!({"status": "SUCCESS"})));
        let fetcher = Fetcher::new(client, fast_policy(3));

        let err = service()
            .locate(&fetcher, "linux-amd64", &ResolvedVersion::new("abc123"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "backend");
    }

    #[tokio::test]
    async fn service_404_is_permanent() {
        let client = FakeClient::new();
        client.on(&resolve_url(), FakeReply::status(404));
        let fetcher = Fetcher::new(client, fast_policy(20));

        let err = service()
            .resolve(&fetcher, "linux-amd64", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "permanent_http");
        assert_eq!(fetcher.client().count(&resolve_url()), 1);
    }

    #[tokio::test]
    async fn direct_resolve_uses_fallback_for_latest() {
        let resolver = DirectUrlResolver::new("https://dl.example.com/golang/", "go1.7");
        let fetcher = Fetcher::new(FakeClient::new(), fast_policy(3));

        for requested in [None, Some("latest"), Some("")] {
            let version = resolver
                .resolve(&fetcher, "linux-amd64", requested)
                .await
                .unwrap();
            assert_eq!(version.as_str(), "go1.7");
        }

        let pinned = resolver
            .resolve(&fetcher, "linux-amd64", Some("go1.6.3"))
            .await
            .unwrap();
        assert_eq!(pinned.as_str(), "go1.6.3");
        assert!(fetcher.client().requests().is_empty());
    }

    #[tokio::test]
    async fn direct_locate_reads_sha256_sidecar() {
        let resolver = DirectUrlResolver::new("https://dl.example.com/golang", "go1.7");
        let client = FakeClient::new();
        client.on(
            "https://dl.example.com/golang/go1.7.linux-amd64.tar.gz.sha256",
            FakeReply::ok(b"ABCDEF0123\n"),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        let artifact = resolver
            .locate(&fetcher, "linux-amd64", &ResolvedVersion::new("go1.7"))
            .await
            .unwrap();

        assert_eq!(
            artifact.url,
            "https://dl.example.com/golang/go1.7.linux-amd64.tar.gz"
        );
        assert_eq!(artifact.filename, "go1.7.linux-amd64.tar.gz");
        assert_eq!(artifact.checksum, ExpectedChecksum::sha256("ABCDEF0123"));
    }

    #[tokio::test]
    async fn direct_locate_rejects_empty_sidecar() {
        let resolver = DirectUrlResolver::new("https://dl.example.com/golang/", "go1.7");
        let client = FakeClient::new();
        client.on(
            "https://dl.example.com/golang/go1.7.linux-amd64.tar.gz.sha256",
            FakeReply::ok(b"  \n"),
        );
        let fetcher = Fetcher::new(client, fast_policy(3));

        let err = resolver
            .locate(&fetcher, "linux-amd64", &ResolvedVersion::new("go1.7"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
    }

    #[tokio::test]
    async fn direct_locate_unknown_version_is_permanent() {
        let resolver = DirectUrlResolver::new("https://dl.example.com/golang/", "go1.7");
        let fetcher = Fetcher::new(FakeClient::new(), fast_policy(20));

        let err = resolver
            .locate(&fetcher, "linux-amd64", &ResolvedVersion::new("go0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::PermanentHttp { status: 404, .. }));
    }
}
