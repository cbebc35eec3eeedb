//! Package client install command.
//!
//! ```bash
//! toolboot cipd --platform linux-amd64 --dest-directory /opt/cipd
//! toolboot cipd --platform linux-amd64 --dest-directory /opt/cipd --version git_revision:abc
//! ```

use anyhow::{Context, Result};
use clap::Args;
use toolboot_bootstrap::resolver::LATEST;
use toolboot_bootstrap::{BootstrapConfig, PackageClientConfig};

use super::common::{InstallOptions, run_install};

/// Arguments for the cipd command.
#[derive(Args, Debug)]
pub struct CipdArgs {
    #[command(flatten)]
    pub options: InstallOptions,

    /// Version, tag or ref to install.
    #[arg(long, default_value = LATEST)]
    pub version: String,
}

/// Executes the cipd command.
///
/// # Errors
///
/// Returns an error if resolution, download, verification or installation
/// fails.
pub async fn execute(args: &CipdArgs) -> Result<()> {
    let fetcher = BootstrapConfig::default()
        .fetcher()
        .context("Failed to set up HTTP client")?;
    let bootstrapper = PackageClientConfig::default()
        .with_backend(args.options.backend_url.clone())
        .bootstrapper(fetcher);

    run_install("cipd", &bootstrapper, &args.options, &args.version).await?;
    Ok(())
}
