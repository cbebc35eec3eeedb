//! Go distribution install command.

use anyhow::{Context, Result};
use clap::Args;
use toolboot_bootstrap::config::DEFAULT_GO_VERSION;
use toolboot_bootstrap::{BootstrapConfig, GoDistributionConfig};

use super::common::{InstallOptions, run_install};

/// Arguments for the go command.
#[derive(Args, Debug)]
pub struct GoArgs {
    #[command(flatten)]
    pub options: InstallOptions,

    /// Go release to install, e.g. go1.7.
    #[arg(long, default_value = DEFAULT_GO_VERSION)]
    pub version: String,
}

/// Executes the go command.
///
/// # Errors
///
/// Returns an error if the download, verification, extraction or version
/// check fails.
pub async fn execute(args: &GoArgs) -> Result<()> {
    let fetcher = BootstrapConfig::default()
        .fetcher()
        .context("Failed to set up HTTP client")?;
    let bootstrapper = GoDistributionConfig::default()
        .with_base_url(args.options.backend_url.clone())
        .bootstrapper(fetcher);

    run_install("go", &bootstrapper, &args.options, &args.version).await?;
    Ok(())
}
