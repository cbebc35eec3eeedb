//! Flags and result handling shared by the install commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use toolboot_bootstrap::{
    BootstrapResult, Bootstrapper, HttpClient, InstallRequest, VersionResolver,
};

/// Flags every install command accepts.
#[derive(Args, Debug, Clone)]
pub struct InstallOptions {
    /// Platform to install for (e.g. linux-amd64, mac-arm64).
    #[arg(long, value_name = "PLATFORM")]
    pub platform: String,

    /// Directory to install into. Created if missing.
    #[arg(long = "dest-directory", value_name = "DIR")]
    pub dest_directory: PathBuf,

    /// Write `{"executable", "version"}` to this file on success.
    #[arg(long = "json-output", value_name = "FILE")]
    pub json_output: Option<PathBuf>,

    /// Reinstall even if the requested version is already present.
    #[arg(long)]
    pub clean: bool,

    /// Use a different server than the public one.
    #[arg(long = "backend-url", value_name = "URL")]
    pub backend_url: Option<String>,
}

impl InstallOptions {
    /// Builds the install request for a requested version.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination cannot be made absolute.
    pub fn request(&self, version: &str) -> Result<InstallRequest> {
        let root = std::path::absolute(&self.dest_directory).with_context(|| {
            format!(
                "Failed to resolve destination directory {}",
                self.dest_directory.display()
            )
        })?;
        Ok(InstallRequest::new(root, self.platform.clone(), Some(version.to_string()))
            .with_force(self.clean))
    }
}

/// Runs an install and reports the outcome.
///
/// # Errors
///
/// Returns an error if the install fails or the JSON file cannot be written.
pub async fn run_install<R, C>(
    tool: &str,
    bootstrapper: &Bootstrapper<R, C>,
    options: &InstallOptions,
    version: &str,
) -> Result<BootstrapResult>
where
    R: VersionResolver,
    C: HttpClient,
{
    let request = options.request(version)?;

    let result = bootstrapper.install(&request).await.with_context(|| {
        format!(
            "Failed to install {tool} {version} into {}",
            request.install_root.display()
        )
    })?;

    if let Some(path) = &options.json_output {
        result
            .write_json(path)
            .with_context(|| format!("Failed to write result to {}", path.display()))?;
    }

    println!(
        "{tool} {} is installed at {}",
        result.version,
        result.executable.display()
    );
    Ok(result)
}
