#![warn(clippy::pedantic)]

//! # toolboot
//!
//! Installs a pinned toolchain into a directory and reports where it ended
//! up. Running the same command twice is cheap: the second run only resolves
//! the version and finds it already installed.
//!
//! ## Subcommands
//!
//! - `cipd` - Install the package client binary from the package service
//! - `go` - Install a Go distribution from its download server
//!
//! ## Examples
//!
//! ```bash
//! toolboot cipd --platform linux-amd64 --dest-directory /opt/cipd \
//!     --version latest --json-output /tmp/cipd.json
//! toolboot go --platform linux-amd64 --dest-directory /opt/golang --clean
//! ```

mod commands;
mod logging;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use commands::{cipd, go};

/// Toolchain bootstrap installer.
#[derive(Parser)]
#[command(
    name = "toolboot",
    author,
    version,
    about = "Install a pinned toolchain into a directory",
    after_help = "\
OUTPUT:
    On success the optional --json-output file receives
    {\"executable\": \"<path>\", \"version\": \"<version>\"}.
    On failure the file is not written and the exit code is 1.

ENVIRONMENT VARIABLES:
    RUST_LOG                Log filter (overrides -v)
    HTTPS_PROXY, NO_PROXY   Proxy settings for all downloads"
)]
pub struct Cli {
    /// Increase log verbosity (-v for progress, -vv for every step).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Installable tools.
#[derive(Subcommand)]
pub enum Commands {
    /// Install the package client binary.
    ///
    /// Resolves the requested version to an instance id through the package
    /// service, downloads the client binary and verifies its SHA-1.
    Cipd(cipd::CipdArgs),

    /// Install a Go distribution.
    ///
    /// Downloads the release archive, verifies it against its published
    /// SHA-256 and installs the extracted `go/` tree.
    Go(go::GoArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints an error with its cause chain and returns the exit code.
fn handle_error(e: &anyhow::Error) -> i32 {
    println!("Error: {e:?}");
    1
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Cipd(args) => cipd::execute(&args).await,
        Commands::Go(args) => go::execute(&args).await,
    }
}
