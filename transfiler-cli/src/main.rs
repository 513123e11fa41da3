//! Transfiler — move a file tree between hosts over plain HTTP.
//!
//! # Usage
//!
//! ```text
//! transfiler index <root> [--output FILE] [--config FILE] [--json]
//! transfiler download --remote URL (--manifest NAME | --manifest-url URL | --manifest-file PATH)
//!                     [--dest DIR] [--state-dir DIR] [--continue | --fresh]
//!                     [--insecure] [--timeout SECS] [--json] [--config FILE]
//! transfiler compare <a> <b> [--out-dir DIR] [--json]
//! transfiler status [--dest DIR] [--state-dir DIR] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    compare::CompareArgs, download::DownloadArgs, index::IndexArgs, status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "transfiler",
    version,
    about = "Index, download and compare file trees over HTTP",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a manifest of a local directory tree.
    Index(IndexArgs),

    /// Fetch every manifest entry from a remote host into a destination.
    Download(DownloadArgs),

    /// Diff two manifests into a change report.
    Compare(CompareArgs),

    /// Show the state of the last transfer into a destination.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Index(args) => args.run(),
        Commands::Download(args) => args.run(),
        Commands::Compare(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}

/// Log records go to stderr so `--json` output stays parseable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
