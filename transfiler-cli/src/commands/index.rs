//! `transfiler index <root>` — snapshot a directory tree into a manifest.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use transfiler_core::{build_manifest, manifest_file_name, write_manifest, EntryKind};

use super::load_config;

/// Arguments for `transfiler index`.
#[derive(Args, Debug)]
pub struct IndexArgs {
    /// Directory to index.
    pub root: PathBuf,

    /// Manifest file to write. Defaults to `index_<timestamp>_<id>.csv` in
    /// the current directory.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Configuration file (filters).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct IndexSummary {
    manifest: String,
    entries: usize,
    files: usize,
    directories: usize,
    other: usize,
    bytes: u64,
    unreadable: usize,
}

impl IndexArgs {
    pub fn run(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let report = build_manifest(&self.root, &config.filters)
            .with_context(|| format!("failed to index {}", self.root.display()))?;

        let output = self
            .output
            .unwrap_or_else(|| PathBuf::from(manifest_file_name()));
        write_manifest(&output, &report.manifest)
            .with_context(|| format!("failed to write manifest {}", output.display()))?;

        let mut summary = IndexSummary {
            manifest: output.display().to_string(),
            entries: report.manifest.len(),
            files: 0,
            directories: 0,
            other: 0,
            bytes: 0,
            unreadable: report.unreadable,
        };
        for entry in &report.manifest {
            match entry.kind {
                EntryKind::File => {
                    summary.files += 1;
                    summary.bytes += entry.size.unwrap_or(0);
                }
                EntryKind::Directory => summary.directories += 1,
                EntryKind::Unknown => summary.other += 1,
            }
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize index JSON")?
            );
            return Ok(());
        }

        println!(
            "{} indexed {} entries ({} files, {} directories, {} bytes) into {}",
            "✓".green().bold(),
            summary.entries,
            summary.files,
            summary.directories,
            summary.bytes,
            summary.manifest
        );
        if summary.unreadable > 0 {
            println!(
                "{} {} entries could not be read and were skipped",
                "!".yellow().bold(),
                summary.unreadable
            );
        }
        Ok(())
    }
}
