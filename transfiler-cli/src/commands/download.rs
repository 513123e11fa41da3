//! `transfiler download` — replay a manifest from a remote host.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use transfiler_core::TlsPolicy;
use transfiler_sync::{
    default_state_dir, lock, pipeline, ManifestSource, ProgressEvent, ProgressSink,
    ReconcileRequest, ReportStatus, RunReport, TransferLog,
};

use super::load_config;

/// Arguments for `transfiler download`.
#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["manifest", "manifest_url", "manifest_file"])
))]
pub struct DownloadArgs {
    /// Base URL that every manifest entry is resolved against.
    #[arg(long)]
    pub remote: String,

    /// Manifest file name on the remote host, relative to `--remote`.
    #[arg(long)]
    pub manifest: Option<String>,

    /// Absolute URL of the manifest.
    #[arg(long)]
    pub manifest_url: Option<String>,

    /// Local manifest file.
    #[arg(long)]
    pub manifest_file: Option<PathBuf>,

    /// Destination root.
    #[arg(long, default_value = ".")]
    pub dest: PathBuf,

    /// Where the transfer logs live. Defaults to `<dest>/.transfiler`.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Continue the previous run instead of checking it for leftovers.
    #[arg(long = "continue")]
    pub continue_run: bool,

    /// Delete the previous run's logs and start over.
    #[arg(long, conflicts_with = "continue_run")]
    pub fresh: bool,

    /// Accept invalid TLS certificates.
    #[arg(long)]
    pub insecure: bool,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,

    /// Configuration file (filters and transfer settings).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl DownloadArgs {
    pub fn run(self) -> Result<()> {
        let mut config = load_config(self.config.as_deref())?;
        if self.insecure {
            config.transfer.tls = TlsPolicy::AcceptInvalidCerts;
        }
        if let Some(secs) = self.timeout {
            config.transfer.timeout_secs = secs;
        }

        let source = match (self.manifest, self.manifest_url, self.manifest_file) {
            (Some(name), _, _) => ManifestSource::Remote(name),
            (_, Some(url), _) => ManifestSource::Url(url),
            (_, _, Some(path)) => ManifestSource::File(path),
            (None, None, None) => bail!("provide --manifest, --manifest-url or --manifest-file"),
        };
        let state_dir = self
            .state_dir
            .unwrap_or_else(|| default_state_dir(&self.dest));

        if self.fresh {
            if lock::is_locked_at(&state_dir) {
                bail!(
                    "a transfer is running in {}; not deleting its logs",
                    state_dir.display()
                );
            }
            TransferLog::remove_all(&state_dir)
                .with_context(|| format!("failed to reset logs in {}", state_dir.display()))?;
        }

        let request = ReconcileRequest::new(source, self.remote, &self.dest)
            .with_state_dir(state_dir)
            .continuing(self.continue_run);

        let mut progress = ConsoleProgress { quiet: self.json };
        let result = pipeline::run(&request, &config, &mut progress);
        let report = RunReport::from_result(&result);

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize run JSON")?
            );
        } else {
            print_report(&report);
        }

        result.map(|_| ()).context("download failed")
    }
}

// ---------------------------------------------------------------------------
// Console output
// ---------------------------------------------------------------------------

/// Prints one line per transferred or failed item.
struct ConsoleProgress {
    quiet: bool,
}

impl ProgressSink for ConsoleProgress {
    fn emit(&mut self, event: &ProgressEvent) {
        if self.quiet {
            return;
        }
        match event {
            ProgressEvent::Started { plan } => println!(
                "Transferring {} files ({} bytes), {} directories",
                plan.files_to_download, plan.bytes_to_download, plan.directories_pending
            ),
            ProgressEvent::FileCopied { key, bytes } => {
                println!("  {}  {key} ({bytes} bytes)", "✎".green())
            }
            ProgressEvent::DirectoryReady { key, created: true } => {
                println!("  {}  {key}/", "+".green())
            }
            ProgressEvent::ItemFailed { key, reason, .. } => {
                println!("  {}  {key}: {reason}", "✗".red())
            }
            _ => {}
        }
    }
}

#[derive(Tabled)]
struct CounterRow {
    #[tabled(rename = "counter")]
    name: &'static str,
    #[tabled(rename = "value")]
    value: usize,
}

fn print_report(report: &RunReport) {
    let badge = match report.status {
        ReportStatus::Success => "✓ SUCCESS".green().bold(),
        ReportStatus::Continue => "… CONTINUE".yellow().bold(),
        ReportStatus::Aborted => "■ ABORTED".yellow().bold(),
        ReportStatus::Error => "✗ ERROR".red().bold(),
    };
    println!("{badge}  {}", report.message);

    let c = &report.counters;
    let rows = vec![
        CounterRow { name: "files copied", value: c.files_copied },
        CounterRow { name: "directories created", value: c.directories_created },
        CounterRow { name: "files failed", value: c.files_failed },
        CounterRow { name: "directories failed", value: c.directories_failed },
        CounterRow { name: "ignored", value: c.files_ignored },
        CounterRow { name: "skipped", value: c.files_skipped },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if let Some(totals) = report.totals {
        println!(
            "Logs: {} downloaded, {} failed, {} ignored",
            totals.downloaded, totals.failed, totals.ignored
        );
    }
    if !report.malformed_rows.is_empty() {
        println!(
            "{} {} malformed manifest rows skipped",
            "!".yellow().bold(),
            report.malformed_rows.len()
        );
    }
    if !report.newly_discovered.is_empty() {
        for key in report.newly_discovered.iter().take(10) {
            println!("  ·  {key}");
        }
        if report.newly_discovered.len() > 10 {
            println!("  +{} more", report.newly_discovered.len() - 10);
        }
        println!("Run again with --continue to fetch them, or --fresh to start over.");
    }
}
