//! `transfiler compare <a> <b>` — diff two manifests into a change report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use transfiler_core::{compare_files, ChangeRecord, ChangeSummary, ChangeTag};

/// Arguments for `transfiler compare`.
#[derive(Args, Debug)]
pub struct CompareArgs {
    /// Baseline manifest (A).
    pub a: PathBuf,

    /// Manifest to compare against the baseline (B).
    pub b: PathBuf,

    /// Directory that receives the `differences_*.csv` report.
    #[arg(long, default_value = ".")]
    pub out_dir: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CompareJson<'a> {
    artifact: String,
    summary: ChangeSummary,
    malformed_a: &'a [usize],
    malformed_b: &'a [usize],
    records: Vec<RecordJson<'a>>,
}

#[derive(Serialize)]
struct RecordJson<'a> {
    name: &'a str,
    relative_path: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    size: Option<i64>,
    source: &'static str,
}

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "entry")]
    entry: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "size / delta")]
    size: String,
}

impl CompareArgs {
    pub fn run(self) -> Result<()> {
        let report = compare_files(&self.a, &self.b, &self.out_dir).with_context(|| {
            format!(
                "failed to compare {} with {}",
                self.a.display(),
                self.b.display()
            )
        })?;

        if self.json {
            let payload = CompareJson {
                artifact: report.artifact_path.display().to_string(),
                summary: report.summary,
                malformed_a: &report.malformed_a,
                malformed_b: &report.malformed_b,
                records: report.records.iter().map(record_json).collect(),
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize compare JSON")?
            );
            return Ok(());
        }

        let summary = report.summary;
        if summary.total() == 0 {
            println!("{} manifests are identical", "✓".green().bold());
        } else {
            println!(
                "{} only in A, {} only in B, {} size changes, {} type changes",
                summary.only_in_a.to_string().red().bold(),
                summary.only_in_b.to_string().green().bold(),
                summary.size_changed.to_string().yellow().bold(),
                summary.type_changed.to_string().magenta().bold(),
            );
            let rows: Vec<RecordRow> = report.records.iter().map(record_row).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        for (label, lines) in [("A", &report.malformed_a), ("B", &report.malformed_b)] {
            if !lines.is_empty() {
                println!(
                    "{} skipped {} malformed rows in {label} (lines {:?})",
                    "!".yellow().bold(),
                    lines.len(),
                    lines
                );
            }
        }
        println!("Report written to {}", report.artifact_path.display());
        Ok(())
    }
}

fn record_json(record: &ChangeRecord) -> RecordJson<'_> {
    RecordJson {
        name: &record.name,
        relative_path: &record.relative_path,
        kind: record.kind.as_str(),
        size: record.size_or_delta,
        source: record.tag.as_str(),
    }
}

fn record_row(record: &ChangeRecord) -> RecordRow {
    let source = match record.tag {
        ChangeTag::A => record.tag.as_str().red().to_string(),
        ChangeTag::B => record.tag.as_str().green().to_string(),
        ChangeTag::SizeDiff => record.tag.as_str().yellow().to_string(),
        ChangeTag::TypeDiff => record.tag.as_str().magenta().to_string(),
    };
    let size = match (record.tag, record.size_or_delta) {
        (ChangeTag::SizeDiff, Some(delta)) => format!("{delta:+}"),
        (_, Some(size)) => size.to_string(),
        (_, None) => String::new(),
    };
    RecordRow {
        source,
        entry: record.key().to_string(),
        kind: record.kind.to_string(),
        size,
    }
}
