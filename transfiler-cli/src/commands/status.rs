//! `transfiler status` — last run snapshot and log totals of a destination.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use transfiler_sync::{
    default_state_dir, lock, status, LogTotals, RunState, RunStatus, TransferLog,
};

/// Arguments for `transfiler status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Destination root.
    #[arg(long, default_value = ".")]
    pub dest: PathBuf,

    /// State directory. Defaults to `<dest>/.transfiler`.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson {
    state_dir: String,
    locked: bool,
    run: Option<RunStatus>,
    logs: LogTotals,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "")]
    name: &'static str,
    #[tabled(rename = "this run")]
    run: String,
    #[tabled(rename = "logged")]
    logged: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let state_dir = self
            .state_dir
            .unwrap_or_else(|| default_state_dir(&self.dest));
        let run = status::load_at(&state_dir)
            .with_context(|| format!("failed to read status in {}", state_dir.display()))?;
        let logs = TransferLog::read_totals(&state_dir)
            .with_context(|| format!("failed to read logs in {}", state_dir.display()))?;
        let locked = lock::is_locked_at(&state_dir);

        if self.json {
            let payload = StatusJson {
                state_dir: state_dir.display().to_string(),
                locked,
                run,
                logs,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        let Some(run) = run else {
            println!("No transfer recorded in {}.", state_dir.display());
            return Ok(());
        };

        println!(
            "{}  started {}, updated {}",
            state_label(run.state, locked),
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            age(run.updated_at, Utc::now()),
        );
        if let Some(plan) = run.plan {
            println!(
                "Plan: {} files ({} bytes), {} directories",
                plan.files_to_download, plan.bytes_to_download, plan.directories_pending
            );
        }

        let c = &run.counters;
        let rows = vec![
            StatusRow {
                name: "downloaded",
                run: format!("{} files, {} dirs", c.files_copied, c.directories_created),
                logged: logs.downloaded.to_string(),
            },
            StatusRow {
                name: "failed",
                run: format!("{} files, {} dirs", c.files_failed, c.directories_failed),
                logged: logs.failed.to_string(),
            },
            StatusRow {
                name: "ignored",
                run: c.files_ignored.to_string(),
                logged: logs.ignored.to_string(),
            },
            StatusRow {
                name: "pending",
                run: String::new(),
                logged: logs.newly_discovered.to_string(),
            },
        ];
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");

        if let Some(failure) = &run.last_failure {
            println!("Last failure: {failure}");
        }
        if let Some(message) = &run.message {
            println!("{message}");
        }
        Ok(())
    }
}

/// `42s ago`, `7m ago`, `3h ago`, `2d ago`
fn age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

fn state_label(state: RunState, locked: bool) -> String {
    match state {
        RunState::Running if locked => "● RUNNING".cyan().bold().to_string(),
        RunState::Running => "● INTERRUPTED".red().bold().to_string(),
        RunState::Success => "✓ SUCCESS".green().bold().to_string(),
        RunState::Continue => "… CONTINUE".yellow().bold().to_string(),
        RunState::Aborted => "■ ABORTED".yellow().bold().to_string(),
        RunState::Failed => "✗ FAILED".red().bold().to_string(),
    }
}
