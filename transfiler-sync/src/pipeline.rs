//! Shared transfer pipeline entrypoint used by the CLI.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::Serialize;

use transfiler_core::Config;

use crate::error::RunError;
use crate::fetch::{Fetch, HttpFetcher};
use crate::progress::{ProgressSink, StatusFile, Tee};
use crate::reconcile::{
    ReconcileOutcome, ReconcileRequest, ReconcileStatus, Reconciler, TransferCounters,
    TransferPlan,
};
use crate::transfer_log::LogTotals;

/// Run a request over HTTP(S) with the configured TLS policy.
///
/// `<state_dir>/status.json` is kept current during the run; `extra` sees
/// the same events.
pub fn run(
    request: &ReconcileRequest,
    config: &Config,
    extra: &mut dyn ProgressSink,
) -> Result<ReconcileOutcome, RunError> {
    let fetcher = HttpFetcher::new(config.transfer.tls)?;
    run_with(fetcher, request, config, extra, None)
}

/// [`run`] with an explicit fetcher and optional abort flag.
pub fn run_with<F: Fetch>(
    fetcher: F,
    request: &ReconcileRequest,
    config: &Config,
    extra: &mut dyn ProgressSink,
    abort: Option<Arc<AtomicBool>>,
) -> Result<ReconcileOutcome, RunError> {
    let mut status_file = StatusFile::new(&request.state_dir);
    let result = {
        let mut reconciler =
            Reconciler::new(fetcher, config).with_sink(Tee(&mut status_file, extra));
        if let Some(flag) = abort {
            reconciler = reconciler.with_abort_flag(flag);
        }
        reconciler.reconcile(request)
    };
    if let Err(err) = &result {
        status_file.record_failure(err.counters, &err.to_string());
    }
    result
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Continue,
    Aborted,
    Error,
}

impl From<ReconcileStatus> for ReportStatus {
    fn from(status: ReconcileStatus) -> Self {
        match status {
            ReconcileStatus::Success => ReportStatus::Success,
            ReconcileStatus::Continue => ReportStatus::Continue,
            ReconcileStatus::Aborted => ReportStatus::Aborted,
        }
    }
}

/// User-visible response of a download run. Always carries counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: ReportStatus,
    pub message: String,
    pub counters: TransferCounters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<LogTotals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<TransferPlan>,
    /// `./path/name` of every entry still pending after a resume check.
    pub newly_discovered: Vec<String>,
    pub malformed_rows: Vec<usize>,
}

impl RunReport {
    pub fn from_result(result: &Result<ReconcileOutcome, RunError>) -> Self {
        match result {
            Ok(outcome) => Self {
                status: outcome.status.into(),
                message: outcome.message.clone(),
                counters: outcome.counters,
                totals: Some(outcome.totals),
                plan: outcome.plan,
                newly_discovered: outcome
                    .newly_discovered
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                malformed_rows: outcome.malformed_rows.clone(),
            },
            Err(err) => Self {
                status: ReportStatus::Error,
                message: err.source.to_string(),
                counters: err.counters,
                totals: None,
                plan: None,
                newly_discovered: Vec::new(),
                malformed_rows: Vec::new(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ReportStatus::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::progress::NoProgress;
    use crate::reconcile::ManifestSource;
    use crate::status::{self, RunState};
    use tempfile::TempDir;
    use transfiler_core::{Manifest, ManifestEntry};

    #[test]
    fn invalid_remote_is_reported_as_error_with_counters() {
        let dest = TempDir::new().expect("dest");
        let request = ReconcileRequest::new(
            ManifestSource::Provided(Manifest::default()),
            "ftp://nowhere",
            dest.path(),
        );
        let result = run(&request, &Config::default(), &mut NoProgress);
        let report = RunReport::from_result(&result);
        assert!(report.is_error());
        assert_eq!(report.counters, TransferCounters::default());

        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["status"], "error");
        assert_eq!(json["counters"]["files_copied"], 0);
        assert!(json["message"].as_str().unwrap().contains("ftp://nowhere"));
    }

    #[test]
    fn directories_only_run_writes_status_snapshot() {
        let dest = TempDir::new().expect("dest");
        let request = ReconcileRequest::new(
            ManifestSource::Provided(Manifest::new(vec![ManifestEntry::directory(".", "sub")])),
            "http://127.0.0.1:9/",
            dest.path(),
        );
        let result = run(&request, &Config::default(), &mut NoProgress);
        let report = RunReport::from_result(&result);
        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.counters.directories_created, 1);

        let snapshot = status::load_at(&request.state_dir)
            .expect("load")
            .expect("snapshot");
        assert_eq!(snapshot.state, RunState::Success);
        assert_eq!(snapshot.counters.directories_created, 1);
    }

    #[test]
    fn locked_run_does_not_touch_snapshot() {
        let dest = TempDir::new().expect("dest");
        let request = ReconcileRequest::new(
            ManifestSource::Provided(Manifest::default()),
            "http://127.0.0.1:9/",
            dest.path(),
        );
        let _held = crate::lock::RunLock::acquire(&request.state_dir).expect("lock");
        let err = run(&request, &Config::default(), &mut NoProgress).unwrap_err();
        assert!(matches!(err.source, SyncError::Locked { .. }));
        assert!(status::load_at(&request.state_dir).expect("load").is_none());
    }
}
