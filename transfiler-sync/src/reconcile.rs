//! Transfer reconciler — replays a manifest onto a destination tree.
//!
//! ## Run protocol
//!
//! 0. Validate the remote base URL and take the state directory's run lock.
//! 1. Resume check: a downloaded log exists and this is not a continuation.
//!    The manifest is compared against the logs and every entry a
//!    continuation would still attempt is written to the newly-discovered
//!    log. Nothing is downloaded.
//! 2. Apply: the bytes still to download are checked against the free space
//!    of the destination's file system, then every manifest entry is
//!    processed in order. Each attempt ends in exactly one of the downloaded,
//!    failed or ignored logs, and the record is flushed before the next
//!    entry starts. Entries resolving into the state directory are failed.
//!
//! Per-item problems are recorded and counted, never propagated. Only
//! run-level problems (bad URL, lock held, unreadable manifest, not enough
//! space, log I/O) end the run, as a [`RunError`] carrying the counters
//! reached so far.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use transfiler_core::codec::{self, Decoded};
use transfiler_core::{
    read_manifest, Config, EntryKey, EntryKind, FilterConfig, Manifest, ManifestEntry,
    RetryPolicy, TransferSettings,
};

use crate::error::{io_err, RunError, SyncError, WriteError};
use crate::fetch::{entry_url, manifest_url, parse_base, Fetch};
use crate::lock::RunLock;
use crate::progress::{NoProgress, ProgressEvent, ProgressSink};
use crate::transfer_log::{LogKind, LogTotals, TransferLog};
use crate::writer;

pub use transfiler_core::STATE_DIR_NAME;

/// `<destination>/.transfiler`
pub fn default_state_dir(destination: &Path) -> PathBuf {
    destination.join(STATE_DIR_NAME)
}

// ---------------------------------------------------------------------------
// Counters and plan
// ---------------------------------------------------------------------------

/// Per-run counters. Each run starts from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferCounters {
    pub files_copied: usize,
    pub directories_created: usize,
    pub files_failed: usize,
    pub directories_failed: usize,
    pub files_ignored: usize,
    pub files_skipped: usize,
}

impl fmt::Display for TransferCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files copied, {} directories created, {} files failed, {} directories failed, {} ignored, {} skipped",
            self.files_copied,
            self.directories_created,
            self.files_failed,
            self.directories_failed,
            self.files_ignored,
            self.files_skipped
        )
    }
}

/// Work left before a run starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferPlan {
    /// Rows in the manifest.
    pub entries: usize,
    pub files_to_download: usize,
    /// Sum of the declared sizes of `files_to_download`. Files above the
    /// size limit are left out of both.
    pub bytes_to_download: u64,
    pub directories_pending: usize,
}

// ---------------------------------------------------------------------------
// Request and outcome
// ---------------------------------------------------------------------------

/// Where the manifest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// A file name resolved against the remote base URL.
    Remote(String),
    /// An absolute URL.
    Url(String),
    /// A local file.
    File(PathBuf),
    /// An already decoded manifest.
    Provided(Manifest),
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestSource::Remote(name) => write!(f, "remote manifest '{name}'"),
            ManifestSource::Url(url) => write!(f, "{url}"),
            ManifestSource::File(path) => write!(f, "{}", path.display()),
            ManifestSource::Provided(m) => write!(f, "in-memory manifest ({} entries)", m.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub source: ManifestSource,
    pub remote_base: String,
    pub continue_run: bool,
    pub destination: PathBuf,
    pub state_dir: PathBuf,
}

impl ReconcileRequest {
    /// A non-continuation request whose state lives in `<destination>/.transfiler`.
    pub fn new(
        source: ManifestSource,
        remote_base: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        let destination = destination.into();
        Self {
            source,
            remote_base: remote_base.into(),
            continue_run: false,
            state_dir: default_state_dir(&destination),
            destination,
        }
    }

    pub fn continuing(mut self, continue_run: bool) -> Self {
        self.continue_run = continue_run;
        self
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStatus {
    /// Nothing left to do, or the manifest was fully applied.
    Success,
    /// A previous run exists and entries remain; continue it to fetch them.
    Continue,
    /// The abort flag stopped the run between two items.
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub status: ReconcileStatus,
    pub counters: TransferCounters,
    /// Present when the manifest was applied.
    pub plan: Option<TransferPlan>,
    pub message: String,
    /// Keys the resume check found still pending.
    pub newly_discovered: Vec<EntryKey>,
    /// Line numbers of manifest rows that could not be decoded.
    pub malformed_rows: Vec<usize>,
    /// Log contents after the run.
    pub totals: LogTotals,
}

/// Why a single entry was not transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemFailure {
    UnsafePath { segment: String },
    ExtensionNotAllowed { extension: String },
    TooLarge { size: u64, limit: u64 },
    MissingSize,
    Fetch { message: String },
    Write { message: String },
    SizeMismatch { expected: u64, actual: u64 },
    CreateDirectory { message: String },
    StateDirectory { path: PathBuf },
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFailure::UnsafePath { segment } => write!(f, "unsafe path segment '{segment}'"),
            ItemFailure::ExtensionNotAllowed { extension } => {
                write!(f, "extension '{extension}' is not in the allow list")
            }
            ItemFailure::TooLarge { size, limit } => {
                write!(f, "declared size {size} exceeds the {limit} byte limit")
            }
            ItemFailure::MissingSize => f.write_str("no declared size to verify against"),
            ItemFailure::Fetch { message } => f.write_str(message),
            ItemFailure::Write { message } => write!(f, "write failed: {message}"),
            ItemFailure::SizeMismatch { expected, actual } => {
                write!(f, "expected {expected} bytes, received {actual}")
            }
            ItemFailure::CreateDirectory { message } => {
                write!(f, "could not create directory: {message}")
            }
            ItemFailure::StateDirectory { path } => {
                write!(f, "{} lies inside the transfer state directory", path.display())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Runs reconciliation requests against one fetch implementation.
pub struct Reconciler<'a, F> {
    fetcher: F,
    filters: FilterConfig,
    settings: TransferSettings,
    sink: Box<dyn ProgressSink + 'a>,
    abort: Option<Arc<AtomicBool>>,
}

impl<'a, F: Fetch> Reconciler<'a, F> {
    pub fn new(fetcher: F, config: &Config) -> Self {
        Self {
            fetcher,
            filters: config.filters.clone(),
            settings: config.transfer.clone(),
            sink: Box::new(NoProgress),
            abort: None,
        }
    }

    pub fn with_sink(mut self, sink: impl ProgressSink + 'a) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Stop between items once `flag` is set.
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = Some(flag);
        self
    }

    pub fn reconcile(&mut self, request: &ReconcileRequest) -> Result<ReconcileOutcome, RunError> {
        let base = parse_base(&request.remote_base)?;
        let _lock = RunLock::acquire(&request.state_dir)?;

        if !request.continue_run && TransferLog::downloaded_exists(&request.state_dir) {
            tracing::info!(
                "previous run found in {}; checking for remaining entries",
                request.state_dir.display()
            );
            return self.resume_check(&base, request).map_err(RunError::from);
        }
        self.apply(&base, request)
    }

    fn aborted(&self) -> bool {
        self.abort
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Keys a continuation run would not attempt.
    fn is_settled(&self, log: &TransferLog, key: &EntryKey) -> bool {
        log.contains(LogKind::Downloaded, key)
            || log.contains(LogKind::Ignored, key)
            || (self.settings.retry_policy == RetryPolicy::SkipFailed
                && log.contains(LogKind::Failed, key))
    }

    // -- manifest ----------------------------------------------------------

    fn load_manifest(&self, base: &Url, source: &ManifestSource) -> Result<Decoded, SyncError> {
        let decoded = match source {
            ManifestSource::Remote(name) => self.fetch_manifest(&manifest_url(base, name)?)?,
            ManifestSource::Url(url) => self.fetch_manifest(&parse_base(url)?)?,
            ManifestSource::File(path) => read_manifest(path)?,
            ManifestSource::Provided(manifest) => Decoded {
                manifest: manifest.clone(),
                malformed: Vec::new(),
            },
        };
        if !decoded.malformed.is_empty() {
            tracing::warn!(
                "{source}: discarded {} malformed rows (lines {:?})",
                decoded.malformed.len(),
                decoded.malformed
            );
        }
        tracing::info!("loaded {source}: {} entries", decoded.manifest.len());
        Ok(decoded)
    }

    fn fetch_manifest(&self, url: &Url) -> Result<Decoded, SyncError> {
        let bytes = self
            .fetcher
            .fetch(url, self.settings.timeout(), None)
            .map_err(SyncError::ManifestFetch)?;
        let text = String::from_utf8(bytes).map_err(|_| SyncError::ManifestEncoding {
            url: url.to_string(),
        })?;
        Ok(codec::decode(&text))
    }

    // -- resume check ------------------------------------------------------

    fn resume_check(
        &mut self,
        base: &Url,
        request: &ReconcileRequest,
    ) -> Result<ReconcileOutcome, SyncError> {
        let mut log = TransferLog::open(&request.state_dir, false)?;
        let decoded = self.load_manifest(base, &request.source)?;
        log.reset_new_files()?;

        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for entry in decoded.manifest.iter().filter(|e| !e.name.is_empty()) {
            let key = entry.key();
            if self.is_settled(&log, &key) || !seen.insert(key.clone()) {
                continue;
            }
            log.append(LogKind::NewlyDiscovered, entry)?;
            pending.push(key);
        }

        let (status, message) = if pending.is_empty() {
            (
                ReconcileStatus::Success,
                "previous run is complete; nothing left to transfer".to_string(),
            )
        } else {
            (
                ReconcileStatus::Continue,
                format!(
                    "previous run found with {} entries not yet transferred; continue it to fetch them",
                    pending.len()
                ),
            )
        };
        tracing::info!("{message}");

        let counters = TransferCounters::default();
        self.sink.emit(&ProgressEvent::Finished { status, counters });
        Ok(ReconcileOutcome {
            status,
            counters,
            plan: None,
            message,
            newly_discovered: pending,
            malformed_rows: decoded.malformed,
            totals: log.totals(),
        })
    }

    // -- apply -------------------------------------------------------------

    fn apply(&mut self, base: &Url, request: &ReconcileRequest) -> Result<ReconcileOutcome, RunError> {
        let mut counters = TransferCounters::default();
        let decoded = self.load_manifest(base, &request.source)?;

        let fresh = !request.continue_run || !TransferLog::downloaded_exists(&request.state_dir);
        let previous = if fresh {
            None
        } else {
            Some(TransferLog::open(&request.state_dir, false)?)
        };
        let plan = self.plan(&decoded.manifest, previous.as_ref());
        check_space(&request.destination, plan.bytes_to_download)?;
        let mut log = match previous {
            Some(log) => log,
            None => TransferLog::open(&request.state_dir, true)?,
        };
        let layout = Layout::new(&request.destination, &request.state_dir);

        tracing::info!(
            "transferring {} files ({} bytes) and {} directories into {}",
            plan.files_to_download,
            plan.bytes_to_download,
            plan.directories_pending,
            request.destination.display()
        );
        self.sink.emit(&ProgressEvent::Started { plan });

        let mut status = ReconcileStatus::Success;
        for entry in decoded.manifest.iter() {
            if self.aborted() {
                tracing::info!("abort requested; stopping before {}", entry.key());
                status = ReconcileStatus::Aborted;
                break;
            }
            self.apply_entry(entry, base, &layout, &mut log, &mut counters)
                .map_err(|e| RunError::new(counters, e))?;
        }

        let message = match status {
            ReconcileStatus::Aborted => format!("transfer aborted: {counters}"),
            _ => format!("transfer finished: {counters}"),
        };
        tracing::info!("{message}");
        self.sink.emit(&ProgressEvent::Finished { status, counters });

        Ok(ReconcileOutcome {
            status,
            counters,
            plan: Some(plan),
            message,
            newly_discovered: Vec::new(),
            malformed_rows: decoded.malformed,
            totals: log.totals(),
        })
    }

    /// Work left against `previous` logs; `None` for a fresh run.
    fn plan(&self, manifest: &Manifest, previous: Option<&TransferLog>) -> TransferPlan {
        let mut plan = TransferPlan {
            entries: manifest.len(),
            ..TransferPlan::default()
        };
        let mut seen = HashSet::new();
        for entry in manifest {
            let key = entry.key();
            let done = previous.is_some_and(|log| {
                log.contains(LogKind::Downloaded, &key)
                    || (self.settings.retry_policy == RetryPolicy::SkipFailed
                        && log.contains(LogKind::Failed, &key))
            });
            if !seen.insert(key.clone()) || done {
                continue;
            }
            let too_large = self
                .settings
                .max_file_size
                .zip(entry.size)
                .is_some_and(|(limit, size)| size > limit);
            match entry.kind {
                EntryKind::File if !self.filters.is_excluded(&entry.extension()) && !too_large => {
                    plan.files_to_download += 1;
                    plan.bytes_to_download += entry.size.unwrap_or(0);
                }
                EntryKind::Directory => plan.directories_pending += 1,
                _ => {}
            }
        }
        plan
    }

    /// Process one entry. Only log I/O errors escape.
    fn apply_entry(
        &mut self,
        entry: &ManifestEntry,
        base: &Url,
        layout: &Layout,
        log: &mut TransferLog,
        counters: &mut TransferCounters,
    ) -> Result<(), SyncError> {
        let key = entry.key();
        if log.contains(LogKind::Downloaded, &key) {
            return self.skip(key, counters, "already downloaded");
        }
        if self.settings.retry_policy == RetryPolicy::SkipFailed && log.contains(LogKind::Failed, &key)
        {
            return self.skip(key, counters, "failed before");
        }

        match entry.kind {
            EntryKind::Unknown => self.ignore(entry, log, counters, "not a file or directory"),
            EntryKind::File if self.filters.is_excluded(&entry.extension()) => {
                self.ignore(entry, log, counters, "excluded extension")
            }
            EntryKind::Directory => self.apply_directory(entry, layout, log, counters),
            EntryKind::File => match self.transfer_file(entry, base, layout) {
                Ok(bytes) => {
                    log.append(LogKind::Downloaded, entry)?;
                    counters.files_copied += 1;
                    tracing::info!("downloaded {key} ({bytes} bytes)");
                    self.sink.emit(&ProgressEvent::FileCopied { key, bytes });
                    Ok(())
                }
                Err(failure) => self.fail(entry, failure, log, counters),
            },
        }
    }

    fn apply_directory(
        &mut self,
        entry: &ManifestEntry,
        layout: &Layout,
        log: &mut TransferLog,
        counters: &mut TransferCounters,
    ) -> Result<(), SyncError> {
        let target = match layout.target(entry) {
            Ok(target) => target,
            Err(failure) => return self.fail(entry, failure, log, counters),
        };
        let created = if target.is_dir() {
            false
        } else if let Err(e) = std::fs::create_dir_all(&target) {
            let failure = ItemFailure::CreateDirectory {
                message: format!("{}: {e}", target.display()),
            };
            return self.fail(entry, failure, log, counters);
        } else {
            true
        };

        log.append(LogKind::Downloaded, entry)?;
        if created {
            counters.directories_created += 1;
            tracing::info!("created directory {}", entry.key());
        } else {
            tracing::debug!("directory {} already present", entry.key());
        }
        self.sink.emit(&ProgressEvent::DirectoryReady {
            key: entry.key(),
            created,
        });
        Ok(())
    }

    /// Checks, fetch, verified write. Returns the bytes written.
    fn transfer_file(
        &self,
        entry: &ManifestEntry,
        base: &Url,
        layout: &Layout,
    ) -> Result<u64, ItemFailure> {
        let target = layout.target(entry)?;

        let extension = entry.extension();
        if self.filters.extension_check && !self.filters.is_allowed(&extension) {
            return Err(ItemFailure::ExtensionNotAllowed { extension });
        }
        let size = entry.size.ok_or(ItemFailure::MissingSize)?;
        if let Some(limit) = self.settings.max_file_size {
            if size > limit {
                return Err(ItemFailure::TooLarge { size, limit });
            }
        }

        let url = entry_url(base, entry).map_err(|e| ItemFailure::Fetch {
            message: e.to_string(),
        })?;
        let bytes = self
            .fetcher
            .fetch(&url, self.settings.timeout(), self.settings.max_file_size)
            .map_err(|e| ItemFailure::Fetch {
                message: e.to_string(),
            })?;

        writer::write_verified(&target, &bytes, size).map_err(|e| match e {
            WriteError::SizeMismatch {
                expected, actual, ..
            } => ItemFailure::SizeMismatch { expected, actual },
            other => ItemFailure::Write {
                message: other.to_string(),
            },
        })
    }

    // -- outcomes ----------------------------------------------------------

    fn skip(
        &mut self,
        key: EntryKey,
        counters: &mut TransferCounters,
        why: &str,
    ) -> Result<(), SyncError> {
        counters.files_skipped += 1;
        tracing::debug!("skipping {key}: {why}");
        self.sink.emit(&ProgressEvent::Skipped { key });
        Ok(())
    }

    fn ignore(
        &mut self,
        entry: &ManifestEntry,
        log: &mut TransferLog,
        counters: &mut TransferCounters,
        why: &str,
    ) -> Result<(), SyncError> {
        let key = entry.key();
        if !log.contains(LogKind::Ignored, &key) {
            log.append(LogKind::Ignored, entry)?;
        }
        counters.files_ignored += 1;
        tracing::debug!("ignoring {key}: {why}");
        self.sink.emit(&ProgressEvent::Ignored { key });
        Ok(())
    }

    fn fail(
        &mut self,
        entry: &ManifestEntry,
        failure: ItemFailure,
        log: &mut TransferLog,
        counters: &mut TransferCounters,
    ) -> Result<(), SyncError> {
        let key = entry.key();
        log.append(LogKind::Failed, entry)?;
        if entry.is_directory() {
            counters.directories_failed += 1;
        } else {
            counters.files_failed += 1;
        }
        tracing::warn!("failed {key}: {failure}");
        self.sink.emit(&ProgressEvent::ItemFailed {
            key,
            kind: entry.kind,
            reason: failure.to_string(),
        });
        Ok(())
    }
}

/// Fail the run before anything is written when `required` bytes do not fit
/// on the file system holding `destination`.
fn check_space(destination: &Path, required: u64) -> Result<(), SyncError> {
    if required == 0 {
        return Ok(());
    }
    let existing = destination
        .ancestors()
        .find(|p| p.is_dir())
        .unwrap_or(Path::new("."));
    let available = fs2::available_space(existing).map_err(|e| io_err(existing, e))?;
    if available < required {
        return Err(SyncError::InsufficientSpace {
            path: existing.to_path_buf(),
            required,
            available,
        });
    }
    tracing::debug!(
        "{required} bytes to download, {available} available at {}",
        existing.display()
    );
    Ok(())
}

/// Destination tree of a run plus the state directory it must not touch.
struct Layout<'a> {
    destination: &'a Path,
    state_dir: PathBuf,
}

impl<'a> Layout<'a> {
    fn new(destination: &'a Path, state_dir: &Path) -> Self {
        Self {
            destination,
            state_dir: resolve(state_dir),
        }
    }

    fn target(&self, entry: &ManifestEntry) -> Result<PathBuf, ItemFailure> {
        let target = target_path(self.destination, entry)?;
        if resolve(&target).starts_with(&self.state_dir) {
            return Err(ItemFailure::StateDirectory { path: target });
        }
        Ok(target)
    }
}

/// `path` with its longest existing ancestor canonicalized, so symlinks and
/// relative forms compare equal.
fn resolve(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut rest = Vec::new();
    loop {
        if let Ok(real) = existing.canonicalize() {
            return rest.iter().rev().fold(real, |acc, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name);
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

/// Destination path of `entry`, refusing anything that could leave
/// `destination`.
fn target_path(destination: &Path, entry: &ManifestEntry) -> Result<PathBuf, ItemFailure> {
    if entry.relative_path.starts_with('/') {
        return Err(ItemFailure::UnsafePath {
            segment: entry.relative_path.clone(),
        });
    }
    let mut path = destination.to_path_buf();
    for segment in entry
        .segments()
        .into_iter()
        .chain(std::iter::once(entry.name.as_str()))
    {
        if !is_safe_segment(segment) {
            return Err(ItemFailure::UnsafePath {
                segment: segment.to_string(),
            });
        }
        path.push(segment);
    }
    Ok(path)
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['/', '\\', '\0'])
        && !is_drive_prefix(segment)
}

/// `C:`-style prefixes, which Windows treats as absolute.
fn is_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_display_names_every_field() {
        let counters = TransferCounters {
            files_copied: 1,
            directories_created: 1,
            files_failed: 1,
            ..TransferCounters::default()
        };
        let text = counters.to_string();
        assert!(text.starts_with("1 files copied, 1 directories created, 1 files failed"));
    }

    #[test]
    fn target_path_joins_segments() {
        let entry = ManifestEntry::file("./wp-content/uploads", "a.png", 1);
        assert_eq!(
            target_path(Path::new("/dest"), &entry).unwrap(),
            Path::new("/dest/wp-content/uploads/a.png")
        );
    }

    #[test]
    fn target_path_rejects_escapes() {
        let dest = Path::new("/dest");
        for entry in [
            ManifestEntry::file("./../etc", "passwd", 1),
            ManifestEntry::file(".", "..", 1),
            ManifestEntry::file(".", "", 1),
            ManifestEntry::file("/etc", "passwd", 1),
            ManifestEntry::file("./a\\..\\..", "x", 1),
            ManifestEntry::file(".", "C:evil", 1),
            ManifestEntry::directory(".", "."),
        ] {
            assert!(
                matches!(target_path(dest, &entry), Err(ItemFailure::UnsafePath { .. })),
                "{entry:?} should be rejected"
            );
        }
    }

    #[test]
    fn layout_refuses_targets_in_state_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let state = tmp.path().join(STATE_DIR_NAME);
        std::fs::create_dir_all(&state).unwrap();
        let layout = Layout::new(tmp.path(), &state);

        let inside = ManifestEntry::file("./.transfiler", "failed_files.log", 1);
        assert!(matches!(
            layout.target(&inside),
            Err(ItemFailure::StateDirectory { .. })
        ));
        let itself = ManifestEntry::directory(".", STATE_DIR_NAME);
        assert!(layout.target(&itself).is_err());
        let beside = ManifestEntry::file("./.transfiler-old", "a.txt", 1);
        assert_eq!(
            layout.target(&beside).unwrap(),
            tmp.path().join(".transfiler-old").join("a.txt")
        );
    }

    #[test]
    fn resolve_keeps_missing_tail() {
        let tmp = tempfile::TempDir::new().unwrap();
        let real = tmp.path().canonicalize().unwrap();
        assert_eq!(resolve(&tmp.path().join("x").join("y")), real.join("x").join("y"));
    }

    #[test]
    fn check_space_rejects_impossible_requests() {
        let tmp = tempfile::TempDir::new().unwrap();
        check_space(&tmp.path().join("not-yet"), 0).unwrap();
        check_space(&tmp.path().join("not-yet"), 1).unwrap();
        let err = check_space(tmp.path(), u64::MAX).unwrap_err();
        assert!(matches!(err, SyncError::InsufficientSpace { .. }), "got: {err}");
    }

    #[test]
    fn default_state_dir_lives_in_destination() {
        let request = ReconcileRequest::new(
            ManifestSource::Remote("index.csv".into()),
            "http://old.example/",
            "/srv/site",
        );
        assert_eq!(request.state_dir, Path::new("/srv/site/.transfiler"));
        assert!(!request.continue_run);
    }
}
