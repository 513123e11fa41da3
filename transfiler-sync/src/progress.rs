//! Progress reporting.
//!
//! The reconciler never prints. It emits [`ProgressEvent`]s to a
//! [`ProgressSink`]; front ends choose how to surface them:
//!
//! - [`NoProgress`] drops everything;
//! - `mpsc::Sender<ProgressEvent>` pushes events to another thread;
//! - [`StatusFile`] keeps `<state_dir>/status.json` current for pollers;
//! - [`Tee`] fans one stream out to two sinks.

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use chrono::Utc;
use serde::Serialize;

use transfiler_core::{EntryKey, EntryKind};

use crate::reconcile::{ReconcileStatus, TransferCounters, TransferPlan};
use crate::status::{self, RunState, RunStatus};

/// One step of a reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { plan: TransferPlan },
    Skipped { key: EntryKey },
    Ignored { key: EntryKey },
    DirectoryReady { key: EntryKey, created: bool },
    FileCopied { key: EntryKey, bytes: u64 },
    ItemFailed { key: EntryKey, kind: EntryKind, reason: String },
    Finished { status: ReconcileStatus, counters: TransferCounters },
}

/// Receiver of progress events. Sinks are best-effort and never fail a run.
pub trait ProgressSink {
    fn emit(&mut self, event: &ProgressEvent);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn emit(&mut self, event: &ProgressEvent) {
        (**self).emit(event);
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for Box<S> {
    fn emit(&mut self, event: &ProgressEvent) {
        (**self).emit(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: &ProgressEvent) {}
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn emit(&mut self, event: &ProgressEvent) {
        // A dropped receiver just stops listening.
        let _ = self.send(event.clone());
    }
}

/// Forwards every event to both sinks, in order.
#[derive(Debug, Default)]
pub struct Tee<A, B>(pub A, pub B);

impl<A: ProgressSink, B: ProgressSink> ProgressSink for Tee<A, B> {
    fn emit(&mut self, event: &ProgressEvent) {
        self.0.emit(event);
        self.1.emit(event);
    }
}

// ---------------------------------------------------------------------------
// Status file
// ---------------------------------------------------------------------------

/// Maintains a [`RunStatus`] snapshot on disk.
#[derive(Debug)]
pub struct StatusFile {
    state_dir: PathBuf,
    current: Option<RunStatus>,
    write_failed: bool,
}

impl StatusFile {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            current: None,
            write_failed: false,
        }
    }

    /// Mark a run that already reported progress as failed.
    ///
    /// Does nothing when no event was seen, so a run rejected before it
    /// started (for instance by the run lock) never overwrites the snapshot
    /// of the run that owns the directory.
    pub fn record_failure(&mut self, counters: TransferCounters, message: &str) {
        let Some(status) = self.current.as_mut() else {
            return;
        };
        status.state = RunState::Failed;
        status.counters = counters;
        status.message = Some(message.to_string());
        status.updated_at = Utc::now();
        self.persist();
    }

    fn apply(&mut self, event: &ProgressEvent) {
        let now = Utc::now();
        let status = self.current.get_or_insert_with(|| RunStatus::started(now));
        status.updated_at = now;
        let c = &mut status.counters;
        match event {
            ProgressEvent::Started { plan } => status.plan = Some(*plan),
            ProgressEvent::Skipped { key } => {
                c.files_skipped += 1;
                status.last_item = Some(key.to_string());
            }
            ProgressEvent::Ignored { key } => {
                c.files_ignored += 1;
                status.last_item = Some(key.to_string());
            }
            ProgressEvent::DirectoryReady { key, created } => {
                if *created {
                    c.directories_created += 1;
                }
                status.last_item = Some(key.to_string());
            }
            ProgressEvent::FileCopied { key, .. } => {
                c.files_copied += 1;
                status.last_item = Some(key.to_string());
            }
            ProgressEvent::ItemFailed { key, kind, reason } => {
                if *kind == EntryKind::Directory {
                    c.directories_failed += 1;
                } else {
                    c.files_failed += 1;
                }
                status.last_item = Some(key.to_string());
                status.last_failure = Some(format!("{key}: {reason}"));
            }
            ProgressEvent::Finished {
                status: outcome,
                counters,
            } => {
                status.counters = *counters;
                status.state = match outcome {
                    ReconcileStatus::Success => RunState::Success,
                    ReconcileStatus::Continue => RunState::Continue,
                    ReconcileStatus::Aborted => RunState::Aborted,
                };
            }
        }
    }

    fn persist(&mut self) {
        let Some(status) = self.current.as_ref() else {
            return;
        };
        match status::save_at(&self.state_dir, status) {
            Ok(()) => self.write_failed = false,
            Err(e) if !self.write_failed => {
                tracing::warn!("status snapshot not updated: {e}");
                self.write_failed = true;
            }
            Err(_) => {}
        }
    }
}

impl ProgressSink for StatusFile {
    fn emit(&mut self, event: &ProgressEvent) {
        self.apply(event);
        self.persist();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Collect(Vec<ProgressEvent>);

    impl ProgressSink for Collect {
        fn emit(&mut self, event: &ProgressEvent) {
            self.0.push(event.clone());
        }
    }

    fn key(name: &str) -> EntryKey {
        EntryKey::new(".", name)
    }

    #[test]
    fn channel_sink_pushes_events() {
        let (mut tx, rx) = mpsc::channel();
        tx.emit(&ProgressEvent::Skipped { key: key("a") });
        assert_eq!(rx.recv().unwrap(), ProgressEvent::Skipped { key: key("a") });
        drop(rx);
        tx.emit(&ProgressEvent::Skipped { key: key("b") });
    }

    #[test]
    fn tee_forwards_to_both() {
        let mut tee = Tee(Collect::default(), Collect::default());
        tee.emit(&ProgressEvent::Ignored { key: key("x.php") });
        assert_eq!(tee.0 .0.len(), 1);
        assert_eq!(tee.1 .0, tee.0 .0);
    }

    #[test]
    fn status_file_tracks_counters_and_outcome() {
        let tmp = TempDir::new().unwrap();
        let mut sink = StatusFile::new(tmp.path());
        sink.emit(&ProgressEvent::Started {
            plan: TransferPlan {
                entries: 3,
                files_to_download: 2,
                bytes_to_download: 30,
                directories_pending: 1,
            },
        });
        sink.emit(&ProgressEvent::FileCopied { key: key("a.txt"), bytes: 10 });

        let mid = status::load_at(tmp.path()).unwrap().expect("status");
        assert_eq!(mid.state, RunState::Running);
        assert_eq!(mid.counters.files_copied, 1);
        assert_eq!(mid.plan.map(|p| p.files_to_download), Some(2));
        assert_eq!(mid.last_item.as_deref(), Some("./a.txt"));

        sink.emit(&ProgressEvent::ItemFailed {
            key: key("b.txt"),
            kind: EntryKind::File,
            reason: "timed out".into(),
        });
        let counters = TransferCounters {
            files_copied: 1,
            files_failed: 1,
            ..TransferCounters::default()
        };
        sink.emit(&ProgressEvent::Finished {
            status: ReconcileStatus::Success,
            counters,
        });

        let done = status::load_at(tmp.path()).unwrap().expect("status");
        assert_eq!(done.state, RunState::Success);
        assert_eq!(done.counters, counters);
        assert_eq!(done.last_failure.as_deref(), Some("./b.txt: timed out"));
    }

    #[test]
    fn failure_before_any_event_leaves_snapshot_alone() {
        let tmp = TempDir::new().unwrap();
        let mut sink = StatusFile::new(tmp.path());
        sink.record_failure(TransferCounters::default(), "locked");
        assert!(status::load_at(tmp.path()).unwrap().is_none());
    }
}
