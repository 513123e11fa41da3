//! # transfiler-sync
//!
//! Manifest-driven transfer engine.
//!
//! [`Reconciler`] replays a manifest onto a destination directory through a
//! [`Fetch`] implementation, recording every per-item outcome in the
//! [`TransferLog`] so interrupted runs can be continued. [`pipeline::run`]
//! wires it to HTTP, the status snapshot and a caller-supplied progress sink.

pub mod error;
pub mod fetch;
pub mod lock;
pub mod pipeline;
pub mod progress;
pub mod reconcile;
pub mod status;
pub mod transfer_log;
mod writer;

pub use error::{FetchError, RunError, SyncError, WriteError};
pub use fetch::{Fetch, HttpFetcher};
pub use pipeline::{RunReport, ReportStatus};
pub use progress::{NoProgress, ProgressEvent, ProgressSink, StatusFile, Tee};
pub use reconcile::{
    default_state_dir, ItemFailure, ManifestSource, ReconcileOutcome, ReconcileRequest,
    ReconcileStatus, Reconciler, TransferCounters, TransferPlan,
};
pub use status::{RunState, RunStatus};
pub use transfer_log::{LogKind, LogTotals, TransferLog};
