//! Error types for transfiler-sync.

use std::path::PathBuf;

use thiserror::Error;

use transfiler_core::ManifestError;

use crate::reconcile::TransferCounters;

/// Run-level (fatal) errors. Per-item problems never surface here; they are
/// recorded in the failed log instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the manifest layer.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote base URL (or a URL derived from it) is unusable.
    #[error("invalid remote URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The manifest could not be fetched.
    #[error("failed to fetch manifest: {0}")]
    ManifestFetch(#[source] FetchError),

    /// The fetched manifest was not valid UTF-8.
    #[error("manifest fetched from {url} is not valid UTF-8")]
    ManifestEncoding { url: String },

    /// The TLS connector for the requested policy could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// Another run holds the lock for this state directory.
    #[error("another transfer is running (lock held on {path})")]
    Locked { path: PathBuf },

    /// The destination's file system cannot hold the pending downloads.
    #[error("insufficient disk space at {path}: {required} bytes required, {available} available")]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    /// JSON serialization error (status snapshot).
    #[error("status JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Failure of a single fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("HTTP {code} from {url}")]
    Status { url: String, code: u16 },

    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: u64 },
}

/// Failure of a verified file write. Always per-item, never fatal.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("size mismatch at {path}: expected {expected} bytes, wrote {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

/// A fatal run failure together with the progress made before it.
#[derive(Debug, Error)]
#[error("{source} (after {counters})")]
pub struct RunError {
    pub counters: TransferCounters,
    #[source]
    pub source: SyncError,
}

impl RunError {
    pub(crate) fn new(counters: TransferCounters, source: SyncError) -> Self {
        Self { counters, source }
    }
}

impl From<SyncError> for RunError {
    fn from(source: SyncError) -> Self {
        Self::new(TransferCounters::default(), source)
    }
}
