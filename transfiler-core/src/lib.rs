//! Transfiler core library — manifest model, codec, builder, differ, config.
//!
//! - [`types`] — entries, keys, manifests, change records
//! - [`codec`] — quoted tabular text format
//! - [`index`] — directory walk into a manifest
//! - [`diff`] — manifest comparison and change report artifacts
//! - [`config`] — YAML configuration
//! - [`error`] — [`ManifestError`]

pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod index;
pub mod types;

pub use config::{Config, FilterConfig, RetryPolicy, TlsPolicy, TransferSettings};
pub use diff::{compare_files, diff, write_report, ChangeSummary, ComparisonReport};
pub use error::ManifestError;
pub use index::{build_manifest, manifest_file_name, read_manifest, write_manifest, IndexReport};
pub use types::{ChangeRecord, ChangeTag, EntryKey, EntryKind, Manifest, ManifestEntry, STATE_DIR_NAME};
