//! YAML configuration for indexing and transfer runs.
//!
//! # Lookup
//!
//! ```text
//! --config <file>              (explicit, CLI only)
//! ./transfiler.yaml
//! ~/.transfiler/config.yaml
//! ```
//!
//! A missing file yields [`Config::default`]. Configuration is always passed
//! by value into operations; nothing here is global.
//!
//! Every function takes explicit paths (`_at` forms); the CLI supplies the
//! working and home directories.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ManifestError};
use crate::types::path_segments;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "transfiler.yaml";

/// Default upper bound for a single downloaded file (40 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 40 * 1024 * 1024;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Extension and directory filters shared by the indexer and the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Extensions accepted when `extension_check` is on.
    pub allowed_extensions: BTreeSet<String>,
    /// Extensions never indexed nor downloaded.
    pub excluded_extensions: BTreeSet<String>,
    /// Enables `allowed_extensions` (indexer) and strict names (downloader).
    pub extension_check: bool,
    /// Root-relative directories to keep; empty keeps everything.
    pub allowed_directories: Vec<String>,
    /// Root-relative directories pruned together with their subtree.
    pub disallowed_directories: Vec<String>,
    /// Index `.transfiler` state directories like any other directory.
    pub include_state_directories: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: [
                "jpg", "jpeg", "png", "gif", "pdf", "txt", "doc", "docx", "xls", "xlsx", "csv",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            excluded_extensions: ["php", "exe", "sh"].into_iter().map(String::from).collect(),
            extension_check: false,
            allowed_directories: Vec::new(),
            disallowed_directories: Vec::new(),
            include_state_directories: false,
        }
    }
}

impl FilterConfig {
    /// A filter that keeps everything.
    pub fn permissive() -> Self {
        Self {
            allowed_extensions: BTreeSet::new(),
            excluded_extensions: BTreeSet::new(),
            extension_check: false,
            allowed_directories: Vec::new(),
            disallowed_directories: Vec::new(),
            include_state_directories: true,
        }
    }

    pub fn is_excluded(&self, extension: &str) -> bool {
        !extension.is_empty() && self.excluded_extensions.contains(&extension.to_ascii_lowercase())
    }

    /// Whether a file with this extension passes the allow-set. Always true
    /// when `extension_check` is off.
    pub fn is_allowed(&self, extension: &str) -> bool {
        !self.extension_check || self.allowed_extensions.contains(&extension.to_ascii_lowercase())
    }

    /// Whether the directory at `rel` (segments joined by `/`, no leading
    /// `./`) is pruned by `disallowed_directories`.
    pub fn is_directory_denied(&self, rel: &str) -> bool {
        self.disallowed_directories
            .iter()
            .map(|d| normalize_dir(d))
            .any(|d| !d.is_empty() && (rel == d || rel.starts_with(&format!("{d}/"))))
    }

    /// Whether an entry at `rel` lies inside an allowed directory. When
    /// `is_dir`, ancestors of allowed directories also pass so the tree
    /// shape leading to them is preserved.
    pub fn is_directory_allowed(&self, rel: &str, is_dir: bool) -> bool {
        if self.allowed_directories.is_empty() {
            return true;
        }
        self.allowed_directories
            .iter()
            .map(|d| normalize_dir(d))
            .any(|d| {
                d.is_empty()
                    || rel == d
                    || rel.starts_with(&format!("{d}/"))
                    || (is_dir && d.starts_with(&format!("{rel}/")))
            })
    }
}

fn normalize_dir(dir: &str) -> String {
    path_segments(dir).join("/")
}

// ---------------------------------------------------------------------------
// Transfer settings
// ---------------------------------------------------------------------------

/// Whether a continuation run retries keys recorded in the failed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Attempt every key not yet downloaded, previous failures included.
    #[default]
    RetryFailed,
    /// Only attempt keys that are in neither the downloaded nor failed log.
    SkipFailed,
}

/// TLS certificate handling for HTTPS fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TlsPolicy {
    #[default]
    Verify,
    /// Skip certificate validation. Only for trusted internal hosts.
    AcceptInvalidCerts,
}

/// Settings for the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub timeout_secs: u64,
    /// Files declared larger than this are failed without fetching.
    pub max_file_size: Option<u64>,
    pub retry_policy: RetryPolicy,
    pub tls: TlsPolicy,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
            retry_policy: RetryPolicy::default(),
            tls: TlsPolicy::default(),
        }
    }
}

impl TransferSettings {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Root of `transfiler.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub filters: FilterConfig,
    pub transfer: TransferSettings,
}

/// `<home>/.transfiler/config.yaml`. Pure, no I/O.
pub fn user_config_path_at(home: &Path) -> PathBuf {
    home.join(".transfiler").join("config.yaml")
}

/// Load config from `path`; returns defaults if the file does not exist.
pub fn load_at(path: &Path) -> Result<Config, ManifestError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| ManifestError::Config {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Resolve the effective config: `explicit` when given, otherwise the first
/// of `<cwd>/transfiler.yaml` and `<home>/.transfiler/config.yaml` that
/// exists, otherwise defaults.
pub fn resolve_at(
    explicit: Option<&Path>,
    cwd: &Path,
    home: Option<&Path>,
) -> Result<Config, ManifestError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(io_err(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            ));
        }
        return load_at(path);
    }
    let local = cwd.join(LOCAL_CONFIG_FILE);
    if local.exists() {
        return load_at(&local);
    }
    match home {
        Some(home) => load_at(&user_config_path_at(home)),
        None => Ok(Config::default()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
