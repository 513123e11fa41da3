//! Transfer logs — the durable per-item outcome record of a destination.
//!
//! Four append-only files live in the state directory, all in the manifest
//! format:
//!
//! ```text
//! <state_dir>/downloaded_files.log
//! <state_dir>/failed_files.log
//! <state_dir>/new_files.log
//! <state_dir>/ignored_files.log
//! ```
//!
//! Every append is flushed before the call returns, so a crash loses at most
//! the item that was in flight.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use transfiler_core::codec::{self, HEADER};
use transfiler_core::{EntryKey, ManifestEntry, ManifestError};

use crate::error::{io_err, SyncError};

/// One of the four transfer logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Downloaded,
    Failed,
    NewlyDiscovered,
    Ignored,
}

impl LogKind {
    pub const ALL: [LogKind; 4] = [
        LogKind::Downloaded,
        LogKind::Failed,
        LogKind::NewlyDiscovered,
        LogKind::Ignored,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            LogKind::Downloaded => "downloaded_files.log",
            LogKind::Failed => "failed_files.log",
            LogKind::NewlyDiscovered => "new_files.log",
            LogKind::Ignored => "ignored_files.log",
        }
    }

    fn index(self) -> usize {
        match self {
            LogKind::Downloaded => 0,
            LogKind::Failed => 1,
            LogKind::NewlyDiscovered => 2,
            LogKind::Ignored => 3,
        }
    }
}

/// `<state_dir>/<log file name>`. Pure, no I/O.
pub fn log_path_at(state_dir: &Path, kind: LogKind) -> PathBuf {
    state_dir.join(kind.file_name())
}

/// Distinct keys per log, plus rows that could not be decoded on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogTotals {
    pub downloaded: usize,
    /// Keys in the failed log that have not been downloaded since.
    pub failed: usize,
    pub newly_discovered: usize,
    pub ignored: usize,
    pub malformed: usize,
}

/// The four logs of one state directory, with their keys held in memory.
#[derive(Debug)]
pub struct TransferLog {
    state_dir: PathBuf,
    keys: [HashSet<EntryKey>; 4],
    malformed: usize,
}

impl TransferLog {
    /// Open the logs under `state_dir`.
    ///
    /// With `fresh`, every log is truncated to its header. Otherwise existing
    /// logs are loaded and missing ones are created with a header.
    pub fn open(state_dir: &Path, fresh: bool) -> Result<Self, SyncError> {
        std::fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;
        let mut log = Self {
            state_dir: state_dir.to_path_buf(),
            keys: Default::default(),
            malformed: 0,
        };

        for kind in LogKind::ALL {
            let path = log_path_at(state_dir, kind);
            if fresh || !path.exists() {
                write_header(&path)?;
                continue;
            }
            let text = read_log(&path)?;
            // A torn last line would swallow the next append.
            if !text.is_empty() && !text.ends_with('\n') {
                append_line(&path, "")?;
            }
            let (keys, malformed) = decode_keys(&path, &text);
            log.malformed += malformed;
            log.keys[kind.index()] = keys;
        }

        tracing::debug!(
            "opened transfer logs in {} (fresh: {fresh})",
            state_dir.display()
        );
        Ok(log)
    }

    /// Append `entry` to the `kind` log and flush it.
    pub fn append(&mut self, kind: LogKind, entry: &ManifestEntry) -> Result<(), SyncError> {
        let path = log_path_at(&self.state_dir, kind);
        append_line(&path, &codec::encode_entry(entry))?;
        self.keys[kind.index()].insert(entry.key());
        Ok(())
    }

    pub fn contains(&self, kind: LogKind, key: &EntryKey) -> bool {
        self.keys[kind.index()].contains(key)
    }

    pub fn totals(&self) -> LogTotals {
        totals_of(&self.keys, self.malformed)
    }

    /// Truncate the newly-discovered log back to its header.
    pub fn reset_new_files(&mut self) -> Result<(), SyncError> {
        write_header(&log_path_at(&self.state_dir, LogKind::NewlyDiscovered))?;
        self.keys[LogKind::NewlyDiscovered.index()].clear();
        Ok(())
    }

    /// Totals of the logs under `state_dir` without creating or repairing
    /// anything. Missing logs count as empty.
    pub fn read_totals(state_dir: &Path) -> Result<LogTotals, SyncError> {
        let mut keys: [HashSet<EntryKey>; 4] = Default::default();
        let mut malformed = 0;
        for kind in LogKind::ALL {
            let path = log_path_at(state_dir, kind);
            if !path.exists() {
                continue;
            }
            let (found, bad) = decode_keys(&path, &read_log(&path)?);
            keys[kind.index()] = found;
            malformed += bad;
        }
        Ok(totals_of(&keys, malformed))
    }

    /// Whether a previous run left a downloaded log behind.
    pub fn downloaded_exists(state_dir: &Path) -> bool {
        log_path_at(state_dir, LogKind::Downloaded).is_file()
    }

    /// Delete all four logs. Missing files are fine.
    pub fn remove_all(state_dir: &Path) -> Result<(), SyncError> {
        for kind in LogKind::ALL {
            let path = log_path_at(state_dir, kind);
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::info!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path, e)),
            }
        }
        Ok(())
    }
}

fn totals_of(keys: &[HashSet<EntryKey>; 4], malformed: usize) -> LogTotals {
    let downloaded = &keys[LogKind::Downloaded.index()];
    LogTotals {
        downloaded: downloaded.len(),
        failed: keys[LogKind::Failed.index()]
            .difference(downloaded)
            .count(),
        newly_discovered: keys[LogKind::NewlyDiscovered.index()].len(),
        ignored: keys[LogKind::Ignored.index()].len(),
        malformed,
    }
}

fn read_log(path: &Path) -> Result<String, SyncError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    String::from_utf8(bytes).map_err(|_| {
        SyncError::Manifest(ManifestError::Encoding {
            path: path.to_path_buf(),
        })
    })
}

fn decode_keys(path: &Path, text: &str) -> (HashSet<EntryKey>, usize) {
    let decoded = codec::decode(text);
    if !decoded.malformed.is_empty() {
        tracing::warn!(
            "{}: skipped {} malformed rows (lines {:?})",
            path.display(),
            decoded.malformed.len(),
            decoded.malformed
        );
    }
    (decoded.manifest.keys().collect(), decoded.malformed.len())
}

fn write_header(path: &Path) -> Result<(), SyncError> {
    let mut file = std::fs::File::create(path).map_err(|e| io_err(path, e))?;
    file.write_all(format!("{HEADER}\n").as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| io_err(path, e))
}

fn append_line(path: &Path, line: &str) -> Result<(), SyncError> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| io_err(path, e))?;
    file.write_all(format!("{line}\n").as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| io_err(path, e))
}
