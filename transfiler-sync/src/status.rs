//! Run status snapshot — `<state_dir>/status.json`.
//!
//! Rewritten after every progress event by [`crate::progress::StatusFile`]
//! so another process can poll a running transfer. Writes use the atomic
//! `.tmp` + rename pattern.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{io_err, SyncError};
use crate::reconcile::{TransferCounters, TransferPlan};

pub const STATUS_FILE: &str = "status.json";

/// Lifecycle state recorded in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Success,
    Continue,
    Aborted,
    Failed,
}

/// On-disk status payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub plan: Option<TransferPlan>,
    #[serde(default)]
    pub counters: TransferCounters,
    /// Key of the item most recently processed.
    #[serde(default)]
    pub last_item: Option<String>,
    #[serde(default)]
    pub last_failure: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RunStatus {
    pub fn started(now: DateTime<Utc>) -> Self {
        Self {
            state: RunState::Running,
            started_at: now,
            updated_at: now,
            plan: None,
            counters: TransferCounters::default(),
            last_item: None,
            last_failure: None,
            message: None,
        }
    }
}

/// `<state_dir>/status.json`
pub fn status_path_at(state_dir: &Path) -> PathBuf {
    state_dir.join(STATUS_FILE)
}

/// Load the snapshot; `None` when no run has written one yet.
pub fn load_at(state_dir: &Path) -> Result<Option<RunStatus>, SyncError> {
    let path = status_path_at(state_dir);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Save the snapshot atomically (`status.json.tmp` + rename).
pub fn save_at(state_dir: &Path, status: &RunStatus) -> Result<(), SyncError> {
    std::fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;
    let path = status_path_at(state_dir);
    let json = serde_json::to_string_pretty(status)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn none_when_file_missing() {
        let tmp = TempDir::new().unwrap();
        assert!(load_at(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut status = RunStatus::started(Utc::now());
        status.counters.files_copied = 3;
        status.state = RunState::Aborted;
        save_at(tmp.path(), &status).unwrap();

        let loaded = load_at(tmp.path()).unwrap().expect("status");
        assert_eq!(loaded, status);
        assert!(
            !status_path_at(tmp.path()).with_extension("json.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(status_path_at(tmp.path()), "{not json").unwrap();
        assert!(matches!(load_at(tmp.path()), Err(SyncError::Json(_))));
    }
}
