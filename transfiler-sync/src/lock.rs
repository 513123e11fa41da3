//! Exclusive run lock for a state directory.
//!
//! `<state_dir>/run.lock` carries an advisory exclusive lock for the lifetime
//! of a run. The operating system drops the lock when its owner exits, so a
//! lock file left behind by a crashed run is taken over rather than blocking
//! every later run. The file records the owner's pid and start time and is
//! removed when the guard drops.

use std::fs::{File, OpenOptions};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use fs2::FileExt;

use crate::error::{io_err, SyncError};

pub const LOCK_FILE: &str = "run.lock";

/// `<state_dir>/run.lock`
pub fn lock_path_at(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILE)
}

fn is_contended(e: &std::io::Error) -> bool {
    e.raw_os_error().is_some() && e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Whether some live run currently holds the lock for `state_dir`.
pub fn is_locked_at(state_dir: &Path) -> bool {
    let Ok(file) = File::open(lock_path_at(state_dir)) else {
        return false;
    };
    match file.try_lock_exclusive() {
        Ok(()) => {
            let _ = file.unlock();
            false
        }
        Err(e) => is_contended(&e),
    }
}

/// Guard for the run lock; dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    _file: File,
}

impl RunLock {
    pub fn acquire(state_dir: &Path) -> Result<Self, SyncError> {
        std::fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;
        let path = lock_path_at(state_dir);
        let existed = path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Err(SyncError::Locked { path }),
            Err(e) => return Err(io_err(&path, e)),
        }
        if existed {
            let previous = std::fs::read_to_string(&path).unwrap_or_default();
            tracing::warn!(
                "taking over stale lock {} ({})",
                path.display(),
                previous.trim().replace('\n', ", ")
            );
        }

        write_owner(&mut file).map_err(|e| io_err(&path, e))?;
        tracing::debug!("acquired {}", path.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_owner(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.rewind()?;
    writeln!(
        file,
        "pid={}\nstarted_at={}",
        std::process::id(),
        Utc::now().to_rfc3339()
    )?;
    file.flush()
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("could not release {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let tmp = TempDir::new().unwrap();
        let first = RunLock::acquire(tmp.path()).unwrap();
        assert!(is_locked_at(tmp.path()));

        let err = RunLock::acquire(tmp.path()).unwrap_err();
        assert!(matches!(err, SyncError::Locked { .. }), "got: {err}");
        assert!(err.to_string().contains("run.lock"));

        drop(first);
        assert!(!is_locked_at(tmp.path()));
        assert!(!lock_path_at(tmp.path()).exists());
        RunLock::acquire(tmp.path()).unwrap();
    }

    #[test]
    fn lock_file_records_owner() {
        let tmp = TempDir::new().unwrap();
        let lock = RunLock::acquire(&tmp.path().join("state")).unwrap();
        let text = std::fs::read_to_string(lock.path()).unwrap();
        assert!(text.contains(&format!("pid={}", std::process::id())));
        assert!(text.contains("started_at="));
    }

    #[test]
    fn lock_file_of_a_dead_run_is_taken_over() {
        let tmp = TempDir::new().unwrap();
        let path = lock_path_at(tmp.path());
        std::fs::write(&path, "pid=999999\nstarted_at=2020-01-01T00:00:00+00:00\n").unwrap();
        assert!(!is_locked_at(tmp.path()));

        let lock = RunLock::acquire(tmp.path()).unwrap();
        let text = std::fs::read_to_string(lock.path()).unwrap();
        assert!(text.starts_with(&format!("pid={}\n", std::process::id())));
        assert!(!text.contains("999999"));
        assert!(is_locked_at(tmp.path()));
    }
}
