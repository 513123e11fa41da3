//! Verified file writer.
//!
//! ## `write_verified` protocol
//!
//! 1. Create the target's parent directories.
//! 2. Write the bytes to `<target>.transfiler.tmp`.
//! 3. Compare the tmp file's length with the declared size; on mismatch
//!    remove the tmp and leave any existing target untouched.
//! 4. Rename onto the target (atomic on POSIX); on failure remove the tmp.

use std::path::{Path, PathBuf};

use crate::error::WriteError;

fn write_io(path: &Path, source: std::io::Error) -> WriteError {
    WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// `<target>.transfiler.tmp`
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".transfiler.tmp");
    PathBuf::from(tmp)
}

/// Write `bytes` to `path` and confirm it holds exactly `expected` bytes.
///
/// Returns the number of bytes on disk.
pub(crate) fn write_verified(path: &Path, bytes: &[u8], expected: u64) -> Result<u64, WriteError> {
    write_verified_with_tmp(path, bytes, expected, &tmp_path(path))
}

fn write_verified_with_tmp(
    path: &Path,
    bytes: &[u8],
    expected: u64,
    tmp: &Path,
) -> Result<u64, WriteError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_io(parent, e))?;
    }
    std::fs::write(tmp, bytes).map_err(|e| write_io(tmp, e))?;

    let actual = match std::fs::metadata(tmp) {
        Ok(meta) => meta.len(),
        Err(e) => {
            let _ = std::fs::remove_file(tmp);
            return Err(write_io(tmp, e));
        }
    };
    if actual != expected {
        if let Err(e) = std::fs::remove_file(tmp) {
            tracing::warn!("could not remove {}: {e}", tmp.display());
        }
        return Err(WriteError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(write_io(path, e));
    }

    tracing::debug!("wrote: {} ({actual} bytes)", path.display());
    Ok(actual)
}
