//! Manifest builder — walks a directory tree into a [`Manifest`].
//!
//! Entries come out in pre-order (a directory before its contents), siblings
//! sorted by file name, the root itself omitted. Symlinks are not followed
//! and are recorded as [`EntryKind::Unknown`] without a size.

use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::codec;
use crate::config::FilterConfig;
use crate::error::{io_err, ManifestError};
use crate::types::{extension_of, EntryKind, Manifest, ManifestEntry, ROOT_PATH, STATE_DIR_NAME};

/// Outcome of indexing a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub manifest: Manifest,
    /// Entries that could not be read and were left out.
    pub unreadable: usize,
}

/// Index `root` into a manifest, applying `filters`.
pub fn build_manifest(root: &Path, filters: &FilterConfig) -> Result<IndexReport, ManifestError> {
    if !root.is_dir() {
        return Err(ManifestError::RootNotDirectory {
            path: root.to_path_buf(),
        });
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| keep_directory(root, e, filters));

    let mut entries = Vec::new();
    let mut unreadable = 0usize;
    for item in walker {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                tracing::debug!("skipping unreadable entry: {err}");
                unreadable += 1;
                continue;
            }
        };
        match to_manifest_entry(root, &entry, filters) {
            Ok(Some(m)) => entries.push(m),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!("skipping unreadable entry {}: {err}", entry.path().display());
                unreadable += 1;
            }
        }
    }

    tracing::info!(
        "indexed {} entries under {} ({} unreadable)",
        entries.len(),
        root.display(),
        unreadable
    );
    Ok(IndexReport {
        manifest: Manifest::new(entries),
        unreadable,
    })
}

/// Default manifest file name: `index_<YYYYmmdd_HHMMSS>_<random>.csv`.
pub fn manifest_file_name() -> String {
    format!(
        "index_{}_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        uuid::Uuid::new_v4().simple()
    )
}

/// Encode and write a manifest atomically (`.tmp` sibling + rename).
pub fn write_manifest(path: &Path, manifest: &Manifest) -> Result<(), ManifestError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);
    std::fs::write(&tmp, codec::encode(manifest)).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Read and decode a manifest file. Malformed rows are reported, not fatal.
pub fn read_manifest(path: &Path) -> Result<codec::Decoded, ManifestError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let text = String::from_utf8(bytes).map_err(|_| ManifestError::Encoding {
        path: path.to_path_buf(),
    })?;
    Ok(codec::decode(&text))
}

/// `a/b/c` for an entry below `root`.
fn rel_string(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Directory pruning for `filter_entry`. Files always pass here and are
/// filtered in [`to_manifest_entry`]. Transfer state directories are pruned
/// unless `include_state_directories` is set.
fn keep_directory(root: &Path, entry: &DirEntry, filters: &FilterConfig) -> bool {
    if !entry.file_type().is_dir() {
        return true;
    }
    if !filters.include_state_directories && entry.file_name() == STATE_DIR_NAME {
        return false;
    }
    let rel = rel_string(root, entry.path());
    !filters.is_directory_denied(&rel) && filters.is_directory_allowed(&rel, true)
}

fn to_manifest_entry(
    root: &Path,
    entry: &DirEntry,
    filters: &FilterConfig,
) -> Result<Option<ManifestEntry>, walkdir::Error> {
    let name = entry.file_name().to_string_lossy().into_owned();
    let extension = extension_of(&name);
    let file_type = entry.file_type();

    if filters.is_excluded(&extension) {
        return Ok(None);
    }

    let rel = rel_string(root, entry.path());
    if !file_type.is_dir() && !filters.is_directory_allowed(&rel, false) {
        return Ok(None);
    }

    let (kind, size) = if file_type.is_dir() {
        (EntryKind::Directory, None)
    } else if file_type.is_file() {
        if !filters.is_allowed(&extension) {
            return Ok(None);
        }
        (EntryKind::File, Some(entry.metadata()?.len()))
    } else {
        (EntryKind::Unknown, None)
    };

    let parent = entry.path().parent().unwrap_or(root);
    let parent_rel = rel_string(root, parent);
    let relative_path = if parent_rel.is_empty() {
        ROOT_PATH.to_string()
    } else {
        format!("{ROOT_PATH}/{parent_rel}")
    };

    Ok(Some(ManifestEntry {
        name,
        relative_path,
        kind,
        size,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
