//! Domain types for manifests and change reports.
//!
//! Entry identity is the structured pair `(relative_path, name)`; the two
//! halves are never concatenated into a single string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Root marker used as the `relative_path` of the indexed root's children.
pub const ROOT_PATH: &str = ".";

/// Name of the per-destination directory holding transfer logs and locks.
pub const STATE_DIR_NAME: &str = ".transfiler";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What a manifest entry refers to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks, sockets, devices and anything else that is neither.
    #[default]
    Unknown,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Directory => "directory",
            EntryKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = std::convert::Infallible;

    /// Lenient: anything that is not `file` or `directory` is `Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "file" => EntryKind::File,
            "directory" => EntryKind::Directory,
            _ => EntryKind::Unknown,
        })
    }
}

/// Classification of a single change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeTag {
    /// Present only in manifest A (removed from B).
    A,
    /// Present only in manifest B (added).
    B,
    /// File present in both with a different size.
    SizeDiff,
    /// Present in both with a different kind.
    TypeDiff,
}

impl ChangeTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeTag::A => "A",
            ChangeTag::B => "B",
            ChangeTag::SizeDiff => "Size Diff",
            ChangeTag::TypeDiff => "Type Diff",
        }
    }
}

impl fmt::Display for ChangeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entry key
// ---------------------------------------------------------------------------

/// Identity of a manifest entry: containing directory plus leaf name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryKey {
    pub relative_path: String,
    pub name: String,
}

impl EntryKey {
    pub fn new(relative_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relative_path.is_empty() || self.relative_path == ROOT_PATH {
            write!(f, "./{}", self.name)
        } else {
            write!(f, "{}/{}", self.relative_path.trim_end_matches('/'), self.name)
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest entry
// ---------------------------------------------------------------------------

/// One row of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    /// Containing directory, relative to the indexed root (`.` or `./a/b`).
    pub relative_path: String,
    pub kind: EntryKind,
    /// Byte length for files; always `None` for directories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ManifestEntry {
    pub fn file(relative_path: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            kind: EntryKind::File,
            size: Some(size),
        }
    }

    pub fn directory(relative_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relative_path: relative_path.into(),
            kind: EntryKind::Directory,
            size: None,
        }
    }

    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.relative_path.clone(), self.name.clone())
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Lower-cased text after the last `.` of the name; empty when there is
    /// none or the name is a dotfile like `.htaccess`.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }

    /// Directory segments below the root, with the leading `.` removed.
    pub fn segments(&self) -> Vec<&str> {
        path_segments(&self.relative_path)
    }
}

/// Lower-cased extension of a file name, matching how filters compare it.
pub fn extension_of(name: &str) -> String {
    match name.rfind('.') {
        Some(0) | None => String::new(),
        Some(idx) => name[idx + 1..].to_ascii_lowercase(),
    }
}

/// Split a manifest relative path into its segments, dropping `.` and empty
/// pieces (`./a//b` → `["a", "b"]`).
pub fn path_segments(relative_path: &str) -> Vec<&str> {
    relative_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ROOT_PATH)
        .collect()
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Ordered snapshot of a directory tree, parents before children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = EntryKey> + '_ {
        self.entries.iter().map(ManifestEntry::key)
    }
}

impl From<Vec<ManifestEntry>> for Manifest {
    fn from(entries: Vec<ManifestEntry>) -> Self {
        Self::new(entries)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Change record
// ---------------------------------------------------------------------------

/// One row of a change report produced by [`crate::diff::diff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub name: String,
    pub relative_path: String,
    pub kind: EntryKind,
    /// Size for `A`/`B`, signed delta (`B - A`) for `SizeDiff`, blank for
    /// `TypeDiff`.
    pub size_or_delta: Option<i64>,
    pub tag: ChangeTag,
}

impl ChangeRecord {
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.relative_path.clone(), self.name.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_leniently() {
        assert_eq!("file".parse::<EntryKind>().unwrap(), EntryKind::File);
        assert_eq!("Directory".parse::<EntryKind>().unwrap(), EntryKind::Directory);
        assert_eq!("symlink".parse::<EntryKind>().unwrap(), EntryKind::Unknown);
        assert_eq!("".parse::<EntryKind>().unwrap(), EntryKind::Unknown);
    }

    #[test]
    fn keys_do_not_collide_on_concatenation() {
        let a = EntryKey::new("./a", "bc");
        let b = EntryKey::new("./ab", "c");
        assert_ne!(a, b);
    }

    #[test]
    fn extension_is_lowercased_and_ignores_dotfiles() {
        assert_eq!(extension_of("Photo.JPG"), "jpg");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of(".htaccess"), "");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn segments_drop_root_marker() {
        let entry = ManifestEntry::file("./wp-content/uploads", "a.png", 1);
        assert_eq!(entry.segments(), vec!["wp-content", "uploads"]);
        let root_child = ManifestEntry::file(".", "a.txt", 1);
        assert!(root_child.segments().is_empty());
    }

    #[test]
    fn key_display_joins_path_and_name() {
        assert_eq!(EntryKey::new(".", "a.txt").to_string(), "./a.txt");
        assert_eq!(EntryKey::new("./sub", "b.txt").to_string(), "./sub/b.txt");
    }

    #[test]
    fn change_tag_text() {
        assert_eq!(ChangeTag::SizeDiff.to_string(), "Size Diff");
        assert_eq!(ChangeTag::TypeDiff.to_string(), "Type Diff");
        assert_eq!(ChangeTag::A.to_string(), "A");
    }
}
