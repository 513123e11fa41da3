//! Manifest differ and change report artifacts.
//!
//! Classification order:
//! 1. walk A's keys: `A` when missing from B, otherwise `Size Diff` and/or
//!    `Type Diff` emitted in place;
//! 2. walk B's keys: `B` when missing from A.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::codec;
use crate::error::{io_err, ManifestError};
use crate::index::read_manifest;
use crate::types::{ChangeRecord, ChangeTag, EntryKey, EntryKind, Manifest, ManifestEntry};

/// Key → entry map that remembers first-insertion order. A repeated key keeps
/// its original position but takes the later entry's fields.
struct KeyedEntries<'a> {
    order: Vec<EntryKey>,
    by_key: HashMap<EntryKey, &'a ManifestEntry>,
}

impl<'a> KeyedEntries<'a> {
    fn from_manifest(manifest: &'a Manifest) -> Self {
        let mut order = Vec::with_capacity(manifest.len());
        let mut by_key = HashMap::with_capacity(manifest.len());
        for entry in manifest {
            let key = entry.key();
            if by_key.insert(key.clone(), entry).is_none() {
                order.push(key);
            }
        }
        Self { order, by_key }
    }

    fn iter(&self) -> impl Iterator<Item = (&EntryKey, &'a ManifestEntry)> + '_ {
        self.order.iter().map(|k| (k, self.by_key[k]))
    }

    fn get(&self, key: &EntryKey) -> Option<&'a ManifestEntry> {
        self.by_key.get(key).copied()
    }
}

fn record(entry: &ManifestEntry, size_or_delta: Option<i64>, tag: ChangeTag) -> ChangeRecord {
    ChangeRecord {
        name: entry.name.clone(),
        relative_path: entry.relative_path.clone(),
        kind: entry.kind,
        size_or_delta,
        tag,
    }
}

fn signed(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

/// Compare two manifests. Pure; see the module docs for ordering.
pub fn diff(a: &Manifest, b: &Manifest) -> Vec<ChangeRecord> {
    let keyed_a = KeyedEntries::from_manifest(a);
    let keyed_b = KeyedEntries::from_manifest(b);
    let mut records = Vec::new();

    for (key, entry_a) in keyed_a.iter() {
        let Some(entry_b) = keyed_b.get(key) else {
            records.push(record(entry_a, entry_a.size.map(signed), ChangeTag::A));
            continue;
        };
        if entry_a.kind == EntryKind::File
            && entry_b.kind == EntryKind::File
            && entry_a.size != entry_b.size
        {
            let delta = signed(entry_b.size.unwrap_or(0)) - signed(entry_a.size.unwrap_or(0));
            records.push(record(entry_a, Some(delta), ChangeTag::SizeDiff));
        }
        if entry_a.kind != entry_b.kind {
            records.push(record(entry_a, None, ChangeTag::TypeDiff));
        }
    }

    for (key, entry_b) in keyed_b.iter() {
        if keyed_a.get(key).is_none() {
            records.push(record(entry_b, entry_b.size.map(signed), ChangeTag::B));
        }
    }

    records
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Per-tag record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ChangeSummary {
    pub only_in_a: usize,
    pub only_in_b: usize,
    pub size_changed: usize,
    pub type_changed: usize,
}

impl ChangeSummary {
    pub fn from_records(records: &[ChangeRecord]) -> Self {
        let mut summary = Self::default();
        for r in records {
            match r.tag {
                ChangeTag::A => summary.only_in_a += 1,
                ChangeTag::B => summary.only_in_b += 1,
                ChangeTag::SizeDiff => summary.size_changed += 1,
                ChangeTag::TypeDiff => summary.type_changed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.only_in_a + self.only_in_b + self.size_changed + self.type_changed
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// `differences_<YYYYmmdd_HHMMSS>_<random>.csv`
pub fn artifact_name() -> String {
    format!(
        "differences_{}_{}.csv",
        Local::now().format("%Y%m%d_%H%M%S"),
        uuid::Uuid::new_v4().simple()
    )
}

/// Persist a change report under `dir` and return the artifact's file name.
///
/// The file is created exclusively, so two comparisons never write into the
/// same artifact.
pub fn write_report(dir: &Path, records: &[ChangeRecord]) -> Result<String, ManifestError> {
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let name = artifact_name();
    let path = dir.join(&name);
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    file.write_all(codec::encode_report(records).as_bytes())
        .map_err(|e| io_err(&path, e))?;
    file.flush().map_err(|e| io_err(&path, e))?;
    tracing::info!("wrote change report {} ({} records)", path.display(), records.len());
    Ok(name)
}

/// Result of [`compare_files`].
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    /// File name of the written artifact inside the output directory.
    pub artifact: String,
    pub artifact_path: PathBuf,
    pub records: Vec<ChangeRecord>,
    pub summary: ChangeSummary,
    /// Line numbers of rows dropped while decoding manifest A / B.
    pub malformed_a: Vec<usize>,
    pub malformed_b: Vec<usize>,
}

/// Read two manifest files, diff them and write the report into `out_dir`.
pub fn compare_files(a: &Path, b: &Path, out_dir: &Path) -> Result<ComparisonReport, ManifestError> {
    let decoded_a = read_manifest(a)?;
    let decoded_b = read_manifest(b)?;
    if !decoded_a.malformed.is_empty() || !decoded_b.malformed.is_empty() {
        tracing::warn!(
            "discarded malformed rows: {} in {}, {} in {}",
            decoded_a.malformed.len(),
            a.display(),
            decoded_b.malformed.len(),
            b.display()
        );
    }

    let records = diff(&decoded_a.manifest, &decoded_b.manifest);
    let artifact = write_report(out_dir, &records)?;
    Ok(ComparisonReport {
        artifact_path: out_dir.join(&artifact),
        artifact,
        summary: ChangeSummary::from_records(&records),
        records,
        malformed_a: decoded_a.malformed,
        malformed_b: decoded_b.malformed,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn m(entries: Vec<ManifestEntry>) -> Manifest {
        Manifest::new(entries)
    }

    #[test]
    fn identity_diff_is_empty() {
        let a = m(vec![
            ManifestEntry::file(".", "a.txt", 10),
            ManifestEntry::directory(".", "sub"),
        ]);
        assert!(diff(&a, &a).is_empty());
    }

    #[test]
    fn size_and_type_changes_are_interleaved_in_a_order() {
        let a = m(vec![
            ManifestEntry::file(".", "gone.txt", 1),
            ManifestEntry::file(".", "grew.txt", 10),
            ManifestEntry::directory(".", "flip"),
        ]);
        let b = m(vec![
            ManifestEntry::file(".", "new.txt", 7),
            ManifestEntry::file(".", "flip", 3),
            ManifestEntry::file(".", "grew.txt", 4),
        ]);
        let records = diff(&a, &b);
        let tags: Vec<_> = records.iter().map(|r| (r.name.as_str(), r.tag)).collect();
        assert_eq!(
            tags,
            vec![
                ("gone.txt", ChangeTag::A),
                ("grew.txt", ChangeTag::SizeDiff),
                ("flip", ChangeTag::TypeDiff),
                ("new.txt", ChangeTag::B),
            ]
        );
        assert_eq!(records[1].size_or_delta, Some(-6));
        assert_eq!(records[2].size_or_delta, None);
        assert_eq!(records[2].kind, EntryKind::Directory);
        assert_eq!(records[3].size_or_delta, Some(7));
    }

    #[test]
    fn directories_never_produce_size_diffs() {
        let a = m(vec![ManifestEntry::directory(".", "d")]);
        let mut dir_b = ManifestEntry::directory(".", "d");
        dir_b.size = Some(4096);
        let b = m(vec![dir_b]);
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn ambiguous_concatenations_are_distinct_keys() {
        let a = m(vec![ManifestEntry::file("./a", "bc", 1)]);
        let b = m(vec![ManifestEntry::file("./ab", "c", 1)]);
        let records = diff(&a, &b);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, ChangeTag::A);
        assert_eq!(records[1].tag, ChangeTag::B);
    }

    #[test]
    fn duplicate_keys_keep_first_position_and_last_fields() {
        let a = m(vec![
            ManifestEntry::file(".", "x", 1),
            ManifestEntry::file(".", "y", 1),
            ManifestEntry::file(".", "x", 5),
        ]);
        let b = m(vec![]);
        let records = diff(&a, &b);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "x");
        assert_eq!(records[0].size_or_delta, Some(5));
    }

    #[test]
    fn write_report_creates_unique_artifacts() {
        let tmp = TempDir::new().unwrap();
        let records = vec![];
        let first = write_report(tmp.path(), &records).unwrap();
        let second = write_report(tmp.path(), &records).unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("differences_") && first.ends_with(".csv"));
        let content = std::fs::read_to_string(tmp.path().join(&first)).unwrap();
        assert_eq!(content, "Name,RelativePath,Type,Size,Source\n");
    }
}
