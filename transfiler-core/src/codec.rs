//! Quoted tabular text format for manifests, transfer logs and change reports.
//!
//! ```text
//! Name,RelativePath,Type,Size
//! "a.txt",".","file","10"
//! "sub",".","directory",""
//! ```
//!
//! Every field is quoted and embedded quotes are doubled. Raw newlines inside
//! fields are not supported. Decoding is lenient: rows that do not parse are
//! dropped, but their line numbers are reported back to the caller.

use crate::types::{ChangeRecord, EntryKind, Manifest, ManifestEntry, ROOT_PATH};

/// Header row of manifests and transfer logs.
pub const HEADER: &str = "Name,RelativePath,Type,Size";

/// Header row of change reports.
pub const REPORT_HEADER: &str = "Name,RelativePath,Type,Size,Source";

/// Header written by older indexers; still accepted on decode.
const LEGACY_HEADER: [&str; 4] = ["name", "relative path", "type", "size"];

/// Result of decoding a manifest text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoded {
    pub manifest: Manifest,
    /// 1-based line numbers of rows that were discarded.
    pub malformed: Vec<usize>,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn quote(field: &str, out: &mut String) {
    out.push('"');
    out.push_str(&field.replace('"', "\"\""));
    out.push('"');
}

fn push_row(fields: &[&str], out: &mut String) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        quote(field, out);
    }
}

/// Encode one entry as a single line (no trailing newline).
pub fn encode_entry(entry: &ManifestEntry) -> String {
    let size = entry.size.map(|s| s.to_string()).unwrap_or_default();
    let mut line = String::new();
    push_row(
        &[&entry.name, &entry.relative_path, entry.kind.as_str(), &size],
        &mut line,
    );
    line
}

/// Encode a full manifest, header first, one row per line.
pub fn encode(manifest: &Manifest) -> String {
    let mut out = String::with_capacity(HEADER.len() + 1 + manifest.len() * 48);
    out.push_str(HEADER);
    out.push('\n');
    for entry in manifest {
        out.push_str(&encode_entry(entry));
        out.push('\n');
    }
    out
}

/// Encode a change report: manifest columns plus the `Source` tag.
pub fn encode_report(records: &[ChangeRecord]) -> String {
    let mut out = String::new();
    out.push_str(REPORT_HEADER);
    out.push('\n');
    for record in records {
        let size = record
            .size_or_delta
            .map(|s| s.to_string())
            .unwrap_or_default();
        push_row(
            &[
                &record.name,
                &record.relative_path,
                record.kind.as_str(),
                &size,
                record.tag.as_str(),
            ],
            &mut out,
        );
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Split one line into fields using the quoting rule above.
///
/// Quoted fields may contain commas and doubled quotes; unquoted fields are
/// taken verbatim up to the next comma. A trailing `\r` is ignored.
pub fn split_row(line: &str) -> Vec<String> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Which header, if any, opened the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Header {
    Current,
    /// Rows carry the entry's full path in `relative_path`.
    Legacy,
}

fn header_of(fields: &[String]) -> Option<Header> {
    if fields.len() != 4 {
        return None;
    }
    let lowered: Vec<String> = fields.iter().map(|f| f.trim().to_ascii_lowercase()).collect();
    if lowered.iter().map(String::as_str).eq(LEGACY_HEADER) {
        return Some(Header::Legacy);
    }
    let current = HEADER.split(',').map(str::to_ascii_lowercase);
    lowered.into_iter().eq(current).then_some(Header::Current)
}

fn parse_entry(fields: Vec<String>) -> Option<ManifestEntry> {
    let [name, relative_path, kind, size]: [String; 4] = fields.try_into().ok()?;
    let size = match size.trim() {
        "" => None,
        s => Some(s.parse::<u64>().ok()?),
    };
    let kind = kind.parse::<EntryKind>().unwrap_or_default();
    Some(ManifestEntry {
        name,
        relative_path,
        kind,
        size,
    })
}

/// Legacy rows store `./sub/b.txt` where the current format stores `./sub`.
fn strip_legacy_name(entry: &mut ManifestEntry) {
    let suffix = format!("/{}", entry.name);
    if let Some(parent) = entry.relative_path.strip_suffix(suffix.as_str()) {
        entry.relative_path = if parent.is_empty() {
            ROOT_PATH.to_string()
        } else {
            parent.to_string()
        };
    }
}

/// Decode a manifest or transfer log. Never fails; see [`Decoded::malformed`].
///
/// A leading byte-order mark is ignored. Under the legacy header each row's
/// trailing `/<name>` is removed from `relative_path`.
pub fn decode(text: &str) -> Decoded {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut entries = Vec::new();
    let mut malformed = Vec::new();
    let mut header = None;

    for (idx, line) in text.split('\n').enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_row(line);
        if idx == 0 {
            header = header_of(&fields);
            if header.is_some() {
                continue;
            }
        }
        match parse_entry(fields) {
            Some(mut entry) => {
                if header == Some(Header::Legacy) {
                    strip_legacy_name(&mut entry);
                }
                entries.push(entry);
            }
            None => malformed.push(idx + 1),
        }
    }

    Decoded {
        manifest: Manifest::new(entries),
        malformed,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
