//! Codec roundtrip and differ laws over built manifests.
//!
//! Each `#[case]` is isolated; no shared state.

use rstest::rstest;
use transfiler_core::{
    build_manifest, codec, diff,
    types::{ChangeTag, EntryKind, Manifest, ManifestEntry},
    FilterConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn flat_manifest() -> Manifest {
    Manifest::new(vec![
        ManifestEntry::file(".", "a.txt", 10),
        ManifestEntry::file(".", "b.txt", 0),
    ])
}

fn nested_manifest() -> Manifest {
    Manifest::new(vec![
        ManifestEntry::directory(".", "wp-content"),
        ManifestEntry::directory("./wp-content", "uploads"),
        ManifestEntry::file("./wp-content/uploads", "photo.jpg", 123_456),
        ManifestEntry {
            name: "link".into(),
            relative_path: ".".into(),
            kind: EntryKind::Unknown,
            size: None,
        },
    ])
}

fn awkward_names_manifest() -> Manifest {
    Manifest::new(vec![
        ManifestEntry::file(".", "comma, separated.txt", 1),
        ManifestEntry::file(".", "say \"cheese\".png", 2),
        ManifestEntry::directory(".", "日本語 ディレクトリ"),
        ManifestEntry::file("./日本語 ディレクトリ", "émoji 🚀.txt", 3),
    ])
}

fn empty_manifest() -> Manifest {
    Manifest::default()
}

// ---------------------------------------------------------------------------
// Parameterised roundtrip test
// ---------------------------------------------------------------------------

#[rstest]
#[case("flat", flat_manifest())]
#[case("nested", nested_manifest())]
#[case("awkward_names", awkward_names_manifest())]
#[case("empty", empty_manifest())]
fn manifest_roundtrip(#[case] label: &str, #[case] manifest: Manifest) {
    let text = codec::encode(&manifest);
    let decoded = codec::decode(&text);
    assert!(decoded.malformed.is_empty(), "[{label}] malformed rows");
    assert_eq!(decoded.manifest, manifest, "[{label}] entries");
}

#[test]
fn built_tree_roundtrip() {
    let root = tempfile::TempDir::new().expect("tempdir");
    std::fs::create_dir_all(root.path().join("a").join("b")).expect("mkdir");
    std::fs::write(root.path().join("a").join("b").join("deep.txt"), b"deep").expect("write");
    std::fs::write(root.path().join("quote\"d.txt"), b"q").expect("write");
    std::fs::write(root.path().join("top.csv"), b"x,y\n").expect("write");

    let built = build_manifest(root.path(), &FilterConfig::permissive())
        .expect("index")
        .manifest;
    assert_eq!(built.len(), 5);
    let decoded = codec::decode(&codec::encode(&built));
    assert_eq!(decoded.manifest, built);
}

// ---------------------------------------------------------------------------
// Differ laws
// ---------------------------------------------------------------------------

#[rstest]
#[case(flat_manifest())]
#[case(nested_manifest())]
#[case(awkward_names_manifest())]
fn identity_diff_is_empty(#[case] manifest: Manifest) {
    assert!(diff(&manifest, &manifest).is_empty());
}

#[test]
fn disjoint_diff_tags_every_entry() {
    let a = nested_manifest();
    let b = awkward_names_manifest();
    let records = diff(&a, &b);
    assert_eq!(records.len(), a.len() + b.len());

    let (left, right) = records.split_at(a.len());
    assert!(left.iter().all(|r| r.tag == ChangeTag::A));
    assert!(right.iter().all(|r| r.tag == ChangeTag::B));
    let left_keys: Vec<_> = left.iter().map(|r| r.key()).collect();
    let a_keys: Vec<_> = a.keys().collect();
    assert_eq!(left_keys, a_keys);
}
