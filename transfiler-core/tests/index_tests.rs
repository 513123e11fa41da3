//! Builder filters, artifact writing, and error-message integration tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use transfiler_core::{
    build_manifest, compare_files, write_manifest, ChangeTag, FilterConfig, ManifestError,
};

fn site() -> assert_fs::TempDir {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("index.php").write_str("<?php").expect("write");
    root.child("robots.txt").write_str("User-agent: *").expect("write");
    root.child(".git/HEAD").write_str("ref").expect("write");
    root.child("wp-content/uploads/2024/photo.jpg")
        .write_binary(&[0u8; 64])
        .expect("write");
    root.child("wp-content/themes/twenty/style.css")
        .write_str("body{}")
        .expect("write");
    root.child("wp-admin/admin.txt").write_str("admin").expect("write");
    root
}

fn names(filters: &FilterConfig, root: &assert_fs::TempDir) -> Vec<String> {
    build_manifest(root.path(), filters)
        .expect("index")
        .manifest
        .iter()
        .map(|e| e.key().to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// 1. Filters
// ---------------------------------------------------------------------------

#[test]
fn excluded_extensions_are_dropped() {
    let root = site();
    let listed = names(&FilterConfig::default(), &root);
    assert!(!listed.iter().any(|n| n.ends_with("index.php")), "{listed:?}");
    assert!(listed.contains(&"./robots.txt".to_string()));
}

#[test]
fn disallowed_directories_prune_subtrees() {
    let root = site();
    let filters = FilterConfig {
        disallowed_directories: vec![".git".into(), "wp-content/themes".into()],
        ..FilterConfig::permissive()
    };
    let listed = names(&filters, &root);
    assert!(!listed.iter().any(|n| n.contains(".git")), "{listed:?}");
    assert!(!listed.iter().any(|n| n.contains("themes")), "{listed:?}");
    assert!(listed.contains(&"./wp-content/uploads/2024/photo.jpg".to_string()));
}

#[test]
fn allowed_directories_keep_only_their_subtrees_and_ancestors() {
    let root = site();
    let filters = FilterConfig {
        allowed_directories: vec!["wp-content/uploads".into()],
        ..FilterConfig::permissive()
    };
    let listed = names(&filters, &root);
    assert_eq!(
        listed,
        vec![
            "./wp-content",
            "./wp-content/uploads",
            "./wp-content/uploads/2024",
            "./wp-content/uploads/2024/photo.jpg",
        ]
    );
}

#[test]
fn transfer_state_directories_are_not_indexed_by_default() {
    let root = site();
    root.child(".transfiler/downloaded_files.log")
        .write_str("Name,RelativePath,Type,Size\n")
        .expect("write");
    root.child("nested/.transfiler/run.lock").write_str("pid=1").expect("write");

    let listed = names(&FilterConfig::default(), &root);
    assert!(!listed.iter().any(|n| n.contains(".transfiler")), "{listed:?}");
    assert!(listed.contains(&"./nested".to_string()));

    let filters = FilterConfig {
        include_state_directories: true,
        ..FilterConfig::default()
    };
    let listed = names(&filters, &root);
    assert!(listed.contains(&"./.transfiler".to_string()), "{listed:?}");
    assert!(listed.contains(&"./nested/.transfiler/run.lock".to_string()), "{listed:?}");
}

// ---------------------------------------------------------------------------
// 2. Manifest files and comparison artifacts
// ---------------------------------------------------------------------------

#[test]
fn write_manifest_creates_file_with_header() {
    let root = site();
    let out = assert_fs::TempDir::new().expect("tempdir");
    let manifest = build_manifest(root.path(), &FilterConfig::default())
        .expect("index")
        .manifest;
    let target = out.child("listing/index.csv");
    write_manifest(target.path(), &manifest).expect("write manifest");

    target.assert(predicate::path::exists());
    target.assert(predicate::str::starts_with("Name,RelativePath,Type,Size\n"));
    target.assert(predicate::str::contains("\"robots.txt\",\".\",\"file\",\"13\""));
}

#[test]
fn compare_files_reports_additions_and_removals() {
    let work = assert_fs::TempDir::new().expect("tempdir");
    let a = work.child("a.csv");
    let b = work.child("b.csv");
    a.write_str("Name,RelativePath,Type,Size\n\"old.txt\",\".\",\"file\",\"3\"\n\"same.txt\",\".\",\"file\",\"5\"\n")
        .expect("write a");
    b.write_str("Name,RelativePath,Type,Size\n\"same.txt\",\".\",\"file\",\"9\"\nnot a row\n\"new.txt\",\".\",\"file\",\"1\"\n")
        .expect("write b");

    let report = compare_files(a.path(), b.path(), work.path()).expect("compare");
    let tags: Vec<_> = report.records.iter().map(|r| r.tag).collect();
    assert_eq!(tags, vec![ChangeTag::A, ChangeTag::SizeDiff, ChangeTag::B]);
    assert_eq!(report.records[1].size_or_delta, Some(4));
    assert_eq!(report.malformed_b, vec![3]);
    assert_eq!(report.summary.total(), 3);

    work.child(&report.artifact)
        .assert(predicate::str::contains("\"same.txt\",\".\",\"file\",\"4\",\"Size Diff\""));
}

#[test]
fn compare_missing_file_names_the_path() {
    let work = assert_fs::TempDir::new().expect("tempdir");
    let b = work.child("b.csv");
    b.write_str("Name,RelativePath,Type,Size\n").expect("write");
    let err = compare_files(&work.path().join("absent.csv"), b.path(), work.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Io { .. }), "got: {err}");
    assert!(err.to_string().contains("absent.csv"));
}
