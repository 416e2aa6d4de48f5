use std::fs;

use mutimg::{image_digest, resolve_dir};
use tempfile::tempdir;

#[test]
fn resolve_dir_canonicalizes_existing_paths() {
    let tmp = tempdir().expect("tempdir");
    let nested = tmp.path().join("nested");
    fs::create_dir_all(&nested).expect("create nested");

    let resolved = resolve_dir(nested.to_str().unwrap()).expect("resolve");
    assert_eq!(resolved, nested.canonicalize().expect("canonicalize"));
}

#[test]
fn resolve_dir_keeps_missing_absolute_paths() {
    let tmp = tempdir().expect("tempdir");
    let missing = tmp.path().join("not-yet");
    assert_eq!(resolve_dir(missing.to_str().unwrap()).expect("resolve"), missing);
}

#[test]
fn resolve_dir_joins_missing_relative_paths_onto_cwd() {
    let resolved = resolve_dir("definitely-missing-output-dir").expect("resolve");
    assert!(resolved.is_absolute());
    assert!(resolved.ends_with("definitely-missing-output-dir"));
}

#[test]
fn image_digest_matches_known_sha256() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("abc.bin");
    fs::write(&path, b"abc").expect("write");
    assert_eq!(
        image_digest(&path).expect("digest"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn image_digest_reports_missing_file() {
    let tmp = tempdir().expect("tempdir");
    let err = image_digest(&tmp.path().join("missing.bin")).unwrap_err();
    assert!(err.to_string().contains("Failed to open image for hashing"));
}
