//! Integration tests for generational snapshots: publishing, retention,
//! locking, and reader isolation.

use std::fs;

use sextant::{Error, INDEX_DIR_NAME, IndexOptions, Sextant};
use tempfile::TempDir;

fn workspace_with_files(files: &[(&str, &str)]) -> (TempDir, Sextant) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    for (path, content) in files {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("should create parent dirs");
        }
        fs::write(&full_path, content).expect("should write file");
    }
    let sextant = Sextant::open(dir.path()).expect("should open Sextant");
    (dir, sextant)
}

fn generation_dirs(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path().join(INDEX_DIR_NAME).join("snapshots"))
        .expect("should list snapshots")
        .map(|e| e.expect("entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn each_run_publishes_one_generation_and_keeps_only_the_previous() {
    let (dir, mut sextant) = workspace_with_files(&[("a.py", "x = 1\n")]);

    sextant.index(&IndexOptions::default()).expect("first index");
    fs::write(dir.path().join("a.py"), "x = 2\n").expect("modify");
    sextant.index(&IndexOptions::default()).expect("second index");

    let current = fs::read_to_string(dir.path().join(INDEX_DIR_NAME).join("CURRENT"))
        .expect("should read CURRENT");
    assert_eq!(current.trim(), "gen-00000002");
    assert_eq!(
        generation_dirs(&dir),
        vec!["gen-00000001".to_string(), "gen-00000002".to_string()]
    );

    fs::write(dir.path().join("a.py"), "x = 3\n").expect("modify");
    sextant.index(&IndexOptions::default()).expect("third index");
    assert_eq!(
        generation_dirs(&dir),
        vec!["gen-00000002".to_string(), "gen-00000003".to_string()]
    );

    let gen_dir = dir
        .path()
        .join(INDEX_DIR_NAME)
        .join("snapshots")
        .join("gen-00000003");
    for table in [
        "meta.json",
        "files.parquet",
        "definitions.parquet",
        "references.parquet",
        "imports.parquet",
        "decorators.parquet",
        "class_bases.parquet",
        "calls.parquet",
        "query.db",
    ] {
        assert!(gen_dir.join(table).exists(), "{table} should be written");
    }
}

#[test]
fn held_lock_rejects_a_second_indexer_and_keeps_the_snapshot() {
    let (dir, mut sextant) = workspace_with_files(&[("a.py", "x = 1\n")]);
    sextant.index(&IndexOptions::default()).expect("first index");

    let _held = sextant.store().lock().expect("should take lock");
    fs::write(dir.path().join("a.py"), "x = 2\n").expect("modify");

    let mut other = Sextant::open(dir.path()).expect("should open");
    let err = other
        .index(&IndexOptions::default())
        .expect_err("lock is held");

    assert!(matches!(err, Error::Locked(_)));
    let meta = sextant.stats().expect("stats").expect("published");
    assert_eq!(meta.generation, 1);
}

#[test]
fn cancelled_run_leaves_the_previous_snapshot_live() {
    let (dir, mut sextant) = workspace_with_files(&[("a.py", "x = 1\n")]);
    sextant.index(&IndexOptions::default()).expect("first index");

    fs::write(dir.path().join("a.py"), "x = 2\n").expect("modify");
    sextant.cancel_token().cancel();
    let err = sextant
        .index(&IndexOptions::default())
        .expect_err("cancelled");

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(generation_dirs(&dir), vec!["gen-00000001".to_string()]);
    assert!(
        !dir.path().join(INDEX_DIR_NAME).join("lock").exists(),
        "lock must be released after a cancelled run"
    );
}

#[test]
fn interrupted_write_leftovers_are_ignored_and_removed() {
    let (dir, mut sextant) = workspace_with_files(&[("a.py", "x = 1\n")]);
    sextant.index(&IndexOptions::default()).expect("first index");

    let staging = dir
        .path()
        .join(INDEX_DIR_NAME)
        .join("snapshots")
        .join(".staging-00000002");
    fs::create_dir_all(&staging).expect("should create staging");
    fs::write(staging.join("files.parquet"), b"PAR1\x00partial").expect("should write partial");

    // Readers only follow CURRENT
    assert_eq!(
        sextant.stats().expect("stats").expect("published").generation,
        1
    );

    fs::write(dir.path().join("a.py"), "x = 2\n").expect("modify");
    let outcome = sextant.index(&IndexOptions::default()).expect("second index");

    assert_eq!(outcome.stats().expect("written").generation, 3);
    assert_eq!(
        generation_dirs(&dir),
        vec!["gen-00000001".to_string(), "gen-00000003".to_string()]
    );
}

#[cfg(unix)]
#[test]
fn open_query_engine_keeps_reading_its_generation() {
    let (dir, mut sextant) = workspace_with_files(&[("a.py", "def old():\n    pass\n")]);
    sextant.index(&IndexOptions::default()).expect("first index");
    let engine = sextant.query().expect("should open query engine");

    fs::write(dir.path().join("a.py"), "def new():\n    pass\n").expect("modify");
    sextant.index(&IndexOptions::default()).expect("second index");

    assert!(engine.get_definition("a.old").expect("lookup").is_some());
    let fresh = sextant.query().expect("should open query engine");
    assert!(fresh.get_definition("a.old").expect("lookup").is_none());
    assert!(fresh.get_definition("a.new").expect("lookup").is_some());
}
