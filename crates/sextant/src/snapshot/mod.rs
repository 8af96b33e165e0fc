//! Generational snapshot storage.
//!
//! A snapshot is the complete set of tables produced by one indexing run.
//! Snapshots are never mutated in place; each run writes a new generation and
//! swaps the `CURRENT` pointer. Each entity table is one Parquet file.
//!
//! ## Layout
//!
//! ```text
//! <index_dir>/
//! ├── config.yaml
//! ├── lock                       held while a coordinator runs
//! ├── CURRENT                    "gen-00000007"
//! └── snapshots/
//!     ├── gen-00000006/          previous generation, kept for open readers
//!     ├── gen-00000007/
//!     │   ├── meta.json
//!     │   ├── files.parquet
//!     │   ├── definitions.parquet
//!     │   ├── references.parquet
//!     │   ├── imports.parquet
//!     │   ├── decorators.parquet
//!     │   ├── class_bases.parquet
//!     │   ├── calls.parquet
//!     │   └── query.db           derived; rebuilt in memory if missing
//!     └── .staging-00000008/     in-progress write, never read
//! ```
//!
//! ## Module Structure
//!
//! - `assemble` - global id assignment from an extraction set
//! - `columnar` - Parquet encoding of each table
//! - `validate` - invariant checks run before anything is written
//! - `writer` - staging, fsync, atomic swap, garbage collection
//! - `reader` - loading the current generation
//! - `schema` - the derived `SQLite` query database

mod assemble;
mod columnar;
mod reader;
mod schema;
mod validate;
mod writer;

pub use assemble::{Assembled, ReferenceSite, assemble};
pub(crate) use schema::build_query_db;
pub use validate::validate;
pub use writer::{CleanReport, SnapshotInfo};

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{
    Call, ClassBase, Decorator, Definition, Degradation, FailedFile, FileRecord, Import,
    Reference, TableCounts,
};

/// Version of the on-disk table format.
pub const SCHEMA_VERSION: u32 = 1;

const CURRENT_FILE: &str = "CURRENT";
const SNAPSHOTS_DIR: &str = "snapshots";
const LOCK_FILE: &str = "lock";
const META_FILE: &str = "meta.json";
const QUERY_DB_FILE: &str = "query.db";
const GENERATION_PREFIX: &str = "gen-";
const STAGING_PREFIX: &str = ".staging-";

/// Table file names.
pub(crate) mod table_files {
    pub const FILES: &str = "files.parquet";
    pub const DEFINITIONS: &str = "definitions.parquet";
    pub const REFERENCES: &str = "references.parquet";
    pub const IMPORTS: &str = "imports.parquet";
    pub const DECORATORS: &str = "decorators.parquet";
    pub const CLASS_BASES: &str = "class_bases.parquet";
    pub const CALLS: &str = "calls.parquet";
}

/// Every table of one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tables {
    /// `files`
    pub files: Vec<FileRecord>,
    /// `definitions`
    pub definitions: Vec<Definition>,
    /// `references`
    pub references: Vec<Reference>,
    /// `imports`
    pub imports: Vec<Import>,
    /// `decorators`
    pub decorators: Vec<Decorator>,
    /// `class_bases`
    pub class_bases: Vec<ClassBase>,
    /// `calls`
    pub calls: Vec<Call>,
}

impl Tables {
    /// Row counts per table.
    #[must_use]
    pub fn counts(&self) -> TableCounts {
        TableCounts {
            files: self.files.len(),
            definitions: self.definitions.len(),
            references: self.references.len(),
            imports: self.imports.len(),
            decorators: self.decorators.len(),
            class_bases: self.class_bases.len(),
            calls: self.calls.len(),
        }
    }

    /// References without a resolved target.
    #[must_use]
    pub fn unresolved_references(&self) -> usize {
        self.references
            .iter()
            .filter(|r| r.target_full_name.is_none())
            .count()
    }
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Table format version
    pub schema_version: u32,
    /// Tool that wrote the snapshot
    pub tool: String,
    /// Version of that tool
    pub tool_version: String,
    /// Generation number
    pub generation: u64,
    /// When the snapshot was assembled
    pub created_at: DateTime<Utc>,
    /// Analysis provider name
    pub provider: String,
    /// Whether references were resolved
    pub resolve_refs: bool,
    /// Row counts per table
    pub counts: TableCounts,
    /// References left without a target
    pub unresolved_references: usize,
    /// Files whose analysis failed, with the hash that failed
    #[serde(default)]
    pub failed_files: Vec<FailedFile>,
    /// Files analyzed with reduced fidelity
    #[serde(default)]
    pub degradations: Vec<Degradation>,
}

/// A loaded snapshot.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Metadata
    pub meta: SnapshotMeta,
    /// Tables
    pub tables: Tables,
}

/// Owns an index directory and its generations.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    index_dir: PathBuf,
}

impl SnapshotStore {
    /// Open the store rooted at `index_dir`. Nothing is created until written.
    #[must_use]
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
        }
    }

    /// The index directory.
    #[must_use]
    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.index_dir.join(SNAPSHOTS_DIR)
    }

    fn current_file(&self) -> PathBuf {
        self.index_dir.join(CURRENT_FILE)
    }

    /// Directory of a published generation.
    #[must_use]
    pub fn generation_dir(&self, generation: u64) -> PathBuf {
        self.snapshots_dir().join(generation_name(generation))
    }

    fn staging_dir(&self, generation: u64) -> PathBuf {
        self.snapshots_dir()
            .join(format!("{STAGING_PREFIX}{generation:08}"))
    }

    /// Path of the query database for a generation.
    #[must_use]
    pub fn query_db_path(&self, generation: u64) -> PathBuf {
        self.generation_dir(generation).join(QUERY_DB_FILE)
    }

    /// The live generation, or `None` if nothing has been published.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if `CURRENT` exists but is malformed.
    pub fn current_generation(&self) -> Result<Option<u64>> {
        let content = match std::fs::read_to_string(self.current_file()) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        parse_generation(content.trim())
            .map(Some)
            .ok_or_else(|| Error::Snapshot(format!("malformed CURRENT pointer: {:?}", content.trim())))
    }

    /// Highest generation number present on disk, published or not.
    fn highest_generation(&self) -> Result<u64> {
        let mut highest = self.current_generation()?.unwrap_or(0);
        match std::fs::read_dir(self.snapshots_dir()) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    let number = parse_generation(&name).or_else(|| {
                        name.strip_prefix(STAGING_PREFIX)
                            .and_then(|n| n.parse().ok())
                    });
                    if let Some(number) = number {
                        highest = highest.max(number);
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(highest)
    }

    /// Take the single-writer lock for this index directory.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked` if another coordinator holds it.
    pub fn lock(&self) -> Result<StoreLock> {
        std::fs::create_dir_all(&self.index_dir)?;
        let path = self.index_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                use std::io::Write;
                // Informational only
                let _ = writeln!(file, "{}", std::process::id());
                debug!(path = %path.display(), "Acquired index lock");
                Ok(StoreLock { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::Locked(path)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Holds the index lock; released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to release index lock");
        } else {
            debug!(path = %self.path.display(), "Released index lock");
        }
    }
}

fn generation_name(generation: u64) -> String {
    format!("{GENERATION_PREFIX}{generation:08}")
}

fn parse_generation(name: &str) -> Option<u64> {
    name.strip_prefix(GENERATION_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_names_round_trip() {
        assert_eq!(generation_name(7), "gen-00000007");
        assert_eq!(parse_generation("gen-00000007"), Some(7));
        assert_eq!(parse_generation(".staging-00000007"), None);
        assert_eq!(parse_generation("gen-x"), None);
    }

    #[test]
    fn missing_current_means_no_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        assert_eq!(store.current_generation().expect("read"), None);
    }

    #[test]
    fn malformed_current_is_a_snapshot_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(CURRENT_FILE), "garbage\n").expect("write");
        let store = SnapshotStore::new(dir.path());
        assert!(matches!(store.current_generation(), Err(Error::Snapshot(_))));
    }

    #[test]
    fn lock_is_exclusive_and_released_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path().join(".sextant"));

        let held = store.lock().expect("first lock");
        let err = store.lock().expect_err("second lock must fail");
        assert!(matches!(err, Error::Locked(ref p) if p.ends_with("lock")));

        drop(held);
        assert!(store.lock().is_ok());
    }

    #[test]
    fn highest_generation_counts_staging_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        std::fs::create_dir_all(store.generation_dir(3)).expect("mkdir");
        std::fs::create_dir_all(store.staging_dir(5)).expect("mkdir");
        assert_eq!(store.highest_generation().expect("scan"), 5);
    }
}
