//! Staged, atomically published snapshot writes.
//!
//! # Atomicity Guarantee
//!
//! 1. Every table and `meta.json` is written into a `.staging-N` directory
//!    and fsynced
//! 2. `query.db` is built next to them
//! 3. The staging directory is renamed to `gen-N`
//! 4. `CURRENT.tmp` is written, fsynced, and renamed over `CURRENT`
//!
//! Step 4 is the commit point. A crash before it leaves `CURRENT` pointing at
//! the previous generation; leftover staging directories are never read and
//! are removed by the next successful write.
//!
//! The generation `CURRENT` pointed at before the swap survives until the next
//! write, so a reader that resolved the old pointer can still open its tables.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use super::columnar::write_table;
use super::{
    CURRENT_FILE, META_FILE, QUERY_DB_FILE, SCHEMA_VERSION, SnapshotMeta, SnapshotStore, Tables,
    build_query_db, generation_name, table_files, validate,
};
use crate::error::Result;
use crate::types::{Degradation, FailedFile};

/// Run-level facts recorded in `meta.json` next to the tables.
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    /// When the run assembled the tables
    pub created_at: DateTime<Utc>,
    /// Analysis provider name
    pub provider: String,
    /// Whether references were resolved
    pub resolve_refs: bool,
    /// Files whose analysis failed
    pub failed_files: Vec<FailedFile>,
    /// Files analyzed with reduced fidelity
    pub degradations: Vec<Degradation>,
}

/// What [`SnapshotStore::clean`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanReport {
    /// Generation and staging directories removed
    pub removed: usize,
    /// The generation left live, if any
    pub current: Option<u64>,
}

impl SnapshotStore {
    /// Validate `tables` and publish them as the next generation.
    ///
    /// Returns the metadata that was written.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the tables break a snapshot invariant,
    /// or an I/O, serialization, or database error from staging. In every
    /// error case `CURRENT` still points at the previous generation.
    pub fn write(&self, tables: &Tables, info: SnapshotInfo) -> Result<SnapshotMeta> {
        validate(tables)?;

        let previous = self.current_generation()?;
        let generation = self.highest_generation()? + 1;
        let meta = SnapshotMeta {
            schema_version: SCHEMA_VERSION,
            tool: env!("CARGO_PKG_NAME").to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            generation,
            created_at: info.created_at,
            provider: info.provider,
            resolve_refs: info.resolve_refs,
            counts: tables.counts(),
            unresolved_references: tables.unresolved_references(),
            failed_files: info.failed_files,
            degradations: info.degradations,
        };

        let staging = self.staging_dir(generation);
        if let Err(e) = self.stage(&staging, tables, &meta) {
            // Best-effort cleanup; CURRENT was never touched
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let published = self.generation_dir(generation);
        fs::rename(&staging, &published)?;
        sync_dir(&self.snapshots_dir());

        self.swap_current(generation)?;
        info!(
            generation,
            files = meta.counts.files,
            definitions = meta.counts.definitions,
            calls = meta.counts.calls,
            "Published snapshot"
        );

        self.collect_garbage(&[Some(generation), previous]);
        Ok(meta)
    }

    fn stage(&self, staging: &Path, tables: &Tables, meta: &SnapshotMeta) -> Result<()> {
        if staging.exists() {
            fs::remove_dir_all(staging)?;
        }
        fs::create_dir_all(staging)?;

        write_table(&staging.join(table_files::FILES), &tables.files)?;
        write_table(&staging.join(table_files::DEFINITIONS), &tables.definitions)?;
        write_table(&staging.join(table_files::REFERENCES), &tables.references)?;
        write_table(&staging.join(table_files::IMPORTS), &tables.imports)?;
        write_table(&staging.join(table_files::DECORATORS), &tables.decorators)?;
        write_table(&staging.join(table_files::CLASS_BASES), &tables.class_bases)?;
        write_table(&staging.join(table_files::CALLS), &tables.calls)?;

        let file = File::create(staging.join(META_FILE))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, meta)?;
        writer.write_all(b"\n")?;
        finish(writer)?;

        let mut conn = Connection::open(staging.join(QUERY_DB_FILE))?;
        build_query_db(&mut conn, tables)?;
        conn.close().map_err(|(_, e)| e)?;

        sync_dir(staging);
        debug!(path = %staging.display(), "Staged snapshot");
        Ok(())
    }

    fn swap_current(&self, generation: u64) -> Result<()> {
        let current = self.current_file();
        let temp = self.index_dir.join(format!("{CURRENT_FILE}.tmp"));

        if let Err(e) = write_pointer(&temp, generation) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }

        fs::rename(&temp, &current)?;
        sync_dir(&self.index_dir);
        debug!(generation, "Swapped CURRENT pointer");
        Ok(())
    }

    /// Remove old generations without publishing anything.
    ///
    /// Keeps only the live generation, or with `all` removes every
    /// generation and the `CURRENT` pointer so the next run starts from
    /// scratch. `config.yaml` is never touched.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked` while an indexer holds the index directory,
    /// or `Error::Io` if `CURRENT` cannot be removed.
    pub fn clean(&self, all: bool) -> Result<CleanReport> {
        let _lock = self.lock()?;
        let current = self.current_generation()?;

        if !all {
            let removed = self.collect_garbage(&[current]);
            info!(removed, ?current, "Removed old snapshots");
            return Ok(CleanReport {
                removed,
                current,
            });
        }

        match fs::remove_file(self.current_file()) {
            Ok(()) => sync_dir(&self.index_dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let removed = self.collect_garbage(&[]);
        info!(removed, "Removed every snapshot");
        Ok(CleanReport {
            removed,
            current: None,
        })
    }

    /// Remove every generation and staging directory not listed in `keep`,
    /// returning how many were removed.
    ///
    /// Failures are logged and otherwise ignored.
    fn collect_garbage(&self, keep: &[Option<u64>]) -> usize {
        let keep_names: Vec<String> = keep
            .iter()
            .flatten()
            .map(|generation| generation_name(*generation))
            .collect();
        let entries = match fs::read_dir(self.snapshots_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(error = %e, "Failed to list snapshots for cleanup");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if keep_names.iter().any(|keep| name.to_string_lossy() == keep.as_str()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    removed += 1;
                    debug!(path = %path.display(), "Removed old snapshot");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove old snapshot"),
            }
        }
        removed
    }
}

fn write_pointer(path: &Path, generation: u64) -> Result<()> {
    let mut file = File::create(path)?;
    writeln!(file, "{}", generation_name(generation))?;
    file.sync_all()?;
    Ok(())
}

fn finish(writer: BufWriter<File>) -> Result<()> {
    let file = writer.into_inner().map_err(std::io::IntoInnerError::into_error)?;
    file.sync_all()?;
    Ok(())
}

/// Persist directory entries (renames, creations). Not supported everywhere.
fn sync_dir(path: &Path) {
    #[cfg(unix)]
    if let Err(e) = File::open(path).and_then(|dir| dir.sync_all()) {
        debug!(path = %path.display(), error = %e, "Directory fsync failed");
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::snapshot::columnar::read_table;
    use crate::types::{DefinitionId, FileId, FileRecord};

    fn info() -> SnapshotInfo {
        SnapshotInfo {
            created_at: Utc::now(),
            provider: "test".to_string(),
            resolve_refs: true,
            failed_files: Vec::new(),
            degradations: Vec::new(),
        }
    }

    fn tables() -> Tables {
        Tables {
            files: vec![FileRecord {
                id: FileId(1),
                path: "a.py".to_string(),
                hash: "h".to_string(),
                size: 1,
                modified_at: Utc::now(),
                indexed_at: Utc::now(),
            }],
            ..Tables::default()
        }
    }

    #[test]
    fn write_publishes_and_collects_old_generations() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());

        let first = store.write(&tables(), info()).expect("first write");
        let second = store.write(&tables(), info()).expect("second write");
        let third = store.write(&tables(), info()).expect("third write");

        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(third.generation, 3);
        assert_eq!(store.current_generation().expect("current"), Some(3));
        assert!(!store.generation_dir(1).exists());
        assert!(store.query_db_path(3).exists());
        assert!(store.generation_dir(3).join(table_files::CALLS).exists());
    }

    #[test]
    fn previous_generation_stays_readable_until_the_next_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        store.write(&tables(), info()).expect("first write");

        // A reader resolved CURRENT to generation 1 before this write
        let stale_dir = store.generation_dir(1);
        store.write(&tables(), info()).expect("second write");

        let files: Vec<FileRecord> =
            read_table(&stale_dir.join(table_files::FILES)).expect("old tables still open");
        assert_eq!(files.len(), 1);
        assert!(stale_dir.join(META_FILE).exists());
    }

    #[test]
    fn invalid_tables_leave_current_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        store.write(&tables(), info()).expect("first write");

        let mut broken = tables();
        broken.files.clear();
        broken.definitions.push(crate::types::Definition {
            id: DefinitionId(1),
            file_id: FileId(1),
            name: "f".to_string(),
            full_name: "a.f".to_string(),
            kind: crate::types::DefinitionKind::Function,
            line: 1,
            column: 0,
            end_line: None,
            end_column: None,
            signature: None,
            docstring: None,
            parent_id: None,
            is_public: true,
            search_text: String::new(),
        });

        let err = store.write(&broken, info()).expect_err("must reject");
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(store.current_generation().expect("current"), Some(1));
    }

    #[test]
    fn stale_staging_dirs_are_skipped_and_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let leftover = store.staging_dir(4);
        fs::create_dir_all(&leftover).expect("mkdir");

        let meta = store.write(&tables(), info()).expect("write");

        assert_eq!(meta.generation, 5);
        assert!(!leftover.exists());
    }

    #[test]
    fn clean_keeps_only_the_live_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        store.write(&tables(), info()).expect("first write");
        store.write(&tables(), info()).expect("second write");
        fs::create_dir_all(store.staging_dir(7)).expect("leftover staging");

        let report = store.clean(false).expect("clean");

        assert_eq!(report, CleanReport { removed: 2, current: Some(2) });
        assert!(!store.generation_dir(1).exists());
        assert!(store.query_db_path(2).exists());
    }

    #[test]
    fn clean_all_removes_the_pointer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        store.write(&tables(), info()).expect("write");

        let report = store.clean(true).expect("clean");

        assert_eq!(report, CleanReport { removed: 1, current: None });
        assert_eq!(store.current_generation().expect("current"), None);
        assert!(store.read_meta().expect("meta").is_none());
        // The next write starts a fresh history
        assert_eq!(store.write(&tables(), info()).expect("write").generation, 1);
    }

    #[test]
    fn clean_waits_for_the_indexer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let _held = store.lock().expect("lock");

        let err = store.clean(true).expect_err("locked");
        assert!(matches!(err, Error::Locked(_)));
    }
}
