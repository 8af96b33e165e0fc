//! Loading the current generation.

use std::fs::File;
use std::io::BufReader;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, warn};

use super::columnar::{read_optional_table, read_table};
use super::{
    META_FILE, QUERY_DB_FILE, SCHEMA_VERSION, Snapshot, SnapshotMeta, SnapshotStore, Tables,
    build_query_db, table_files,
};
use crate::change::PriorState;
use crate::error::{Error, Result};
use crate::types::FileRecord;

impl SnapshotStore {
    /// Metadata of the current generation, or `None` if nothing is published.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if `CURRENT` points at a generation whose
    /// `meta.json` is missing, unreadable, or from a newer schema.
    pub fn read_meta(&self) -> Result<Option<SnapshotMeta>> {
        let Some(generation) = self.current_generation()? else {
            return Ok(None);
        };
        let path = self.generation_dir(generation).join(META_FILE);
        let file = File::open(&path).map_err(|e| {
            Error::Snapshot(format!("cannot open {}: {e}", path.display()))
        })?;
        let meta: SnapshotMeta = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Snapshot(format!("malformed {}: {e}", path.display())))?;

        if meta.schema_version > SCHEMA_VERSION {
            return Err(Error::Snapshot(format!(
                "snapshot schema version {} is newer than supported version {SCHEMA_VERSION}",
                meta.schema_version
            )));
        }
        Ok(Some(meta))
    }

    /// Load every table of the current generation.
    ///
    /// A missing `class_bases.parquet` (written by older versions) reads as
    /// empty; any other missing table is an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if a table is missing, corrupt, or lacks a
    /// column.
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let Some(meta) = self.read_meta()? else {
            return Ok(None);
        };
        let dir = self.generation_dir(meta.generation);

        let tables = Tables {
            files: read_table(&dir.join(table_files::FILES))?,
            definitions: read_table(&dir.join(table_files::DEFINITIONS))?,
            references: read_table(&dir.join(table_files::REFERENCES))?,
            imports: read_table(&dir.join(table_files::IMPORTS))?,
            decorators: read_table(&dir.join(table_files::DECORATORS))?,
            class_bases: read_optional_table(&dir.join(table_files::CLASS_BASES))?,
            calls: read_table(&dir.join(table_files::CALLS))?,
        };

        debug!(generation = meta.generation, "Loaded snapshot");
        Ok(Some(Snapshot { meta, tables }))
    }

    /// What the current snapshot knows about file contents.
    ///
    /// Only `meta.json` and `files.parquet` are read.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if the current generation is unreadable.
    pub fn prior_state(&self) -> Result<Option<PriorState>> {
        let Some(meta) = self.read_meta()? else {
            return Ok(None);
        };
        let files: Vec<FileRecord> =
            read_table(&self.generation_dir(meta.generation).join(table_files::FILES))?;
        Ok(Some(PriorState::new(&files, &meta.failed_files, meta.resolve_refs)))
    }

    /// Open the query database of the current generation read-only.
    ///
    /// If `query.db` is missing it is rebuilt in memory from the tables.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if nothing is published, or a database error.
    pub fn open_query_db(&self) -> Result<Connection> {
        let generation = self
            .current_generation()?
            .ok_or_else(|| Error::Snapshot("no snapshot found; run `sextant index` first".to_string()))?;
        let path = self.generation_dir(generation).join(QUERY_DB_FILE);

        if path.exists() {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            return Ok(conn);
        }

        warn!(path = %path.display(), "Query database missing, rebuilding in memory");
        let snapshot = self
            .load()?
            .ok_or_else(|| Error::Snapshot("snapshot disappeared while opening".to_string()))?;
        let mut conn = Connection::open_in_memory()?;
        build_query_db(&mut conn, &snapshot.tables)?;
        conn.pragma_update(None, "query_only", true)?;
        Ok(conn)
    }
}
