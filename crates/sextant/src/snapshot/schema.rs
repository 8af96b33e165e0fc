//! Derived `SQLite` query database.
//!
//! `query.db` is built from the Parquet tables of one generation and never
//! written to afterwards. The Parquet files stay the source of truth; a
//! missing or deleted `query.db` is rebuilt in memory on open.
//!
//! The `references` table is named `refs` here because `REFERENCES` is an SQL
//! keyword.

use rusqlite::{Connection, params};
use tracing::debug;

use super::Tables;
use crate::error::Result;

/// Tables, full-text index, and convenience views.
pub(crate) const SCHEMA: &str = r"
CREATE TABLE files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    modified_at TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE TABLE definitions (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    line INTEGER NOT NULL,
    column INTEGER NOT NULL,
    end_line INTEGER,
    end_column INTEGER,
    signature TEXT,
    docstring TEXT,
    parent_id INTEGER REFERENCES definitions(id),
    is_public INTEGER NOT NULL,
    search_text TEXT NOT NULL
);

CREATE INDEX idx_definitions_name ON definitions(name);
CREATE INDEX idx_definitions_full_name ON definitions(full_name);
CREATE INDEX idx_definitions_kind ON definitions(kind);
CREATE INDEX idx_definitions_file ON definitions(file_id);
CREATE INDEX idx_definitions_parent ON definitions(parent_id);

-- definition_id is NULL at module level; target_* are NULL when unresolved
CREATE TABLE refs (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    definition_id INTEGER REFERENCES definitions(id),
    name TEXT NOT NULL,
    line INTEGER NOT NULL,
    column INTEGER NOT NULL,
    context TEXT NOT NULL,
    target_full_name TEXT,
    target_module_path TEXT,
    is_call INTEGER NOT NULL,
    call_order INTEGER,
    call_depth INTEGER
);

CREATE INDEX idx_refs_name ON refs(name);
CREATE INDEX idx_refs_file ON refs(file_id);
CREATE INDEX idx_refs_target ON refs(target_full_name);
CREATE INDEX idx_refs_unresolved ON refs(name) WHERE target_full_name IS NULL;

CREATE TABLE imports (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    module TEXT NOT NULL,
    name TEXT,
    alias TEXT,
    line INTEGER NOT NULL,
    column INTEGER NOT NULL
);

CREATE INDEX idx_imports_module ON imports(module);
CREATE INDEX idx_imports_file ON imports(file_id);

CREATE TABLE decorators (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    definition_id INTEGER NOT NULL REFERENCES definitions(id),
    name TEXT NOT NULL,
    full_name TEXT,
    arguments TEXT,
    line INTEGER NOT NULL,
    column INTEGER NOT NULL
);

CREATE INDEX idx_decorators_definition ON decorators(definition_id);
CREATE INDEX idx_decorators_name ON decorators(name);

CREATE TABLE class_bases (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    class_id INTEGER NOT NULL REFERENCES definitions(id),
    base_name TEXT NOT NULL,
    base_full_name TEXT,
    base_id INTEGER REFERENCES definitions(id),
    position INTEGER NOT NULL
);

CREATE INDEX idx_class_bases_class ON class_bases(class_id);
CREATE INDEX idx_class_bases_base ON class_bases(base_full_name);

CREATE TABLE calls (
    id INTEGER PRIMARY KEY,
    file_id INTEGER NOT NULL REFERENCES files(id),
    reference_id INTEGER NOT NULL REFERENCES refs(id),
    caller_id INTEGER NOT NULL REFERENCES definitions(id),
    caller_full_name TEXT NOT NULL,
    callee_name TEXT,
    callee_full_name TEXT,
    callee_id INTEGER REFERENCES definitions(id),
    line INTEGER NOT NULL,
    column INTEGER NOT NULL,
    context TEXT NOT NULL,
    call_order INTEGER NOT NULL,
    call_depth INTEGER NOT NULL
);

CREATE INDEX idx_calls_caller_order ON calls(caller_id, call_order);
CREATE INDEX idx_calls_caller_name ON calls(caller_full_name);
CREATE INDEX idx_calls_callee ON calls(callee_full_name);
CREATE INDEX idx_calls_callee_name ON calls(callee_name);

-- Ranked text search over definitions
CREATE VIRTUAL TABLE definitions_fts USING fts5(
    name,
    full_name,
    search_text,
    content='definitions',
    content_rowid='id'
);

CREATE VIEW functions AS
    SELECT d.*, f.path AS file_path
    FROM definitions d JOIN files f ON f.id = d.file_id
    WHERE d.kind = 'function';

CREATE VIEW classes AS
    SELECT d.*, f.path AS file_path
    FROM definitions d JOIN files f ON f.id = d.file_id
    WHERE d.kind = 'class';

CREATE VIEW definitions_with_path AS
    SELECT d.*, f.path AS file_path
    FROM definitions d JOIN files f ON f.id = d.file_id;

CREATE VIEW class_hierarchy AS
    SELECT c.id AS class_id,
           c.name AS class_name,
           c.full_name AS class_full_name,
           b.base_name,
           b.base_full_name,
           b.base_id,
           b.position,
           f.path AS file_path
    FROM definitions c
    JOIN files f ON f.id = c.file_id
    LEFT JOIN class_bases b ON b.class_id = c.id
    WHERE c.kind = 'class';

CREATE VIEW decorated_definitions AS
    SELECT d.id,
           d.name,
           d.full_name,
           d.kind,
           dec.name AS decorator_name,
           dec.full_name AS decorator_full_name,
           dec.arguments AS decorator_arguments,
           f.path AS file_path
    FROM decorators dec
    JOIN definitions d ON d.id = dec.definition_id
    JOIN files f ON f.id = d.file_id;

CREATE VIEW calls_with_context AS
    SELECT c.*, f.path AS file_path
    FROM calls c JOIN files f ON f.id = c.file_id;

CREATE VIEW refs_with_path AS
    SELECT r.*, f.path AS file_path
    FROM refs r JOIN files f ON f.id = r.file_id;

CREATE VIEW imports_with_path AS
    SELECT i.*, f.path AS file_path
    FROM imports i JOIN files f ON f.id = i.file_id;
";

/// Create the schema on an empty connection and load every table.
///
/// All inserts run in one transaction.
///
/// # Errors
///
/// Returns `Error::Database` if any statement fails.
pub(crate) fn build_query_db(conn: &mut Connection, tables: &Tables) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    let tx = conn.transaction()?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO files (id, path, hash, size, modified_at, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for file in &tables.files {
            stmt.execute(params![
                file.id.as_i64(),
                file.path,
                file.hash,
                i64::try_from(file.size).unwrap_or(i64::MAX),
                file.modified_at.to_rfc3339(),
                file.indexed_at.to_rfc3339(),
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO definitions (id, file_id, name, full_name, kind, line, column,
             end_line, end_column, signature, docstring, parent_id, is_public, search_text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        )?;
        for def in &tables.definitions {
            stmt.execute(params![
                def.id.as_i64(),
                def.file_id.as_i64(),
                def.name,
                def.full_name,
                def.kind.as_str(),
                def.line,
                def.column,
                def.end_line,
                def.end_column,
                def.signature,
                def.docstring,
                def.parent_id.map(|id| id.as_i64()),
                def.is_public,
                def.search_text,
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO refs (id, file_id, definition_id, name, line, column, context,
             target_full_name, target_module_path, is_call, call_order, call_depth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for reference in &tables.references {
            stmt.execute(params![
                reference.id.as_i64(),
                reference.file_id.as_i64(),
                reference.definition_id.map(|id| id.as_i64()),
                reference.name,
                reference.line,
                reference.column,
                reference.context,
                reference.target_full_name,
                reference.target_module_path,
                reference.is_call,
                reference.call_order,
                reference.call_depth,
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO imports (id, file_id, module, name, alias, line, column)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for import in &tables.imports {
            stmt.execute(params![
                import.id.as_i64(),
                import.file_id.as_i64(),
                import.module,
                import.name,
                import.alias,
                import.line,
                import.column,
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO decorators (id, file_id, definition_id, name, full_name, arguments, line, column)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for decorator in &tables.decorators {
            stmt.execute(params![
                decorator.id.as_i64(),
                decorator.file_id.as_i64(),
                decorator.definition_id.as_i64(),
                decorator.name,
                decorator.full_name,
                decorator.arguments,
                decorator.line,
                decorator.column,
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO class_bases (id, file_id, class_id, base_name, base_full_name, base_id, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for base in &tables.class_bases {
            stmt.execute(params![
                base.id.as_i64(),
                base.file_id.as_i64(),
                base.class_id.as_i64(),
                base.base_name,
                base.base_full_name,
                base.base_id.map(|id| id.as_i64()),
                base.position,
            ])?;
        }

        let mut stmt = tx.prepare(
            "INSERT INTO calls (id, file_id, reference_id, caller_id, caller_full_name,
             callee_name, callee_full_name, callee_id, line, column, context, call_order, call_depth)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for call in &tables.calls {
            stmt.execute(params![
                call.id.as_i64(),
                call.file_id.as_i64(),
                call.reference_id.as_i64(),
                call.caller_id.as_i64(),
                call.caller_full_name,
                call.callee_name,
                call.callee_full_name,
                call.callee_id.map(|id| id.as_i64()),
                call.line,
                call.column,
                call.context,
                call.call_order,
                call.call_depth,
            ])?;
        }
    }

    tx.execute(
        "INSERT INTO definitions_fts(definitions_fts) VALUES ('rebuild')",
        [],
    )?;
    tx.commit()?;

    debug!(
        definitions = tables.definitions.len(),
        references = tables.references.len(),
        calls = tables.calls.len(),
        "Built query database"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Definition, DefinitionId, DefinitionKind, FileId, FileRecord};
    use chrono::Utc;

    fn tables() -> Tables {
        let file = FileRecord {
            id: FileId(1),
            path: "models.py".to_string(),
            hash: "abc".to_string(),
            size: 10,
            modified_at: Utc::now(),
            indexed_at: Utc::now(),
        };
        let definition = |id: i64, name: &str, kind: DefinitionKind| Definition {
            id: DefinitionId(id),
            file_id: FileId(1),
            name: name.to_string(),
            full_name: format!("models.{name}"),
            kind,
            line: 1,
            column: 0,
            end_line: None,
            end_column: None,
            signature: None,
            docstring: None,
            parent_id: None,
            is_public: true,
            search_text: format!("{} parse xml", name.to_lowercase()),
        };
        Tables {
            files: vec![file],
            definitions: vec![
                definition(1, "XmlParser", DefinitionKind::Class),
                definition(2, "load", DefinitionKind::Function),
            ],
            ..Tables::default()
        }
    }

    #[test]
    fn views_expose_file_paths() {
        let mut conn = Connection::open_in_memory().expect("open");
        build_query_db(&mut conn, &tables()).expect("build");

        let (name, path): (String, String) = conn
            .query_row("SELECT name, file_path FROM classes", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .expect("query");
        assert_eq!(name, "XmlParser");
        assert_eq!(path, "models.py");

        let functions: i64 = conn
            .query_row("SELECT COUNT(*) FROM functions", [], |row| row.get(0))
            .expect("count");
        assert_eq!(functions, 1);
    }

    #[test]
    fn full_text_index_is_populated() {
        let mut conn = Connection::open_in_memory().expect("open");
        build_query_db(&mut conn, &tables()).expect("build");

        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM definitions_fts WHERE definitions_fts MATCH 'xml*'",
                [],
                |row| row.get(0),
            )
            .expect("match");
        assert_eq!(hits, 2);
    }
}
