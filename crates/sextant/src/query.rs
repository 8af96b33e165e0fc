//! Read-only queries over a snapshot's `query.db`.
//!
//! ## Design
//!
//! | Query | Source |
//! |-------|--------|
//! | search | `definitions_fts` (FTS5, `bm25`), `LIKE` fallback |
//! | definition lookup | `definitions` by full name, then simple name |
//! | call tree | `calls` by caller id, recursing into resolved callees |
//! | references to a name | `refs` by target, or by name when unresolved |
//! | bases, subclasses | `class_bases` by class id, or by base full name |
//! | inheritance tree | `class_bases` walked up or down, at most 10 levels |
//! | export | one table, typed values, stable order |
//! | raw SQL | any read-only statement |

// SQLite stores integers as i64; limits and counts stay far below i64::MAX
#![allow(clippy::cast_possible_wrap)]

use std::collections::HashSet;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::export::{ExportRows, ExportTable};
use crate::snapshot::SnapshotStore;
use crate::types::{
    Call, CallId, ClassBase, ClassBaseId, Definition, DefinitionId, DefinitionKind, FileId,
    Reference, ReferenceId,
};

/// Deepest level an inheritance walk expands.
pub const MAX_INHERITANCE_DEPTH: u32 = 10;

/// Definition columns, prefixed for joins; use with `row_to_definition`.
const DEFINITION_COLUMNS: &str = "d.id, d.file_id, d.name, d.full_name, d.kind, d.line, d.column, \
     d.end_line, d.end_column, d.signature, d.docstring, d.parent_id, d.is_public, d.search_text";

/// Number of `DEFINITION_COLUMNS`; the file path follows them.
const DEFINITION_WIDTH: usize = 14;

/// Call columns; use with `row_to_call`.
const CALL_COLUMNS: &str = "id, file_id, reference_id, caller_id, caller_full_name, callee_name, \
     callee_full_name, callee_id, line, column, context, call_order, call_depth";

/// Reference columns, prefixed for joins; use with `row_to_reference`.
const REFERENCE_COLUMNS: &str = "r.id, r.file_id, r.definition_id, r.name, r.line, r.column, \
     r.context, r.target_full_name, r.target_module_path, r.is_call, r.call_order, r.call_depth";

const REFERENCE_WIDTH: usize = 12;

/// Class base columns, prefixed for joins; use with `row_to_class_base`.
const CLASS_BASE_COLUMNS: &str =
    "b.id, b.file_id, b.class_id, b.base_name, b.base_full_name, b.base_id, b.position";

const CLASS_BASE_WIDTH: usize = 7;

fn parse_kind(s: &str) -> rusqlite::Result<DefinitionKind> {
    DefinitionKind::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("Unknown definition kind '{s}' in query database").into(),
        )
    })
}

fn row_to_definition(row: &Row<'_>) -> rusqlite::Result<Definition> {
    let kind: String = row.get(4)?;
    Ok(Definition {
        id: DefinitionId(row.get(0)?),
        file_id: FileId(row.get(1)?),
        name: row.get(2)?,
        full_name: row.get(3)?,
        kind: parse_kind(&kind)?,
        line: row.get(5)?,
        column: row.get(6)?,
        end_line: row.get(7)?,
        end_column: row.get(8)?,
        signature: row.get(9)?,
        docstring: row.get(10)?,
        parent_id: row.get::<_, Option<i64>>(11)?.map(DefinitionId),
        is_public: row.get(12)?,
        search_text: row.get(13)?,
    })
}

fn row_to_call(row: &Row<'_>) -> rusqlite::Result<Call> {
    Ok(Call {
        id: CallId(row.get(0)?),
        file_id: FileId(row.get(1)?),
        reference_id: ReferenceId(row.get(2)?),
        caller_id: DefinitionId(row.get(3)?),
        caller_full_name: row.get(4)?,
        callee_name: row.get(5)?,
        callee_full_name: row.get(6)?,
        callee_id: row.get::<_, Option<i64>>(7)?.map(DefinitionId),
        line: row.get(8)?,
        column: row.get(9)?,
        context: row.get(10)?,
        call_order: row.get(11)?,
        call_depth: row.get(12)?,
    })
}

fn row_to_reference(row: &Row<'_>) -> rusqlite::Result<Reference> {
    Ok(Reference {
        id: ReferenceId(row.get(0)?),
        file_id: FileId(row.get(1)?),
        definition_id: row.get::<_, Option<i64>>(2)?.map(DefinitionId),
        name: row.get(3)?,
        line: row.get(4)?,
        column: row.get(5)?,
        context: row.get(6)?,
        target_full_name: row.get(7)?,
        target_module_path: row.get(8)?,
        is_call: row.get(9)?,
        call_order: row.get(10)?,
        call_depth: row.get(11)?,
    })
}

fn row_to_class_base(row: &Row<'_>) -> rusqlite::Result<ClassBase> {
    Ok(ClassBase {
        id: ClassBaseId(row.get(0)?),
        file_id: FileId(row.get(1)?),
        class_id: DefinitionId(row.get(2)?),
        base_name: row.get(3)?,
        base_full_name: row.get(4)?,
        base_id: row.get::<_, Option<i64>>(5)?.map(DefinitionId),
        position: row.get(6)?,
    })
}

fn row_to_hit(row: &Row<'_>) -> rusqlite::Result<DefinitionHit> {
    Ok(DefinitionHit {
        definition: row_to_definition(row)?,
        file_path: row.get(DEFINITION_WIDTH)?,
        score: None,
    })
}

/// Filters for [`QueryEngine::search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Only definitions of this kind
    pub kind: Option<DefinitionKind>,
    /// Include names starting with `_`
    pub include_private: bool,
    /// Maximum number of hits
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            kind: None,
            include_private: false,
            limit: 20,
        }
    }
}

/// A definition found by search or lookup.
#[derive(Debug, Clone)]
pub struct DefinitionHit {
    /// The definition
    pub definition: Definition,
    /// Path of its file
    pub file_path: String,
    /// `bm25` rank (lower is better); `None` for `LIKE` matches and lookups
    pub score: Option<f64>,
}

/// A call and, when expanded, what its callee calls.
#[derive(Debug, Clone)]
pub struct CallTreeEntry {
    /// The call row
    pub call: Call,
    /// Calls made by the resolved callee
    pub nested: Vec<CallTreeEntry>,
}

/// A reference with the path of the file containing it.
#[derive(Debug, Clone)]
pub struct ReferenceHit {
    /// The reference
    pub reference: Reference,
    /// Path of the referencing file
    pub file_path: String,
}

/// One class in an inheritance walk.
///
/// Walking up, `expanded` holds the class's bases in declaration order;
/// walking down, its direct subclasses. A class already expanded elsewhere
/// in the walk appears again with `expanded` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritanceNode {
    /// Full name, or the base expression as written when it is not resolved
    pub full_name: String,
    /// Defining file; `None` for classes outside the project
    pub file_path: Option<String>,
    /// Next level of the walk
    pub expanded: Vec<InheritanceNode>,
}

/// Result of a raw SQL query, rendered as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRows {
    /// Column names
    pub columns: Vec<String>,
    /// Rows, one string per column
    pub rows: Vec<Vec<String>>,
}

/// Read-only access to one snapshot's query database.
///
/// Owns its connection; dropping the engine closes it.
#[derive(Debug)]
pub struct QueryEngine {
    conn: Connection,
}

impl QueryEngine {
    /// Open the current snapshot of `store`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if nothing has been indexed yet.
    pub fn open(store: &SnapshotStore) -> Result<Self> {
        Ok(Self::new(store.open_query_db()?))
    }

    /// Wrap an existing connection.
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Ranked search over definition names, full names, and docstrings.
    ///
    /// Exact name matches rank first, then prefix matches, then `bm25`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if both the full-text and `LIKE` queries fail.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<DefinitionHit>> {
        let terms = fts_terms(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        match self.fts_search(query, &terms, options) {
            Ok(hits) => Ok(hits),
            Err(e) => {
                debug!(error = %e, "Full-text search failed, falling back to LIKE");
                self.like_search(query, options)
            }
        }
    }

    fn fts_search(
        &self,
        query: &str,
        terms: &str,
        options: &SearchOptions,
    ) -> Result<Vec<DefinitionHit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS}, f.path, bm25(definitions_fts) AS score \
             FROM definitions_fts \
             JOIN definitions d ON d.id = definitions_fts.rowid \
             JOIN files f ON f.id = d.file_id \
             WHERE definitions_fts MATCH ?1 \
               AND (?2 IS NULL OR d.kind = ?2) \
               AND (?3 OR d.is_public = 1) \
             ORDER BY \
               CASE WHEN lower(d.name) = lower(?4) THEN 0 \
                    WHEN lower(d.name) LIKE lower(?4) || '%' THEN 1 \
                    ELSE 2 END, \
               score, d.full_name \
             LIMIT ?5"
        ))?;

        let hits = stmt
            .query_map(
                params![
                    terms,
                    options.kind.map(|k| k.as_str()),
                    options.include_private,
                    query,
                    options.limit as i64
                ],
                |row| {
                    Ok(DefinitionHit {
                        definition: row_to_definition(row)?,
                        file_path: row.get(DEFINITION_WIDTH)?,
                        score: row.get(DEFINITION_WIDTH + 1)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        trace!(query = %query, terms = %terms, hits = hits.len(), "Full-text search");
        Ok(hits)
    }

    fn like_search(&self, query: &str, options: &SearchOptions) -> Result<Vec<DefinitionHit>> {
        let pattern = format!("%{query}%");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS}, f.path \
             FROM definitions d JOIN files f ON f.id = d.file_id \
             WHERE (d.name LIKE ?1 OR d.full_name LIKE ?1) \
               AND (?2 IS NULL OR d.kind = ?2) \
               AND (?3 OR d.is_public = 1) \
             ORDER BY \
               CASE WHEN d.name = ?4 THEN 0 WHEN d.name LIKE ?4 || '%' THEN 1 ELSE 2 END, \
               d.name, d.full_name \
             LIMIT ?5"
        ))?;

        let hits = stmt
            .query_map(
                params![
                    pattern,
                    options.kind.map(|k| k.as_str()),
                    options.include_private,
                    query,
                    options.limit as i64
                ],
                row_to_hit,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Find a definition by full name, falling back to simple name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn get_definition(&self, name: &str) -> Result<Option<DefinitionHit>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {DEFINITION_COLUMNS}, f.path \
                     FROM definitions d JOIN files f ON f.id = d.file_id \
                     WHERE d.full_name = ?1 OR d.name = ?1 \
                     ORDER BY CASE WHEN d.full_name = ?1 THEN 0 ELSE 1 END, d.id \
                     LIMIT 1"
                ),
                [name],
                row_to_hit,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Calls made by `caller` in execution order.
    ///
    /// With `depth > 1`, resolved callees are expanded recursively; a
    /// definition already expanded on the way down is not expanded again.
    /// `top_level_only` keeps only statement-level (depth 1) calls.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if a query fails.
    pub fn calls(
        &self,
        caller: DefinitionId,
        depth: u32,
        top_level_only: bool,
    ) -> Result<Vec<CallTreeEntry>> {
        let mut expanded = HashSet::from([caller]);
        self.call_tree(caller, depth.max(1), top_level_only, &mut expanded)
    }

    fn call_tree(
        &self,
        caller: DefinitionId,
        remaining: u32,
        top_level_only: bool,
        expanded: &mut HashSet<DefinitionId>,
    ) -> Result<Vec<CallTreeEntry>> {
        let calls = self.direct_calls(caller, top_level_only)?;
        let mut entries = Vec::with_capacity(calls.len());

        for call in calls {
            let mut nested = Vec::new();
            if remaining > 1 {
                if let Some(callee) = call.callee_id {
                    if expanded.insert(callee) {
                        nested = self.call_tree(callee, remaining - 1, top_level_only, expanded)?;
                    }
                }
            }
            entries.push(CallTreeEntry { call, nested });
        }
        Ok(entries)
    }

    fn direct_calls(&self, caller: DefinitionId, top_level_only: bool) -> Result<Vec<Call>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CALL_COLUMNS} FROM calls \
             WHERE caller_id = ?1 AND (NOT ?2 OR call_depth = 1) \
             ORDER BY call_order"
        ))?;
        let calls = stmt
            .query_map(params![caller.as_i64(), top_level_only], row_to_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(calls)
    }

    /// Definitions whose calls target `callee`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn callers(&self, callee: DefinitionId) -> Result<Vec<Call>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CALL_COLUMNS} FROM calls WHERE callee_id = ?1 \
             ORDER BY caller_full_name, call_order"
        ))?;
        let calls = stmt
            .query_map([callee.as_i64()], row_to_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(calls)
    }

    /// References that resolve to `name`, plus unresolved references whose
    /// written name is the last segment of `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn references_to(&self, name: &str) -> Result<Vec<ReferenceHit>> {
        let simple = name.rsplit('.').next().unwrap_or(name);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {REFERENCE_COLUMNS}, f.path \
             FROM refs r JOIN files f ON f.id = r.file_id \
             WHERE r.target_full_name = ?1 \
                OR (r.target_full_name IS NULL AND r.name = ?2) \
             ORDER BY f.path, r.line, r.column"
        ))?;
        let hits = stmt
            .query_map(params![name, simple], |row| {
                Ok(ReferenceHit {
                    reference: row_to_reference(row)?,
                    file_path: row.get(REFERENCE_WIDTH)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Find a definition by row id.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn definition_by_id(&self, id: DefinitionId) -> Result<Option<DefinitionHit>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {DEFINITION_COLUMNS}, f.path \
                     FROM definitions d JOIN files f ON f.id = d.file_id \
                     WHERE d.id = ?1"
                ),
                [id.as_i64()],
                row_to_hit,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Every definition whose full name or simple name is `name`, full-name
    /// matches first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn definitions_named(&self, name: &str) -> Result<Vec<DefinitionHit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS}, f.path \
             FROM definitions d JOIN files f ON f.id = d.file_id \
             WHERE d.full_name = ?1 OR d.name = ?1 \
             ORDER BY CASE WHEN d.full_name = ?1 THEN 0 ELSE 1 END, f.path, d.line"
        ))?;
        let hits = stmt
            .query_map([name], row_to_hit)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Definitions nested directly inside `parent` (methods of a class,
    /// functions of a module), in source order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn members(&self, parent: DefinitionId) -> Result<Vec<Definition>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DEFINITION_COLUMNS} FROM definitions d \
             WHERE d.parent_id = ?1 ORDER BY d.line, d.column"
        ))?;
        let members = stmt
            .query_map([parent.as_i64()], row_to_definition)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Base list of `class` in declaration order.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn bases(&self, class: DefinitionId) -> Result<Vec<ClassBase>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLASS_BASE_COLUMNS} FROM class_bases b \
             WHERE b.class_id = ?1 ORDER BY b.position"
        ))?;
        let bases = stmt
            .query_map([class.as_i64()], row_to_class_base)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(bases)
    }

    /// Classes that list `full_name` as a direct base, by full name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if the query fails.
    pub fn subclasses(&self, full_name: &str) -> Result<Vec<DefinitionHit>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT {DEFINITION_COLUMNS}, f.path \
             FROM class_bases b \
             JOIN definitions d ON d.id = b.class_id \
             JOIN files f ON f.id = d.file_id \
             WHERE b.base_full_name = ?1 \
             ORDER BY d.full_name, d.id"
        ))?;
        let hits = stmt
            .query_map([full_name], row_to_hit)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Bases of `full_name`, their bases, and so on, up to `max_depth`
    /// levels (capped at [`MAX_INHERITANCE_DEPTH`]).
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if a query fails.
    pub fn ancestors(&self, full_name: &str, max_depth: u32) -> Result<Vec<InheritanceNode>> {
        let mut visited = HashSet::from([full_name.to_string()]);
        self.walk_up(full_name, max_depth.min(MAX_INHERITANCE_DEPTH), &mut visited)
    }

    fn walk_up(
        &self,
        full_name: &str,
        remaining: u32,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<InheritanceNode>> {
        if remaining == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {CLASS_BASE_COLUMNS}, bf.path \
             FROM class_bases b \
             JOIN definitions c ON c.id = b.class_id \
             LEFT JOIN definitions bd ON bd.id = b.base_id \
             LEFT JOIN files bf ON bf.id = bd.file_id \
             WHERE c.full_name = ?1 \
             ORDER BY b.position, b.id"
        ))?;
        let bases = stmt
            .query_map([full_name], |row| {
                Ok((row_to_class_base(row)?, row.get::<_, Option<String>>(CLASS_BASE_WIDTH)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut nodes = Vec::with_capacity(bases.len());
        for (base, file_path) in bases {
            let name = base.base_full_name.unwrap_or(base.base_name);
            let expanded = if visited.insert(name.clone()) {
                self.walk_up(&name, remaining - 1, visited)?
            } else {
                Vec::new()
            };
            nodes.push(InheritanceNode {
                full_name: name,
                file_path,
                expanded,
            });
        }
        Ok(nodes)
    }

    /// Subclasses of `full_name`, their subclasses, and so on, up to
    /// `max_depth` levels (capped at [`MAX_INHERITANCE_DEPTH`]).
    ///
    /// # Errors
    ///
    /// Returns `Error::Database` if a query fails.
    pub fn descendants(&self, full_name: &str, max_depth: u32) -> Result<Vec<InheritanceNode>> {
        let mut visited = HashSet::from([full_name.to_string()]);
        self.walk_down(full_name, max_depth.min(MAX_INHERITANCE_DEPTH), &mut visited)
    }

    fn walk_down(
        &self,
        full_name: &str,
        remaining: u32,
        visited: &mut HashSet<String>,
    ) -> Result<Vec<InheritanceNode>> {
        if remaining == 0 {
            return Ok(Vec::new());
        }

        let mut nodes = Vec::new();
        for hit in self.subclasses(full_name)? {
            let name = hit.definition.full_name;
            let expanded = if visited.insert(name.clone()) {
                self.walk_down(&name, remaining - 1, visited)?
            } else {
                Vec::new()
            };
            nodes.push(InheritanceNode {
                full_name: name,
                file_path: Some(hit.file_path),
                expanded,
            });
        }
        Ok(nodes)
    }

    /// Every row of `table`, ordered by file path and position.
    ///
    /// `kind` filters the `definitions` table.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `kind` is given for another table, or
    /// `Error::Database` if the query fails.
    pub fn export(&self, table: ExportTable, kind: Option<DefinitionKind>) -> Result<ExportRows> {
        let mut stmt = self.conn.prepare(table.select_sql())?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| (*c).to_string()).collect();
        let width = columns.len();

        let mut cursor = match (table, kind) {
            (ExportTable::Definitions, kind) => stmt.query([kind.map(|k| k.as_str())])?,
            (_, None) => stmt.query([])?,
            (_, Some(_)) => {
                return Err(Error::Config(format!(
                    "a kind filter only applies to the definitions table, not {}",
                    table.as_str()
                )));
            }
        };

        let mut rows = Vec::new();
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(json_value(row.get_ref(i)?));
            }
            rows.push(values);
        }
        debug!(table = table.as_str(), rows = rows.len(), "Exported table");
        Ok(ExportRows { columns, rows })
    }

    /// Run a read-only SQL statement and render every value as text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for statements that would write, or
    /// `Error::Database` if the statement is invalid.
    pub fn raw(&self, sql: &str) -> Result<RawRows> {
        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(Error::Config(
                "only read-only statements are allowed against the index".to_string(),
            ));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| (*c).to_string()).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(render_value(row.get_ref(i)?));
            }
            rows.push(values);
        }
        Ok(RawRows { columns, rows })
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => i.into(),
        ValueRef::Real(f) => f.into(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned().into(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()).into(),
    }
}

/// Turn free text into an FTS5 query: every word becomes a quoted prefix term.
fn fts_terms(query: &str) -> String {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| format!("\"{}\"*", word.to_lowercase()))
        .collect::<Vec<_>>()
        .join(" ")
}
