//! Table export as JSON or CSV.
//!
//! Rows come from `query.db` in a stable order (by file path, then position)
//! so that two exports of the same snapshot are byte-identical.

use std::io::Write;
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};

/// A table that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTable {
    /// Definitions with their file path
    Definitions,
    /// Indexed files
    Files,
    /// References with their file path
    Refs,
    /// Imports with their file path
    Imports,
    /// Call graph edges with their file path
    Calls,
    /// Class bases with the class full name
    ClassBases,
    /// Decorators with the decorated full name
    Decorators,
}

impl ExportTable {
    /// Every exportable table.
    pub const ALL: [Self; 7] = [
        Self::Definitions,
        Self::Files,
        Self::Refs,
        Self::Imports,
        Self::Calls,
        Self::ClassBases,
        Self::Decorators,
    ];

    /// Name as accepted on the command line.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Definitions => "definitions",
            Self::Files => "files",
            Self::Refs => "refs",
            Self::Imports => "imports",
            Self::Calls => "calls",
            Self::ClassBases => "class_bases",
            Self::Decorators => "decorators",
        }
    }

    /// Parse a table name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an unknown table.
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == name)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|t| t.as_str()).collect();
                Error::Config(format!(
                    "unknown table {name:?} (expected one of: {})",
                    known.join(", ")
                ))
            })
    }

    /// The `SELECT` for this table. Only `definitions` takes a parameter:
    /// `?1`, an optional definition kind.
    pub(crate) fn select_sql(self) -> &'static str {
        match self {
            Self::Definitions => {
                "SELECT d.id, d.name, d.full_name, d.kind, d.line, d.column, d.end_line, \
                        d.signature, d.docstring, d.parent_id, d.is_public, f.path AS file \
                 FROM definitions d JOIN files f ON f.id = d.file_id \
                 WHERE ?1 IS NULL OR d.kind = ?1 \
                 ORDER BY f.path, d.line, d.column, d.id"
            }
            Self::Files => {
                "SELECT id, path, hash, size, modified_at, indexed_at FROM files \
                 ORDER BY path"
            }
            Self::Refs => {
                "SELECT r.id, r.name, r.line, r.column, r.context, r.target_full_name, \
                        r.is_call, f.path AS file \
                 FROM refs r JOIN files f ON f.id = r.file_id \
                 ORDER BY f.path, r.line, r.column, r.id"
            }
            Self::Imports => {
                "SELECT i.id, i.module, i.name, i.alias, i.line, f.path AS file \
                 FROM imports i JOIN files f ON f.id = i.file_id \
                 ORDER BY f.path, i.line, i.id"
            }
            Self::Calls => {
                "SELECT c.id, c.caller_full_name, c.callee_name, c.callee_full_name, c.line, \
                        c.column, c.call_order, c.call_depth, f.path AS file \
                 FROM calls c JOIN files f ON f.id = c.file_id \
                 ORDER BY f.path, c.caller_full_name, c.call_order"
            }
            Self::ClassBases => {
                "SELECT b.id, d.full_name AS class, b.base_name, b.base_full_name, b.position, \
                        f.path AS file \
                 FROM class_bases b \
                 JOIN definitions d ON d.id = b.class_id \
                 JOIN files f ON f.id = b.file_id \
                 ORDER BY f.path, d.full_name, b.position"
            }
            Self::Decorators => {
                "SELECT x.id, d.full_name AS definition, x.name, x.full_name, x.arguments, \
                        x.line, f.path AS file \
                 FROM decorators x \
                 JOIN definitions d ON d.id = x.definition_id \
                 JOIN files f ON f.id = x.file_id \
                 ORDER BY f.path, x.line, x.id"
            }
        }
    }
}

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// A JSON array of objects, keys in column order
    Json,
    /// CSV with a header row
    Csv,
}

impl ExportFormat {
    /// Parse a format name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for anything but `json` or `csv`.
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(Error::Config(format!(
                "unknown export format {other:?} (expected json or csv)"
            ))),
        }
    }

    /// Format implied by a file extension, if it names one.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| Self::parse(ext).ok())
    }
}

/// Rows of an exported table with their SQL types kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportRows {
    /// Column names
    pub columns: Vec<String>,
    /// Rows, one value per column
    pub rows: Vec<Vec<Value>>,
}

impl ExportRows {
    /// Write in `format`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json`, `Error::Csv`, or `Error::Io` if writing fails.
    pub fn write<W: Write>(&self, format: ExportFormat, writer: W) -> Result<()> {
        match format {
            ExportFormat::Json => self.write_json(writer),
            ExportFormat::Csv => self.write_csv(writer),
        }
    }

    fn write_json<W: Write>(&self, mut writer: W) -> Result<()> {
        let objects: Vec<RowObject<'_>> = self
            .rows
            .iter()
            .map(|values| RowObject {
                columns: &self.columns,
                values,
            })
            .collect();
        serde_json::to_writer_pretty(&mut writer, &objects)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(&self.columns)?;
        for row in &self.rows {
            csv.write_record(row.iter().map(csv_field))?;
        }
        csv.flush()?;
        Ok(())
    }
}

/// One row serialized as a map without reordering its keys.
struct RowObject<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
