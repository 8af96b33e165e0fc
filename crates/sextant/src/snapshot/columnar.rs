//! Parquet encoding of snapshot tables.
//!
//! Each table is one Parquet file holding a single Arrow record batch. Columns
//! are looked up by name on read, so column order is not part of the format.
//!
//! | Rust type | Arrow type |
//! |-----------|------------|
//! | ids, `Option<id>` | `Int64` |
//! | `u32` positions, orders | `UInt32` |
//! | `u64` sizes | `UInt64` |
//! | `String`, `DefinitionKind` | `Utf8` |
//! | `bool` | `Boolean` |
//! | `DateTime<Utc>` | `Timestamp(Nanosecond, "UTC")` |

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Int64Array, StringArray, TimestampNanosecondArray,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{
    Call, CallId, ClassBase, ClassBaseId, Decorator, DecoratorId, Definition, DefinitionId,
    DefinitionKind, FileId, FileRecord, Import, ImportId, Reference, ReferenceId,
};

/// A row type stored as one Parquet file.
pub(crate) trait ColumnarTable: Sized {
    /// Encode rows as one record batch.
    fn to_batch(rows: &[Self]) -> Result<RecordBatch>;

    /// Decode every row of `batch`, appending to `out`.
    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()>;
}

/// Write `rows` to `path` and fsync.
pub(crate) fn write_table<T: ColumnarTable>(path: &Path, rows: &[T]) -> Result<()> {
    let batch = T::to_batch(rows)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(&file, batch.schema(), Some(props))?;
    if batch.num_rows() > 0 {
        writer.write(&batch)?;
    }
    writer.close()?;
    file.sync_all()?;
    Ok(())
}

/// Read every row of the table at `path`.
///
/// Errors name the file so a corrupt generation can be found.
pub(crate) fn read_table<T: ColumnarTable>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)
        .map_err(|e| Error::Snapshot(format!("cannot open {}: {e}", path.display())))?;
    decode(file).map_err(|e| match e {
        Error::Snapshot(message) => Error::Snapshot(format!("{}: {message}", path.display())),
        other => Error::Snapshot(format!("{}: {other}", path.display())),
    })
}

/// Like [`read_table`], but a missing file reads as an empty table.
pub(crate) fn read_optional_table<T: ColumnarTable>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        debug!(path = %path.display(), "Optional table missing, treating as empty");
        return Ok(Vec::new());
    }
    read_table(path)
}

fn decode<T: ColumnarTable>(file: File) -> Result<Vec<T>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut rows = Vec::new();
    for batch in reader {
        T::read_batch(&batch?, &mut rows)?;
    }
    Ok(rows)
}

// ============================================================================
// Encoding helpers
// ============================================================================

/// Collects named columns; the schema follows from the arrays.
#[derive(Default)]
struct BatchBuilder {
    fields: Vec<Field>,
    columns: Vec<ArrayRef>,
}

impl BatchBuilder {
    fn required(self, name: &str, array: impl Array + 'static) -> Self {
        self.push(name, false, array)
    }

    fn optional(self, name: &str, array: impl Array + 'static) -> Self {
        self.push(name, true, array)
    }

    fn push(mut self, name: &str, nullable: bool, array: impl Array + 'static) -> Self {
        self.fields
            .push(Field::new(name, array.data_type().clone(), nullable));
        self.columns.push(Arc::new(array));
        self
    }

    fn finish(self) -> Result<RecordBatch> {
        Ok(RecordBatch::try_new(
            Arc::new(Schema::new(self.fields)),
            self.columns,
        )?)
    }
}

fn ids<T>(rows: &[T], id: impl Fn(&T) -> i64) -> Int64Array {
    Int64Array::from_iter_values(rows.iter().map(id))
}

fn optional_ids<T>(rows: &[T], id: impl Fn(&T) -> Option<i64>) -> Int64Array {
    rows.iter().map(id).collect()
}

fn u32s<T>(rows: &[T], value: impl Fn(&T) -> u32) -> UInt32Array {
    UInt32Array::from_iter_values(rows.iter().map(value))
}

fn optional_u32s<T>(rows: &[T], value: impl Fn(&T) -> Option<u32>) -> UInt32Array {
    rows.iter().map(value).collect()
}

fn strings<'a, T: 'a>(rows: &'a [T], value: impl Fn(&'a T) -> &'a str) -> StringArray {
    StringArray::from_iter_values(rows.iter().map(value))
}

fn optional_strings<'a, T: 'a>(
    rows: &'a [T],
    value: impl Fn(&'a T) -> Option<&'a str>,
) -> StringArray {
    rows.iter().map(value).collect()
}

fn bools<T>(rows: &[T], value: impl Fn(&T) -> bool) -> BooleanArray {
    rows.iter().map(|row| Some(value(row))).collect()
}

fn timestamps<T>(rows: &[T], value: impl Fn(&T) -> DateTime<Utc>) -> Result<TimestampNanosecondArray> {
    let nanos = rows
        .iter()
        .map(|row| {
            let at = value(row);
            at.timestamp_nanos_opt()
                .ok_or_else(|| Error::Internal(format!("timestamp out of range: {at}")))
        })
        .collect::<Result<Vec<i64>>>()?;
    Ok(TimestampNanosecondArray::from(nanos).with_timezone("UTC"))
}

// ============================================================================
// Decoding helpers
// ============================================================================

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::Snapshot(format!("missing column {name:?}")))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| Error::Snapshot(format!("unexpected type for column {name:?}")))
}

fn opt_i64(array: &Int64Array, row: usize) -> Option<i64> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_u32(array: &UInt32Array, row: usize) -> Option<u32> {
    (!array.is_null(row)).then(|| array.value(row))
}

fn opt_string(array: &StringArray, row: usize) -> Option<String> {
    (!array.is_null(row)).then(|| array.value(row).to_string())
}

fn timestamp(array: &TimestampNanosecondArray, row: usize) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(array.value(row))
}

fn kind(array: &StringArray, row: usize) -> Result<DefinitionKind> {
    let value = array.value(row);
    DefinitionKind::parse(value)
        .ok_or_else(|| Error::Snapshot(format!("unknown definition kind {value:?}")))
}

// ============================================================================
// Tables
// ============================================================================

impl ColumnarTable for FileRecord {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("path", strings(rows, |r| r.path.as_str()))
            .required("hash", strings(rows, |r| r.hash.as_str()))
            .required("size", UInt64Array::from_iter_values(rows.iter().map(|r| r.size)))
            .required("modified_at", timestamps(rows, |r| r.modified_at)?)
            .required("indexed_at", timestamps(rows, |r| r.indexed_at)?)
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let path = column::<StringArray>(batch, "path")?;
        let hash = column::<StringArray>(batch, "hash")?;
        let size = column::<UInt64Array>(batch, "size")?;
        let modified_at = column::<TimestampNanosecondArray>(batch, "modified_at")?;
        let indexed_at = column::<TimestampNanosecondArray>(batch, "indexed_at")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: FileId(id.value(i)),
                path: path.value(i).to_string(),
                hash: hash.value(i).to_string(),
                size: size.value(i),
                modified_at: timestamp(modified_at, i),
                indexed_at: timestamp(indexed_at, i),
            });
        }
        Ok(())
    }
}

impl ColumnarTable for Definition {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("file_id", ids(rows, |r| r.file_id.0))
            .required("name", strings(rows, |r| r.name.as_str()))
            .required("full_name", strings(rows, |r| r.full_name.as_str()))
            .required("kind", strings(rows, |r| r.kind.as_str()))
            .required("line", u32s(rows, |r| r.line))
            .required("column", u32s(rows, |r| r.column))
            .optional("end_line", optional_u32s(rows, |r| r.end_line))
            .optional("end_column", optional_u32s(rows, |r| r.end_column))
            .optional("signature", optional_strings(rows, |r| r.signature.as_deref()))
            .optional("docstring", optional_strings(rows, |r| r.docstring.as_deref()))
            .optional("parent_id", optional_ids(rows, |r| r.parent_id.map(|p| p.0)))
            .required("is_public", bools(rows, |r| r.is_public))
            .required("search_text", strings(rows, |r| r.search_text.as_str()))
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let file_id = column::<Int64Array>(batch, "file_id")?;
        let name = column::<StringArray>(batch, "name")?;
        let full_name = column::<StringArray>(batch, "full_name")?;
        let kinds = column::<StringArray>(batch, "kind")?;
        let line = column::<UInt32Array>(batch, "line")?;
        let col = column::<UInt32Array>(batch, "column")?;
        let end_line = column::<UInt32Array>(batch, "end_line")?;
        let end_column = column::<UInt32Array>(batch, "end_column")?;
        let signature = column::<StringArray>(batch, "signature")?;
        let docstring = column::<StringArray>(batch, "docstring")?;
        let parent_id = column::<Int64Array>(batch, "parent_id")?;
        let is_public = column::<BooleanArray>(batch, "is_public")?;
        let search_text = column::<StringArray>(batch, "search_text")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: DefinitionId(id.value(i)),
                file_id: FileId(file_id.value(i)),
                name: name.value(i).to_string(),
                full_name: full_name.value(i).to_string(),
                kind: kind(kinds, i)?,
                line: line.value(i),
                column: col.value(i),
                end_line: opt_u32(end_line, i),
                end_column: opt_u32(end_column, i),
                signature: opt_string(signature, i),
                docstring: opt_string(docstring, i),
                parent_id: opt_i64(parent_id, i).map(DefinitionId),
                is_public: is_public.value(i),
                search_text: search_text.value(i).to_string(),
            });
        }
        Ok(())
    }
}

impl ColumnarTable for Reference {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("file_id", ids(rows, |r| r.file_id.0))
            .optional("definition_id", optional_ids(rows, |r| r.definition_id.map(|d| d.0)))
            .required("name", strings(rows, |r| r.name.as_str()))
            .required("line", u32s(rows, |r| r.line))
            .required("column", u32s(rows, |r| r.column))
            .required("context", strings(rows, |r| r.context.as_str()))
            .optional(
                "target_full_name",
                optional_strings(rows, |r| r.target_full_name.as_deref()),
            )
            .optional(
                "target_module_path",
                optional_strings(rows, |r| r.target_module_path.as_deref()),
            )
            .required("is_call", bools(rows, |r| r.is_call))
            .optional("call_order", optional_u32s(rows, |r| r.call_order))
            .optional("call_depth", optional_u32s(rows, |r| r.call_depth))
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let file_id = column::<Int64Array>(batch, "file_id")?;
        let definition_id = column::<Int64Array>(batch, "definition_id")?;
        let name = column::<StringArray>(batch, "name")?;
        let line = column::<UInt32Array>(batch, "line")?;
        let col = column::<UInt32Array>(batch, "column")?;
        let context = column::<StringArray>(batch, "context")?;
        let target_full_name = column::<StringArray>(batch, "target_full_name")?;
        let target_module_path = column::<StringArray>(batch, "target_module_path")?;
        let is_call = column::<BooleanArray>(batch, "is_call")?;
        let call_order = column::<UInt32Array>(batch, "call_order")?;
        let call_depth = column::<UInt32Array>(batch, "call_depth")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: ReferenceId(id.value(i)),
                file_id: FileId(file_id.value(i)),
                definition_id: opt_i64(definition_id, i).map(DefinitionId),
                name: name.value(i).to_string(),
                line: line.value(i),
                column: col.value(i),
                context: context.value(i).to_string(),
                target_full_name: opt_string(target_full_name, i),
                target_module_path: opt_string(target_module_path, i),
                is_call: is_call.value(i),
                call_order: opt_u32(call_order, i),
                call_depth: opt_u32(call_depth, i),
            });
        }
        Ok(())
    }
}

impl ColumnarTable for Import {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("file_id", ids(rows, |r| r.file_id.0))
            .required("module", strings(rows, |r| r.module.as_str()))
            .optional("name", optional_strings(rows, |r| r.name.as_deref()))
            .optional("alias", optional_strings(rows, |r| r.alias.as_deref()))
            .required("line", u32s(rows, |r| r.line))
            .required("column", u32s(rows, |r| r.column))
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let file_id = column::<Int64Array>(batch, "file_id")?;
        let module = column::<StringArray>(batch, "module")?;
        let name = column::<StringArray>(batch, "name")?;
        let alias = column::<StringArray>(batch, "alias")?;
        let line = column::<UInt32Array>(batch, "line")?;
        let col = column::<UInt32Array>(batch, "column")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: ImportId(id.value(i)),
                file_id: FileId(file_id.value(i)),
                module: module.value(i).to_string(),
                name: opt_string(name, i),
                alias: opt_string(alias, i),
                line: line.value(i),
                column: col.value(i),
            });
        }
        Ok(())
    }
}

impl ColumnarTable for Decorator {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("file_id", ids(rows, |r| r.file_id.0))
            .required("definition_id", ids(rows, |r| r.definition_id.0))
            .required("name", strings(rows, |r| r.name.as_str()))
            .optional("full_name", optional_strings(rows, |r| r.full_name.as_deref()))
            .optional("arguments", optional_strings(rows, |r| r.arguments.as_deref()))
            .required("line", u32s(rows, |r| r.line))
            .required("column", u32s(rows, |r| r.column))
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let file_id = column::<Int64Array>(batch, "file_id")?;
        let definition_id = column::<Int64Array>(batch, "definition_id")?;
        let name = column::<StringArray>(batch, "name")?;
        let full_name = column::<StringArray>(batch, "full_name")?;
        let arguments = column::<StringArray>(batch, "arguments")?;
        let line = column::<UInt32Array>(batch, "line")?;
        let col = column::<UInt32Array>(batch, "column")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: DecoratorId(id.value(i)),
                file_id: FileId(file_id.value(i)),
                definition_id: DefinitionId(definition_id.value(i)),
                name: name.value(i).to_string(),
                full_name: opt_string(full_name, i),
                arguments: opt_string(arguments, i),
                line: line.value(i),
                column: col.value(i),
            });
        }
        Ok(())
    }
}

impl ColumnarTable for ClassBase {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("file_id", ids(rows, |r| r.file_id.0))
            .required("class_id", ids(rows, |r| r.class_id.0))
            .required("base_name", strings(rows, |r| r.base_name.as_str()))
            .optional(
                "base_full_name",
                optional_strings(rows, |r| r.base_full_name.as_deref()),
            )
            .optional("base_id", optional_ids(rows, |r| r.base_id.map(|b| b.0)))
            .required("position", u32s(rows, |r| r.position))
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let file_id = column::<Int64Array>(batch, "file_id")?;
        let class_id = column::<Int64Array>(batch, "class_id")?;
        let base_name = column::<StringArray>(batch, "base_name")?;
        let base_full_name = column::<StringArray>(batch, "base_full_name")?;
        let base_id = column::<Int64Array>(batch, "base_id")?;
        let position = column::<UInt32Array>(batch, "position")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: ClassBaseId(id.value(i)),
                file_id: FileId(file_id.value(i)),
                class_id: DefinitionId(class_id.value(i)),
                base_name: base_name.value(i).to_string(),
                base_full_name: opt_string(base_full_name, i),
                base_id: opt_i64(base_id, i).map(DefinitionId),
                position: position.value(i),
            });
        }
        Ok(())
    }
}

impl ColumnarTable for Call {
    fn to_batch(rows: &[Self]) -> Result<RecordBatch> {
        BatchBuilder::default()
            .required("id", ids(rows, |r| r.id.0))
            .required("file_id", ids(rows, |r| r.file_id.0))
            .required("reference_id", ids(rows, |r| r.reference_id.0))
            .required("caller_id", ids(rows, |r| r.caller_id.0))
            .required("caller_full_name", strings(rows, |r| r.caller_full_name.as_str()))
            .optional("callee_name", optional_strings(rows, |r| r.callee_name.as_deref()))
            .optional(
                "callee_full_name",
                optional_strings(rows, |r| r.callee_full_name.as_deref()),
            )
            .optional("callee_id", optional_ids(rows, |r| r.callee_id.map(|c| c.0)))
            .required("line", u32s(rows, |r| r.line))
            .required("column", u32s(rows, |r| r.column))
            .required("context", strings(rows, |r| r.context.as_str()))
            .required("call_order", u32s(rows, |r| r.call_order))
            .required("call_depth", u32s(rows, |r| r.call_depth))
            .finish()
    }

    fn read_batch(batch: &RecordBatch, out: &mut Vec<Self>) -> Result<()> {
        let id = column::<Int64Array>(batch, "id")?;
        let file_id = column::<Int64Array>(batch, "file_id")?;
        let reference_id = column::<Int64Array>(batch, "reference_id")?;
        let caller_id = column::<Int64Array>(batch, "caller_id")?;
        let caller_full_name = column::<StringArray>(batch, "caller_full_name")?;
        let callee_name = column::<StringArray>(batch, "callee_name")?;
        let callee_full_name = column::<StringArray>(batch, "callee_full_name")?;
        let callee_id = column::<Int64Array>(batch, "callee_id")?;
        let line = column::<UInt32Array>(batch, "line")?;
        let col = column::<UInt32Array>(batch, "column")?;
        let context = column::<StringArray>(batch, "context")?;
        let call_order = column::<UInt32Array>(batch, "call_order")?;
        let call_depth = column::<UInt32Array>(batch, "call_depth")?;

        for i in 0..batch.num_rows() {
            out.push(Self {
                id: CallId(id.value(i)),
                file_id: FileId(file_id.value(i)),
                reference_id: ReferenceId(reference_id.value(i)),
                caller_id: DefinitionId(caller_id.value(i)),
                caller_full_name: caller_full_name.value(i).to_string(),
                callee_name: opt_string(callee_name, i),
                callee_full_name: opt_string(callee_full_name, i),
                callee_id: opt_i64(callee_id, i).map(DefinitionId),
                line: line.value(i),
                column: col.value(i),
                context: context.value(i).to_string(),
                call_order: call_order.value(i),
                call_depth: call_depth.value(i),
            });
        }
        Ok(())
    }
}
