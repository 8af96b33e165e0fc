//! Global id assignment.
//!
//! Batches arrive sorted by path; ids are handed out sequentially from 1 per
//! table in that order, keeping each file's rows in provider order. The same
//! input therefore always yields the same ids.

use chrono::{DateTime, Utc};

use super::Tables;
use crate::error::IndexError;
use crate::extract::ExtractionSet;
use crate::types::{
    ClassBase, ClassBaseId, Decorator, DecoratorId, Definition, DefinitionId, DefinitionKind,
    Degradation, FailedFile, FileId, FileRecord, Import, ImportId, Reference, ReferenceId,
};

/// Resolution inputs for one reference, aligned with `Tables::references`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSite {
    /// Definition that owns the call: the enclosing function or class, else
    /// the file's module definition
    pub caller: Option<DefinitionId>,
    /// Target suggested by the provider
    pub target: Option<String>,
    /// The callee is not a plain name
    pub dynamic_callee: bool,
    /// The callee is a plain name bound nowhere in its file
    pub unbound_name: bool,
    /// Index (into `Tables::references`) of the enclosing argument-list call
    pub call_parent: Option<usize>,
}

/// Tables with ids assigned but references not yet resolved.
#[derive(Debug, Clone)]
pub struct Assembled {
    /// Snapshot tables; `calls` is empty until resolution
    pub tables: Tables,
    /// One entry per reference row
    pub sites: Vec<ReferenceSite>,
    /// Per-file failures from extraction
    pub errors: Vec<IndexError>,
    /// Files whose analysis failed
    pub failed_files: Vec<FailedFile>,
    /// Files analyzed with reduced fidelity
    pub degradations: Vec<Degradation>,
    /// Provider that produced the rows
    pub provider: String,
}

fn next_id(len: usize) -> i64 {
    i64::try_from(len + 1).unwrap_or(i64::MAX)
}

/// Assign global ids to a completed extraction set.
#[must_use]
pub fn assemble(set: ExtractionSet, indexed_at: DateTime<Utc>) -> Assembled {
    let mut tables = Tables::default();
    let mut sites = Vec::new();

    for batch in set.batches {
        let file_id = FileId(next_id(tables.files.len()));
        tables.files.push(FileRecord {
            id: file_id,
            path: batch.path,
            hash: batch.hash,
            size: batch.size,
            modified_at: batch.modified_at,
            indexed_at,
        });

        let def_base = tables.definitions.len();
        let def_id = |index: usize| DefinitionId(next_id(def_base + index));
        let module = batch
            .definitions
            .first()
            .filter(|d| d.kind == DefinitionKind::Module)
            .map(|_| def_id(0));

        for (index, def) in batch.definitions.into_iter().enumerate() {
            tables.definitions.push(Definition {
                id: def_id(index),
                file_id,
                name: def.name,
                full_name: def.full_name,
                kind: def.kind,
                line: def.start.line,
                column: def.start.column,
                end_line: def.end.map(|e| e.line),
                end_column: def.end.map(|e| e.column),
                signature: def.signature,
                docstring: def.docstring,
                parent_id: def.parent.map(def_id),
                is_public: def.is_public,
                search_text: def.search_text,
            });
        }

        let ref_base = tables.references.len();
        for reference in batch.references {
            let scope = reference.scope.map(def_id);
            sites.push(ReferenceSite {
                caller: scope.or(module),
                target: reference.target,
                dynamic_callee: reference.dynamic_callee,
                unbound_name: reference.unbound_name,
                call_parent: reference.call_parent.map(|p| ref_base + p),
            });
            tables.references.push(Reference {
                id: ReferenceId(next_id(tables.references.len())),
                file_id,
                definition_id: scope,
                name: reference.name,
                line: reference.position.line,
                column: reference.position.column,
                context: reference.context,
                target_full_name: None,
                target_module_path: None,
                is_call: reference.is_call,
                call_order: None,
                call_depth: None,
            });
        }

        for import in batch.imports {
            tables.imports.push(Import {
                id: ImportId(next_id(tables.imports.len())),
                file_id,
                module: import.module,
                name: import.name,
                alias: import.alias,
                line: import.position.line,
                column: import.position.column,
            });
        }

        for decorator in batch.decorators {
            tables.decorators.push(Decorator {
                id: DecoratorId(next_id(tables.decorators.len())),
                file_id,
                definition_id: def_id(decorator.target),
                name: decorator.name,
                full_name: decorator.full_name,
                arguments: decorator.arguments,
                line: decorator.position.line,
                column: decorator.position.column,
            });
        }

        for base in batch.bases {
            tables.class_bases.push(ClassBase {
                id: ClassBaseId(next_id(tables.class_bases.len())),
                file_id,
                class_id: def_id(base.class),
                base_name: base.name,
                base_full_name: base.full_name,
                base_id: None,
                position: base.position,
            });
        }
    }

    Assembled {
        tables,
        sites,
        errors: set.errors,
        failed_files: set.failed_files,
        degradations: set.degradations,
        provider: set.provider,
    }
}
