//! Invariant checks run before a snapshot is written.
//!
//! A failure here is a bug in an earlier stage, so it surfaces as
//! `Error::Internal` and nothing touches the disk.

use std::collections::{HashMap, HashSet};

use petgraph::algo;
use petgraph::graphmap::DiGraphMap;

use super::Tables;
use crate::error::{Error, Result};
use crate::types::{DefinitionId, FileId};

fn violation(message: String) -> Error {
    Error::Internal(format!("snapshot invariant violated: {message}"))
}

/// Check referential integrity, parent-tree shape, and call numbering.
///
/// # Errors
///
/// Returns `Error::Internal` describing the first violation found.
pub fn validate(tables: &Tables) -> Result<()> {
    let files: HashSet<FileId> = tables.files.iter().map(|f| f.id).collect();
    if files.len() != tables.files.len() {
        return Err(violation("duplicate file ids".to_string()));
    }
    let check_file = |table: &str, id: FileId| {
        if files.contains(&id) {
            Ok(())
        } else {
            Err(violation(format!("{table} row points at missing file {id}")))
        }
    };

    let definition_files: HashMap<DefinitionId, FileId> = tables
        .definitions
        .iter()
        .map(|d| (d.id, d.file_id))
        .collect();
    if definition_files.len() != tables.definitions.len() {
        return Err(violation("duplicate definition ids".to_string()));
    }
    let check_definition = |table: &str, id: DefinitionId| {
        if definition_files.contains_key(&id) {
            Ok(())
        } else {
            Err(violation(format!("{table} row points at missing definition {id}")))
        }
    };

    let mut parents = DiGraphMap::<i64, ()>::new();
    for def in &tables.definitions {
        check_file("definitions", def.file_id)?;
        parents.add_node(def.id.as_i64());
        if let Some(parent) = def.parent_id {
            check_definition("definitions", parent)?;
            if definition_files.get(&parent) != Some(&def.file_id) {
                return Err(violation(format!(
                    "definition {} ({}) has a parent in another file",
                    def.id, def.full_name
                )));
            }
            parents.add_edge(parent.as_i64(), def.id.as_i64(), ());
        }
    }
    if let Err(cycle) = algo::toposort(&parents, None) {
        return Err(violation(format!(
            "definition parent links form a cycle through {}",
            cycle.node_id()
        )));
    }

    let references: HashSet<_> = tables.references.iter().map(|r| r.id).collect();
    for reference in &tables.references {
        check_file("references", reference.file_id)?;
        if let Some(owner) = reference.definition_id {
            check_definition("references", owner)?;
        }
    }

    for import in &tables.imports {
        check_file("imports", import.file_id)?;
    }

    for decorator in &tables.decorators {
        check_file("decorators", decorator.file_id)?;
        check_definition("decorators", decorator.definition_id)?;
    }

    for base in &tables.class_bases {
        check_file("class_bases", base.file_id)?;
        check_definition("class_bases", base.class_id)?;
        if let Some(target) = base.base_id {
            check_definition("class_bases", target)?;
        }
    }

    let mut orders: HashMap<DefinitionId, Vec<u32>> = HashMap::new();
    for call in &tables.calls {
        check_file("calls", call.file_id)?;
        check_definition("calls", call.caller_id)?;
        if let Some(callee) = call.callee_id {
            check_definition("calls", callee)?;
        }
        if !references.contains(&call.reference_id) {
            return Err(violation(format!(
                "call {} points at missing reference {}",
                call.id, call.reference_id
            )));
        }
        if call.call_depth == 0 {
            return Err(violation(format!("call {} has depth 0", call.id)));
        }
        orders.entry(call.caller_id).or_default().push(call.call_order);
    }

    for (caller, mut numbers) in orders {
        numbers.sort_unstable();
        let dense = numbers
            .iter()
            .zip(1u32..)
            .all(|(&order, expected)| order == expected);
        if !dense {
            return Err(violation(format!(
                "call orders of caller {caller} are not 1..={}",
                numbers.len()
            )));
        }
    }

    Ok(())
}
