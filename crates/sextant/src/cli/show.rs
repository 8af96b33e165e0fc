//! `sextant show` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::{DefinitionKind, Sextant};

use super::display::print_not_found;

const MAX_SHOWN_REFERENCES: usize = 20;

/// Run the show command.
pub fn run(workspace: &Path, name: &str, with_refs: bool) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;

    let Some(hit) = engine.get_definition(name)? else {
        print_not_found(name);
        return Ok(());
    };
    let def = &hit.definition;

    println!("{}", def.full_name.white().bold());
    println!("  {}: {}", "Kind".dimmed(), def.kind.as_str());
    let span = match def.end_line {
        Some(end) if end != def.line => format!("{}:{}-{end}", hit.file_path, def.line),
        _ => format!("{}:{}", hit.file_path, def.line),
    };
    println!("  {}: {span}", "Location".dimmed());
    println!(
        "  {}: {}",
        "Visibility".dimmed(),
        if def.is_public { "public" } else { "private" }
    );
    if let Some(parent) = def.parent_id {
        if let Some(owner) = engine.definition_by_id(parent)? {
            println!("  {}: {}", "Parent".dimmed(), owner.definition.full_name);
        }
    }
    if let Some(sig) = &def.signature {
        println!("  {}: {}", "Signature".dimmed(), sig.cyan());
    }

    if def.kind == DefinitionKind::Class {
        let bases = engine.bases(def.id)?;
        if !bases.is_empty() {
            let names: Vec<&str> = bases
                .iter()
                .map(|b| b.base_full_name.as_deref().unwrap_or(&b.base_name))
                .collect();
            println!("  {}: {}", "Bases".dimmed(), names.join(", "));
        }
    }

    if let Some(doc) = &def.docstring {
        println!();
        for line in doc.lines() {
            println!("    {}", line.dimmed());
        }
    }

    if def.kind.is_scope() {
        let members = engine.members(def.id)?;
        let members: Vec<_> = members
            .iter()
            .filter(|m| m.kind != DefinitionKind::Param)
            .collect();
        if !members.is_empty() {
            println!();
            println!("  {} ({}):", "Members".white().bold(), members.len());
            for member in members {
                println!(
                    "    {} {} {}",
                    member.name,
                    format!("({})", member.kind.as_str()).dimmed(),
                    format!("line {}", member.line).dimmed()
                );
            }
        }
    }

    if with_refs {
        let refs = engine.references_to(&def.full_name)?;
        println!();
        println!("  {} ({}):", "References".white().bold(), refs.len());
        for r in refs.iter().take(MAX_SHOWN_REFERENCES) {
            println!(
                "    {} {}",
                format!("{}:{}", r.file_path, r.reference.line).dimmed(),
                r.reference.context.trim()
            );
        }
        if refs.len() > MAX_SHOWN_REFERENCES {
            println!("    ... and {} more", refs.len() - MAX_SHOWN_REFERENCES);
        }
    }

    Ok(())
}
