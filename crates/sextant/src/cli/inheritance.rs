//! `sextant inheritance` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::{DefinitionKind, MAX_INHERITANCE_DEPTH, Sextant};

use super::display::{print_inheritance_tree, print_not_found};

/// Run the inheritance command.
pub fn run(workspace: &Path, name: &str, children: bool, tree: bool) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;

    let Some(hit) = engine.get_definition(name)? else {
        print_not_found(name);
        return Ok(());
    };
    let class = &hit.definition;
    if class.kind != DefinitionKind::Class {
        println!(
            "\"{}\" is a {}, not a class",
            class.full_name,
            class.kind.as_str()
        );
        return Ok(());
    }

    println!(
        "{} {}",
        class.full_name.white().bold(),
        format!("- {}:{}", hit.file_path, class.line).dimmed()
    );

    if tree {
        let ancestors = engine.ancestors(&class.full_name, MAX_INHERITANCE_DEPTH)?;
        let descendants = engine.descendants(&class.full_name, MAX_INHERITANCE_DEPTH)?;
        println!();
        println!("  {}", "Bases".white().bold());
        if ancestors.is_empty() {
            println!("    {}", "(none)".dimmed());
        }
        print_inheritance_tree(&ancestors, "    ");
        println!();
        println!("  {}", "Subclasses".white().bold());
        if descendants.is_empty() {
            println!("    {}", "(none)".dimmed());
        }
        print_inheritance_tree(&descendants, "    ");
        return Ok(());
    }

    if children {
        let subclasses = engine.subclasses(&class.full_name)?;
        if subclasses.is_empty() {
            println!("  {}", "(no subclasses)".dimmed());
        }
        for sub in &subclasses {
            println!(
                "  {} {}",
                sub.definition.full_name.white().bold(),
                format!("- {}:{}", sub.file_path, sub.definition.line).dimmed()
            );
        }
        return Ok(());
    }

    let bases = engine.bases(class.id)?;
    if bases.is_empty() {
        println!("  {}", "(no bases)".dimmed());
    }
    for base in &bases {
        let target = match &base.base_full_name {
            Some(full) if base.base_id.is_some() => full.white().bold().to_string(),
            Some(full) => format!("{full} {}", "(external)".dimmed()),
            None => format!("{} {}", base.base_name, "(unresolved)".dimmed()),
        };
        println!("  {} {target}", (base.position + 1).to_string().cyan());
    }

    Ok(())
}
