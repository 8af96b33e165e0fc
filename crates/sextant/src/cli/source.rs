//! `sextant source` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::{DefinitionHit, QueryEngine, Sextant};

use super::display::{print_call_tree, print_not_found};

/// Options for the source command.
pub struct SourceArgs {
    /// Lines of context around the definition
    pub context: u32,
    /// Print every definition with the name, not just the best match
    pub all: bool,
    /// Also print the calls the definition makes
    pub calls: bool,
    /// Also print references to the definition
    pub refs: bool,
}

/// Run the source command.
pub fn run(workspace: &Path, name: &str, args: &SourceArgs) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;

    let hits = if args.all {
        engine.definitions_named(name)?
    } else {
        engine.get_definition(name)?.into_iter().collect()
    };
    if hits.is_empty() {
        print_not_found(name);
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_source(&sextant, &engine, hit, args)?;
    }
    Ok(())
}

fn print_source(
    sextant: &Sextant,
    engine: &QueryEngine,
    hit: &DefinitionHit,
    args: &SourceArgs,
) -> Result<(), sextant::Error> {
    let def = &hit.definition;
    let end = def.end_line.unwrap_or(def.line);
    let first = def.line.saturating_sub(args.context);
    let last = end.saturating_add(args.context);

    println!(
        "{} {}",
        def.full_name.white().bold(),
        format!("- {}:{}", hit.file_path, def.line).dimmed()
    );

    match sextant.source_lines(&hit.file_path, first, last) {
        Ok(lines) => {
            let width = lines.last().map_or(1, |(n, _)| n.to_string().len());
            for (number, text) in lines {
                let gutter = format!("{number:>width$}");
                if (def.line..=end).contains(&number) {
                    println!("  {} {text}", gutter.cyan());
                } else {
                    println!("  {} {}", gutter.dimmed(), text.dimmed());
                }
            }
        }
        Err(e) => {
            tracing::debug!(path = %hit.file_path, error = %e, "Source unreadable");
            println!(
                "  {}",
                "(source file changed or missing; re-run sextant index)".dimmed()
            );
        }
    }

    if args.calls {
        let tree = engine.calls(def.id, 1, false)?;
        println!();
        println!("  {} ({}):", "Calls".white().bold(), tree.len());
        print_call_tree(&tree, "  ");
    }

    if args.refs {
        let refs = engine.references_to(&def.full_name)?;
        println!();
        println!("  {} ({}):", "References".white().bold(), refs.len());
        for r in &refs {
            println!(
                "    {} {}",
                format!("{}:{}", r.file_path, r.reference.line).dimmed(),
                r.reference.context.trim()
            );
        }
    }

    Ok(())
}
