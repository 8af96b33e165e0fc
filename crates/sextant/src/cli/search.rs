//! `sextant search` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::{SearchOptions, Sextant};

use super::display::parse_kind;

/// Run the search command.
pub fn run(
    workspace: &Path,
    query: &str,
    kind_filter: Option<&str>,
    limit: usize,
    include_private: bool,
) -> Result<(), sextant::Error> {
    let kind = kind_filter.map(parse_kind).transpose()?;

    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;
    let hits = engine.search(
        query,
        &SearchOptions {
            kind,
            include_private,
            limit,
        },
    )?;

    if hits.is_empty() {
        println!("No definitions found matching \"{query}\"");
        if kind.is_some() {
            println!(
                "\n{}: Try searching without the --kind filter.",
                "hint".dimmed()
            );
        } else if !include_private {
            println!(
                "\n{}: Private names are hidden; add '{}' to include them.",
                "hint".dimmed(),
                "--private".cyan()
            );
        }
        return Ok(());
    }

    println!(
        "Found {} definitions matching \"{}\":",
        hits.len().to_string().green().bold(),
        query.cyan()
    );
    println!();

    for hit in &hits {
        let def = &hit.definition;
        println!(
            "  {} {} {}",
            def.full_name.white().bold(),
            format!("({})", def.kind.as_str()).dimmed(),
            format!("- {}:{}", hit.file_path, def.line).dimmed()
        );

        if let Some(sig) = &def.signature {
            println!("    {}", sig.dimmed());
        }
    }

    Ok(())
}
