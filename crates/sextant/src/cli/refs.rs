//! `sextant refs` command implementation.

use std::collections::BTreeMap;
use std::path::Path;

use colored::Colorize;
use sextant::{ReferenceHit, Sextant};

/// Run the refs command.
pub fn run(workspace: &Path, name: &str) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;
    let hits = engine.references_to(name)?;

    if hits.is_empty() {
        println!("No references to \"{name}\"");
        return Ok(());
    }

    println!(
        "Found {} references to \"{}\":",
        hits.len().to_string().green().bold(),
        name.cyan()
    );

    // Group by file; rows already come sorted by position
    let mut by_file: BTreeMap<&str, Vec<&ReferenceHit>> = BTreeMap::new();
    for hit in &hits {
        by_file.entry(hit.file_path.as_str()).or_default().push(hit);
    }

    for (file, refs) in by_file {
        println!();
        println!("  {}:", file.white().bold());
        for hit in refs {
            let r = &hit.reference;
            let marker = if r.target_full_name.is_some() {
                String::new()
            } else {
                format!(" {}", "(unresolved)".dimmed())
            };
            println!(
                "    {} {}{}",
                format!("{}:{}", r.line, r.column).dimmed(),
                r.context.trim(),
                marker
            );
        }
    }

    Ok(())
}
