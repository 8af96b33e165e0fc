//! `sextant calls` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::Sextant;

use super::display::{print_call_tree, print_not_found};

/// Run the calls command.
pub fn run(
    workspace: &Path,
    full_name: &str,
    depth: u32,
    top_level_only: bool,
) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;

    let Some(hit) = engine.get_definition(full_name)? else {
        print_not_found(full_name);
        return Ok(());
    };

    let def = &hit.definition;
    let tree = engine.calls(def.id, depth, top_level_only)?;

    println!(
        "{} {}",
        def.full_name.white().bold(),
        format!("- {}:{}", hit.file_path, def.line).dimmed()
    );
    if tree.is_empty() {
        println!("  {}", "(no calls)".dimmed());
        return Ok(());
    }
    print_call_tree(&tree, "");

    Ok(())
}
