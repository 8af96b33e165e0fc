//! `sextant query` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::Sextant;

/// Run the query command, printing tab-separated rows with a header.
pub fn run(workspace: &Path, sql: &str) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;
    let engine = sextant.query()?;
    let result = engine.raw(sql)?;

    println!("{}", result.columns.join("\t").bold());
    for row in &result.rows {
        println!("{}", row.join("\t"));
    }
    eprintln!("{}", format!("({} rows)", result.rows.len()).dimmed());

    Ok(())
}
