//! `sextant clean` command implementation.

use std::io::{BufRead, Write};
use std::path::Path;

use colored::Colorize;
use sextant::Sextant;

/// Run the clean command.
pub fn run(workspace: &Path, all: bool, yes: bool) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;

    if all && !yes && !confirm("This removes every snapshot of the index. Continue?")? {
        println!("{}", "Aborted".yellow());
        return Ok(());
    }

    let report = sextant.clean(all)?;
    if report.removed == 0 {
        println!("{}", "Nothing to remove".dimmed());
    } else {
        println!(
            "{} {} snapshot directories",
            "Removed".green().bold(),
            report.removed
        );
    }
    match report.current {
        Some(generation) => println!("{}: generation {generation}", "Kept".dimmed()),
        None if all => println!(
            "\n{}: Run '{}' to rebuild the index.",
            "hint".dimmed(),
            "sextant index".cyan()
        ),
        None => {}
    }

    Ok(())
}

fn confirm(question: &str) -> Result<bool, sextant::Error> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
