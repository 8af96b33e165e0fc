//! `sextant init` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::Sextant;

/// Run the init command.
pub fn run(workspace: &Path) -> Result<(), sextant::Error> {
    let report = Sextant::init(workspace)?;

    if report.config_created {
        println!(
            "{} {}",
            "Created".green().bold(),
            report.config_file.display()
        );
    } else {
        println!(
            "{} {} already exists",
            "Kept".yellow().bold(),
            report.config_file.display()
        );
    }

    if report.gitignore_updated {
        println!(
            "{} {} to .gitignore",
            "Added".green().bold(),
            report.index_dir.display()
        );
    }

    println!(
        "\n{}: run '{}' to build the index.",
        "hint".dimmed(),
        "sextant index".cyan()
    );
    Ok(())
}
