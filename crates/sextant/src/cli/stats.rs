//! `sextant stats` command implementation.

use std::path::Path;

use colored::Colorize;
use sextant::Sextant;

/// Run the stats command.
pub fn run(workspace: &Path) -> Result<(), sextant::Error> {
    let sextant = Sextant::open(workspace)?;

    let Some(meta) = sextant.stats()? else {
        println!("No snapshot found.");
        println!(
            "\n{}: Run '{}' to index your project.",
            "hint".dimmed(),
            "sextant index".cyan()
        );
        return Ok(());
    };

    let db_path = sextant.store().query_db_path(meta.generation);
    let db_size = match std::fs::metadata(&db_path) {
        Ok(m) => format_size(m.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %db_path.display(), "Query database not found");
            "missing, rebuilt on query".to_string()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to get query database size");
            "size unknown".to_string()
        }
    };

    println!("{}", "Sextant Index Statistics".cyan().bold());
    println!();
    println!(
        "  {}: {} ({})",
        "Generation".white().bold(),
        meta.generation,
        meta.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "  {}: {} ({})",
        "Query database".white().bold(),
        db_path.display(),
        db_size
    );
    println!(
        "  {}: {} {}",
        "Provider".white().bold(),
        meta.provider,
        if meta.resolve_refs {
            String::new()
        } else {
            "(references not resolved)".yellow().to_string()
        }
    );
    println!();

    let counts = meta.counts;
    let rows = [
        ("Files", counts.files),
        ("Definitions", counts.definitions),
        ("References", counts.references),
        ("Imports", counts.imports),
        ("Decorators", counts.decorators),
        ("Class bases", counts.class_bases),
        ("Calls", counts.calls),
    ];
    for (label, count) in rows {
        println!("  {}: {}", label.white().bold(), count.to_string().green());
    }
    println!(
        "  {}: {}",
        "Unresolved references".white().bold(),
        meta.unresolved_references
    );

    if !meta.failed_files.is_empty() {
        println!();
        println!(
            "  {}: {} files failed analysis",
            "Warning".yellow().bold(),
            meta.failed_files.len()
        );
        for failed in meta.failed_files.iter().take(5) {
            println!("    {} {}: {}", "•".dimmed(), failed.path, failed.message);
        }
    }

    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_use_binary_units() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
    }
}
