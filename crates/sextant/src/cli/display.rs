//! Common display utilities for CLI commands.

use colored::Colorize;
use sextant::{CallTreeEntry, DefinitionKind, IndexStats, InheritanceNode, RunOutcome};

const MAX_DISPLAY_ITEMS: usize = 5;

/// Print the result of one indexing run.
pub fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Unchanged { files } => {
            println!(
                "{} {} files unchanged, index is up to date",
                "Fresh".green().bold(),
                files
            );
        }
        RunOutcome::Indexed(stats) => print_stats(stats),
    }
}

fn print_stats(stats: &IndexStats) {
    println!(
        "{} {} files, found {} definitions, {} references, {} calls",
        "Indexed".green().bold(),
        stats.files_indexed,
        stats.counts.definitions,
        stats.counts.references,
        stats.counts.calls
    );
    println!(
        "{}: generation {}, {:.2?}",
        "Snapshot".dimmed(),
        stats.generation,
        stats.duration
    );

    if stats.files_removed > 0 {
        println!("{}: {} files", "Removed".yellow(), stats.files_removed);
    }

    if stats.unresolved_references > 0 {
        println!(
            "{}: {} (external or dynamic)",
            "Unresolved references".dimmed(),
            stats.unresolved_references
        );
    }

    if !stats.degradations.is_empty() {
        println!(
            "{}: {} files analyzed with reduced fidelity",
            "Degraded".yellow(),
            stats.degradations.len()
        );
    }

    if !stats.errors.is_empty() {
        println!();
        println!("{} ({}):", "Errors".red().bold(), stats.errors.len());
        for err in stats.errors.iter().take(MAX_DISPLAY_ITEMS) {
            println!("  {} {}: {}", "•".red(), err.path.display(), err.message);
        }
        if stats.errors.len() > MAX_DISPLAY_ITEMS {
            println!("  ... and {} more", stats.errors.len() - MAX_DISPLAY_ITEMS);
        }
    }
}

/// Print a list of file paths with truncation.
pub fn print_paths(label: &str, paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    println!("  {} ({}):", label.white().bold(), paths.len());
    for path in paths.iter().take(MAX_DISPLAY_ITEMS) {
        println!("    {} {path}", "•".dimmed());
    }
    if paths.len() > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            paths.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Print a call tree with box-drawing connectors.
///
/// ```text
/// ├── 1 b.h [arg depth 2]  (line 2)
/// └── 2 b.g  (line 2)
///     └── 1 c.k  (line 7)
/// ```
pub fn print_call_tree(entries: &[CallTreeEntry], prefix: &str) {
    for (i, entry) in entries.iter().enumerate() {
        let last = i + 1 == entries.len();
        let connector = if last { "└── " } else { "├── " };
        let call = &entry.call;

        let callee = match (&call.callee_full_name, &call.callee_name) {
            (Some(full), _) => full.white().bold().to_string(),
            (None, Some(name)) => format!("{name} {}", "(unresolved)".dimmed()),
            (None, None) => format!("{} {}", call.context, "(dynamic)".dimmed()),
        };
        let depth = if call.call_depth > 1 {
            format!(" [arg depth {}]", call.call_depth).dimmed().to_string()
        } else {
            String::new()
        };

        println!(
            "{prefix}{}{} {callee}{depth}  {}",
            connector.dimmed(),
            call.call_order.to_string().cyan(),
            format!("(line {})", call.line).dimmed()
        );

        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        print_call_tree(&entry.nested, &child_prefix);
    }
}

/// Parse a `--kind` argument.
pub fn parse_kind(kind: &str) -> Result<DefinitionKind, sextant::Error> {
    DefinitionKind::parse(kind).ok_or_else(|| {
        let valid: Vec<&str> = DefinitionKind::ALL.iter().map(DefinitionKind::as_str).collect();
        sextant::Error::Config(format!(
            "unknown definition kind '{kind}'. Valid kinds: {}",
            valid.join(", ")
        ))
    })
}

/// Report a name that matched no definition, with a search hint.
pub fn print_not_found(name: &str) {
    println!("No definition named \"{name}\"");
    println!(
        "\n{}: Use '{}' to find the full name.",
        "hint".dimmed(),
        format!("sextant search {name}").cyan()
    );
}

/// Print an inheritance walk with the same connectors as a call tree.
pub fn print_inheritance_tree(nodes: &[InheritanceNode], prefix: &str) {
    for (i, node) in nodes.iter().enumerate() {
        let last = i + 1 == nodes.len();
        let connector = if last { "└── " } else { "├── " };
        let location = match &node.file_path {
            Some(path) => format!("({path})").dimmed().to_string(),
            None => "(external)".dimmed().to_string(),
        };
        println!(
            "{prefix}{}{} {location}",
            connector.dimmed(),
            node.full_name.white().bold()
        );

        let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
        print_inheritance_tree(&node.expanded, &child_prefix);
    }
}
