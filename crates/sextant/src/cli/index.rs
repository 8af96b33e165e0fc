//! `sextant index` command implementation.

use std::path::Path;
use std::process::ExitCode;

use colored::Colorize;
use sextant::{CancelToken, IndexOptions, Sextant};

use super::display::{print_outcome, print_paths};

/// Flags of the index command.
#[derive(Debug, Clone, Default)]
pub struct IndexArgs {
    /// Re-index even if nothing changed
    pub force: bool,
    /// Report staleness only
    pub check: bool,
    /// Skip resolution
    pub no_resolve_refs: bool,
    /// Keep watching after the first run
    pub watch: bool,
    /// Extra include patterns
    pub include: Vec<String>,
    /// Extra exclude patterns
    pub exclude: Vec<String>,
}

/// Run the index command.
pub fn run(workspace: &Path, args: &IndexArgs) -> Result<ExitCode, sextant::Error> {
    let mut sextant = Sextant::open_with_patterns(workspace, &args.include, &args.exclude)?;

    let options = IndexOptions {
        force: args.force,
        resolve_refs: sextant.default_options().resolve_refs && !args.no_resolve_refs,
    };

    if args.check {
        return check(&mut sextant, &options);
    }
    if !options.resolve_refs {
        println!("{}", "Reference resolution disabled".yellow());
    }

    if args.watch {
        return watch(&mut sextant, &options);
    }

    println!("{} {}...", "Indexing".cyan().bold(), sextant.root().display());
    let outcome = sextant.index(&options)?;
    println!();
    print_outcome(&outcome);
    Ok(ExitCode::SUCCESS)
}

fn check(sextant: &mut Sextant, options: &IndexOptions) -> Result<ExitCode, sextant::Error> {
    let changes = sextant.check(options)?;

    if !changes.is_stale() {
        println!(
            "{} {} files, index is up to date",
            "Fresh".green().bold(),
            changes.files_in_scope()
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Index is stale".yellow().bold());
    if changes.baseline_missing {
        println!("  {}", "no snapshot has been written yet".dimmed());
    }
    if changes.resolve_refs_changed {
        println!("  {}", "reference resolution setting changed".dimmed());
    }
    print_paths("Added", &changes.added);
    print_paths("Modified", &changes.modified);
    print_paths("Removed", &changes.removed);
    Ok(ExitCode::from(1))
}

fn watch(sextant: &mut Sextant, options: &IndexOptions) -> Result<ExitCode, sextant::Error> {
    cancel_on_signal(sextant.cancel_token())?;

    println!(
        "{} {} (Ctrl-C to stop)",
        "Watching".cyan().bold(),
        sextant.root().display()
    );

    let summary = sextant.watch(options, |outcome| match outcome {
        Ok(outcome) => {
            println!();
            print_outcome(outcome);
        }
        Err(sextant::Error::Cancelled) => {}
        Err(e) => {
            eprintln!(
                "{}: {e} {}",
                "error".red().bold(),
                "(previous snapshot still live)".dimmed()
            );
        }
    })?;

    println!();
    println!(
        "{} after {} runs ({} snapshots, {} failed)",
        "Stopped".cyan().bold(),
        summary.runs,
        summary.snapshots,
        summary.failures
    );
    Ok(ExitCode::SUCCESS)
}

/// Cancel the session on SIGINT or SIGTERM so the index lock is released.
#[cfg(unix)]
fn cancel_on_signal(token: CancelToken) -> Result<(), sextant::Error> {
    use signal_hook::consts::signal;
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([signal::SIGTERM, signal::SIGINT])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            token.cancel();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
#[allow(clippy::unnecessary_wraps, clippy::needless_pass_by_value)]
fn cancel_on_signal(_token: CancelToken) -> Result<(), sextant::Error> {
    Ok(())
}
