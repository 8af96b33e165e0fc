//! Sextant CLI - index and query a Python codebase from the command line.
//!
//! Sextant indexes Python files with tree-sitter into generational snapshots
//! and answers search, call-graph, inheritance, and raw SQL queries against
//! them.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod cli;

/// Sextant: incremental Python codebase indexer.
#[derive(Parser)]
#[command(name = "sextant")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index directory and a default config.yaml
    Init,

    /// Index Python files in the project
    Index {
        /// Re-index even if nothing changed
        #[arg(long)]
        force: bool,

        /// Only report whether the index is stale (exit 1 if it is)
        #[arg(long, conflicts_with = "watch")]
        check: bool,

        /// Skip reference resolution and call graph construction
        #[arg(long)]
        no_resolve_refs: bool,

        /// Keep running and re-index when files change
        #[arg(long)]
        watch: bool,

        /// Extra include pattern (repeatable)
        #[arg(short, long = "include", value_name = "PAT")]
        include: Vec<String>,

        /// Extra exclude pattern (repeatable)
        #[arg(short, long = "exclude", value_name = "PAT")]
        exclude: Vec<String>,
    },

    /// Search definitions by name, full name, or docstring
    Search {
        /// Search terms (prefix matching)
        query: String,

        /// Filter by kind (module, class, function, method, variable, parameter)
        #[arg(short, long)]
        kind: Option<String>,

        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Include names starting with an underscore
        #[arg(long)]
        private: bool,
    },

    /// Show what a definition calls, in execution order
    Calls {
        /// Full name of the caller (e.g., "pkg.module.func")
        full_name: String,

        /// Expand resolved callees this many levels deep
        #[arg(short, long, default_value = "1")]
        depth: u32,

        /// Only statement-level calls, not calls nested in arguments
        #[arg(long)]
        top_level: bool,
    },

    /// Show references to a name
    Refs {
        /// Full name, or a simple name for unresolved references
        name: String,
    },

    /// Show a definition's kind, location, signature, docstring, and members
    Show {
        /// Full name, or a simple name
        name: String,

        /// Also list references to it
        #[arg(long)]
        refs: bool,
    },

    /// Print a definition's source code
    Source {
        /// Full name, or a simple name
        name: String,

        /// Lines of context before and after
        #[arg(short = 'n', long, default_value = "0")]
        context: u32,

        /// Print every definition with this name
        #[arg(short, long)]
        all: bool,

        /// Also list the calls it makes
        #[arg(long)]
        calls: bool,

        /// Also list references to it
        #[arg(long)]
        refs: bool,
    },

    /// Show a class's bases, subclasses, or full inheritance tree
    Inheritance {
        /// Full name of the class, or a simple name
        name: String,

        /// List direct subclasses instead of bases
        #[arg(short, long, conflicts_with = "tree")]
        children: bool,

        /// Walk bases and subclasses recursively
        #[arg(short, long)]
        tree: bool,
    },

    /// Export a table as JSON or CSV
    Export {
        /// Table: definitions, files, refs, imports, calls, class_bases, decorators
        #[arg(short, long, default_value = "definitions")]
        table: String,

        /// Output format: json or csv (defaults to the output extension, then json)
        #[arg(short, long)]
        format: Option<String>,

        /// Only definitions of this kind
        #[arg(short, long)]
        kind: Option<String>,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Remove old snapshots, or with --all every snapshot
    Clean {
        /// Remove every snapshot, not just superseded ones
        #[arg(short, long)]
        all: bool,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a read-only SQL query against the index
    Query {
        /// SQL statement
        sql: String,
    },

    /// Show index statistics
    Stats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let workspace = match cli.workspace {
        Some(w) => w,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                eprintln!(
                    "{}: failed to get current directory: {e}",
                    "error".red().bold()
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let result = match cli.command {
        Commands::Init => cli::init::run(&workspace).map(|()| ExitCode::SUCCESS),
        Commands::Index {
            force,
            check,
            no_resolve_refs,
            watch,
            include,
            exclude,
        } => cli::index::run(
            &workspace,
            &cli::index::IndexArgs {
                force,
                check,
                no_resolve_refs,
                watch,
                include,
                exclude,
            },
        ),
        Commands::Search {
            query,
            kind,
            limit,
            private,
        } => cli::search::run(&workspace, &query, kind.as_deref(), limit, private)
            .map(|()| ExitCode::SUCCESS),
        Commands::Calls {
            full_name,
            depth,
            top_level,
        } => cli::calls::run(&workspace, &full_name, depth, top_level).map(|()| ExitCode::SUCCESS),
        Commands::Refs { name } => cli::refs::run(&workspace, &name).map(|()| ExitCode::SUCCESS),
        Commands::Show { name, refs } => {
            cli::show::run(&workspace, &name, refs).map(|()| ExitCode::SUCCESS)
        }
        Commands::Source {
            name,
            context,
            all,
            calls,
            refs,
        } => cli::source::run(
            &workspace,
            &name,
            &cli::source::SourceArgs {
                context,
                all,
                calls,
                refs,
            },
        )
        .map(|()| ExitCode::SUCCESS),
        Commands::Inheritance {
            name,
            children,
            tree,
        } => cli::inheritance::run(&workspace, &name, children, tree).map(|()| ExitCode::SUCCESS),
        Commands::Export {
            table,
            format,
            kind,
            output,
        } => cli::export::run(
            &workspace,
            &cli::export::ExportArgs {
                table,
                format,
                kind,
                output,
            },
        )
        .map(|()| ExitCode::SUCCESS),
        Commands::Clean { all, yes } => {
            cli::clean::run(&workspace, all, yes).map(|()| ExitCode::SUCCESS)
        }
        Commands::Query { sql } => cli::query::run(&workspace, &sql).map(|()| ExitCode::SUCCESS),
        Commands::Stats => cli::stats::run(&workspace).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {e}", "error".red().bold());
            // Show cause chain for nested errors
            let mut source = std::error::Error::source(&e);
            while let Some(cause) = source {
                eprintln!("  {}: {cause}", "caused by".dimmed());
                source = std::error::Error::source(cause);
            }
            ExitCode::FAILURE
        }
    }
}
