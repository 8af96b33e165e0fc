//! # Sextant: incremental Python codebase indexer
//!
//! Sextant builds a structured, queryable index of a Python codebase:
//! definitions, references, imports, decorators, base classes, and a call
//! graph that records each call's execution order and argument nesting depth.
//!
//! ## Design Philosophy
//!
//! - **All-or-nothing** - any change re-extracts and re-resolves every file,
//!   so cross-file references never go stale
//! - **Snapshots, not mutation** - each run publishes a complete new generation
//!   with an atomic pointer swap; readers never see a partial index
//! - **Unresolved is data** - references that cannot be resolved keep their
//!   written name with null targets
//! - **Library first, CLI second**
//!
//! ## Quick Start
//!
//! ```no_run
//! use sextant::{SearchOptions, Sextant};
//! use std::path::Path;
//!
//! let mut sextant = Sextant::open(Path::new("/path/to/project"))?;
//!
//! let outcome = sextant.index(&sextant.default_options())?;
//! if let Some(stats) = outcome.stats() {
//!     println!("indexed {} files", stats.files_indexed);
//! }
//!
//! let engine = sextant.query()?;
//! for hit in engine.search("parse config", &SearchOptions::default())? {
//!     println!("{} ({})", hit.definition.full_name, hit.file_path);
//! }
//! # Ok::<(), sextant::Error>(())
//! ```
//!
//! ## Module Structure
//!
//! | Module | Stage |
//! |--------|-------|
//! | `scanner` | enumerate in-scope `.py` files |
//! | `change` | hash files and classify them against the last snapshot |
//! | `provider` | per-file analysis behind the [`AnalysisProvider`] seam |
//! | `extract` | run the provider in parallel and normalize its output |
//! | `resolver` | cross-file resolution and call graph derivation |
//! | `snapshot` | validate, write, publish, and read generations |
//! | `coordinator` | drive one run through the stages |
//! | `watch` | re-run on filesystem changes |
//! | `query` | search, call-tree, and inheritance queries over `query.db` |
//! | `export` | table export as JSON or CSV |

mod change;
mod config;
mod coordinator;
mod error;
mod export;
mod extract;
mod provider;
mod query;
mod resolver;
mod scanner;
mod snapshot;
mod types;
mod watch;

pub use change::{ChangeDetector, ChangeSet, PriorState, content_hash};
pub use config::{CONFIG_FILE_NAME, Config, INDEX_DIR_NAME, WatchConfig};
pub use coordinator::{CancelToken, CoordinatorState, IncrementalCoordinator, IndexOptions};
pub use error::{Error, IndexError, IndexErrorKind, ProviderError, Result};
pub use extract::{ExtractionAdapter, ExtractionSet, search_text, split_identifier};
pub use provider::{
    AnalysisProvider, AnalysisRequest, PythonProvider, RawAnalysis, RawClassBase, RawDecorator,
    RawDefinition, RawImport, RawReference, module_name,
};
pub use export::{ExportFormat, ExportRows, ExportTable};
pub use query::{
    CallTreeEntry, DefinitionHit, InheritanceNode, MAX_INHERITANCE_DEPTH, QueryEngine, RawRows,
    ReferenceHit, SearchOptions,
};
pub use resolver::{
    CallNode, CallRank, ReferenceResolver, ResolutionStats, SymbolIndex, rank_calls,
};
pub use scanner::{FileScanner, PathFilter, ScanReport, ScannedFile, expand_pattern};
pub use snapshot::{
    CleanReport, SCHEMA_VERSION, Snapshot, SnapshotInfo, SnapshotMeta, SnapshotStore, StoreLock,
    Tables,
};
pub use types::{
    Call, CallId, ClassBase, ClassBaseId, Decorator, DecoratorId, Definition, DefinitionId,
    DefinitionKind, Degradation, Facility, FailedFile, FileId, FileRecord, Import, ImportId,
    IndexStats, Position, Reference, ReferenceId, RunOutcome, TableCounts,
};
pub use watch::WatchSummary;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

/// What `Sextant::init` created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    /// The index directory
    pub index_dir: PathBuf,
    /// Path of `config.yaml`
    pub config_file: PathBuf,
    /// Whether `config.yaml` was written (false if it already existed)
    pub config_created: bool,
    /// Whether the index directory was appended to the root `.gitignore`
    pub gitignore_updated: bool,
}

/// Indexer and query interface for one project root.
///
/// Owns the coordinator for the root's index directory. Query methods open
/// the current snapshot on demand and never block on a running index.
#[derive(Debug)]
pub struct Sextant {
    root: PathBuf,
    config: Config,
    coordinator: IncrementalCoordinator,
}

impl Sextant {
    /// Open a project root using its `config.yaml` (or defaults).
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the root does not exist, or `Error::Config` if
    /// the configuration or one of its patterns is invalid.
    pub fn open(root: &Path) -> Result<Self> {
        Self::open_with_patterns(root, &[], &[])
    }

    /// Open a project root, appending extra include and exclude patterns to
    /// the configured ones.
    ///
    /// # Errors
    ///
    /// Same as [`Sextant::open`].
    pub fn open_with_patterns(root: &Path, include: &[String], exclude: &[String]) -> Result<Self> {
        let root = canonical_root(root)?;
        let index_dir = root.join(INDEX_DIR_NAME);

        let mut config = Config::load(&index_dir)?;
        config.merge_patterns(include, exclude);
        let filter = PathFilter::new(&config.include, &config.exclude)?;

        let scanner = FileScanner::new(root.clone(), index_dir.clone(), filter);
        let store = SnapshotStore::new(index_dir);
        let coordinator =
            IncrementalCoordinator::new(root.clone(), scanner, store, Arc::new(PythonProvider::new()));

        debug!(root = %root.display(), "Opened project");
        Ok(Self {
            root,
            config,
            coordinator,
        })
    }

    /// Create the index directory and a default `config.yaml`.
    ///
    /// An existing config file is left alone. When the root has a
    /// `.gitignore` that does not mention the index directory, it is appended.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the root does not exist or a write fails.
    pub fn init(root: &Path) -> Result<InitReport> {
        let root = canonical_root(root)?;
        let index_dir = root.join(INDEX_DIR_NAME);
        std::fs::create_dir_all(&index_dir)?;

        let config_file = Config::path(&index_dir);
        let config_created = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&config_file)
        {
            Ok(mut file) => {
                file.write_all(Config::template().as_bytes())?;
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => false,
            Err(e) => return Err(e.into()),
        };

        let gitignore_updated = ignore_index_dir(&root.join(".gitignore"))?;

        info!(
            index_dir = %index_dir.display(),
            config_created,
            gitignore_updated,
            "Initialized index directory"
        );
        Ok(InitReport {
            index_dir,
            config_file,
            config_created,
            gitignore_updated,
        })
    }

    /// The canonical project root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The index directory.
    #[must_use]
    pub fn index_dir(&self) -> &Path {
        self.coordinator.store().index_dir()
    }

    /// The effective configuration, including command-line patterns.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The snapshot store for this root.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        self.coordinator.store()
    }

    /// Run options taken from the configuration.
    #[must_use]
    pub fn default_options(&self) -> IndexOptions {
        IndexOptions {
            force: false,
            resolve_refs: self.config.resolve_refs,
        }
    }

    /// A handle that cancels runs and watch sessions of this instance.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.coordinator.cancel_token()
    }

    // === Indexing ===

    /// Index the project once.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked` if another process is indexing this root, or
    /// the error of the failing stage; the previous snapshot stays live.
    pub fn index(&mut self, options: &IndexOptions) -> Result<RunOutcome> {
        self.coordinator.run(options)
    }

    /// Report whether a run with `options` would re-index, without writing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if the current snapshot is unreadable.
    pub fn check(&mut self, options: &IndexOptions) -> Result<ChangeSet> {
        self.coordinator.check(options)
    }

    /// Index once, then re-index after each burst of changes until cancelled.
    ///
    /// `on_run` sees the outcome of every run, including the first.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked`, `Error::Watch`, or the error of the initial run.
    pub fn watch<F>(&mut self, options: &IndexOptions, on_run: F) -> Result<WatchSummary>
    where
        F: FnMut(&Result<RunOutcome>),
    {
        let debounce = Duration::from_millis(self.config.watch.debounce_ms);
        watch::watch(&mut self.coordinator, options, debounce, on_run)
    }

    // === Queries ===

    /// Open a query engine over the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if nothing has been indexed yet.
    pub fn query(&self) -> Result<QueryEngine> {
        QueryEngine::open(self.coordinator.store())
    }

    /// Metadata of the current snapshot, or `None` before the first index.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if the snapshot metadata is unreadable.
    pub fn stats(&self) -> Result<Option<SnapshotMeta>> {
        self.coordinator.store().read_meta()
    }

    /// Lines `first..=last` (1-based) of a project file, clamped to its
    /// length, each with its line number.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read.
    pub fn source_lines(&self, path: &str, first: u32, last: u32) -> Result<Vec<(u32, String)>> {
        let content = std::fs::read_to_string(self.root.join(path))?;
        let first = first.max(1);
        Ok(content
            .lines()
            .zip(1u32..)
            .skip_while(|(_, number)| *number < first)
            .take_while(|(_, number)| *number <= last)
            .map(|(line, number)| (number, line.to_string()))
            .collect())
    }

    /// Remove old snapshots; with `all`, remove every snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked` while an indexer is running.
    pub fn clean(&self, all: bool) -> Result<CleanReport> {
        self.coordinator.store().clean(all)
    }

    /// Load every table of the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if a table is missing or malformed.
    pub fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        self.coordinator.store().load()
    }
}

fn canonical_root(root: &Path) -> Result<PathBuf> {
    root.canonicalize().map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("project root not found: {}", root.display()),
        ))
    })
}

/// Append the index directory to an existing `.gitignore`.
fn ignore_index_dir(gitignore: &Path) -> Result<bool> {
    let content = match std::fs::read_to_string(gitignore) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let already = content.lines().any(|line| {
        let line = line.trim().trim_start_matches('/').trim_end_matches('/');
        line == INDEX_DIR_NAME
    });
    if already {
        return Ok(false);
    }

    let mut file = OpenOptions::new().append(true).open(gitignore)?;
    if !content.is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "{INDEX_DIR_NAME}/")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_writes_config_once() {
        let dir = tempfile::tempdir().expect("tempdir");

        let first = Sextant::init(dir.path()).expect("init");
        assert!(first.config_created);
        assert!(first.config_file.exists());
        assert!(!first.gitignore_updated);

        std::fs::write(&first.config_file, "resolve-refs: false\n").expect("edit");
        let second = Sextant::init(dir.path()).expect("init again");
        assert!(!second.config_created);
        let content = std::fs::read_to_string(&second.config_file).expect("read");
        assert_eq!(content, "resolve-refs: false\n");
    }

    #[test]
    fn init_appends_index_dir_to_gitignore_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gitignore = dir.path().join(".gitignore");
        std::fs::write(&gitignore, "target").expect("write");

        assert!(Sextant::init(dir.path()).expect("init").gitignore_updated);
        assert!(!Sextant::init(dir.path()).expect("init").gitignore_updated);

        let content = std::fs::read_to_string(&gitignore).expect("read");
        assert_eq!(content, "target\n.sextant/\n");
    }

    #[test]
    fn config_drives_default_options() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index_dir = dir.path().join(INDEX_DIR_NAME);
        std::fs::create_dir_all(&index_dir).expect("mkdir");
        std::fs::write(Config::path(&index_dir), "resolve-refs: false\n").expect("write");

        let sextant = Sextant::open(dir.path()).expect("open");
        assert!(!sextant.default_options().resolve_refs);
    }

    #[test]
    fn missing_root_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Sextant::open(&dir.path().join("nope")).expect_err("missing");
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Sextant::open_with_patterns(dir.path(), &["[".to_string()], &[])
            .expect_err("bad glob");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn query_before_index_reports_missing_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sextant = Sextant::open(dir.path()).expect("open");
        assert!(matches!(sextant.query(), Err(Error::Snapshot(_))));
        assert!(sextant.stats().expect("stats").is_none());
    }

    #[test]
    fn source_lines_are_clamped_to_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("m.py"), "a = 1\nb = 2\nc = 3\n").expect("write");
        let sextant = Sextant::open(dir.path()).expect("open");

        let lines = sextant.source_lines("m.py", 0, 2).expect("read");
        assert_eq!(lines, vec![(1, "a = 1".to_string()), (2, "b = 2".to_string())]);
        let tail = sextant.source_lines("m.py", 3, 40).expect("read");
        assert_eq!(tail, vec![(3, "c = 3".to_string())]);
    }
}
