//! Drives one indexing run from scan to snapshot swap.
//!
//! ## Design
//!
//! Any change re-extracts and re-resolves every file in scope. A run either
//! publishes a complete new snapshot or leaves the previous one untouched;
//! there is no per-file patching.
//!
//! ```text
//! Idle ─→ Scanning ─┬─→ Unchanged ──────────────────────────┬─→ Idle | Watching
//!                   └─→ Extracting ─→ Resolving ─→ Writing ─┘
//! ```
//!
//! `Watching` is the resting state between runs in watch mode. Transitions
//! outside this graph are contract violations (`Error::Internal`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::change::{ChangeDetector, ChangeSet, hash_files};
use crate::error::{Error, Result};
use crate::extract::ExtractionAdapter;
use crate::provider::AnalysisProvider;
use crate::resolver::{ReferenceResolver, SymbolIndex};
use crate::scanner::{FileScanner, ScannedFile};
use crate::snapshot::{SnapshotInfo, SnapshotStore, assemble};
use crate::types::{IndexStats, RunOutcome};

/// Cooperative cancellation, checked between pipeline stages.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create an uncancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Treat every file as modified
    pub force: bool,
    /// Resolve references and build the call graph
    pub resolve_refs: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            force: false,
            resolve_refs: true,
        }
    }
}

/// Where the coordinator is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    /// No run in progress
    Idle,
    /// Enumerating and hashing files
    Scanning,
    /// Nothing changed; no writes will happen
    Unchanged,
    /// Running the provider over every file in scope
    Extracting,
    /// Assigning ids and resolving references
    Resolving,
    /// Validating and publishing the snapshot
    Writing,
    /// Waiting for change events between runs
    Watching,
}

impl CoordinatorState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Unchanged => "unchanged",
            Self::Extracting => "extracting",
            Self::Resolving => "resolving",
            Self::Writing => "writing",
            Self::Watching => "watching",
        }
    }

    fn can_transition_to(self, next: Self) -> bool {
        use CoordinatorState::{Extracting, Idle, Resolving, Scanning, Unchanged, Watching, Writing};
        matches!(
            (self, next),
            (Idle | Watching, Scanning)
                | (Idle, Watching)
                | (Watching, Idle)
                | (Scanning, Unchanged | Extracting)
                | (Extracting, Resolving)
                | (Resolving, Writing)
                | (Unchanged | Writing, Idle | Watching)
        )
    }
}

impl std::fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the scan → classify → extract → resolve → write pipeline.
pub struct IncrementalCoordinator {
    root: PathBuf,
    scanner: FileScanner,
    store: SnapshotStore,
    provider: Arc<dyn AnalysisProvider>,
    state: CoordinatorState,
    resting: CoordinatorState,
    cancel: CancelToken,
}

impl std::fmt::Debug for IncrementalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncrementalCoordinator")
            .field("root", &self.root)
            .field("index_dir", &self.store.index_dir())
            .field("provider", &self.provider.name())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl IncrementalCoordinator {
    /// Create a coordinator for `root`, storing snapshots through `store`.
    #[must_use]
    pub fn new(
        root: PathBuf,
        scanner: FileScanner,
        store: SnapshotStore,
        provider: Arc<dyn AnalysisProvider>,
    ) -> Self {
        Self {
            root,
            scanner,
            store,
            provider,
            state: CoordinatorState::Idle,
            resting: CoordinatorState::Idle,
            cancel: CancelToken::new(),
        }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The scanner deciding which files are in scope.
    #[must_use]
    pub fn scanner(&self) -> &FileScanner {
        &self.scanner
    }

    /// The snapshot store.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// A handle that cancels this coordinator's runs.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Move to `next`, rejecting transitions outside the state graph.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` for an illegal transition.
    pub fn transition(&mut self, next: CoordinatorState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::Internal(format!(
                "illegal coordinator transition {} -> {next}",
                self.state
            )));
        }
        debug!(from = %self.state, to = %next, "Coordinator transition");
        self.state = next;
        Ok(())
    }

    /// Enter or leave watch mode; runs then rest in `Watching` instead of `Idle`.
    pub(crate) fn set_watching(&mut self, watching: bool) -> Result<()> {
        let next = if watching {
            CoordinatorState::Watching
        } else {
            CoordinatorState::Idle
        };
        self.transition(next)?;
        self.resting = next;
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("Indexing cancelled, previous snapshot left in place");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Report what changed since the current snapshot without writing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Snapshot` if the current snapshot is unreadable.
    pub fn check(&mut self, options: &IndexOptions) -> Result<ChangeSet> {
        self.transition(CoordinatorState::Scanning)?;
        let result = self.scan_and_classify(options).map(|(changes, _)| changes);
        self.state = self.resting;
        result
    }

    fn scan_and_classify(&self, options: &IndexOptions) -> Result<(ChangeSet, Vec<ScannedFile>)> {
        let report = self.scanner.scan();
        let (hashed, unreadable) = hash_files(&report.files);
        let prior = self.store.prior_state()?;
        let changes = ChangeDetector::new(options.force, options.resolve_refs).classify(
            &hashed,
            unreadable,
            prior.as_ref(),
        );

        let readable: std::collections::HashSet<&str> =
            hashed.iter().map(|f| f.path.as_str()).collect();
        let in_scope = report
            .files
            .iter()
            .filter(|f| readable.contains(f.path.as_str()))
            .cloned()
            .collect();
        Ok((changes, in_scope))
    }

    /// Take the index lock and run the pipeline once.
    ///
    /// # Errors
    ///
    /// Returns `Error::Locked` if another coordinator holds the index,
    /// `Error::Cancelled` if cancelled between stages, or the error of the
    /// failing stage. In every error case the previous snapshot is intact.
    pub fn run(&mut self, options: &IndexOptions) -> Result<RunOutcome> {
        let _lock = self.store.lock()?;
        self.run_locked(options)
    }

    /// Run the pipeline once; the caller holds the index lock.
    pub(crate) fn run_locked(&mut self, options: &IndexOptions) -> Result<RunOutcome> {
        let result = self.pipeline(options);
        if result.is_err() && self.state != self.resting {
            debug!(from = %self.state, to = %self.resting, "Run aborted");
            self.state = self.resting;
        }
        result
    }

    fn pipeline(&mut self, options: &IndexOptions) -> Result<RunOutcome> {
        let start = Instant::now();

        self.transition(CoordinatorState::Scanning)?;
        let (changes, in_scope) = self.scan_and_classify(options)?;
        self.check_cancelled()?;

        if !changes.is_stale() {
            self.transition(CoordinatorState::Unchanged)?;
            info!(files = changes.files_in_scope(), "Index is up to date");
            self.transition(self.resting)?;
            return Ok(RunOutcome::Unchanged {
                files: changes.files_in_scope(),
            });
        }

        self.transition(CoordinatorState::Extracting)?;
        info!(
            files = in_scope.len(),
            added = changes.added.len(),
            modified = changes.modified.len(),
            removed = changes.removed.len(),
            "Re-indexing workspace"
        );
        let adapter = ExtractionAdapter::new(Arc::clone(&self.provider), options.resolve_refs);
        let set = adapter.extract_all(&in_scope);
        self.check_cancelled()?;

        self.transition(CoordinatorState::Resolving)?;
        let created_at = Utc::now();
        let mut assembled = assemble(set, created_at);
        let index = SymbolIndex::build(&assembled);
        let resolution = ReferenceResolver::new(&index).resolve(&mut assembled, options.resolve_refs);
        self.check_cancelled()?;

        for degradation in &assembled.degradations {
            warn!(path = %degradation.path, facility = %degradation.facility, "Reduced analysis fidelity");
        }

        self.transition(CoordinatorState::Writing)?;
        let meta = self.store.write(
            &assembled.tables,
            SnapshotInfo {
                created_at,
                provider: assembled.provider.clone(),
                resolve_refs: options.resolve_refs,
                failed_files: assembled.failed_files.clone(),
                degradations: assembled.degradations.clone(),
            },
        )?;

        let mut errors = changes.unreadable;
        errors.extend(assembled.errors);
        let stats = IndexStats {
            files_indexed: meta.counts.files,
            files_failed: assembled.failed_files.len(),
            files_removed: changes.removed.len(),
            files_unchanged: changes.unchanged.len(),
            counts: meta.counts,
            unresolved_references: resolution.unresolved,
            errors,
            degradations: assembled.degradations,
            generation: meta.generation,
            duration: start.elapsed(),
        };

        self.transition(self.resting)?;
        info!(
            generation = stats.generation,
            files = stats.files_indexed,
            failed = stats.files_failed,
            unresolved = stats.unresolved_references,
            duration_ms = u64::try_from(stats.duration.as_millis()).unwrap_or(u64::MAX),
            "Indexing complete"
        );
        Ok(RunOutcome::Indexed(stats))
    }
}
