//! Watch mode: re-index after each quiet burst of file changes.
//!
//! The debouncer thread coalesces raw filesystem events and sends one batch
//! per quiet period into an `mpsc` channel. A single loop drains the channel
//! and runs the coordinator; events that arrive during a run stay queued and
//! are drained together afterwards, producing exactly one follow-up run.
//! Every run keeps the all-or-nothing policy.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use notify_debouncer_mini::notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, new_debouncer};
use tracing::{debug, info, warn};

use crate::coordinator::{CancelToken, IncrementalCoordinator, IndexOptions};
use crate::error::{Error, Result};
use crate::types::RunOutcome;

/// How often the loop wakes to check for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Paths changed during one quiet period, or the watcher's error message.
pub(crate) type ChangeBatch = std::result::Result<Vec<PathBuf>, String>;

/// Totals for a watch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Runs triggered by change events
    pub runs: usize,
    /// Runs that published a snapshot
    pub snapshots: usize,
    /// Runs that failed (the previous snapshot stayed live)
    pub failures: usize,
}

/// Index once, then re-index on every relevant change until `cancel` fires.
///
/// The index lock is held for the whole session.
///
/// # Errors
///
/// Returns `Error::Locked` if another coordinator holds the index,
/// `Error::Watch` if the watcher cannot start or its channel closes, or the
/// error of the initial run.
pub fn watch<F>(
    coordinator: &mut IncrementalCoordinator,
    options: &IndexOptions,
    debounce: Duration,
    mut on_run: F,
) -> Result<WatchSummary>
where
    F: FnMut(&Result<RunOutcome>),
{
    let _lock = coordinator.store().lock()?;

    let (tx, rx) = mpsc::channel::<ChangeBatch>();
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
        let batch = result
            .map(|events| events.into_iter().map(|event| event.path).collect())
            .map_err(|e| e.to_string());
        // The receiver only goes away when the session ends
        let _ = tx.send(batch);
    })
    .map_err(|e| Error::Watch(format!("failed to create watcher: {e}")))?;
    debouncer
        .watcher()
        .watch(coordinator.root(), RecursiveMode::Recursive)
        .map_err(|e| {
            Error::Watch(format!(
                "failed to watch {}: {e}",
                coordinator.root().display()
            ))
        })?;
    info!(
        root = %coordinator.root().display(),
        debounce_ms = u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX),
        "Watching for changes"
    );

    let initial = coordinator.run_locked(options);
    on_run(&initial);
    initial?;

    let cancel = coordinator.cancel_token();
    let scanner = coordinator.scanner().clone();
    coordinator.set_watching(true)?;

    let summary = event_loop(
        &rx,
        &cancel,
        |path| scanner.is_relevant(path),
        || {
            let outcome = coordinator.run_locked(options);
            on_run(&outcome);
            outcome
        },
    );

    coordinator.set_watching(false)?;
    info!(runs = summary.as_ref().map_or(0, |s| s.runs), "Stopped watching");
    summary
}

/// Drain change batches and run once per batch that touches a relevant path.
///
/// Returns when `cancel` fires or a run is cancelled.
///
/// # Errors
///
/// Returns `Error::Watch` if the sending side of the channel disconnects.
pub(crate) fn event_loop<P, R>(
    rx: &Receiver<ChangeBatch>,
    cancel: &CancelToken,
    is_relevant: P,
    mut run: R,
) -> Result<WatchSummary>
where
    P: Fn(&Path) -> bool,
    R: FnMut() -> Result<RunOutcome>,
{
    let mut summary = WatchSummary::default();

    while !cancel.is_cancelled() {
        let first = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(Error::Watch("watcher stopped unexpectedly".to_string()));
            }
        };

        let mut relevant = relevant_paths(first, &is_relevant);
        // Anything queued while the last run was busy belongs to this run
        while let Ok(batch) = rx.try_recv() {
            relevant += relevant_paths(batch, &is_relevant);
        }
        if relevant == 0 {
            continue;
        }

        info!(paths = relevant, "Change detected, re-indexing");
        summary.runs += 1;
        match run() {
            Ok(RunOutcome::Indexed(_)) => summary.snapshots += 1,
            Ok(RunOutcome::Unchanged { .. }) => {}
            Err(Error::Cancelled) => break,
            Err(e) => {
                summary.failures += 1;
                warn!(error = %e, "Re-index failed, previous snapshot still live");
            }
        }
    }

    Ok(summary)
}

fn relevant_paths<P>(batch: ChangeBatch, is_relevant: &P) -> usize
where
    P: Fn(&Path) -> bool,
{
    match batch {
        Ok(paths) => paths
            .iter()
            .filter(|path| {
                let keep = is_relevant(path);
                if !keep {
                    debug!(path = %path.display(), "Ignoring change");
                }
                keep
            })
            .count(),
        Err(e) => {
            warn!(error = %e, "Watcher reported an error");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IndexStats;
    use std::sync::mpsc::Sender;

    fn send(tx: &Sender<ChangeBatch>, paths: &[&str]) {
        tx.send(Ok(paths.iter().map(PathBuf::from).collect()))
            .expect("send");
    }

    fn is_python(path: &Path) -> bool {
        path.extension().is_some_and(|e| e == "py")
    }

    #[test]
    fn queued_batches_coalesce_into_one_run() {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        send(&tx, &["/w/a.py"]);
        send(&tx, &["/w/b.py"]);
        send(&tx, &["/w/c.py"]);

        let stop = cancel.clone();
        let summary = event_loop(&rx, &cancel, is_python, || {
            stop.cancel();
            Ok(RunOutcome::Indexed(IndexStats::default()))
        })
        .expect("loop");

        assert_eq!(summary.runs, 1);
        assert_eq!(summary.snapshots, 1);
    }

    #[test]
    fn events_during_a_run_trigger_exactly_one_follow_up() {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        send(&tx, &["/w/a.py"]);

        let mut calls = 0;
        let stop = cancel.clone();
        let summary = event_loop(&rx, &cancel, is_python, || {
            calls += 1;
            if calls == 1 {
                // Two bursts land while the first run is busy
                send(&tx, &["/w/a.py"]);
                send(&tx, &["/w/b.py"]);
            } else {
                stop.cancel();
            }
            Ok(RunOutcome::Unchanged { files: 2 })
        })
        .expect("loop");

        assert_eq!(summary.runs, 2);
    }

    #[test]
    fn irrelevant_changes_do_not_run() {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        send(&tx, &["/w/.sextant/CURRENT", "/w/readme.md"]);
        drop(tx);

        let err = event_loop(&rx, &cancel, is_python, || {
            panic!("must not run for irrelevant paths")
        })
        .expect_err("channel closes");

        assert!(matches!(err, Error::Watch(_)));
    }

    #[test]
    fn failed_runs_are_counted_and_watching_continues() {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        send(&tx, &["/w/a.py"]);

        let mut calls = 0;
        let stop = cancel.clone();
        let summary = event_loop(&rx, &cancel, is_python, || {
            calls += 1;
            if calls == 1 {
                send(&tx, &["/w/a.py"]);
                Err(Error::Snapshot("disk full".to_string()))
            } else {
                stop.cancel();
                Ok(RunOutcome::Indexed(IndexStats::default()))
            }
        })
        .expect("loop");

        assert_eq!(summary.failures, 1);
        assert_eq!(summary.snapshots, 1);
    }

    #[test]
    fn cancelled_run_ends_the_loop() {
        let (tx, rx) = mpsc::channel();
        let cancel = CancelToken::new();
        send(&tx, &["/w/a.py"]);
        send(&tx, &["/w/b.py"]);

        let summary = event_loop(&rx, &cancel, is_python, || Err(Error::Cancelled)).expect("loop");
        assert_eq!(summary.runs, 1);
        drop(tx);
    }
}
