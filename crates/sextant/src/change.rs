//! Content hashing and change classification.
//!
//! The content hash (SHA-256) is the only authoritative signal; size and
//! modification time are carried along for display. Classification is a pure
//! function of the current hashes and the prior snapshot's records, so the
//! staleness check never writes anything.
//!
//! A snapshot built with a different resolution setting is stale even when
//! every hash matches: its reference targets and call rows do not describe
//! what the requested run would produce.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::IndexError;
use crate::scanner::ScannedFile;
use crate::types::{FailedFile, FileRecord};

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Modification time of a file, falling back to the epoch when unavailable.
#[must_use]
pub fn modified_at(metadata: &std::fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map_or_else(|_| DateTime::<Utc>::from(UNIX_EPOCH), DateTime::<Utc>::from)
}

/// A scanned file with its current content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedFile {
    /// Project-relative path
    pub path: String,
    /// Absolute path on disk
    pub abs_path: PathBuf,
    /// Hex SHA-256 of the content
    pub hash: String,
}

/// Hash one file from disk.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn hash_file(file: &ScannedFile) -> std::io::Result<HashedFile> {
    let bytes = std::fs::read(&file.abs_path)?;
    Ok(HashedFile {
        path: file.path.clone(),
        abs_path: file.abs_path.clone(),
        hash: content_hash(&bytes),
    })
}

/// Hash every scanned file in parallel, separating unreadable ones.
#[must_use]
pub fn hash_files(files: &[ScannedFile]) -> (Vec<HashedFile>, Vec<(String, IndexError)>) {
    let results: Vec<_> = files
        .par_iter()
        .map(|file| {
            hash_file(file).map_err(|e| {
                (
                    file.path.clone(),
                    IndexError::io_error(PathBuf::from(&file.path), &e),
                )
            })
        })
        .collect();

    let mut hashed = Vec::with_capacity(results.len());
    let mut unreadable = Vec::new();
    for result in results {
        match result {
            Ok(file) => hashed.push(file),
            Err((path, error)) => {
                warn!(path = %path, error = %error.message, "Cannot read file, excluding it from this run");
                unreadable.push((path, error));
            }
        }
    }
    (hashed, unreadable)
}

/// What the previous snapshot knew about file contents.
#[derive(Debug, Clone, Default)]
pub struct PriorState {
    hashes: HashMap<String, String>,
    resolve_refs: bool,
}

impl PriorState {
    /// Build from a snapshot's file rows, the files that failed analysis, and
    /// whether that snapshot resolved references.
    #[must_use]
    pub fn new(files: &[FileRecord], failed: &[FailedFile], resolve_refs: bool) -> Self {
        let hashes = files
            .iter()
            .map(|f| (f.path.clone(), f.hash.clone()))
            .chain(failed.iter().map(|f| (f.path.clone(), f.hash.clone())))
            .collect();
        Self {
            hashes,
            resolve_refs,
        }
    }

    /// Whether the snapshot was built with reference resolution.
    #[must_use]
    pub fn resolve_refs(&self) -> bool {
        self.resolve_refs
    }

    /// Number of known files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Whether no files are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    fn hash_of(&self, path: &str) -> Option<&str> {
        self.hashes.get(path).map(String::as_str)
    }
}

/// Partition of the current file set against the prior snapshot.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Same hash as before
    pub unchanged: Vec<String>,
    /// Hash differs (or force was requested)
    pub modified: Vec<String>,
    /// Not in the prior snapshot
    pub added: Vec<String>,
    /// In the prior snapshot but gone, out of scope, or unreadable
    pub removed: Vec<String>,
    /// Files that could not be read this run
    pub unreadable: Vec<IndexError>,
    /// No prior snapshot exists
    pub baseline_missing: bool,
    /// Force was requested
    pub forced: bool,
    /// The prior snapshot used a different resolution setting
    pub resolve_refs_changed: bool,
}

impl ChangeSet {
    /// Whether a re-index is needed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.forced
            || self.baseline_missing
            || self.resolve_refs_changed
            || !self.modified.is_empty()
            || !self.added.is_empty()
            || !self.removed.is_empty()
    }

    /// Number of readable files in scope.
    #[must_use]
    pub fn files_in_scope(&self) -> usize {
        self.unchanged.len() + self.modified.len() + self.added.len()
    }
}

/// Classifies the current file set against the prior snapshot.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    force: bool,
    resolve_refs: bool,
}

impl ChangeDetector {
    /// Create a detector; `force` marks every readable file modified, and
    /// `resolve_refs` is the setting the next snapshot will be built with.
    #[must_use]
    pub fn new(force: bool, resolve_refs: bool) -> Self {
        Self {
            force,
            resolve_refs,
        }
    }

    /// Partition `current` against `prior` (`None` when no snapshot exists).
    ///
    /// Unreadable files the prior snapshot knew about are classified as
    /// removed for this run; unreadable files it did not know are only
    /// reported.
    #[must_use]
    pub fn classify(
        &self,
        current: &[HashedFile],
        unreadable: Vec<(String, IndexError)>,
        prior: Option<&PriorState>,
    ) -> ChangeSet {
        let empty = PriorState::default();
        let baseline = prior.unwrap_or(&empty);
        let mut changes = ChangeSet {
            baseline_missing: prior.is_none(),
            forced: self.force,
            resolve_refs_changed: prior.is_some_and(|p| p.resolve_refs != self.resolve_refs),
            ..ChangeSet::default()
        };

        let mut seen = std::collections::HashSet::with_capacity(current.len());
        for file in current {
            seen.insert(file.path.as_str());
            match baseline.hash_of(&file.path) {
                None if self.force => changes.modified.push(file.path.clone()),
                None => changes.added.push(file.path.clone()),
                Some(old) if self.force || old != file.hash => {
                    changes.modified.push(file.path.clone());
                }
                Some(_) => changes.unchanged.push(file.path.clone()),
            }
        }

        let mut removed: Vec<String> = baseline
            .hashes
            .keys()
            .filter(|path| !seen.contains(path.as_str()))
            .cloned()
            .collect();
        removed.sort();
        changes.removed = removed;

        changes.unreadable = unreadable.into_iter().map(|(_, error)| error).collect();

        debug!(
            unchanged = changes.unchanged.len(),
            modified = changes.modified.len(),
            added = changes.added.len(),
            removed = changes.removed.len(),
            unreadable = changes.unreadable.len(),
            baseline_missing = changes.baseline_missing,
            forced = changes.forced,
            resolve_refs_changed = changes.resolve_refs_changed,
            "Classified workspace changes"
        );
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hashed(path: &str, content: &str) -> HashedFile {
        HashedFile {
            path: path.to_string(),
            abs_path: PathBuf::from("/work").join(path),
            hash: content_hash(content.as_bytes()),
        }
    }

    fn record(path: &str, content: &str) -> FileRecord {
        let at = Utc.timestamp_opt(0, 0).single().expect("epoch");
        FileRecord {
            id: 1.into(),
            path: path.to_string(),
            hash: content_hash(content.as_bytes()),
            size: content.len() as u64,
            modified_at: at,
            indexed_at: at,
        }
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn identical_content_is_not_stale() {
        let prior = PriorState::new(&[record("a.py", "x = 1")], &[], true);
        let changes =
            ChangeDetector::new(false, true).classify(&[hashed("a.py", "x = 1")], Vec::new(), Some(&prior));

        assert!(!changes.is_stale());
        assert_eq!(changes.unchanged, vec!["a.py"]);
    }

    #[test]
    fn partitions_modified_added_removed() {
        let prior = PriorState::new(&[record("a.py", "x = 1"), record("gone.py", "y = 2")], &[], true);
        let current = [hashed("a.py", "x = 2"), hashed("new.py", "z = 3")];

        let changes = ChangeDetector::new(false, true).classify(&current, Vec::new(), Some(&prior));

        assert!(changes.is_stale());
        assert_eq!(changes.modified, vec!["a.py"]);
        assert_eq!(changes.added, vec!["new.py"]);
        assert_eq!(changes.removed, vec!["gone.py"]);
    }

    #[test]
    fn force_marks_everything_modified() {
        let prior = PriorState::new(&[record("a.py", "x = 1")], &[], true);
        let current = [hashed("a.py", "x = 1"), hashed("b.py", "y = 1")];

        let changes = ChangeDetector::new(true, true).classify(&current, Vec::new(), Some(&prior));

        assert!(changes.is_stale());
        assert_eq!(changes.modified, vec!["a.py", "b.py"]);
        assert!(changes.unchanged.is_empty());
    }

    #[test]
    fn missing_baseline_is_stale_even_when_empty() {
        let changes = ChangeDetector::new(false, true).classify(&[], Vec::new(), None);
        assert!(changes.baseline_missing);
        assert!(changes.is_stale());
    }

    #[test]
    fn unreadable_known_file_counts_as_removed() {
        let prior = PriorState::new(&[record("a.py", "x = 1")], &[], true);
        let error = IndexError::io_error(
            PathBuf::from("a.py"),
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        let changes = ChangeDetector::new(false, true).classify(
            &[],
            vec![("a.py".to_string(), error)],
            Some(&prior),
        );

        assert_eq!(changes.removed, vec!["a.py"]);
        assert_eq!(changes.unreadable.len(), 1);
    }

    #[test]
    fn unreadable_unknown_file_is_only_reported() {
        let prior = PriorState::new(&[], &[], true);
        let error = IndexError::io_error(
            PathBuf::from("new.py"),
            &std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        let changes = ChangeDetector::new(false, true).classify(
            &[],
            vec![("new.py".to_string(), error)],
            Some(&prior),
        );

        assert!(!changes.is_stale());
        assert_eq!(changes.unreadable.len(), 1);
    }

    #[test]
    fn previously_failed_file_with_same_hash_is_unchanged() {
        let failed = FailedFile {
            path: "broken.py".to_string(),
            hash: content_hash(b"def (:"),
            message: "syntax error".to_string(),
        };
        let prior = PriorState::new(&[], &[failed], true);

        let changes = ChangeDetector::new(false, true).classify(
            &[hashed("broken.py", "def (:")],
            Vec::new(),
            Some(&prior),
        );

        assert!(!changes.is_stale());
    }

    #[test]
    fn switching_resolution_setting_is_stale() {
        let prior = PriorState::new(&[record("a.py", "x = 1")], &[], true);
        let current = [hashed("a.py", "x = 1")];

        let same = ChangeDetector::new(false, true).classify(&current, Vec::new(), Some(&prior));
        let switched =
            ChangeDetector::new(false, false).classify(&current, Vec::new(), Some(&prior));

        assert!(!same.is_stale());
        assert!(switched.resolve_refs_changed);
        assert!(switched.is_stale());
        assert_eq!(switched.unchanged, vec!["a.py"]);
    }

    #[test]
    fn hash_files_reports_missing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.py"), "x = 1").expect("write");
        let files = vec![
            ScannedFile {
                path: "a.py".to_string(),
                abs_path: dir.path().join("a.py"),
            },
            ScannedFile {
                path: "vanished.py".to_string(),
                abs_path: dir.path().join("vanished.py"),
            },
        ];

        let (hashed, unreadable) = hash_files(&files);

        assert_eq!(hashed.len(), 1);
        assert_eq!(unreadable.len(), 1);
        assert_eq!(unreadable[0].0, "vanished.py");
    }
}
