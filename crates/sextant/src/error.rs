//! Error types for Sextant operations.
//!
//! Errors are split by how far they reach:
//!
//! - **`Error`**: failures that abort the current operation (snapshot writes,
//!   lock contention, corrupt configuration, contract violations)
//! - **`IndexError`**: per-file failures that are collected while the run continues
//! - **`ProviderError`**: what an [`AnalysisProvider`](crate::AnalysisProvider)
//!   reports for one file, converted into an `IndexError` by the extraction stage
//!
//! ## Error Philosophy
//!
//! A single broken file never prevents indexing the rest. Unresolved
//! references are data, not errors. Anything that fails before the snapshot
//! swap leaves the previous snapshot intact and queryable.
//!
//! ## Error Categorization
//!
//! `IndexErrorKind` uses a 4xx/5xx style categorization:
//! - Input problems (user's fault): syntax errors, non-UTF-8 sources
//! - Internal problems (our fault): I/O errors, provider crashes

use std::path::PathBuf;
use thiserror::Error;

/// Result type for Sextant operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Sextant operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Query database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or JSON export could not be encoded or decoded
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Export could not be written as CSV
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Snapshot table file could not be written or read
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Snapshot table columns could not be assembled
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Invalid configuration, pattern, or argument
    #[error("configuration error: {0}")]
    Config(String),

    /// Snapshot missing or unreadable
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// Another coordinator holds the index directory
    #[error(
        "index is locked by another process: {} (remove it if no indexer is running)",
        .0.display()
    )]
    Locked(PathBuf),

    /// Filesystem watcher failed
    #[error("watch error: {0}")]
    Watch(String),

    /// The run was cancelled between stages
    #[error("indexing cancelled")]
    Cancelled,

    /// Pipeline stages invoked out of order or an invariant was broken
    #[error("internal error: {0}")]
    Internal(String),
}

/// Error encountered while indexing a specific file.
///
/// These errors are collected during indexing but don't halt the operation.
#[derive(Debug, Clone)]
pub struct IndexError {
    /// Project-relative path of the file that failed
    pub path: PathBuf,
    /// Category of the error
    pub kind: IndexErrorKind,
    /// Human-readable error message
    pub message: String,
}

impl std::fmt::Display for IndexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.path.display(),
            self.message,
            self.kind
        )
    }
}

impl std::error::Error for IndexError {}

/// Categorization of indexing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexErrorKind {
    // === Input Problems (analogous to HTTP 4xx) ===
    /// Source file has syntax errors that prevent analysis
    ParseFailed,

    /// File content is not valid UTF-8
    EncodingError,

    // === Internal Problems (analogous to HTTP 5xx) ===
    /// Could not read the file from disk
    IoError,

    /// The analysis provider failed for a reason unrelated to the source
    ProviderFailed,
}

impl std::fmt::Display for IndexErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ParseFailed => write!(f, "parse failed"),
            Self::EncodingError => write!(f, "encoding error"),
            Self::IoError => write!(f, "I/O error"),
            Self::ProviderFailed => write!(f, "provider failed"),
        }
    }
}

impl IndexErrorKind {
    /// Returns `true` if this is an input problem (4xx-style).
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::ParseFailed | Self::EncodingError)
    }

    /// Returns `true` if this is an internal problem (5xx-style).
    #[must_use]
    pub fn is_internal_error(&self) -> bool {
        matches!(self, Self::IoError | Self::ProviderFailed)
    }
}

impl IndexError {
    /// Create a new indexing error.
    #[must_use]
    pub fn new(path: PathBuf, kind: IndexErrorKind, message: impl Into<String>) -> Self {
        Self {
            path,
            kind,
            message: message.into(),
        }
    }

    /// Create a parse error for a file.
    #[must_use]
    pub fn parse_failed(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(path, IndexErrorKind::ParseFailed, message)
    }

    /// Create an encoding error for a file.
    #[must_use]
    pub fn encoding_error(path: PathBuf) -> Self {
        Self::new(path, IndexErrorKind::EncodingError, "file is not valid UTF-8")
    }

    /// Create an I/O error for a file.
    #[must_use]
    pub fn io_error(path: PathBuf, error: &std::io::Error) -> Self {
        Self::new(path, IndexErrorKind::IoError, error.to_string())
    }

    /// Convert a provider failure for `path` into a collected error.
    #[must_use]
    pub fn from_provider(path: PathBuf, error: &ProviderError) -> Self {
        let kind = match error {
            ProviderError::Syntax { .. } => IndexErrorKind::ParseFailed,
            ProviderError::Internal(_) => IndexErrorKind::ProviderFailed,
        };
        Self::new(path, kind, error.to_string())
    }
}

/// Failure reported by an analysis provider for a single file.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The source does not parse
    #[error("syntax error at line {line}, column {column}")]
    Syntax {
        /// 1-based line of the first error node
        line: u32,
        /// 0-based column of the first error node
        column: u32,
    },

    /// The provider itself failed (grammar load, parser timeout)
    #[error("{0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_error_kind_categorization() {
        assert!(IndexErrorKind::ParseFailed.is_input_error());
        assert!(IndexErrorKind::EncodingError.is_input_error());
        assert!(!IndexErrorKind::ParseFailed.is_internal_error());

        assert!(IndexErrorKind::IoError.is_internal_error());
        assert!(IndexErrorKind::ProviderFailed.is_internal_error());
        assert!(!IndexErrorKind::IoError.is_input_error());
    }

    #[test]
    fn index_error_display_includes_path_and_kind() {
        let error = IndexError::parse_failed(PathBuf::from("pkg/mod.py"), "unexpected indent");

        let display = error.to_string();
        assert!(display.contains("pkg/mod.py"));
        assert!(display.contains("unexpected indent"));
        assert!(display.contains("parse failed"));
    }

    #[test]
    fn syntax_errors_map_to_parse_failed() {
        let err = ProviderError::Syntax { line: 3, column: 4 };
        let index_error = IndexError::from_provider(PathBuf::from("a.py"), &err);

        assert_eq!(index_error.kind, IndexErrorKind::ParseFailed);
        assert!(index_error.message.contains("line 3"));
    }

    #[test]
    fn provider_internal_errors_are_internal() {
        let err = ProviderError::Internal("grammar version mismatch".to_string());
        let index_error = IndexError::from_provider(PathBuf::from("a.py"), &err);

        assert!(index_error.kind.is_internal_error());
    }

    #[test]
    fn locked_error_names_the_lock_file() {
        let err = Error::Locked(PathBuf::from(".sextant/lock"));
        assert!(err.to_string().contains(".sextant/lock"));
    }
}
