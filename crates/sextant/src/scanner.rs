//! Enumerates the Python files that are in scope for indexing.
//!
//! Include and exclude rules accept full globs or shorthands (see
//! [`expand_pattern`]). Excludes win; when no include pattern is given every
//! remaining `.py` file is in scope. A fixed set of tool and virtualenv
//! directories is always pruned, as is the index directory itself.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::normalize_path;

/// Directory names that are never descended into.
const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "__pycache__",
    ".git",
    ".venv",
    "venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "node_modules",
    "build",
    "dist",
];

/// Directory name suffixes that are never descended into.
const DEFAULT_EXCLUDED_DIR_SUFFIXES: &[&str] = &[".egg-info"];

const PYTHON_EXTENSION: &str = "py";

/// Expand a configured pattern into a glob.
///
/// Patterns containing `/` are paths:
/// - `src/` → `src/**`
/// - `pkg/mod.py` → `**/pkg/mod.py`
/// - `src/*.py` → unchanged
/// - `src/pkg` → `src/pkg/**`
///
/// Patterns without `/` are shorthands:
/// - `test_*` → `**/test_*.py`
/// - `test_` → `**/test_*.py` (filename prefix)
/// - `_test` → `**/*_test.py` (filename suffix)
/// - `tests` → `**/tests/**` (directory anywhere)
#[must_use]
pub fn expand_pattern(pattern: &str) -> String {
    let pattern = pattern.trim();

    if pattern.contains('/') {
        if pattern.ends_with('/') {
            return format!("{pattern}**");
        }
        if pattern.ends_with(".py") {
            if pattern.starts_with("**/") || pattern.starts_with('/') {
                return pattern.to_string();
            }
            return format!("**/{pattern}");
        }
        if pattern.contains('*') {
            return pattern.to_string();
        }
        return format!("{pattern}/**");
    }

    if pattern.contains('*') {
        if pattern.ends_with(".py") {
            return format!("**/{pattern}");
        }
        return format!("**/{pattern}.py");
    }
    if pattern.ends_with('_') {
        return format!("**/{pattern}*.py");
    }
    if pattern.starts_with('_') {
        return format!("**/*{pattern}.py");
    }
    format!("**/{pattern}/**")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let expanded = expand_pattern(pattern);
        let glob = GlobBuilder::new(&expanded)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::Config(format!("invalid pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("invalid pattern set: {e}")))
}

/// Include/exclude rules for project-relative paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
}

impl PathFilter {
    /// Compile include and exclude patterns.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any pattern is not a valid glob.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = if include.is_empty() {
            None
        } else {
            Some(build_globset(include)?)
        };
        Ok(Self {
            include,
            exclude: build_globset(exclude)?,
        })
    }

    /// A filter with no user patterns.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: GlobSet::empty(),
        }
    }

    /// Whether a project-relative path is in scope.
    ///
    /// Only `.py` files outside the default-excluded directories qualify.
    #[must_use]
    pub fn matches(&self, relative: &Path) -> bool {
        if relative.extension().and_then(|e| e.to_str()) != Some(PYTHON_EXTENSION) {
            return false;
        }
        if relative
            .parent()
            .is_some_and(|dir| dir.iter().any(|c| is_default_excluded(&c.to_string_lossy())))
        {
            return false;
        }
        if self.exclude.is_match(relative) {
            return false;
        }
        self.include
            .as_ref()
            .is_none_or(|include| include.is_match(relative))
    }
}

fn is_default_excluded(dir_name: &str) -> bool {
    DEFAULT_EXCLUDED_DIRS.contains(&dir_name)
        || DEFAULT_EXCLUDED_DIR_SUFFIXES
            .iter()
            .any(|suffix| dir_name.ends_with(suffix))
}

/// A source file found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Project-relative, `/`-separated path
    pub path: String,
    /// Absolute path on disk
    pub abs_path: PathBuf,
}

/// Result of scanning the workspace.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// In-scope files, sorted by path
    pub files: Vec<ScannedFile>,
    /// Directories that could not be read
    pub skipped_dirs: Vec<PathBuf>,
}

/// Walks a workspace root and collects in-scope Python files.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    index_dir: PathBuf,
    filter: PathFilter,
}

impl FileScanner {
    /// Create a scanner. `index_dir` is always skipped.
    #[must_use]
    pub fn new(root: PathBuf, index_dir: PathBuf, filter: PathFilter) -> Self {
        Self {
            root,
            index_dir,
            filter,
        }
    }

    /// The rules this scanner applies.
    #[must_use]
    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    /// Project-relative form of an absolute path under the root.
    #[must_use]
    pub fn relative_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    /// Whether an absolute path (e.g. from a change event) is in scope.
    #[must_use]
    pub fn is_relevant(&self, path: &Path) -> bool {
        if path.starts_with(&self.index_dir) {
            return false;
        }
        self.relative_path(path)
            .is_some_and(|relative| self.filter.matches(&relative))
    }

    /// Walk the root and return every in-scope file.
    ///
    /// Unreadable directories are logged and skipped.
    #[must_use]
    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                if entry.path() == self.index_dir {
                    return false;
                }
                !is_default_excluded(&entry.file_name().to_string_lossy())
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                    report.skipped_dirs.push(path);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = self.relative_path(entry.path()) else {
                continue;
            };
            if self.filter.matches(&relative) {
                report.files.push(ScannedFile {
                    path: normalize_path(&relative),
                    abs_path: entry.into_path(),
                });
            }
        }

        report.files.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(
            files = report.files.len(),
            skipped_dirs = report.skipped_dirs.len(),
            "Scan complete"
        );
        report
    }
}
