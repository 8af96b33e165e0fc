//! Project configuration stored in `<index_dir>/config.yaml`.
//!
//! A missing file means defaults. Command-line patterns are appended to the
//! file's lists with [`Config::merge_patterns`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the directory holding config and snapshots, relative to the root.
pub const INDEX_DIR_NAME: &str = ".sextant";

/// Name of the configuration file inside the index directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Project configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Include patterns; empty means every Python file
    pub include: Vec<String>,
    /// Exclude patterns, checked before includes
    pub exclude: Vec<String>,
    /// Resolve references and build the call graph
    pub resolve_refs: bool,
    /// Watch mode settings
    pub watch: WatchConfig,
}

/// Settings for `index --watch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WatchConfig {
    /// Quiet period that ends a burst of change events
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            resolve_refs: true,
            watch: WatchConfig::default(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl Config {
    /// Load the configuration from `index_dir`, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file exists but is not valid YAML for
    /// this schema, or `Error::Io` if it cannot be read.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let path = Self::path(index_dir);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let config: Self = serde_yaml::from_str(&content).map_err(|e| {
                    Error::Config(format!("invalid {}: {e}", path.display()))
                })?;
                debug!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Location of the configuration file for an index directory.
    #[must_use]
    pub fn path(index_dir: &Path) -> PathBuf {
        index_dir.join(CONFIG_FILE_NAME)
    }

    /// Append command-line patterns to the configured ones.
    pub fn merge_patterns(&mut self, include: &[String], exclude: &[String]) {
        self.include.extend(include.iter().cloned());
        self.exclude.extend(exclude.iter().cloned());
    }

    /// Render the default file written by `sextant init`.
    #[must_use]
    pub fn template() -> String {
        format!(
            "# Sextant configuration\n\
             #\n\
             # Patterns are globs or shorthands:\n\
             #   tests      any directory named `tests`\n\
             #   test_      files starting with `test_`\n\
             #   _test      files ending with `_test.py`\n\
             include: []\n\
             exclude: []\n\
             resolve-refs: true\n\
             watch:\n  debounce-ms: {DEFAULT_DEBOUNCE_MS}\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config, Config::default());
        assert!(config.resolve_refs);
    }

    #[test]
    fn template_parses_to_defaults() {
        let parsed: Config = serde_yaml::from_str(&Config::template()).expect("parse template");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            Config::path(dir.path()),
            "exclude:\n  - migrations\nresolve-refs: false\n",
        )
        .expect("write");

        let config = Config::load(dir.path()).expect("load");
        assert_eq!(config.exclude, vec!["migrations".to_string()]);
        assert!(!config.resolve_refs);
        assert_eq!(config.watch.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn malformed_yaml_is_config_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(Config::path(dir.path()), "include: [unterminated\n").expect("write");

        let err = Config::load(dir.path()).expect_err("should fail");
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn merge_appends_cli_patterns() {
        let mut config = Config {
            include: vec!["src".to_string()],
            ..Config::default()
        };
        config.merge_patterns(&["lib".to_string()], &["test_".to_string()]);
        assert_eq!(config.include, vec!["src", "lib"]);
        assert_eq!(config.exclude, vec!["test_"]);
    }
}
