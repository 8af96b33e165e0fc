//! Per-file extraction: run the provider and normalize its output.
//!
//! Each file is read, hashed, decoded, and handed to the
//! [`AnalysisProvider`]. The raw facts are then normalized into a
//! [`FileBatch`] whose cross-links are guaranteed valid:
//!
//! - every definition's parent precedes it and is a full-name prefix of it
//! - every reference's enclosing scope is a function or class of this file
//! - every argument-parent link points at an earlier call reference
//! - decorators and bases point at existing definitions
//!
//! Files run in parallel on the rayon pool; each worker produces an isolated
//! batch, so there is no shared mutable state until assembly.
//!
//! ## Failure handling
//!
//! | Failure | Result |
//! |---------|--------|
//! | Read error | `IndexError` (`IoError`), no rows |
//! | Not UTF-8 | `IndexError` (`EncodingError`), recorded as a failed file |
//! | Syntax error | `IndexError` (`ParseFailed`), recorded as a failed file |
//! | Facility missing | `Degradation`, rows for the rest of the file |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, trace, warn};

use crate::change::{content_hash, modified_at};
use crate::error::IndexError;
use crate::provider::{
    AnalysisProvider, AnalysisRequest, RawAnalysis, RawClassBase, RawDecorator, RawImport,
    module_name,
};
use crate::scanner::ScannedFile;
use crate::types::{Degradation, DefinitionKind, Facility, FailedFile, Position, stored_path};

/// Longest context line kept before truncation, in characters.
const MAX_CONTEXT_CHARS: usize = 200;

/// A definition with file-local links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDefinition {
    /// Simple name
    pub name: String,
    /// Dotted, module-qualified name
    pub full_name: String,
    /// Entity kind
    pub kind: DefinitionKind,
    /// Position of the name
    pub start: Position,
    /// End of the definition
    pub end: Option<Position>,
    /// Call signature
    pub signature: Option<String>,
    /// Docstring
    pub docstring: Option<String>,
    /// Index of the parent definition in this batch
    pub parent: Option<usize>,
    /// Name does not start with `_`
    pub is_public: bool,
    /// Tokens indexed for full-text search
    pub search_text: String,
}

/// A reference with file-local links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReference {
    /// Name as written
    pub name: String,
    /// Position of the name
    pub position: Position,
    /// Stripped source line
    pub context: String,
    /// Best-effort target from the provider
    pub target: Option<String>,
    /// Whether this use is an invocation
    pub is_call: bool,
    /// The callee is not a plain name
    pub dynamic_callee: bool,
    /// The callee is a plain name bound nowhere in its file
    pub unbound_name: bool,
    /// Index of the enclosing function or class definition
    pub scope: Option<usize>,
    /// Index of the call whose argument list contains this reference
    pub call_parent: Option<usize>,
}

/// Everything extracted from one file.
#[derive(Debug, Clone)]
pub struct FileBatch {
    /// Project-relative path
    pub path: String,
    /// Dotted module name
    pub module: String,
    /// Hash of the bytes analyzed
    pub hash: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time
    pub modified_at: DateTime<Utc>,
    /// Definitions; index 0 is the module
    pub definitions: Vec<LocalDefinition>,
    /// References in provider order
    pub references: Vec<LocalReference>,
    /// Imports in source order
    pub imports: Vec<RawImport>,
    /// Decorators with valid targets
    pub decorators: Vec<RawDecorator>,
    /// Class bases with valid classes
    pub bases: Vec<RawClassBase>,
}

/// Result of extracting every file in scope.
///
/// Only [`ExtractionAdapter::extract_all`] produces one; downstream stages
/// take it as proof that extraction completed.
#[derive(Debug, Clone)]
pub struct ExtractionSet {
    /// Successful files, sorted by path
    pub batches: Vec<FileBatch>,
    /// Per-file failures
    pub errors: Vec<IndexError>,
    /// Files that failed after being read, with the hash that failed
    pub failed_files: Vec<FailedFile>,
    /// Files analyzed with reduced fidelity
    pub degradations: Vec<Degradation>,
    /// Provider that produced the batches
    pub provider: String,
}

/// A file that produced no batch.
#[derive(Debug, Clone)]
pub struct FileFailure {
    /// What went wrong
    pub error: IndexError,
    /// Content hash, when the file could be read
    pub hash: Option<String>,
}

/// Runs the provider over files and normalizes the results.
#[derive(Clone)]
pub struct ExtractionAdapter {
    provider: Arc<dyn AnalysisProvider>,
    resolve_targets: bool,
}

impl std::fmt::Debug for ExtractionAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionAdapter")
            .field("provider", &self.provider.name())
            .field("resolve_targets", &self.resolve_targets)
            .finish()
    }
}

impl ExtractionAdapter {
    /// Create an adapter. `resolve_targets` is forwarded to the provider.
    #[must_use]
    pub fn new(provider: Arc<dyn AnalysisProvider>, resolve_targets: bool) -> Self {
        Self {
            provider,
            resolve_targets,
        }
    }

    /// Extract every file in parallel.
    #[must_use]
    pub fn extract_all(&self, files: &[ScannedFile]) -> ExtractionSet {
        let results: Vec<_> = files
            .par_iter()
            .map(|file| (file, self.extract_file(file)))
            .collect();

        let mut set = ExtractionSet {
            batches: Vec::with_capacity(results.len()),
            errors: Vec::new(),
            failed_files: Vec::new(),
            degradations: Vec::new(),
            provider: self.provider.name().to_string(),
        };

        for (file, result) in results {
            match result {
                Ok((batch, degradations)) => {
                    set.degradations.extend(degradations);
                    set.batches.push(batch);
                }
                Err(failure) => {
                    warn!(
                        path = %file.path,
                        kind = %failure.error.kind,
                        error = %failure.error.message,
                        "Skipping file"
                    );
                    if let Some(hash) = failure.hash {
                        set.failed_files.push(FailedFile {
                            path: file.path.clone(),
                            hash,
                            message: failure.error.message.clone(),
                        });
                    }
                    set.errors.push(failure.error);
                }
            }
        }

        set.batches.sort_by(|a, b| a.path.cmp(&b.path));
        info!(
            files = set.batches.len(),
            failed = set.errors.len(),
            degraded = set.degradations.len(),
            "Extraction complete"
        );
        set
    }

    /// Extract one file.
    ///
    /// # Errors
    ///
    /// Returns a [`FileFailure`] if the file cannot be read, is not UTF-8, or
    /// the provider rejects it.
    pub fn extract_file(
        &self,
        file: &ScannedFile,
    ) -> Result<(FileBatch, Vec<Degradation>), FileFailure> {
        let path = stored_path(&file.path);
        let io_failure = |e: &std::io::Error| FileFailure {
            error: IndexError::io_error(path.clone(), e),
            hash: None,
        };

        let bytes = std::fs::read(&file.abs_path).map_err(|e| io_failure(&e))?;
        let metadata = std::fs::metadata(&file.abs_path).map_err(|e| io_failure(&e))?;
        let hash = content_hash(&bytes);
        let size = bytes.len() as u64;

        let Ok(mut source) = String::from_utf8(bytes) else {
            return Err(FileFailure {
                error: IndexError::encoding_error(path),
                hash: Some(hash),
            });
        };
        if source.starts_with('\u{feff}') {
            source.drain(..'\u{feff}'.len_utf8());
        }

        let module = module_name(&file.path);
        let request = AnalysisRequest {
            source: &source,
            path: &file.path,
            module: &module,
            resolve_targets: self.resolve_targets,
        };
        let raw = self.provider.analyze(&request).map_err(|e| FileFailure {
            error: IndexError::from_provider(path.clone(), &e),
            hash: Some(hash.clone()),
        })?;

        let (batch, degradations) = normalize(
            raw,
            &source,
            FileInfo {
                path: file.path.clone(),
                module,
                hash,
                size,
                modified_at: modified_at(&metadata),
            },
        );
        debug!(
            path = %batch.path,
            definitions = batch.definitions.len(),
            references = batch.references.len(),
            "Extracted file"
        );
        Ok((batch, degradations))
    }
}

/// File metadata carried into a batch.
struct FileInfo {
    path: String,
    module: String,
    hash: String,
    size: u64,
    modified_at: DateTime<Utc>,
}

fn normalize(raw: RawAnalysis, source: &str, info: FileInfo) -> (FileBatch, Vec<Degradation>) {
    let lines: Vec<&str> = source.lines().collect();
    let definitions = normalize_definitions(&info.path, raw.definitions);
    let references = normalize_references(&definitions, raw.references, &lines);

    let mut degradations = Vec::new();
    let decorators = match raw.decorators {
        Some(decorators) => decorators
            .into_iter()
            .filter(|d| d.target < definitions.len())
            .collect(),
        None => {
            degradations.push(degraded(&info.path, Facility::Decorators));
            Vec::new()
        }
    };
    let bases = match raw.bases {
        Some(bases) => bases
            .into_iter()
            .filter(|b| {
                definitions
                    .get(b.class)
                    .is_some_and(|d| d.kind == DefinitionKind::Class)
            })
            .collect(),
        None => {
            degradations.push(degraded(&info.path, Facility::ClassBases));
            Vec::new()
        }
    };

    let batch = FileBatch {
        path: info.path,
        module: info.module,
        hash: info.hash,
        size: info.size,
        modified_at: info.modified_at,
        definitions,
        references,
        imports: raw.imports,
        decorators,
        bases,
    };
    (batch, degradations)
}

fn degraded(path: &str, facility: Facility) -> Degradation {
    warn!(path = %path, facility = %facility, "Provider facility unavailable, continuing without it");
    Degradation {
        path: path.to_string(),
        facility,
    }
}

fn normalize_definitions(
    path: &str,
    raw: Vec<crate::provider::RawDefinition>,
) -> Vec<LocalDefinition> {
    let mut definitions: Vec<LocalDefinition> = Vec::with_capacity(raw.len());

    for (index, def) in raw.into_iter().enumerate() {
        let parent = match def.parent {
            Some(parent)
                if parent < index && is_child_name(&definitions[parent].full_name, &def.full_name) =>
            {
                Some(parent)
            }
            reported => {
                let derived = derive_parent(&definitions, &def.full_name);
                if reported.is_some() {
                    trace!(
                        path = %path,
                        full_name = %def.full_name,
                        ?reported,
                        ?derived,
                        "Repaired invalid parent link"
                    );
                }
                derived
            }
        };

        definitions.push(LocalDefinition {
            is_public: !def.name.starts_with('_'),
            search_text: search_text(&def.name, &def.full_name, def.docstring.as_deref()),
            name: def.name,
            full_name: def.full_name,
            kind: def.kind,
            start: def.start,
            end: def.end,
            signature: def.signature,
            docstring: def.docstring,
            parent,
        });
    }
    definitions
}

fn is_child_name(parent: &str, child: &str) -> bool {
    child
        .strip_prefix(parent)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Nearest preceding definition whose full name is the child's prefix.
fn derive_parent(definitions: &[LocalDefinition], full_name: &str) -> Option<usize> {
    let (prefix, _) = full_name.rsplit_once('.')?;
    definitions.iter().rposition(|d| d.full_name == prefix)
}

fn normalize_references(
    definitions: &[LocalDefinition],
    raw: Vec<crate::provider::RawReference>,
    lines: &[&str],
) -> Vec<LocalReference> {
    let mut references: Vec<LocalReference> = Vec::with_capacity(raw.len());

    for (index, reference) in raw.into_iter().enumerate() {
        let scope = reference
            .scope
            .filter(|&s| definitions.get(s).is_some_and(|d| owns_calls(d.kind)))
            .or_else(|| enclosing_scope(definitions, reference.position));
        let call_parent = reference
            .call_parent
            .filter(|&p| p < index && references[p].is_call);

        references.push(LocalReference {
            context: context_line(lines, reference.position.line),
            name: reference.name,
            position: reference.position,
            target: reference.target,
            is_call: reference.is_call,
            dynamic_callee: reference.dynamic_callee,
            unbound_name: reference.unbound_name,
            scope,
            call_parent,
        });
    }
    references
}

fn owns_calls(kind: DefinitionKind) -> bool {
    matches!(kind, DefinitionKind::Function | DefinitionKind::Class)
}

/// Innermost function or class whose range contains `position`.
fn enclosing_scope(definitions: &[LocalDefinition], position: Position) -> Option<usize> {
    definitions
        .iter()
        .enumerate()
        .filter(|(_, d)| owns_calls(d.kind))
        .filter(|(_, d)| d.start <= position && d.end.is_some_and(|end| position <= end))
        .max_by_key(|(_, d)| d.start)
        .map(|(index, _)| index)
}

/// The stripped source line at `line`, truncated for storage.
fn context_line(lines: &[&str], line: u32) -> String {
    let text = (line as usize)
        .checked_sub(1)
        .and_then(|i| lines.get(i))
        .map_or("", |l| l.trim());
    if text.chars().count() > MAX_CONTEXT_CHARS {
        let mut truncated: String = text.chars().take(MAX_CONTEXT_CHARS).collect();
        truncated.push_str("...");
        truncated
    } else {
        text.to_string()
    }
}

/// Split an identifier into lowercase words.
///
/// Handles `snake_case`, `kebab-case`, `camelCase`, and acronym runs
/// (`XMLParser` → `xml parser`).
#[must_use]
pub fn split_identifier(identifier: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = identifier.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Text indexed for full-text search of a definition.
#[must_use]
pub fn search_text(name: &str, full_name: &str, docstring: Option<&str>) -> String {
    let split_full: Vec<String> = full_name.split('.').flat_map(split_identifier).collect();
    let mut parts = vec![
        name.to_lowercase(),
        split_identifier(name).join(" "),
        full_name.replace('.', " ").to_lowercase(),
        split_full.join(" "),
    ];
    if let Some(doc) = docstring {
        parts.push(doc.to_lowercase());
    }
    parts.retain(|p| !p.is_empty());
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{IndexErrorKind, ProviderError};
    use crate::provider::{PythonProvider, RawDefinition, RawReference};
    use rstest::rstest;

    struct FixedProvider(RawAnalysis);

    impl AnalysisProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn analyze(&self, _request: &AnalysisRequest<'_>) -> Result<RawAnalysis, ProviderError> {
            Ok(self.0.clone())
        }
    }

    fn raw_def(name: &str, full: &str, kind: DefinitionKind, line: u32, end: u32, parent: Option<usize>) -> RawDefinition {
        RawDefinition {
            name: name.to_string(),
            full_name: full.to_string(),
            kind,
            start: Position::new(line, 0),
            end: Some(Position::new(end, 0)),
            signature: None,
            docstring: None,
            parent,
        }
    }

    fn raw_ref(name: &str, line: u32, scope: Option<usize>, call_parent: Option<usize>) -> RawReference {
        RawReference {
            name: name.to_string(),
            position: Position::new(line, 4),
            target: None,
            is_call: true,
            dynamic_callee: false,
            unbound_name: true,
            scope,
            call_parent,
        }
    }

    fn write_file(dir: &tempfile::TempDir, path: &str, content: &[u8]) -> ScannedFile {
        let abs_path = dir.path().join(path);
        std::fs::write(&abs_path, content).expect("write");
        ScannedFile {
            path: path.to_string(),
            abs_path,
        }
    }

    fn python_adapter() -> ExtractionAdapter {
        ExtractionAdapter::new(Arc::new(PythonProvider::new()), true)
    }

    #[rstest]
    #[case("snake_case_name", &["snake", "case", "name"])]
    #[case("camelCaseName", &["camel", "case", "name"])]
    #[case("XMLParser", &["xml", "parser"])]
    #[case("parse_HTTPResponse", &["parse", "http", "response"])]
    #[case("kebab-case", &["kebab", "case"])]
    #[case("__init__", &["init"])]
    #[case("v2Client", &["v2", "client"])]
    fn splits_identifiers(#[case] input: &str, #[case] expected: &[&str]) {
        assert_eq!(split_identifier(input), expected);
    }

    #[test]
    fn search_text_combines_names_and_docstring() {
        let text = search_text("parseXML", "pkg.io.parseXML", Some("Parse a Document."));
        assert_eq!(
            text,
            "parsexml parse xml pkg io parsexml pkg io parse xml parse a document."
        );
    }

    #[test]
    fn long_context_lines_are_truncated() {
        let long = "x".repeat(250);
        let lines = vec![long.as_str()];
        let context = context_line(&lines, 1);
        assert_eq!(context.chars().count(), MAX_CONTEXT_CHARS + 3);
        assert!(context.ends_with("..."));
        assert_eq!(context_line(&lines, 7), "");
    }

    #[test]
    fn invalid_parent_links_are_repaired_from_full_names() {
        let raw = vec![
            raw_def("m", "m", DefinitionKind::Module, 1, 10, None),
            raw_def("C", "m.C", DefinitionKind::Class, 1, 5, Some(0)),
            raw_def("other", "m.other", DefinitionKind::Function, 6, 7, Some(0)),
            // Parent index points forward: invalid
            raw_def("run", "m.C.run", DefinitionKind::Function, 2, 4, Some(4)),
            // Parent is not a prefix: invalid
            raw_def("x", "m.C.run.x", DefinitionKind::Variable, 3, 3, Some(2)),
        ];

        let parents: Vec<_> = normalize_definitions("m.py", raw)
            .iter()
            .map(|d| d.parent)
            .collect();

        assert_eq!(parents, vec![None, Some(0), Some(0), Some(1), Some(3)]);
    }

    #[test]
    fn missing_reference_scope_falls_back_to_innermost_range() {
        let definitions = normalize_definitions(
            "m.py",
            vec![
                raw_def("m", "m", DefinitionKind::Module, 1, 20, None),
                raw_def("outer", "m.outer", DefinitionKind::Function, 1, 10, Some(0)),
                raw_def("inner", "m.outer.inner", DefinitionKind::Function, 3, 5, Some(1)),
            ],
        );
        let references = normalize_references(
            &definitions,
            vec![
                raw_ref("a", 4, None, None),
                raw_ref("b", 8, Some(7), None),
                raw_ref("c", 15, None, None),
                // Argument parent must be an earlier call
                raw_ref("d", 8, Some(1), Some(5)),
            ],
            &[],
        );

        assert_eq!(references[0].scope, Some(2));
        assert_eq!(references[1].scope, Some(1));
        assert_eq!(references[2].scope, None);
        assert_eq!(references[3].call_parent, None);
    }

    #[test]
    fn missing_facilities_degrade_instead_of_failing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write_file(&dir, "m.py", b"x = 1\n");
        let provider = FixedProvider(RawAnalysis {
            definitions: vec![raw_def("m", "m", DefinitionKind::Module, 1, 1, None)],
            ..RawAnalysis::default()
        });
        let adapter = ExtractionAdapter::new(Arc::new(provider), true);

        let (batch, degradations) = adapter.extract_file(&file).expect("extract");

        assert!(batch.decorators.is_empty());
        assert!(batch.bases.is_empty());
        assert_eq!(
            degradations.iter().map(|d| d.facility).collect::<Vec<_>>(),
            vec![Facility::Decorators, Facility::ClassBases]
        );
    }

    #[test]
    fn extracts_python_file_with_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let content = b"def _helper():\n    return len([])\n";
        let file = write_file(&dir, "m.py", content);

        let (batch, degradations) = python_adapter().extract_file(&file).expect("extract");

        assert!(degradations.is_empty());
        assert_eq!(batch.module, "m");
        assert_eq!(batch.hash, content_hash(content));
        assert_eq!(batch.size, content.len() as u64);
        let helper = &batch.definitions[1];
        assert_eq!(helper.full_name, "m._helper");
        assert!(!helper.is_public);
        let call = batch.references.iter().find(|r| r.is_call).expect("call");
        assert_eq!(call.context, "return len([])");
        assert_eq!(call.scope, Some(1));
    }

    #[test]
    fn non_utf8_file_is_an_encoding_failure_with_hash() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = write_file(&dir, "bad.py", &[0x66, 0xff, 0xfe, 0x0a]);

        let failure = python_adapter().extract_file(&file).expect_err("should fail");

        assert_eq!(failure.error.kind, IndexErrorKind::EncodingError);
        assert!(failure.hash.is_some());
    }

    #[test]
    fn extract_all_collects_failures_and_keeps_going() {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = vec![
            write_file(&dir, "a.py", b"def a():\n    pass\n"),
            write_file(&dir, "broken.py", b"def broken(:\n"),
            write_file(&dir, "c.py", b"C = 1\n"),
        ];

        let set = python_adapter().extract_all(&files);

        let paths: Vec<_> = set.batches.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["a.py", "c.py"]);
        assert_eq!(set.errors.len(), 1);
        assert_eq!(set.errors[0].kind, IndexErrorKind::ParseFailed);
        assert_eq!(set.failed_files.len(), 1);
        assert_eq!(set.failed_files[0].path, "broken.py");
        assert_eq!(set.provider, "tree-sitter-python");
    }
}
