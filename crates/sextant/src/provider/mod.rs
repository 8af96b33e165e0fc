//! The analysis provider seam.
//!
//! A provider turns one file's source into raw facts: definitions with their
//! nesting, references with best-effort targets, imports, and optionally
//! decorators and base classes. Everything downstream (normalization,
//! cross-file resolution, snapshots) depends only on [`AnalysisProvider`], so
//! a different analyzer can be substituted without touching the pipeline.
//!
//! ## Index conventions
//!
//! Raw facts link to each other by index into [`RawAnalysis::definitions`]
//! or [`RawAnalysis::references`]. A provider must report parents before their
//! children; the extraction stage repairs links that break this rule.

pub mod python;
mod tree_sitter_utils;

pub use python::PythonProvider;

use crate::error::ProviderError;
use crate::types::{DefinitionKind, Position};

/// Everything a provider needs to analyze one file.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisRequest<'a> {
    /// File content
    pub source: &'a str,
    /// Project-relative, `/`-separated path
    pub path: &'a str,
    /// Dotted module name derived from the path
    pub module: &'a str,
    /// Whether reference targets are wanted; providers may skip scope lookups
    /// when this is `false`
    pub resolve_targets: bool,
}

impl AnalysisRequest<'_> {
    /// Whether the file is a package initializer (`__init__.py`).
    #[must_use]
    pub fn is_package(&self) -> bool {
        self.path == "__init__.py" || self.path.ends_with("/__init__.py")
    }
}

/// A definition as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDefinition {
    /// Simple name
    pub name: String,
    /// Dotted, module-qualified name
    pub full_name: String,
    /// Entity kind
    pub kind: DefinitionKind,
    /// Position of the name
    pub start: Position,
    /// End of the whole definition, when known
    pub end: Option<Position>,
    /// Call signature
    pub signature: Option<String>,
    /// Docstring
    pub docstring: Option<String>,
    /// Index of the enclosing definition in the same file
    pub parent: Option<usize>,
}

/// A use of a name as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReference {
    /// Name as written; the callee expression text for dynamic calls
    pub name: String,
    /// Position of the name (of the argument list for dynamic calls)
    pub position: Position,
    /// Best-effort full name of the target
    pub target: Option<String>,
    /// Whether this use is an invocation
    pub is_call: bool,
    /// The callee is an arbitrary expression rather than a name
    pub dynamic_callee: bool,
    /// The callee is a plain identifier with no binding in any enclosing
    /// scope; only such calls may be matched by simple name across files
    pub unbound_name: bool,
    /// Index of the innermost enclosing function or class definition
    pub scope: Option<usize>,
    /// Index of the call reference whose argument list contains this one
    pub call_parent: Option<usize>,
}

/// An import binding as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImport {
    /// Absolute module name
    pub module: String,
    /// Imported name for `from` imports
    pub name: Option<String>,
    /// `as` alias
    pub alias: Option<String>,
    /// Position of the imported item
    pub position: Position,
}

/// A decorator as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDecorator {
    /// Index of the decorated definition
    pub target: usize,
    /// Dotted name as written
    pub name: String,
    /// Best-effort full name
    pub full_name: Option<String>,
    /// Text between the call parentheses
    pub arguments: Option<String>,
    /// Position of the `@`
    pub position: Position,
}

/// A base-class list entry as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClassBase {
    /// Index of the class definition
    pub class: usize,
    /// Base expression as written
    pub name: String,
    /// Best-effort full name
    pub full_name: Option<String>,
    /// 0-based index among positional bases
    pub position: u32,
}

/// Raw facts for one file.
///
/// `decorators` and `bases` are `None` when the provider cannot attribute
/// them; that is reduced fidelity, not a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAnalysis {
    /// Definitions, parents before children
    pub definitions: Vec<RawDefinition>,
    /// References in report order
    pub references: Vec<RawReference>,
    /// Imports in source order
    pub imports: Vec<RawImport>,
    /// Decorators, if the facility is available
    pub decorators: Option<Vec<RawDecorator>>,
    /// Base classes, if the facility is available
    pub bases: Option<Vec<RawClassBase>>,
}

/// Capability to analyze a single source file.
///
/// Implementations must be usable from many threads at once; extraction
/// runs one file per worker.
pub trait AnalysisProvider: Send + Sync {
    /// Short identifier recorded in snapshot metadata.
    fn name(&self) -> &str;

    /// Analyze one file.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Syntax` when the source does not parse and
    /// `ProviderError::Internal` when the provider itself fails.
    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<RawAnalysis, ProviderError>;
}

/// Dotted module name for a project-relative path.
///
/// `pkg/mod.py` → `pkg.mod`, `pkg/__init__.py` → `pkg`, `main.py` → `main`.
#[must_use]
pub fn module_name(path: &str) -> String {
    let trimmed = path.strip_suffix(".py").unwrap_or(path);
    let mut parts: Vec<&str> = trimmed.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() > 1 && parts.last() == Some(&"__init__") {
        parts.pop();
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_names_follow_package_layout() {
        assert_eq!(module_name("a.py"), "a");
        assert_eq!(module_name("pkg/mod.py"), "pkg.mod");
        assert_eq!(module_name("pkg/sub/__init__.py"), "pkg.sub");
        assert_eq!(module_name("__init__.py"), "__init__");
    }

    #[test]
    fn package_detection_uses_file_name() {
        let request = AnalysisRequest {
            source: "",
            path: "pkg/__init__.py",
            module: "pkg",
            resolve_targets: true,
        };
        assert!(request.is_package());
        assert!(
            !AnalysisRequest {
                path: "pkg/not__init__.py",
                ..request
            }
            .is_package()
        );
    }
}
