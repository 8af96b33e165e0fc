//! Domain types for the Sextant index.
//!
//! These types represent the persisted snapshot tables and the results of a run:
//! - **Entities**: `FileRecord`, `Definition`, `Reference`, `Import`, `Decorator`,
//!   `ClassBase`, `Call` (one Parquet table each in a snapshot)
//! - **Results**: `IndexStats`, `RunOutcome`, `TableCounts`
//!
//! ## Design Decisions
//!
//! | Decision | Choice | Rationale |
//! |----------|--------|-----------|
//! | Ids | `i64` newtypes | Type-safe joins; `SQLite` rowids are `i64` |
//! | Positions | 1-based line, 0-based column | Matches Python tooling conventions |
//! | Paths | `/`-separated `String` | Stable across platforms inside snapshots |
//! | Unresolved targets | `None` | "Used but unknown" is valid data |

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

// ============================================================================
// Strongly-typed ID wrappers
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Extract the raw i64 value.
            #[must_use]
            pub fn as_i64(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Identifier of a row in the `files` table.
    FileId
);
define_id!(
    /// Identifier of a row in the `definitions` table.
    DefinitionId
);
define_id!(
    /// Identifier of a row in the `references` table.
    ReferenceId
);
define_id!(
    /// Identifier of a row in the `imports` table.
    ImportId
);
define_id!(
    /// Identifier of a row in the `decorators` table.
    DecoratorId
);
define_id!(
    /// Identifier of a row in the `class_bases` table.
    ClassBaseId
);
define_id!(
    /// Identifier of a row in the `calls` table.
    CallId
);

// ============================================================================
// Enums
// ============================================================================

/// Kinds of named program entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// `def` or `async def`, including methods and lambdas bound to names
    Function,
    /// `class`
    Class,
    /// Assignment target, loop target, `with ... as` target
    Variable,
    /// Function parameter
    Param,
    /// The module a file defines
    Module,
}

impl DefinitionKind {
    /// All kinds, in display order.
    pub const ALL: [Self; 5] = [
        Self::Module,
        Self::Class,
        Self::Function,
        Self::Variable,
        Self::Param,
    ];

    /// Convert to the string stored in snapshot tables.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Class => "class",
            Self::Variable => "variable",
            Self::Param => "param",
            Self::Module => "module",
        }
    }

    /// Parse a kind name, accepting a few common aliases.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "function" | "func" | "def" | "method" => Some(Self::Function),
            "class" => Some(Self::Class),
            "variable" | "var" | "statement" => Some(Self::Variable),
            "param" | "parameter" => Some(Self::Param),
            "module" | "mod" => Some(Self::Module),
            _ => None,
        }
    }

    /// Whether definitions of this kind can own calls in the call graph.
    #[must_use]
    pub fn is_scope(&self) -> bool {
        matches!(self, Self::Function | Self::Class | Self::Module)
    }
}

/// Provider facilities that may be unavailable for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facility {
    /// Decorator attribution
    Decorators,
    /// Base-class attribution
    ClassBases,
}

impl std::fmt::Display for Facility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Decorators => write!(f, "decorators"),
            Self::ClassBases => write!(f, "class bases"),
        }
    }
}

// ============================================================================
// Positions
// ============================================================================

/// A location in a source file: 1-based line, 0-based column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// 1-based line
    pub line: u32,
    /// 0-based column (in bytes)
    pub column: u32,
}

impl Position {
    /// Create a position.
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ============================================================================
// Snapshot entities
// ============================================================================

/// An indexed source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Row id
    pub id: FileId,
    /// Project-relative, `/`-separated path
    pub path: String,
    /// Hex SHA-256 of the bytes that were analyzed
    pub hash: String,
    /// Size in bytes
    pub size: u64,
    /// Filesystem modification time (advisory)
    pub modified_at: DateTime<Utc>,
    /// When this row was produced
    pub indexed_at: DateTime<Utc>,
}

/// A named program entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition {
    /// Row id
    pub id: DefinitionId,
    /// Owning file
    pub file_id: FileId,
    /// Simple name
    pub name: String,
    /// Dotted, module-qualified name (e.g. `pkg.mod.Class.method`)
    pub full_name: String,
    /// What kind of entity this is
    pub kind: DefinitionKind,
    /// Line of the name
    pub line: u32,
    /// Column of the name
    pub column: u32,
    /// End line of the whole definition
    pub end_line: Option<u32>,
    /// End column of the whole definition
    pub end_column: Option<u32>,
    /// Call signature for functions and classes
    pub signature: Option<String>,
    /// Cleaned docstring
    pub docstring: Option<String>,
    /// Enclosing definition in the same file
    pub parent_id: Option<DefinitionId>,
    /// `false` when the name starts with `_`
    pub is_public: bool,
    /// Denormalized tokens for ranked search
    pub search_text: String,
}

impl Definition {
    /// Start position of the name.
    #[must_use]
    pub fn start(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// End position, when known.
    #[must_use]
    pub fn end(&self) -> Option<Position> {
        Some(Position::new(self.end_line?, self.end_column?))
    }
}

/// A use of a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Row id
    pub id: ReferenceId,
    /// Owning file
    pub file_id: FileId,
    /// Innermost enclosing function or class (`None` at module level)
    pub definition_id: Option<DefinitionId>,
    /// Referenced name as written (the callee expression for dynamic calls)
    pub name: String,
    /// Line of the name
    pub line: u32,
    /// Column of the name
    pub column: u32,
    /// Stripped source line
    pub context: String,
    /// Full name of the resolved target; `None` means unresolved
    pub target_full_name: Option<String>,
    /// Project-relative path of the file defining the target
    pub target_module_path: Option<String>,
    /// Whether this use is an invocation
    pub is_call: bool,
    /// Position of this call within its caller, starting at 1
    pub call_order: Option<u32>,
    /// Argument nesting depth, starting at 1
    pub call_depth: Option<u32>,
}

/// An import statement binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    /// Row id
    pub id: ImportId,
    /// Owning file
    pub file_id: FileId,
    /// Absolute module name
    pub module: String,
    /// Imported name for `from` imports (`*` for star imports)
    pub name: Option<String>,
    /// `as` alias
    pub alias: Option<String>,
    /// Line of the statement
    pub line: u32,
    /// Column of the imported item
    pub column: u32,
}

/// A decorator applied to a function or class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decorator {
    /// Row id
    pub id: DecoratorId,
    /// Owning file
    pub file_id: FileId,
    /// Decorated definition
    pub definition_id: DefinitionId,
    /// Dotted decorator name as written (without arguments)
    pub name: String,
    /// Resolved full name of the decorator, when it is a project definition
    pub full_name: Option<String>,
    /// Text between the call parentheses
    pub arguments: Option<String>,
    /// Line of the `@`
    pub line: u32,
    /// Column of the `@`
    pub column: u32,
}

/// One entry in a class's base list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassBase {
    /// Row id
    pub id: ClassBaseId,
    /// Owning file
    pub file_id: FileId,
    /// The class whose base list this is
    pub class_id: DefinitionId,
    /// Base expression as written
    pub base_name: String,
    /// Best-effort full name of the base
    pub base_full_name: Option<String>,
    /// Base class definition, when it is in the project
    pub base_id: Option<DefinitionId>,
    /// 0-based index in the base list
    pub position: u32,
}

/// A call-graph edge, derived from a call reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    /// Row id
    pub id: CallId,
    /// Owning file
    pub file_id: FileId,
    /// The reference this edge was derived from
    pub reference_id: ReferenceId,
    /// Calling definition
    pub caller_id: DefinitionId,
    /// Full name of the caller
    pub caller_full_name: String,
    /// Callee simple name; `None` when the callee is an arbitrary expression
    pub callee_name: Option<String>,
    /// Full name of the callee when resolved
    pub callee_full_name: Option<String>,
    /// Callee definition when resolved
    pub callee_id: Option<DefinitionId>,
    /// Line of the call
    pub line: u32,
    /// Column of the call
    pub column: u32,
    /// Stripped source line
    pub context: String,
    /// Execution order within the caller, starting at 1
    pub call_order: u32,
    /// Argument nesting depth, starting at 1
    pub call_depth: u32,
}

// ============================================================================
// Run results
// ============================================================================

/// A file analyzed with reduced fidelity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    /// Project-relative path
    pub path: String,
    /// Facility that was unavailable
    pub facility: Facility,
}

/// Row counts for each snapshot table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    /// `files` rows
    pub files: usize,
    /// `definitions` rows
    pub definitions: usize,
    /// `references` rows
    pub references: usize,
    /// `imports` rows
    pub imports: usize,
    /// `decorators` rows
    pub decorators: usize,
    /// `class_bases` rows
    pub class_bases: usize,
    /// `calls` rows
    pub calls: usize,
}

/// Statistics from an indexing run that produced a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    /// Files analyzed successfully
    pub files_indexed: usize,
    /// Files skipped because analysis failed
    pub files_failed: usize,
    /// Previously indexed files that are gone from the new snapshot
    pub files_removed: usize,
    /// Files whose content did not change (still re-analyzed)
    pub files_unchanged: usize,
    /// Row counts of the new snapshot
    pub counts: TableCounts,
    /// References left without a target
    pub unresolved_references: usize,
    /// Per-file failures
    pub errors: Vec<IndexError>,
    /// Files analyzed with reduced fidelity
    pub degradations: Vec<Degradation>,
    /// Generation number of the new snapshot
    pub generation: u64,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Result of asking the coordinator to index.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Nothing changed; no writes happened
    Unchanged {
        /// Files in scope
        files: usize,
    },
    /// A new snapshot was written
    Indexed(IndexStats),
}

impl RunOutcome {
    /// Stats of the written snapshot, if one was written.
    #[must_use]
    pub fn stats(&self) -> Option<&IndexStats> {
        match self {
            Self::Unchanged { .. } => None,
            Self::Indexed(stats) => Some(stats),
        }
    }

    /// Whether this run wrote a snapshot.
    #[must_use]
    pub fn wrote_snapshot(&self) -> bool {
        matches!(self, Self::Indexed(_))
    }
}

/// A file whose analysis failed in the run that produced a snapshot.
///
/// Kept in snapshot metadata so an unchanged broken file does not make the
/// index look stale forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    /// Project-relative path
    pub path: String,
    /// Hash of the content that failed
    pub hash: String,
    /// Failure message
    pub message: String,
}

/// Convert a path to the `/`-separated form stored in snapshots.
#[must_use]
pub fn normalize_path(path: &std::path::Path) -> String {
    let s = path.to_string_lossy();
    if cfg!(windows) {
        s.replace('\\', "/")
    } else {
        s.into_owned()
    }
}

/// Convert a stored path back to a `PathBuf`.
#[must_use]
pub fn stored_path(path: &str) -> PathBuf {
    PathBuf::from(path)
}
