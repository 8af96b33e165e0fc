//! Python analysis for Sextant, built on tree-sitter-python.
//!
//! Analysis runs in two passes over the syntax tree:
//!
//! 1. **Declare**: create definitions and record every binding per scope
//!    (module, class, function, lambda, comprehension). Imports are recorded
//!    here too.
//! 2. **Visit**: walk expressions, emitting references whose targets are
//!    looked up through the Python scope chain. Class scopes are only visible
//!    from their own body. Calls remember which call's argument list they sit
//!    in, so call depth can be derived later.
//!
//! Targets are best effort: a name bound by an import resolves to the imported
//! path, a method called on `self` resolves to the class member when the class
//! body defines it, and builtins resolve to `builtins.<name>`. Anything else
//! is left for the resolver.

// Tree-sitter returns usize for positions, but we store u32 for compactness.
#![allow(clippy::cast_possible_truncation)]

use std::collections::{HashMap, HashSet};

use tree_sitter::{Node, Parser};

use super::tree_sitter_utils::{
    field_children, first_error, named_children, node_end, node_start, node_text,
};
use super::{
    AnalysisProvider, AnalysisRequest, RawAnalysis, RawClassBase, RawDecorator, RawDefinition,
    RawImport, RawReference,
};
use crate::error::ProviderError;
use crate::types::{DefinitionKind, Position};

/// Tree-sitter node kind constants for the Python grammar.
mod node_kinds {
    // Definitions
    pub const FUNCTION_DEFINITION: &str = "function_definition";
    pub const CLASS_DEFINITION: &str = "class_definition";
    pub const DECORATED_DEFINITION: &str = "decorated_definition";
    pub const DECORATOR: &str = "decorator";
    pub const LAMBDA: &str = "lambda";

    // Parameters
    pub const TYPED_PARAMETER: &str = "typed_parameter";
    pub const DEFAULT_PARAMETER: &str = "default_parameter";
    pub const TYPED_DEFAULT_PARAMETER: &str = "typed_default_parameter";
    pub const LIST_SPLAT_PATTERN: &str = "list_splat_pattern";
    pub const DICTIONARY_SPLAT_PATTERN: &str = "dictionary_splat_pattern";

    // Statements
    pub const EXPRESSION_STATEMENT: &str = "expression_statement";
    pub const ASSIGNMENT: &str = "assignment";
    pub const AUGMENTED_ASSIGNMENT: &str = "augmented_assignment";
    pub const FOR_STATEMENT: &str = "for_statement";
    pub const IMPORT_STATEMENT: &str = "import_statement";
    pub const IMPORT_FROM_STATEMENT: &str = "import_from_statement";
    pub const FUTURE_IMPORT_STATEMENT: &str = "future_import_statement";
    pub const GLOBAL_STATEMENT: &str = "global_statement";
    pub const NONLOCAL_STATEMENT: &str = "nonlocal_statement";

    // Import pieces
    pub const DOTTED_NAME: &str = "dotted_name";
    pub const ALIASED_IMPORT: &str = "aliased_import";
    pub const RELATIVE_IMPORT: &str = "relative_import";
    pub const IMPORT_PREFIX: &str = "import_prefix";
    pub const WILDCARD_IMPORT: &str = "wildcard_import";

    // Expressions
    pub const IDENTIFIER: &str = "identifier";
    pub const CALL: &str = "call";
    pub const ATTRIBUTE: &str = "attribute";
    pub const SUBSCRIPT: &str = "subscript";
    pub const KEYWORD_ARGUMENT: &str = "keyword_argument";
    pub const LIST_SPLAT: &str = "list_splat";
    pub const DICTIONARY_SPLAT: &str = "dictionary_splat";
    pub const NAMED_EXPRESSION: &str = "named_expression";
    pub const AS_PATTERN: &str = "as_pattern";
    pub const AS_PATTERN_TARGET: &str = "as_pattern_target";
    pub const STRING: &str = "string";
    pub const STRING_CONTENT: &str = "string_content";
    pub const COMMENT: &str = "comment";

    // Target patterns
    pub const PATTERN_LIST: &str = "pattern_list";
    pub const TUPLE_PATTERN: &str = "tuple_pattern";
    pub const LIST_PATTERN: &str = "list_pattern";
    pub const TUPLE: &str = "tuple";
    pub const LIST: &str = "list";
    pub const EXPRESSION_LIST: &str = "expression_list";
    pub const PARENTHESIZED_EXPRESSION: &str = "parenthesized_expression";

    // Comprehensions
    pub const LIST_COMPREHENSION: &str = "list_comprehension";
    pub const SET_COMPREHENSION: &str = "set_comprehension";
    pub const DICTIONARY_COMPREHENSION: &str = "dictionary_comprehension";
    pub const GENERATOR_EXPRESSION: &str = "generator_expression";
    pub const FOR_IN_CLAUSE: &str = "for_in_clause";
}

use node_kinds::{
    ALIASED_IMPORT, AS_PATTERN, AS_PATTERN_TARGET, ASSIGNMENT, ATTRIBUTE, AUGMENTED_ASSIGNMENT,
    CALL, CLASS_DEFINITION, COMMENT, DECORATED_DEFINITION, DECORATOR, DEFAULT_PARAMETER,
    DICTIONARY_COMPREHENSION, DICTIONARY_SPLAT, DICTIONARY_SPLAT_PATTERN, DOTTED_NAME,
    EXPRESSION_LIST, LIST_SPLAT,
    EXPRESSION_STATEMENT, FOR_IN_CLAUSE, FOR_STATEMENT, FUNCTION_DEFINITION,
    FUTURE_IMPORT_STATEMENT, GENERATOR_EXPRESSION, GLOBAL_STATEMENT, IDENTIFIER,
    IMPORT_FROM_STATEMENT, IMPORT_PREFIX, IMPORT_STATEMENT, KEYWORD_ARGUMENT, LAMBDA, LIST,
    LIST_COMPREHENSION, LIST_PATTERN, LIST_SPLAT_PATTERN, NAMED_EXPRESSION, NONLOCAL_STATEMENT,
    PARENTHESIZED_EXPRESSION, PATTERN_LIST, RELATIVE_IMPORT, SET_COMPREHENSION, STRING,
    STRING_CONTENT, SUBSCRIPT, TUPLE, TUPLE_PATTERN, TYPED_DEFAULT_PARAMETER, TYPED_PARAMETER,
    WILDCARD_IMPORT,
};

/// Names that resolve to `builtins.<name>` when not shadowed.
const BUILTINS: &[&str] = &[
    "abs", "all", "any", "ascii", "bin", "bool", "breakpoint", "bytearray", "bytes", "callable",
    "chr", "classmethod", "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate",
    "eval", "exec", "filter", "float", "format", "frozenset", "getattr", "globals", "hasattr",
    "hash", "help", "hex", "id", "input", "int", "isinstance", "issubclass", "iter", "len",
    "list", "locals", "map", "max", "memoryview", "min", "next", "object", "oct", "open", "ord",
    "pow", "print", "property", "range", "repr", "reversed", "round", "set", "setattr",
    "slice", "sorted", "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip",
    "BaseException", "Exception", "ArithmeticError", "AssertionError", "AttributeError",
    "EOFError", "FileExistsError", "FileNotFoundError", "ImportError", "IndexError",
    "KeyError", "KeyboardInterrupt", "LookupError", "ModuleNotFoundError", "NameError",
    "NotImplementedError", "OSError", "PermissionError", "RecursionError", "RuntimeError",
    "StopIteration", "SyntaxError", "SystemExit", "TimeoutError", "TypeError",
    "UnicodeDecodeError", "UnicodeEncodeError", "ValueError", "ZeroDivisionError", "Warning",
    "DeprecationWarning", "UserWarning", "NotImplemented", "Ellipsis",
];

/// Longest callee expression kept as the name of a dynamic call.
const MAX_DYNAMIC_NAME_LEN: usize = 80;

/// Python analysis provider backed by tree-sitter-python.
///
/// Stateless; a parser is created per file so the provider can be shared
/// across extraction workers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PythonProvider;

impl PythonProvider {
    /// Create a provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisProvider for PythonProvider {
    fn name(&self) -> &'static str {
        "tree-sitter-python"
    }

    fn analyze(&self, request: &AnalysisRequest<'_>) -> Result<RawAnalysis, ProviderError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ProviderError::Internal(format!("failed to load Python grammar: {e}")))?;

        let tree = parser
            .parse(request.source, None)
            .ok_or_else(|| ProviderError::Internal("parser produced no tree".to_string()))?;
        let root = tree.root_node();

        if let Some(position) = first_error(&root) {
            return Err(ProviderError::Syntax {
                line: position.line,
                column: position.column,
            });
        }

        let mut analyzer = Analyzer::new(*request);
        analyzer.declare_module(&root);
        analyzer.visit(&root, MODULE_SCOPE, None);
        Ok(analyzer.finish())
    }
}

// ============================================================================
// Scopes and bindings
// ============================================================================

const MODULE_SCOPE: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeKind {
    Module,
    Class,
    Function,
    Lambda,
    Comprehension,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Import,
    Class,
    Function,
    Variable,
    Param,
    /// Bound in a lambda or comprehension; no definition row
    Local,
    Builtin,
}

#[derive(Debug, Clone)]
struct Binding {
    full_name: Option<String>,
    kind: BindingKind,
}

#[derive(Debug)]
struct Scope {
    kind: ScopeKind,
    /// Prefix for the full names of definitions in this scope
    full_name: String,
    /// Innermost function or class definition (None at module level)
    owner: Option<usize>,
    /// Definition that new definitions in this scope hang under
    definition: usize,
    parent: Option<usize>,
    bindings: HashMap<String, Binding>,
    /// Names declared `global`/`nonlocal`; not local bindings
    non_local: HashSet<String>,
    /// First parameter of a method and the class scope it refers to
    receiver: Option<(String, usize)>,
}

/// Result of resolving a dotted expression.
enum Chain {
    Named(String, BindingKind),
    /// An instance of the class with the given scope (`self`, `cls`)
    Instance(usize),
}

struct Analyzer<'a> {
    request: AnalysisRequest<'a>,
    source: &'a str,
    scopes: Vec<Scope>,
    scope_of_node: HashMap<usize, usize>,
    definition_of_node: HashMap<usize, usize>,
    definitions: Vec<RawDefinition>,
    references: Vec<RawReference>,
    imports: Vec<RawImport>,
    decorators: Vec<RawDecorator>,
    bases: Vec<RawClassBase>,
}

impl<'a> Analyzer<'a> {
    fn new(request: AnalysisRequest<'a>) -> Self {
        Self {
            request,
            source: request.source,
            scopes: Vec::new(),
            scope_of_node: HashMap::new(),
            definition_of_node: HashMap::new(),
            definitions: Vec::new(),
            references: Vec::new(),
            imports: Vec::new(),
            decorators: Vec::new(),
            bases: Vec::new(),
        }
    }

    fn finish(self) -> RawAnalysis {
        RawAnalysis {
            definitions: self.definitions,
            references: self.references,
            imports: self.imports,
            decorators: Some(self.decorators),
            bases: Some(self.bases),
        }
    }

    fn text(&self, node: &Node<'_>) -> &'a str {
        node_text(node, self.source).unwrap_or_default()
    }

    fn push_scope(&mut self, kind: ScopeKind, parent: usize, owner: Option<usize>, definition: usize, full_name: String) -> usize {
        self.scopes.push(Scope {
            kind,
            full_name,
            owner,
            definition,
            parent: Some(parent),
            bindings: HashMap::new(),
            non_local: HashSet::new(),
            receiver: None,
        });
        self.scopes.len() - 1
    }

    /// Nearest scope that can hold definitions (skips lambdas and comprehensions).
    fn binding_scope(&self, mut scope: usize) -> usize {
        while matches!(
            self.scopes[scope].kind,
            ScopeKind::Lambda | ScopeKind::Comprehension
        ) {
            match self.scopes[scope].parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        scope
    }

    /// Bind `name` in `scope` unless it is already bound there (first binding wins).
    fn bind(&mut self, scope: usize, name: &str, binding: Binding) -> bool {
        let scope = &mut self.scopes[scope];
        if scope.bindings.contains_key(name) {
            return false;
        }
        scope.bindings.insert(name.to_string(), binding);
        true
    }

    fn qualify(&self, scope: usize, name: &str) -> String {
        format!("{}.{name}", self.scopes[scope].full_name)
    }

    fn push_definition(&mut self, definition: RawDefinition) -> usize {
        self.definitions.push(definition);
        self.definitions.len() - 1
    }

    // ========================================================================
    // Pass 1: declarations
    // ========================================================================

    fn declare_module(&mut self, root: &Node<'_>) {
        let module = self.request.module.to_string();
        let name = module.rsplit('.').next().unwrap_or(&module).to_string();
        let docstring = self.docstring(root);
        self.push_definition(RawDefinition {
            name,
            full_name: module.clone(),
            kind: DefinitionKind::Module,
            start: Position::new(1, 0),
            end: Some(node_end(root)),
            signature: None,
            docstring,
            parent: None,
        });
        self.scopes.push(Scope {
            kind: ScopeKind::Module,
            full_name: module,
            owner: None,
            definition: 0,
            parent: None,
            bindings: HashMap::new(),
            non_local: HashSet::new(),
            receiver: None,
        });
        self.scope_of_node.insert(root.id(), MODULE_SCOPE);
        self.declare_children(root, MODULE_SCOPE);
    }

    fn declare_children(&mut self, node: &Node<'_>, scope: usize) {
        for child in named_children(node) {
            self.declare(&child, scope);
        }
    }

    fn declare(&mut self, node: &Node<'_>, scope: usize) {
        match node.kind() {
            FUNCTION_DEFINITION => self.declare_function(node, scope),
            CLASS_DEFINITION => self.declare_class(node, scope),
            ASSIGNMENT | AUGMENTED_ASSIGNMENT => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.declare_targets(&left, scope, node);
                }
                if let Some(right) = node.child_by_field_name("right") {
                    self.declare(&right, scope);
                }
            }
            FOR_STATEMENT => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.declare_targets(&left, scope, &left);
                }
                for field in ["right", "body", "alternative"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.declare(&child, scope);
                    }
                }
            }
            NAMED_EXPRESSION => {
                if let Some(name) = node.child_by_field_name("name") {
                    self.declare_variable(&name, scope, node);
                }
                if let Some(value) = node.child_by_field_name("value") {
                    self.declare(&value, scope);
                }
            }
            AS_PATTERN => {
                for child in named_children(node) {
                    if child.kind() == AS_PATTERN_TARGET {
                        self.declare_targets(&child, scope, &child);
                    } else {
                        self.declare(&child, scope);
                    }
                }
            }
            IMPORT_STATEMENT | IMPORT_FROM_STATEMENT | FUTURE_IMPORT_STATEMENT => {
                self.declare_import(node, scope);
            }
            GLOBAL_STATEMENT | NONLOCAL_STATEMENT => {
                let target = self.binding_scope(scope);
                for child in named_children(node) {
                    if child.kind() == IDENTIFIER {
                        let name = self.text(&child).to_string();
                        self.scopes[target].non_local.insert(name);
                    }
                }
            }
            LAMBDA => self.declare_lambda(node, scope),
            LIST_COMPREHENSION | SET_COMPREHENSION | DICTIONARY_COMPREHENSION
            | GENERATOR_EXPRESSION => self.declare_comprehension(node, scope),
            _ => self.declare_children(node, scope),
        }
    }

    fn declare_function(&mut self, node: &Node<'_>, scope: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.declare_children(node, scope);
        };
        let scope = self.binding_scope(scope);
        let name = self.text(&name_node).to_string();
        let full_name = self.qualify(scope, &name);
        let docstring = node
            .child_by_field_name("body")
            .and_then(|body| self.docstring(&body));

        let index = self.push_definition(RawDefinition {
            name: name.clone(),
            full_name: full_name.clone(),
            kind: DefinitionKind::Function,
            start: node_start(&name_node),
            end: Some(node_end(node)),
            signature: self.function_signature(node, &name),
            docstring,
            parent: Some(self.scopes[scope].definition),
        });
        self.definition_of_node.insert(node.id(), index);
        self.bind(
            scope,
            &name,
            Binding {
                full_name: Some(full_name.clone()),
                kind: BindingKind::Function,
            },
        );

        let inner = self.push_scope(ScopeKind::Function, scope, Some(index), index, full_name);
        self.scope_of_node.insert(node.id(), inner);

        if let Some(params) = node.child_by_field_name("parameters") {
            let parameters = parameter_names(&params);
            for (ident, param) in &parameters {
                let param_name = self.text(ident).to_string();
                let param_full = self.qualify(inner, &param_name);
                self.push_definition(RawDefinition {
                    name: param_name.clone(),
                    full_name: param_full.clone(),
                    kind: DefinitionKind::Param,
                    start: node_start(ident),
                    end: Some(node_end(param)),
                    signature: None,
                    docstring: None,
                    parent: Some(index),
                });
                self.bind(
                    inner,
                    &param_name,
                    Binding {
                        full_name: Some(param_full),
                        kind: BindingKind::Param,
                    },
                );
            }

            if self.scopes[scope].kind == ScopeKind::Class && !self.is_static_method(node) {
                if let Some((first, _)) = parameters.first() {
                    self.scopes[inner].receiver = Some((self.text(first).to_string(), scope));
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.declare_children(&body, inner);
        }
    }

    fn declare_class(&mut self, node: &Node<'_>, scope: usize) {
        let Some(name_node) = node.child_by_field_name("name") else {
            return self.declare_children(node, scope);
        };
        let scope = self.binding_scope(scope);
        let name = self.text(&name_node).to_string();
        let full_name = self.qualify(scope, &name);
        let body = node.child_by_field_name("body");
        let docstring = body.as_ref().and_then(|b| self.docstring(b));
        let signature = Some(self.class_signature(body.as_ref(), &name));

        let index = self.push_definition(RawDefinition {
            name: name.clone(),
            full_name: full_name.clone(),
            kind: DefinitionKind::Class,
            start: node_start(&name_node),
            end: Some(node_end(node)),
            signature,
            docstring,
            parent: Some(self.scopes[scope].definition),
        });
        self.definition_of_node.insert(node.id(), index);
        self.bind(
            scope,
            &name,
            Binding {
                full_name: Some(full_name.clone()),
                kind: BindingKind::Class,
            },
        );

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            self.declare(&superclasses, scope);
        }

        let inner = self.push_scope(ScopeKind::Class, scope, Some(index), index, full_name);
        self.scope_of_node.insert(node.id(), inner);
        if let Some(body) = body {
            self.declare_children(&body, inner);
        }
    }

    fn declare_lambda(&mut self, node: &Node<'_>, scope: usize) {
        let owner = self.scopes[scope].owner;
        let definition = self.scopes[scope].definition;
        let full_name = self.scopes[scope].full_name.clone();
        let inner = self.push_scope(ScopeKind::Lambda, scope, owner, definition, full_name);
        self.scope_of_node.insert(node.id(), inner);

        if let Some(params) = node.child_by_field_name("parameters") {
            for (ident, _) in parameter_names(&params) {
                let name = self.text(&ident).to_string();
                self.bind(
                    inner,
                    &name,
                    Binding {
                        full_name: None,
                        kind: BindingKind::Local,
                    },
                );
            }
        }
        if let Some(body) = node.child_by_field_name("body") {
            self.declare(&body, inner);
        }
    }

    fn declare_comprehension(&mut self, node: &Node<'_>, scope: usize) {
        let owner = self.scopes[scope].owner;
        let definition = self.scopes[scope].definition;
        let full_name = self.scopes[scope].full_name.clone();
        let inner = self.push_scope(ScopeKind::Comprehension, scope, owner, definition, full_name);
        self.scope_of_node.insert(node.id(), inner);

        for child in named_children(node) {
            if child.kind() == FOR_IN_CLAUSE {
                if let Some(left) = child.child_by_field_name("left") {
                    self.declare_locals(&left, inner);
                }
                for right in field_children(&child, "right") {
                    self.declare(&right, inner);
                }
            } else {
                self.declare(&child, inner);
            }
        }
    }

    /// Bind assignment-like targets as variables.
    fn declare_targets(&mut self, target: &Node<'_>, scope: usize, statement: &Node<'_>) {
        match target.kind() {
            IDENTIFIER => self.declare_variable(target, scope, statement),
            PATTERN_LIST | TUPLE_PATTERN | LIST_PATTERN | TUPLE | LIST | EXPRESSION_LIST
            | PARENTHESIZED_EXPRESSION | LIST_SPLAT_PATTERN | AS_PATTERN_TARGET => {
                for child in named_children(target) {
                    self.declare_targets(&child, scope, statement);
                }
            }
            _ => {}
        }
    }

    fn declare_variable(&mut self, name_node: &Node<'_>, scope: usize, statement: &Node<'_>) {
        let scope = self.binding_scope(scope);
        let name = self.text(name_node).to_string();
        if self.scopes[scope].non_local.contains(&name)
            || self.scopes[scope].bindings.contains_key(&name)
        {
            return;
        }
        let full_name = self.qualify(scope, &name);
        let parent = self.scopes[scope].definition;
        self.push_definition(RawDefinition {
            name: name.clone(),
            full_name: full_name.clone(),
            kind: DefinitionKind::Variable,
            start: node_start(name_node),
            end: Some(node_end(statement)),
            signature: None,
            docstring: None,
            parent: Some(parent),
        });
        self.bind(
            scope,
            &name,
            Binding {
                full_name: Some(full_name),
                kind: BindingKind::Variable,
            },
        );
    }

    /// Bind comprehension targets without creating definitions.
    fn declare_locals(&mut self, target: &Node<'_>, scope: usize) {
        if target.kind() == IDENTIFIER {
            let name = self.text(target).to_string();
            self.bind(
                scope,
                &name,
                Binding {
                    full_name: None,
                    kind: BindingKind::Local,
                },
            );
            return;
        }
        for child in named_children(target) {
            self.declare_locals(&child, scope);
        }
    }

    fn declare_import(&mut self, node: &Node<'_>, scope: usize) {
        let scope = self.binding_scope(scope);
        match node.kind() {
            IMPORT_STATEMENT => {
                for item in field_children(node, "name") {
                    let (module_node, alias) = split_alias(&item);
                    let Some(module_node) = module_node else {
                        continue;
                    };
                    let module = self.text(&module_node).to_string();
                    let alias = alias.map(|a| self.text(&a).to_string());
                    // `import a.b` binds `a`; `import a.b as c` binds `c` to `a.b`
                    let (bound, target) = match &alias {
                        Some(alias) => (alias.clone(), module.clone()),
                        None => {
                            let head = module.split('.').next().unwrap_or(&module).to_string();
                            (head.clone(), head)
                        }
                    };
                    self.bind_import(scope, &bound, target);
                    self.imports.push(RawImport {
                        module,
                        name: None,
                        alias,
                        position: node_start(&item),
                    });
                }
            }
            IMPORT_FROM_STATEMENT | FUTURE_IMPORT_STATEMENT => {
                let module = if node.kind() == FUTURE_IMPORT_STATEMENT {
                    "__future__".to_string()
                } else {
                    match node.child_by_field_name("module_name") {
                        Some(module_node) => self.absolute_module(&module_node),
                        None => return,
                    }
                };

                for child in named_children(node) {
                    if child.kind() == WILDCARD_IMPORT {
                        self.imports.push(RawImport {
                            module: module.clone(),
                            name: Some("*".to_string()),
                            alias: None,
                            position: node_start(&child),
                        });
                    }
                }

                for item in field_children(node, "name") {
                    let (name_node, alias) = split_alias(&item);
                    let Some(name_node) = name_node else {
                        continue;
                    };
                    let name = self.text(&name_node).to_string();
                    let alias = alias.map(|a| self.text(&a).to_string());
                    let bound = alias.clone().unwrap_or_else(|| name.clone());
                    self.bind_import(scope, &bound, format!("{module}.{name}"));
                    self.imports.push(RawImport {
                        module: module.clone(),
                        name: Some(name),
                        alias,
                        position: node_start(&item),
                    });
                }
            }
            _ => {}
        }
    }

    fn bind_import(&mut self, scope: usize, name: &str, target: String) {
        self.bind(
            scope,
            name,
            Binding {
                full_name: Some(target),
                kind: BindingKind::Import,
            },
        );
    }

    /// Absolute module name of an import source, resolving leading dots
    /// against this file's package.
    fn absolute_module(&self, node: &Node<'_>) -> String {
        if node.kind() != RELATIVE_IMPORT {
            return self.text(node).to_string();
        }

        let mut level = 0;
        let mut rest = None;
        for child in named_children(node) {
            match child.kind() {
                IMPORT_PREFIX => level = self.text(&child).matches('.').count(),
                DOTTED_NAME => rest = Some(self.text(&child)),
                _ => {}
            }
        }

        let mut base: Vec<&str> = self.request.module.split('.').collect();
        if !self.request.is_package() {
            base.pop();
        }
        for _ in 1..level {
            base.pop();
        }
        if let Some(rest) = rest {
            base.push(rest);
        }
        base.retain(|part| !part.is_empty());
        base.join(".")
    }

    fn is_static_method(&self, function: &Node<'_>) -> bool {
        let Some(parent) = function.parent() else {
            return false;
        };
        parent.kind() == DECORATED_DEFINITION
            && named_children(&parent)
                .iter()
                .filter(|c| c.kind() == DECORATOR)
                .any(|d| self.text(d).contains("staticmethod"))
    }

    fn function_signature(&self, node: &Node<'_>, name: &str) -> Option<String> {
        let params = node.child_by_field_name("parameters")?;
        let mut signature = format!("{name}({})", self.parameter_list(&params, false));
        if let Some(returns) = node.child_by_field_name("return_type") {
            signature.push_str(" -> ");
            signature.push_str(&collapse_whitespace(self.text(&returns)));
        }
        Some(signature)
    }

    /// `Name(args)` from `__init__`, without the receiver.
    fn class_signature(&self, body: Option<&Node<'_>>, name: &str) -> String {
        let init = body.and_then(|body| {
            named_children(body).into_iter().find_map(|child| {
                let function = match child.kind() {
                    FUNCTION_DEFINITION => child,
                    DECORATED_DEFINITION => child.child_by_field_name("definition")?,
                    _ => return None,
                };
                let is_init = function.kind() == FUNCTION_DEFINITION
                    && function
                        .child_by_field_name("name")
                        .is_some_and(|n| self.text(&n) == "__init__");
                is_init.then_some(function)
            })
        });
        let params = init
            .and_then(|f| f.child_by_field_name("parameters"))
            .map(|p| self.parameter_list(&p, true))
            .unwrap_or_default();
        format!("{name}({params})")
    }

    fn parameter_list(&self, params: &Node<'_>, skip_receiver: bool) -> String {
        named_children(params)
            .iter()
            .filter(|c| c.kind() != COMMENT)
            .skip(usize::from(skip_receiver))
            .map(|c| collapse_whitespace(self.text(c)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Docstring of a module or block: a leading string expression statement.
    fn docstring(&self, block: &Node<'_>) -> Option<String> {
        let first = named_children(block)
            .into_iter()
            .find(|c| c.kind() != COMMENT)?;
        if first.kind() != EXPRESSION_STATEMENT {
            return None;
        }
        let string = first.named_child(0)?;
        if string.kind() != STRING {
            return None;
        }
        let raw: String = named_children(&string)
            .iter()
            .filter(|c| c.kind() == STRING_CONTENT)
            .map(|c| self.text(c))
            .collect();
        let cleaned = clean_docstring(&raw);
        (!cleaned.is_empty()).then_some(cleaned)
    }

    // ========================================================================
    // Pass 2: references
    // ========================================================================

    fn visit_children(&mut self, node: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        for child in named_children(node) {
            self.visit(&child, scope, call_parent);
        }
    }

    fn visit(&mut self, node: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        match node.kind() {
            FUNCTION_DEFINITION => self.visit_function(node, scope, call_parent),
            CLASS_DEFINITION => self.visit_class(node, scope, call_parent),
            DECORATED_DEFINITION => self.visit_decorated(node, scope, call_parent),
            LAMBDA => {
                let inner = self.scope_of_node.get(&node.id()).copied().unwrap_or(scope);
                if let Some(params) = node.child_by_field_name("parameters") {
                    for param in named_children(&params) {
                        self.visit_parameter(&param, scope, call_parent);
                    }
                }
                if let Some(body) = node.child_by_field_name("body") {
                    self.visit(&body, inner, call_parent);
                }
            }
            CALL => self.visit_call(node, scope, call_parent),
            ATTRIBUTE => {
                if let Some(object) = node.child_by_field_name("object") {
                    self.visit(&object, scope, call_parent);
                }
                if let Some(attribute) = node.child_by_field_name("attribute") {
                    let target = self.reference_target(|this| this.resolve_expression(node, scope));
                    self.push_reference(
                        self.text(&attribute).to_string(),
                        node_start(&attribute),
                        target,
                        false,
                        scope,
                        call_parent,
                    );
                }
            }
            IDENTIFIER => {
                let name = self.text(node);
                let target = self.reference_target(|this| this.lookup_target(name, scope));
                self.push_reference(
                    name.to_string(),
                    node_start(node),
                    target,
                    false,
                    scope,
                    call_parent,
                );
            }
            KEYWORD_ARGUMENT => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(&value, scope, call_parent);
                }
            }
            ASSIGNMENT | AUGMENTED_ASSIGNMENT => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.visit_target(&left, scope, call_parent);
                }
                for field in ["type", "right"] {
                    if let Some(child) = node.child_by_field_name(field) {
                        self.visit(&child, scope, call_parent);
                    }
                }
            }
            FOR_STATEMENT | FOR_IN_CLAUSE => {
                if let Some(left) = node.child_by_field_name("left") {
                    self.visit_target(&left, scope, call_parent);
                }
                for child in named_children(node) {
                    if Some(child) != node.child_by_field_name("left") {
                        self.visit(&child, scope, call_parent);
                    }
                }
            }
            NAMED_EXPRESSION => {
                if let Some(value) = node.child_by_field_name("value") {
                    self.visit(&value, scope, call_parent);
                }
            }
            AS_PATTERN => {
                for child in named_children(node) {
                    if child.kind() == AS_PATTERN_TARGET {
                        self.visit_target(&child, scope, call_parent);
                    } else {
                        self.visit(&child, scope, call_parent);
                    }
                }
            }
            LIST_COMPREHENSION | SET_COMPREHENSION | DICTIONARY_COMPREHENSION
            | GENERATOR_EXPRESSION => {
                let inner = self.scope_of_node.get(&node.id()).copied().unwrap_or(scope);
                self.visit_children(node, inner, call_parent);
            }
            IMPORT_STATEMENT | IMPORT_FROM_STATEMENT | FUTURE_IMPORT_STATEMENT
            | GLOBAL_STATEMENT | NONLOCAL_STATEMENT | COMMENT => {}
            _ => self.visit_children(node, scope, call_parent),
        }
    }

    /// Visit an assignment target: bound names are not references, but the
    /// objects and indices of attribute and subscript targets are.
    fn visit_target(&mut self, target: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        match target.kind() {
            IDENTIFIER => {}
            PATTERN_LIST | TUPLE_PATTERN | LIST_PATTERN | TUPLE | LIST | EXPRESSION_LIST
            | PARENTHESIZED_EXPRESSION | LIST_SPLAT_PATTERN | AS_PATTERN_TARGET => {
                for child in named_children(target) {
                    self.visit_target(&child, scope, call_parent);
                }
            }
            ATTRIBUTE => {
                if let Some(object) = target.child_by_field_name("object") {
                    self.visit(&object, scope, call_parent);
                }
            }
            _ => self.visit(target, scope, call_parent),
        }
    }

    fn visit_function(&mut self, node: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        // Defaults and annotations evaluate in the enclosing scope
        if let Some(params) = node.child_by_field_name("parameters") {
            for param in named_children(&params) {
                self.visit_parameter(&param, scope, call_parent);
            }
        }
        if let Some(returns) = node.child_by_field_name("return_type") {
            self.visit(&returns, scope, call_parent);
        }
        let inner = self.scope_of_node.get(&node.id()).copied();
        if let (Some(body), Some(inner)) = (node.child_by_field_name("body"), inner) {
            self.visit(&body, inner, None);
        }
    }

    fn visit_parameter(&mut self, param: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        match param.kind() {
            DEFAULT_PARAMETER | TYPED_DEFAULT_PARAMETER | TYPED_PARAMETER => {
                for field in ["type", "value"] {
                    if let Some(child) = param.child_by_field_name(field) {
                        self.visit(&child, scope, call_parent);
                    }
                }
            }
            _ => {}
        }
    }

    fn visit_class(&mut self, node: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        let class = self.definition_of_node.get(&node.id()).copied();

        if let Some(superclasses) = node.child_by_field_name("superclasses") {
            let mut position = 0;
            for argument in named_children(&superclasses) {
                match argument.kind() {
                    KEYWORD_ARGUMENT | LIST_SPLAT | DICTIONARY_SPLAT | COMMENT => {}
                    _ => {
                        if let Some(class) = class {
                            self.bases.push(RawClassBase {
                                class,
                                name: collapse_whitespace(self.text(&argument)),
                                full_name: self.resolve_expression(&argument, scope),
                                position,
                            });
                        }
                        position += 1;
                    }
                }
                self.visit(&argument, scope, call_parent);
            }
        }

        let inner = self.scope_of_node.get(&node.id()).copied();
        if let (Some(body), Some(inner)) = (node.child_by_field_name("body"), inner) {
            self.visit(&body, inner, None);
        }
    }

    fn visit_decorated(&mut self, node: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        let definition = node.child_by_field_name("definition");
        let target = definition.and_then(|d| self.definition_of_node.get(&d.id()).copied());

        for decorator in named_children(node) {
            if decorator.kind() != DECORATOR {
                continue;
            }
            let Some(expression) = named_children(&decorator)
                .into_iter()
                .find(|c| c.kind() != COMMENT)
            else {
                continue;
            };

            if let Some(target) = target {
                let (callee, arguments) = if expression.kind() == CALL {
                    let arguments = expression
                        .child_by_field_name("arguments")
                        .map(|a| strip_parens(self.text(&a)))
                        .filter(|a| !a.is_empty());
                    (expression.child_by_field_name("function"), arguments)
                } else {
                    (Some(expression), None)
                };
                let name = callee
                    .map(|c| collapse_whitespace(self.text(&c)))
                    .unwrap_or_default();
                let full_name = callee.and_then(|c| self.resolve_expression(&c, scope));
                self.decorators.push(RawDecorator {
                    target,
                    name,
                    full_name,
                    arguments,
                    position: node_start(&decorator),
                });
            }

            self.visit(&expression, scope, call_parent);
        }

        if let Some(definition) = definition {
            self.visit(&definition, scope, call_parent);
        }
    }

    fn visit_call(&mut self, node: &Node<'_>, scope: usize, call_parent: Option<usize>) {
        let Some(function) = node.child_by_field_name("function") else {
            return self.visit_children(node, scope, call_parent);
        };
        let arguments = node.child_by_field_name("arguments");

        let attribute = (function.kind() == ATTRIBUTE)
            .then(|| function.child_by_field_name("attribute"))
            .flatten();

        let index = if function.kind() == IDENTIFIER {
            let name = self.text(&function);
            let target = self.reference_target(|this| this.lookup_target(name, scope));
            let unbound = self.lookup(name, scope).is_none() && !BUILTINS.contains(&name);
            let index = self.push_reference(
                name.to_string(),
                node_start(&function),
                target,
                true,
                scope,
                call_parent,
            );
            self.references[index].unbound_name = unbound;
            index
        } else if let Some(attribute) = attribute {
            // Receiver-chain calls are siblings of this call, not arguments
            if let Some(object) = function.child_by_field_name("object") {
                self.visit(&object, scope, call_parent);
            }
            let target = self.reference_target(|this| this.resolve_expression(&function, scope));
            self.push_reference(
                self.text(&attribute).to_string(),
                node_start(&attribute),
                target,
                true,
                scope,
                call_parent,
            )
        } else {
            self.visit(&function, scope, call_parent);
            let position = arguments.as_ref().map_or_else(|| node_start(node), node_start);
            let name = truncate_chars(&collapse_whitespace(self.text(&function)), MAX_DYNAMIC_NAME_LEN);
            let index = self.push_reference(name, position, None, true, scope, call_parent);
            self.references[index].dynamic_callee = true;
            index
        };

        if let Some(arguments) = arguments {
            self.visit(&arguments, scope, Some(index));
        }
    }

    fn reference_target(&self, resolve: impl FnOnce(&Self) -> Option<String>) -> Option<String> {
        if self.request.resolve_targets {
            resolve(self)
        } else {
            None
        }
    }

    fn push_reference(
        &mut self,
        name: String,
        position: Position,
        target: Option<String>,
        is_call: bool,
        scope: usize,
        call_parent: Option<usize>,
    ) -> usize {
        self.references.push(RawReference {
            name,
            position,
            target,
            is_call,
            dynamic_callee: false,
            unbound_name: false,
            scope: self.scopes[scope].owner,
            call_parent,
        });
        self.references.len() - 1
    }

    // ========================================================================
    // Name lookup
    // ========================================================================

    fn lookup(&self, name: &str, scope: usize) -> Option<&Binding> {
        let mut current = Some(scope);
        while let Some(index) = current {
            let candidate = &self.scopes[index];
            let visible = index == scope || candidate.kind != ScopeKind::Class;
            if visible {
                if candidate.non_local.contains(name) {
                    return self.scopes[MODULE_SCOPE].bindings.get(name);
                }
                if let Some(binding) = candidate.bindings.get(name) {
                    return Some(binding);
                }
            }
            current = candidate.parent;
        }
        None
    }

    fn lookup_target(&self, name: &str, scope: usize) -> Option<String> {
        match self.lookup(name, scope) {
            Some(binding) => binding.full_name.clone(),
            None if BUILTINS.contains(&name) => Some(format!("builtins.{name}")),
            None => None,
        }
    }

    /// Class scope that `name` refers to an instance of, when `name` is the
    /// receiver parameter of an enclosing method.
    fn receiver_class(&self, name: &str, scope: usize) -> Option<usize> {
        let mut current = Some(scope);
        while let Some(index) = current {
            let candidate = &self.scopes[index];
            match candidate.kind {
                ScopeKind::Function => {
                    if let Some((receiver, class_scope)) = &candidate.receiver {
                        if receiver == name {
                            return Some(*class_scope);
                        }
                    }
                    if candidate.bindings.contains_key(name) {
                        return None;
                    }
                }
                ScopeKind::Lambda | ScopeKind::Comprehension => {
                    if candidate.bindings.contains_key(name) {
                        return None;
                    }
                }
                ScopeKind::Class | ScopeKind::Module => return None,
            }
            current = candidate.parent;
        }
        None
    }

    fn resolve_chain(&self, node: &Node<'_>, scope: usize) -> Option<Chain> {
        match node.kind() {
            IDENTIFIER => {
                let name = self.text(node);
                if let Some(class_scope) = self.receiver_class(name, scope) {
                    return Some(Chain::Instance(class_scope));
                }
                match self.lookup(name, scope) {
                    Some(binding) => binding
                        .full_name
                        .clone()
                        .map(|full| Chain::Named(full, binding.kind)),
                    None if BUILTINS.contains(&name) => Some(Chain::Named(
                        format!("builtins.{name}"),
                        BindingKind::Builtin,
                    )),
                    None => None,
                }
            }
            ATTRIBUTE => {
                let object = node.child_by_field_name("object")?;
                let attribute = self.text(&node.child_by_field_name("attribute")?);
                match self.resolve_chain(&object, scope)? {
                    Chain::Instance(class_scope) => {
                        let binding = self.scopes[class_scope].bindings.get(attribute)?;
                        binding
                            .full_name
                            .clone()
                            .map(|full| Chain::Named(full, binding.kind))
                    }
                    Chain::Named(base, kind @ (BindingKind::Import | BindingKind::Class | BindingKind::Builtin)) => {
                        Some(Chain::Named(format!("{base}.{attribute}"), kind))
                    }
                    Chain::Named(..) => None,
                }
            }
            SUBSCRIPT => self.resolve_chain(&node.child_by_field_name("value")?, scope),
            _ => None,
        }
    }

    fn resolve_expression(&self, node: &Node<'_>, scope: usize) -> Option<String> {
        match self.resolve_chain(node, scope)? {
            Chain::Named(full, _) => Some(full),
            Chain::Instance(_) => None,
        }
    }
}

/// Identifier and whole-parameter node for each parameter.
fn parameter_names<'t>(params: &Node<'t>) -> Vec<(Node<'t>, Node<'t>)> {
    named_children(params)
        .into_iter()
        .filter_map(|param| {
            let ident = match param.kind() {
                IDENTIFIER => Some(param),
                DEFAULT_PARAMETER | TYPED_DEFAULT_PARAMETER => param.child_by_field_name("name"),
                TYPED_PARAMETER | LIST_SPLAT_PATTERN | DICTIONARY_SPLAT_PATTERN => {
                    first_identifier(&param)
                }
                _ => None,
            }?;
            (ident.kind() == IDENTIFIER).then_some((ident, param))
        })
        .collect()
}

fn first_identifier<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    named_children(node).into_iter().find_map(|child| match child.kind() {
        IDENTIFIER => Some(child),
        LIST_SPLAT_PATTERN | DICTIONARY_SPLAT_PATTERN => first_identifier(&child),
        _ => None,
    })
}

/// `(name, alias)` nodes of an import item.
fn split_alias<'t>(item: &Node<'t>) -> (Option<Node<'t>>, Option<Node<'t>>) {
    if item.kind() == ALIASED_IMPORT {
        (
            item.child_by_field_name("name"),
            item.child_by_field_name("alias"),
        )
    } else {
        (Some(*item), None)
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max).collect();
        truncated.push_str("...");
        truncated
    }
}

fn strip_parens(text: &str) -> String {
    let inner = text
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text);
    collapse_whitespace(inner)
}

/// Trim a docstring and remove the common indentation of continuation lines.
fn clean_docstring(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };
    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first.trim().to_string()];
    cleaned.extend(rest.iter().map(|line| {
        line.get(indent..)
            .map_or_else(|| line.trim().to_string(), |l| l.trim_end().to_string())
    }));
    cleaned.join("\n").trim().to_string()
}
