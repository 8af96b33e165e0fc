//! Cross-file reference resolution and call-graph derivation.
//!
//! Resolution runs over the whole assembled snapshot at once, so a change in
//! one file is reflected in every other file's references.
//!
//! ## Resolution rules
//!
//! | Provider target | Reference | Result |
//! |-----------------|-----------|--------|
//! | `Some(name)` | any | exact full-name match (following import re-exports), else unresolved |
//! | `None` | call, unbound plain name | the unique function or class with that simple name, else unresolved |
//! | `None` | other | unresolved |
//!
//! Attribute calls on receivers the provider could not type (`items.append()`)
//! never fall back to simple-name matching. Unresolved references stay in the
//! snapshot with null target fields.
//!
//! When a module binds the same full name twice, the later definition wins,
//! as it does at runtime.
//!
//! ## Call order and depth
//!
//! Calls are grouped by caller and sorted by `(line, column, report index)`.
//! A call nested in another call's argument list is that call's child.
//! Depth is 1 for roots and parent depth + 1 otherwise. Order is a post-order
//! walk (children first, siblings by position), which is evaluation order:
//! in `g(h())`, `h` gets order 1 and `g` order 2.

use std::collections::HashMap;

use tracing::{debug, trace, warn};

use crate::snapshot::Assembled;
use crate::types::{Call, CallId, Definition, DefinitionId, DefinitionKind, Position};

/// Re-export chains longer than this are treated as unresolvable.
const MAX_ALIAS_HOPS: usize = 8;

/// Project-wide lookup of definitions by name.
///
/// Built once per run from an assembled snapshot and only read afterwards.
#[derive(Debug, Default)]
pub struct SymbolIndex {
    by_full_name: HashMap<String, Vec<usize>>,
    by_simple_name: HashMap<String, Vec<usize>>,
    /// `module.name` bound by an import → the imported full name
    aliases: HashMap<String, String>,
    definitions: Vec<(DefinitionId, DefinitionKind, String)>,
    paths: HashMap<DefinitionId, String>,
}

impl SymbolIndex {
    /// Index every definition of an assembled snapshot.
    #[must_use]
    pub fn build(assembled: &Assembled) -> Self {
        let tables = &assembled.tables;
        let mut index = Self::default();

        let file_paths: HashMap<_, _> = tables.files.iter().map(|f| (f.id, f.path.as_str())).collect();
        let mut module_of_file = HashMap::new();

        for (position, def) in tables.definitions.iter().enumerate() {
            index
                .by_full_name
                .entry(def.full_name.clone())
                .or_default()
                .push(position);
            index
                .by_simple_name
                .entry(def.name.clone())
                .or_default()
                .push(position);
            index
                .definitions
                .push((def.id, def.kind, def.full_name.clone()));
            if let Some(path) = file_paths.get(&def.file_id) {
                index.paths.insert(def.id, (*path).to_string());
            }
            if def.kind == DefinitionKind::Module {
                module_of_file.entry(def.file_id).or_insert(def.full_name.as_str());
            }
        }

        for import in &tables.imports {
            let Some(module) = module_of_file.get(&import.file_id) else {
                continue;
            };
            let (bound, target) = match (&import.name, &import.alias) {
                (Some(name), _) if name == "*" => continue,
                (Some(name), alias) => (
                    alias.clone().unwrap_or_else(|| name.clone()),
                    format!("{}.{name}", import.module),
                ),
                (None, Some(alias)) => (alias.clone(), import.module.clone()),
                (None, None) => continue,
            };
            index
                .aliases
                .entry(format!("{module}.{bound}"))
                .or_insert(target);
        }

        debug!(
            definitions = index.definitions.len(),
            aliases = index.aliases.len(),
            "Built symbol index"
        );
        index
    }

    /// Number of indexed definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Definition with exactly this full name, following import re-exports.
    ///
    /// When several definitions share a full name the last one wins.
    #[must_use]
    pub fn lookup_full(&self, full_name: &str) -> Option<usize> {
        let mut current = full_name.to_string();
        for _ in 0..MAX_ALIAS_HOPS {
            if let Some(found) = self.by_full_name.get(&current).and_then(|ids| ids.last()) {
                return Some(*found);
            }
            current = self.rewrite_alias(&current)?;
        }
        None
    }

    /// Replace the longest aliased prefix of `name` with its import target.
    fn rewrite_alias(&self, name: &str) -> Option<String> {
        let mut prefix = name;
        loop {
            if let Some(target) = self.aliases.get(prefix) {
                return Some(format!("{target}{}", &name[prefix.len()..]));
            }
            prefix = prefix.rsplit_once('.')?.0;
        }
    }

    /// The only definition with this simple name among `kinds`.
    #[must_use]
    pub fn unique_simple(&self, name: &str, kinds: &[DefinitionKind]) -> Option<usize> {
        let mut candidates = self
            .by_simple_name
            .get(name)?
            .iter()
            .filter(|&&i| kinds.contains(&self.definitions[i].1));
        let first = candidates.next()?;
        candidates.next().is_none().then_some(*first)
    }

    fn id(&self, index: usize) -> DefinitionId {
        self.definitions[index].0
    }

    fn kind(&self, index: usize) -> DefinitionKind {
        self.definitions[index].1
    }

    fn full_name(&self, index: usize) -> &str {
        &self.definitions[index].2
    }

    fn path(&self, index: usize) -> Option<&str> {
        self.paths.get(&self.id(index)).map(String::as_str)
    }
}

/// Outcome counts of a resolution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolutionStats {
    /// References with a target
    pub resolved: usize,
    /// References left without a target
    pub unresolved: usize,
    /// Call rows produced
    pub calls: usize,
}

/// A call within one caller, for numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallNode {
    /// Position of the call
    pub position: Position,
    /// Provider report index, the final tie-breaker
    pub report: usize,
    /// Index (into the same slice) of the call whose argument list holds this one
    pub parent: Option<usize>,
}

/// Execution order and nesting depth of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallRank {
    /// 1-based order within the caller
    pub order: u32,
    /// 1 for statement-level calls
    pub depth: u32,
}

/// Number the calls of one caller.
///
/// The result is aligned with `nodes`. Orders cover `1..=nodes.len()`
/// exactly once; parent links that point outside the slice or form a cycle
/// are treated as absent.
#[must_use]
pub fn rank_calls(nodes: &[CallNode]) -> Vec<CallRank> {
    let count = nodes.len();
    let mut sorted: Vec<usize> = (0..count).collect();
    sorted.sort_by_key(|&i| (nodes[i].position, nodes[i].report));

    let mut children = vec![Vec::new(); count];
    let mut roots = Vec::new();
    for &i in &sorted {
        match nodes[i].parent.filter(|&p| p < count && p != i) {
            Some(parent) => children[parent].push(i),
            None => roots.push(i),
        }
    }

    let mut ranks = vec![CallRank::default(); count];
    let mut visited = vec![false; count];
    let mut next_order = 1;

    // Nodes unreachable from a root (cycles) start their own walk
    for &start in roots.iter().chain(&sorted) {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        ranks[start].depth = 1;
        let mut stack = vec![(start, 0usize)];

        while let Some(&(node, cursor)) = stack.last() {
            if let Some(&child) = children[node].get(cursor) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if !visited[child] {
                    visited[child] = true;
                    ranks[child].depth = ranks[node].depth + 1;
                    stack.push((child, 0));
                }
            } else {
                ranks[node].order = next_order;
                next_order += 1;
                stack.pop();
            }
        }
    }
    ranks
}

/// Resolves references against a [`SymbolIndex`] and derives `Call` rows.
#[derive(Debug)]
pub struct ReferenceResolver<'a> {
    index: &'a SymbolIndex,
}

impl<'a> ReferenceResolver<'a> {
    /// Create a resolver over `index`.
    #[must_use]
    pub fn new(index: &'a SymbolIndex) -> Self {
        Self { index }
    }

    /// Resolve an assembled snapshot in place.
    ///
    /// Decorators and class bases are always resolved. References and calls
    /// only when `resolve_refs` is set; otherwise every target is cleared and
    /// no call rows are produced.
    pub fn resolve(&self, assembled: &mut Assembled, resolve_refs: bool) -> ResolutionStats {
        self.resolve_decorators(assembled);
        self.resolve_bases(assembled);

        let tables = &mut assembled.tables;
        tables.calls.clear();

        if !resolve_refs {
            for reference in &mut tables.references {
                reference.target_full_name = None;
                reference.target_module_path = None;
                reference.call_order = None;
                reference.call_depth = None;
            }
            debug!("Reference resolution disabled");
            return ResolutionStats {
                unresolved: tables.references.len(),
                ..ResolutionStats::default()
            };
        }

        let mut stats = ResolutionStats::default();
        let mut targets = Vec::with_capacity(tables.references.len());

        for (reference, site) in tables.references.iter_mut().zip(&assembled.sites) {
            let target = match &site.target {
                Some(full_name) => self.index.lookup_full(full_name),
                None if reference.is_call && site.unbound_name => self
                    .index
                    .unique_simple(&reference.name, &[DefinitionKind::Function, DefinitionKind::Class]),
                None => None,
            };

            match target {
                Some(index) => {
                    reference.target_full_name = Some(self.index.full_name(index).to_string());
                    reference.target_module_path = self.index.path(index).map(str::to_string);
                    stats.resolved += 1;
                }
                None => {
                    reference.target_full_name = None;
                    reference.target_module_path = None;
                    stats.unresolved += 1;
                    trace!(
                        name = %reference.name,
                        line = reference.line,
                        hint = ?site.target,
                        "Unresolved reference"
                    );
                }
            }
            targets.push(target);
        }

        stats.calls = self.derive_calls(assembled, &targets);
        debug!(
            resolved = stats.resolved,
            unresolved = stats.unresolved,
            calls = stats.calls,
            "Resolved references"
        );
        stats
    }

    fn derive_calls(&self, assembled: &mut Assembled, targets: &[Option<usize>]) -> usize {
        let tables = &mut assembled.tables;
        let sites = &assembled.sites;

        let mut by_caller: HashMap<DefinitionId, Vec<usize>> = HashMap::new();
        for (i, reference) in tables.references.iter().enumerate() {
            if !reference.is_call {
                continue;
            }
            match sites[i].caller {
                Some(caller) => by_caller.entry(caller).or_default().push(i),
                None => warn!(
                    name = %reference.name,
                    line = reference.line,
                    "Call has no owning definition, skipping"
                ),
            }
        }

        let mut ranks: HashMap<usize, CallRank> = HashMap::new();
        for members in by_caller.values() {
            let slot: HashMap<usize, usize> =
                members.iter().enumerate().map(|(slot, &r)| (r, slot)).collect();
            let nodes: Vec<CallNode> = members
                .iter()
                .map(|&r| CallNode {
                    position: Position::new(tables.references[r].line, tables.references[r].column),
                    report: r,
                    parent: sites[r].call_parent.and_then(|p| slot.get(&p).copied()),
                })
                .collect();
            for (&r, rank) in members.iter().zip(rank_calls(&nodes)) {
                ranks.insert(r, rank);
            }
        }

        let callers: HashMap<DefinitionId, &Definition> =
            tables.definitions.iter().map(|d| (d.id, d)).collect();
        let mut calls = Vec::with_capacity(ranks.len());

        for (i, reference) in tables.references.iter().enumerate() {
            let (Some(rank), Some(caller)) = (ranks.get(&i), sites[i].caller) else {
                continue;
            };
            let Some(caller_def) = callers.get(&caller) else {
                continue;
            };
            let target = targets[i];
            calls.push(Call {
                id: CallId(i64::try_from(calls.len() + 1).unwrap_or(i64::MAX)),
                file_id: reference.file_id,
                reference_id: reference.id,
                caller_id: caller,
                caller_full_name: caller_def.full_name.clone(),
                callee_name: (!sites[i].dynamic_callee).then(|| reference.name.clone()),
                callee_full_name: target.map(|t| self.index.full_name(t).to_string()),
                callee_id: target.map(|t| self.index.id(t)),
                line: reference.line,
                column: reference.column,
                context: reference.context.clone(),
                call_order: rank.order,
                call_depth: rank.depth,
            });
        }

        for (i, reference) in tables.references.iter_mut().enumerate() {
            if let Some(rank) = ranks.get(&i) {
                reference.call_order = Some(rank.order);
                reference.call_depth = Some(rank.depth);
            } else {
                reference.call_order = None;
                reference.call_depth = None;
            }
        }

        let count = calls.len();
        tables.calls = calls;
        count
    }

    fn resolve_decorators(&self, assembled: &mut Assembled) {
        for decorator in &mut assembled.tables.decorators {
            let found = match &decorator.full_name {
                Some(full_name) => self.index.lookup_full(full_name),
                // `@app.route` names an attribute of something untyped
                None if decorator.name.contains('.') => None,
                None => self
                    .index
                    .unique_simple(&decorator.name, &[DefinitionKind::Function, DefinitionKind::Class]),
            };
            if let Some(index) = found {
                decorator.full_name = Some(self.index.full_name(index).to_string());
            }
        }
    }

    fn resolve_bases(&self, assembled: &mut Assembled) {
        for base in &mut assembled.tables.class_bases {
            let found = match &base.base_full_name {
                Some(full_name) => self
                    .index
                    .lookup_full(full_name)
                    .filter(|&i| self.index.kind(i) == DefinitionKind::Class),
                None if base.base_name.contains('.') => None,
                None => self.index.unique_simple(&base.base_name, &[DefinitionKind::Class]),
            };
            if let Some(index) = found {
                base.base_id = Some(self.index.id(index));
                base.base_full_name = Some(self.index.full_name(index).to_string());
            } else {
                base.base_id = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractionAdapter, ExtractionSet};
    use crate::provider::PythonProvider;
    use crate::scanner::ScannedFile;
    use crate::snapshot::assemble;
    use chrono::Utc;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn extract(files: &[(&str, &str)]) -> (tempfile::TempDir, ExtractionSet) {
        let dir = tempfile::tempdir().expect("tempdir");
        let scanned: Vec<ScannedFile> = files
            .iter()
            .map(|(path, content)| {
                let abs_path = dir.path().join(path);
                std::fs::create_dir_all(abs_path.parent().expect("parent")).expect("mkdir");
                std::fs::write(&abs_path, content).expect("write");
                ScannedFile {
                    path: (*path).to_string(),
                    abs_path,
                }
            })
            .collect();
        let adapter = ExtractionAdapter::new(Arc::new(PythonProvider::new()), true);
        let set = adapter.extract_all(&scanned);
        (dir, set)
    }

    fn resolved(files: &[(&str, &str)]) -> Assembled {
        let (_dir, set) = extract(files);
        let mut assembled = assemble(set, Utc::now());
        let index = SymbolIndex::build(&assembled);
        ReferenceResolver::new(&index).resolve(&mut assembled, true);
        assembled
    }

    fn call<'a>(assembled: &'a Assembled, callee: &str) -> &'a Call {
        assembled
            .tables
            .calls
            .iter()
            .find(|c| c.callee_name.as_deref() == Some(callee))
            .unwrap_or_else(|| panic!("no call to {callee}"))
    }

    fn node(line: u32, column: u32, parent: Option<usize>) -> CallNode {
        CallNode {
            position: Position::new(line, column),
            report: 0,
            parent,
        }
    }

    #[test]
    fn arguments_are_numbered_before_their_call() {
        // g(h())
        let ranks = rank_calls(&[node(1, 0, None), node(1, 2, Some(0))]);
        assert_eq!(ranks[0], CallRank { order: 2, depth: 1 });
        assert_eq!(ranks[1], CallRank { order: 1, depth: 2 });
    }

    #[test]
    fn siblings_follow_source_position() {
        // report order differs from position order
        let ranks = rank_calls(&[node(3, 0, None), node(1, 0, None), node(2, 0, None)]);
        let orders: Vec<u32> = ranks.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![3, 1, 2]);
    }

    #[test]
    fn cyclic_parent_links_still_number_every_call() {
        let ranks = rank_calls(&[node(1, 0, Some(1)), node(1, 2, Some(0))]);
        let mut orders: Vec<u32> = ranks.iter().map(|r| r.order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn scenario_nested_call_order_and_depth() {
        let assembled = resolved(&[
            ("a.py", "from b import g, h\n\ndef f():\n    return g(h())\n"),
            ("b.py", "def g(x):\n    return x\n\ndef h():\n    return 1\n"),
        ]);

        let h = call(&assembled, "h");
        let g = call(&assembled, "g");
        assert_eq!(h.callee_full_name.as_deref(), Some("b.h"));
        assert_eq!((h.call_order, h.call_depth), (1, 2));
        assert_eq!(g.callee_full_name.as_deref(), Some("b.g"));
        assert_eq!((g.call_order, g.call_depth), (2, 1));
        assert_eq!(g.caller_full_name, "a.f");
    }

    #[test]
    fn unique_simple_name_resolves_unimported_calls() {
        let assembled = resolved(&[
            ("a.py", "def f():\n    helper()\n"),
            ("b.py", "def helper():\n    pass\n"),
        ]);
        let helper = call(&assembled, "helper");
        assert_eq!(helper.callee_full_name.as_deref(), Some("b.helper"));
    }

    #[test]
    fn ambiguous_simple_names_stay_unresolved() {
        let assembled = resolved(&[
            ("a.py", "def f():\n    helper()\n"),
            ("b.py", "def helper():\n    pass\n"),
            ("c.py", "def helper():\n    pass\n"),
        ]);
        let helper = call(&assembled, "helper");
        assert_eq!(helper.callee_full_name, None);
        assert_eq!(helper.callee_id, None);
    }

    #[test]
    fn attribute_calls_on_untyped_receivers_stay_unresolved() {
        let assembled = resolved(&[
            ("a.py", "def f(items):\n    items.append(1)\n    return ' x '.strip()\n"),
            ("b.py", "def append(x):\n    pass\n\ndef strip():\n    pass\n"),
        ]);

        for name in ["append", "strip"] {
            let found = call(&assembled, name);
            assert_eq!(found.callee_full_name, None, "{name} must not resolve to b.{name}");
            assert_eq!(found.callee_id, None);
        }
        assert!(
            assembled
                .tables
                .references
                .iter()
                .filter(|r| r.name == "append" || r.name == "strip")
                .all(|r| r.target_full_name.is_none())
        );
    }

    #[test]
    fn locally_bound_names_do_not_match_other_modules() {
        let assembled = resolved(&[
            ("a.py", "def f(append):\n    append(1)\n"),
            ("b.py", "def append(x):\n    pass\n"),
        ]);
        assert_ne!(
            call(&assembled, "append").callee_full_name.as_deref(),
            Some("b.append")
        );
    }

    #[test]
    fn dotted_decorators_and_bases_do_not_match_by_simple_name() {
        let assembled = resolved(&[
            ("views.py", "import flask\napp = flask.Flask()\n\n@app.route('/')\nclass Index(flask.View):\n    pass\n"),
            ("other.py", "def route(path):\n    pass\n\nclass View:\n    pass\n"),
        ]);
        let decorator = &assembled.tables.decorators[0];
        assert_ne!(decorator.full_name.as_deref(), Some("other.route"));
        let base = &assembled.tables.class_bases[0];
        assert_eq!(base.base_id, None);
    }

    #[test]
    fn redefinition_resolves_to_the_last_binding() {
        let assembled = resolved(&[(
            "a.py",
            "def f():\n    return 1\n\ndef f():\n    return 2\n\ndef main():\n    f()\n",
        )]);
        let last = assembled
            .tables
            .definitions
            .iter()
            .filter(|d| d.full_name == "a.f")
            .max_by_key(|d| d.line)
            .expect("second f");

        let f = call(&assembled, "f");
        assert_eq!(f.callee_full_name.as_deref(), Some("a.f"));
        assert_eq!(f.callee_id, Some(last.id));
        assert_eq!(last.line, 4);
    }

    #[test]
    fn external_targets_are_unresolved() {
        let assembled = resolved(&[("a.py", "import os\n\ndef f(p):\n    os.path.join(p)\n")]);
        let join = call(&assembled, "join");
        assert_eq!(join.callee_full_name, None);

        let reference = assembled
            .tables
            .references
            .iter()
            .find(|r| r.name == "join")
            .expect("join reference");
        assert_eq!(reference.target_full_name, None);
        assert_eq!(reference.target_module_path, None);
    }

    #[test]
    fn re_exports_are_followed() {
        let assembled = resolved(&[
            ("app.py", "from pkg import run\n\ndef main():\n    run()\n"),
            ("pkg/__init__.py", "from .core import run\n"),
            ("pkg/core.py", "def run():\n    pass\n"),
        ]);
        let run = call(&assembled, "run");
        assert_eq!(run.callee_full_name.as_deref(), Some("pkg.core.run"));
    }

    #[test]
    fn module_level_calls_belong_to_the_module() {
        let assembled = resolved(&[("main.py", "print('a')\nprint('b')\n")]);
        let orders: Vec<(String, u32)> = assembled
            .tables
            .calls
            .iter()
            .map(|c| (c.caller_full_name.clone(), c.call_order))
            .collect();
        assert_eq!(orders, vec![("main".to_string(), 1), ("main".to_string(), 2)]);
    }

    #[test]
    fn dynamic_callees_have_no_name_but_are_numbered() {
        let assembled = resolved(&[("a.py", "def f(handlers, key):\n    handlers[key](g())\n")]);
        let calls = &assembled.tables.calls;
        assert_eq!(calls.len(), 2);
        let dynamic = calls.iter().find(|c| c.callee_name.is_none()).expect("dynamic call");
        assert_eq!((dynamic.call_order, dynamic.call_depth), (2, 1));
    }

    #[test]
    fn bases_and_decorators_resolve_across_files() {
        let assembled = resolved(&[
            ("models.py", "class Base:\n    pass\n\ndef register(cls):\n    return cls\n"),
            (
                "user.py",
                "from models import Base, register\n\n@register\nclass User(Base):\n    pass\n",
            ),
        ]);
        let base = &assembled.tables.class_bases[0];
        assert_eq!(base.base_full_name.as_deref(), Some("models.Base"));
        assert!(base.base_id.is_some());

        let decorator = &assembled.tables.decorators[0];
        assert_eq!(decorator.full_name.as_deref(), Some("models.register"));
    }

    #[test]
    fn disabled_resolution_clears_targets_and_calls() {
        let (_dir, set) = extract(&[("a.py", "def g():\n    pass\n\ndef f():\n    g()\n")]);
        let mut assembled = assemble(set, Utc::now());
        let index = SymbolIndex::build(&assembled);

        let stats = ReferenceResolver::new(&index).resolve(&mut assembled, false);

        assert_eq!(stats.calls, 0);
        assert!(assembled.tables.calls.is_empty());
        assert!(
            assembled
                .tables
                .references
                .iter()
                .all(|r| r.target_full_name.is_none() && r.call_order.is_none())
        );
    }

    /// Random call forests: each node's parent is an earlier node or none.
    fn call_forest() -> impl Strategy<Value = Vec<CallNode>> {
        prop::collection::vec((1u32..20, 0u32..80, prop::option::of(0usize..64)), 0..64).prop_map(
            |raw| {
                raw.into_iter()
                    .enumerate()
                    .map(|(i, (line, column, parent))| CallNode {
                        position: Position::new(line, column),
                        report: i,
                        parent: parent.filter(|&p| p < i),
                    })
                    .collect()
            },
        )
    }

    proptest! {
        #[test]
        fn orders_are_dense(nodes in call_forest()) {
            let ranks = rank_calls(&nodes);
            let mut orders: Vec<u32> = ranks.iter().map(|r| r.order).collect();
            orders.sort_unstable();
            let expected: Vec<u32> = (1..=u32::try_from(nodes.len()).expect("small")).collect();
            prop_assert_eq!(orders, expected);
        }

        #[test]
        fn children_are_one_deeper_and_numbered_first(nodes in call_forest()) {
            let ranks = rank_calls(&nodes);
            for (i, node) in nodes.iter().enumerate() {
                match node.parent {
                    Some(parent) => {
                        prop_assert_eq!(ranks[i].depth, ranks[parent].depth + 1);
                        prop_assert!(ranks[i].order < ranks[parent].order);
                    }
                    None => prop_assert_eq!(ranks[i].depth, 1),
                }
            }
        }
    }
}
