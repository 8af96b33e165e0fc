//! Integration tests for the indexing pipeline.
//!
//! workspace → scanner → provider → resolver → snapshot → `query.db`

use std::fs;

use sextant::{Call, IndexOptions, RunOutcome, Sextant, Snapshot};
use tempfile::TempDir;

/// Create a temporary project with the given files.
/// Returns the temp directory (must be kept alive) and the Sextant instance.
fn workspace_with_files(files: &[(&str, &str)]) -> (TempDir, Sextant) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");

    for (path, content) in files {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("failed to write file");
    }

    let sextant = Sextant::open(dir.path()).expect("failed to open Sextant");
    (dir, sextant)
}

fn index(sextant: &mut Sextant) -> RunOutcome {
    sextant
        .index(&IndexOptions::default())
        .expect("index failed")
}

fn snapshot(sextant: &Sextant) -> Snapshot {
    sextant
        .load_snapshot()
        .expect("load failed")
        .expect("snapshot published")
}

fn call_to<'a>(snapshot: &'a Snapshot, callee: &str) -> &'a Call {
    snapshot
        .tables
        .calls
        .iter()
        .find(|c| c.callee_name.as_deref() == Some(callee))
        .unwrap_or_else(|| panic!("no call to {callee}"))
}

// ============================================================================
// Basic indexing
// ============================================================================

#[test]
fn empty_workspace_publishes_an_empty_snapshot() {
    let (_dir, mut sextant) = workspace_with_files(&[]);

    let outcome = index(&mut sextant);

    let stats = outcome.stats().expect("first run writes");
    assert_eq!(stats.files_indexed, 0);
    assert_eq!(stats.generation, 1);
    assert!(stats.errors.is_empty());
}

#[test]
fn definitions_are_nested_under_their_module() {
    let (_dir, mut sextant) = workspace_with_files(&[(
        "shop/cart.py",
        r#"
class Cart:
    """A shopping cart."""

    def add(self, item):
        self.items.append(item)
"#,
    )]);

    index(&mut sextant);
    let snapshot = snapshot(&sextant);
    let defs = &snapshot.tables.definitions;

    let module = defs
        .iter()
        .find(|d| d.full_name == "shop.cart")
        .expect("module definition");
    let class = defs
        .iter()
        .find(|d| d.full_name == "shop.cart.Cart")
        .expect("class definition");
    let method = defs
        .iter()
        .find(|d| d.full_name == "shop.cart.Cart.add")
        .expect("method definition");

    assert_eq!(class.parent_id, Some(module.id));
    assert_eq!(method.parent_id, Some(class.id));
    assert_eq!(class.docstring.as_deref(), Some("A shopping cart."));
    assert!(class.search_text.contains("shopping cart"));
}

#[test]
fn files_outside_scope_are_not_indexed() {
    let (_dir, mut sextant) = workspace_with_files(&[
        ("app.py", "x = 1\n"),
        ("notes.txt", "not python\n"),
        ("__pycache__/app.py", "x = 2\n"),
        (".venv/lib/site.py", "y = 3\n"),
    ]);

    index(&mut sextant);
    let paths: Vec<String> = snapshot(&sextant)
        .tables
        .files
        .iter()
        .map(|f| f.path.clone())
        .collect();

    assert_eq!(paths, vec!["app.py".to_string()]);
}

// ============================================================================
// Call graph
// ============================================================================

#[test]
fn nested_call_is_ordered_before_its_enclosing_call() {
    let (_dir, mut sextant) = workspace_with_files(&[
        ("a.py", "from b import g, h\n\ndef f():\n    return g(h())\n"),
        ("b.py", "def g(x):\n    return x\n\ndef h():\n    return 1\n"),
    ]);

    index(&mut sextant);
    let snapshot = snapshot(&sextant);

    let h = call_to(&snapshot, "h");
    assert_eq!(h.caller_full_name, "a.f");
    assert_eq!(h.callee_full_name.as_deref(), Some("b.h"));
    assert_eq!((h.call_order, h.call_depth), (1, 2));

    let g = call_to(&snapshot, "g");
    assert_eq!(g.callee_full_name.as_deref(), Some("b.g"));
    assert_eq!((g.call_order, g.call_depth), (2, 1));
}

#[test]
fn call_orders_are_dense_per_caller() {
    let (_dir, mut sextant) = workspace_with_files(&[(
        "work.py",
        r#"
def step(x):
    return x

def run(items):
    step(step(1))
    for item in items:
        step(item)
    print(len(items), step(2))

print(run([]))
"#,
    )]);

    index(&mut sextant);
    let snapshot = snapshot(&sextant);

    let mut by_caller: std::collections::BTreeMap<&str, Vec<u32>> = Default::default();
    for call in &snapshot.tables.calls {
        by_caller
            .entry(call.caller_full_name.as_str())
            .or_default()
            .push(call.call_order);
    }
    assert_eq!(by_caller.len(), 2);
    for (caller, mut orders) in by_caller {
        orders.sort_unstable();
        let expected: Vec<u32> = (1..=u32::try_from(orders.len()).expect("fits")).collect();
        assert_eq!(orders, expected, "orders of {caller} must be 1..=N");
    }
}

#[test]
fn unresolved_external_calls_are_preserved() {
    let (_dir, mut sextant) = workspace_with_files(&[(
        "paths.py",
        "import os\n\ndef build(a, b):\n    return os.path.join(a, b)\n",
    )]);

    let outcome = index(&mut sextant);
    let snapshot = snapshot(&sextant);

    let join = call_to(&snapshot, "join");
    assert_eq!(join.callee_full_name, None);
    assert_eq!(join.callee_id, None);
    assert_eq!(join.caller_full_name, "paths.build");

    let reference = snapshot
        .tables
        .references
        .iter()
        .find(|r| r.name == "join")
        .expect("join reference");
    assert!(reference.is_call);
    assert_eq!(reference.target_full_name, None);
    assert!(outcome.stats().expect("written").unresolved_references >= 1);
}

#[test]
fn no_resolve_mode_keeps_facts_and_drops_the_call_graph() {
    let files = [
        ("a.py", "from b import helper\n\n@helper\ndef f():\n    helper()\n"),
        ("b.py", "def helper(fn=None):\n    return fn\n"),
    ];
    let (_resolved_dir, mut resolved) = workspace_with_files(&files);
    let (_plain_dir, mut plain) = workspace_with_files(&files);

    index(&mut resolved);
    plain
        .index(&IndexOptions {
            force: false,
            resolve_refs: false,
        })
        .expect("index failed");

    let with = snapshot(&resolved);
    let without = snapshot(&plain);

    assert!(!with.tables.calls.is_empty());
    assert!(without.tables.calls.is_empty());
    assert!(
        without
            .tables
            .references
            .iter()
            .all(|r| r.target_full_name.is_none() && r.call_order.is_none())
    );
    assert!(!without.meta.resolve_refs);

    let names = |s: &Snapshot| -> Vec<String> {
        s.tables
            .definitions
            .iter()
            .map(|d| d.full_name.clone())
            .collect()
    };
    assert_eq!(names(&with), names(&without));
    assert_eq!(with.tables.imports.len(), without.tables.imports.len());
    assert_eq!(with.tables.decorators.len(), without.tables.decorators.len());
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn broken_file_is_reported_and_others_are_indexed() {
    let (_dir, mut sextant) = workspace_with_files(&[
        ("good.py", "def ok():\n    pass\n"),
        ("broken.py", "def oops(:\n    pass\n"),
    ]);

    let outcome = index(&mut sextant);
    let stats = outcome.stats().expect("written");

    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.files_failed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert!(stats.errors[0].path.ends_with("broken.py"));

    let meta = sextant.stats().expect("stats").expect("published");
    assert_eq!(meta.failed_files.len(), 1);
    assert_eq!(meta.failed_files[0].path, "broken.py");
}

#[test]
fn unchanged_broken_file_does_not_force_a_reindex() {
    let (_dir, mut sextant) = workspace_with_files(&[
        ("good.py", "def ok():\n    pass\n"),
        ("broken.py", "def oops(:\n    pass\n"),
    ]);

    index(&mut sextant);
    let second = index(&mut sextant);

    assert!(
        matches!(second, RunOutcome::Unchanged { .. }),
        "a failed file with the same content is not a change"
    );
}

#[test]
fn non_utf8_file_is_an_encoding_error() {
    let (dir, mut sextant) = workspace_with_files(&[("good.py", "x = 1\n")]);
    fs::write(dir.path().join("latin1.py"), b"name = '\xe9t\xe9'\n").expect("write");

    let outcome = index(&mut sextant);
    let stats = outcome.stats().expect("written");

    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.errors.len(), 1);
    assert_eq!(stats.errors[0].kind, sextant::IndexErrorKind::EncodingError);
}
