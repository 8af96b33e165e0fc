//! Integration tests for the query engine over an indexed project.

use std::fs;

use rstest::rstest;
use sextant::{
    DefinitionKind, Error, ExportFormat, ExportTable, IndexOptions, MAX_INHERITANCE_DEPTH,
    QueryEngine, SearchOptions, Sextant,
};
use tempfile::TempDir;

const PROJECT: &[(&str, &str)] = &[
    (
        "billing/invoice.py",
        r#"
from billing.tax import compute_tax


class InvoiceBuilder:
    """Builds invoices from order lines."""

    def build(self, lines):
        total = sum_lines(lines)
        return self._finish(total + compute_tax(total))

    def _finish(self, amount):
        return round(amount, 2)


def sum_lines(lines):
    return sum(line.price for line in lines)
"#,
    ),
    (
        "billing/tax.py",
        r#"
RATE = 0.2


def compute_tax(amount):
    """Apply the flat tax rate."""
    return amount * RATE
"#,
    ),
];

const HIERARCHY: &[(&str, &str)] = &[
    (
        "docs/base.py",
        r#"
class Document:
    """Anything that can be rendered."""

    def render(self):
        return ""

    def title(self):
        return self.render()


class Printable:
    pass
"#,
    ),
    (
        "docs/pdf.py",
        r#"
from docs.base import Document, Printable


class Pdf(Document, Printable):
    def render(self):
        return "pdf"


class SignedPdf(Pdf, Exception):
    pass


def make():
    return SignedPdf()
"#,
    ),
];

fn index_files(files: &[(&str, &str)]) -> (TempDir, Sextant) {
    let dir = tempfile::tempdir().expect("should create temp dir");
    for (path, content) in files {
        let full_path = dir.path().join(path);
        fs::create_dir_all(full_path.parent().expect("parent")).expect("mkdir");
        fs::write(&full_path, content).expect("write");
    }
    let mut sextant = Sextant::open(dir.path()).expect("open");
    sextant.index(&IndexOptions::default()).expect("index");
    (dir, sextant)
}

fn indexed_project() -> (TempDir, QueryEngine) {
    let (dir, sextant) = index_files(PROJECT);
    let engine = sextant.query().expect("query engine");
    (dir, engine)
}

fn class_names(hits: &[sextant::DefinitionHit]) -> Vec<&str> {
    hits.iter().map(|h| h.definition.full_name.as_str()).collect()
}

#[rstest]
#[case("InvoiceBuilder", "billing.invoice.InvoiceBuilder")]
#[case("compute_tax", "billing.tax.compute_tax")]
#[case("compute", "billing.tax.compute_tax")]
#[case("sum", "billing.invoice.sum_lines")]
fn search_ranks_the_expected_definition_first(#[case] query: &str, #[case] expected: &str) {
    let (_dir, engine) = indexed_project();

    let hits = engine
        .search(query, &SearchOptions::default())
        .expect("search");

    assert_eq!(
        hits.first().map(|h| h.definition.full_name.as_str()),
        Some(expected)
    );
}

#[test]
fn search_hides_private_names_unless_asked() {
    let (_dir, engine) = indexed_project();

    let public = engine
        .search("finish", &SearchOptions::default())
        .expect("search");
    assert!(public.iter().all(|h| h.definition.name != "_finish"));

    let all = engine
        .search(
            "finish",
            &SearchOptions {
                include_private: true,
                ..SearchOptions::default()
            },
        )
        .expect("search");
    assert!(
        all.iter()
            .any(|h| h.definition.full_name == "billing.invoice.InvoiceBuilder._finish")
    );
}

#[test]
fn search_filters_by_kind() {
    let (_dir, engine) = indexed_project();

    let classes = engine
        .search(
            "invoice",
            &SearchOptions {
                kind: Some(DefinitionKind::Class),
                ..SearchOptions::default()
            },
        )
        .expect("search");

    assert!(!classes.is_empty());
    assert!(classes.iter().all(|h| h.definition.kind == DefinitionKind::Class));
}

#[test]
fn call_tree_follows_execution_order_and_expands_callees() {
    let (_dir, engine) = indexed_project();
    let build = engine
        .get_definition("billing.invoice.InvoiceBuilder.build")
        .expect("lookup")
        .expect("build exists");

    let tree = engine.calls(build.definition.id, 2, false).expect("calls");
    let order: Vec<(Option<&str>, u32)> = tree
        .iter()
        .map(|e| (e.call.callee_name.as_deref(), e.call.call_order))
        .collect();
    assert_eq!(
        order,
        vec![
            (Some("sum_lines"), 1),
            (Some("compute_tax"), 2),
            (Some("_finish"), 3),
        ]
    );

    let sum_lines = &tree[0];
    assert_eq!(
        sum_lines.call.callee_full_name.as_deref(),
        Some("billing.invoice.sum_lines")
    );
    assert_eq!(sum_lines.nested.len(), 1, "sum_lines calls sum()");
    assert_eq!(sum_lines.nested[0].call.callee_full_name, None);

    let top_level = engine.calls(build.definition.id, 1, true).expect("calls");
    let names: Vec<_> = top_level
        .iter()
        .map(|e| e.call.callee_name.as_deref())
        .collect();
    assert_eq!(names, vec![Some("sum_lines"), Some("_finish")]);
}

#[test]
fn callers_and_references_find_uses_of_a_definition() {
    let (_dir, engine) = indexed_project();
    let tax = engine
        .get_definition("billing.tax.compute_tax")
        .expect("lookup")
        .expect("compute_tax exists");

    let callers = engine.callers(tax.definition.id).expect("callers");
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].caller_full_name, "billing.invoice.InvoiceBuilder.build");

    let refs = engine
        .references_to("billing.tax.compute_tax")
        .expect("refs");
    assert!(refs.iter().all(|r| r.file_path == "billing/invoice.py"));
    assert!(refs.iter().any(|r| r.reference.is_call));
}

#[test]
fn raw_queries_read_views_and_reject_writes() {
    let (_dir, engine) = indexed_project();

    let rows = engine
        .raw("SELECT full_name, file_path FROM functions WHERE name = 'compute_tax'")
        .expect("raw select");
    assert_eq!(rows.columns, vec!["full_name", "file_path"]);
    assert_eq!(
        rows.rows,
        vec![vec![
            "billing.tax.compute_tax".to_string(),
            "billing/tax.py".to_string()
        ]]
    );

    let err = engine.raw("DELETE FROM definitions").expect_err("write rejected");
    assert!(matches!(err, Error::Config(_) | Error::Database(_)));
}

#[test]
fn bases_resolve_across_modules_in_declaration_order() {
    let (_dir, sextant) = index_files(HIERARCHY);
    let engine = sextant.query().expect("query engine");
    let signed = engine
        .get_definition("docs.pdf.SignedPdf")
        .expect("lookup")
        .expect("class exists");

    let bases = engine.bases(signed.definition.id).expect("bases");
    let written: Vec<&str> = bases.iter().map(|b| b.base_name.as_str()).collect();
    assert_eq!(written, vec!["Pdf", "Exception"]);
    assert_eq!(bases[0].base_full_name.as_deref(), Some("docs.pdf.Pdf"));
    assert!(bases[0].base_id.is_some());
    assert_eq!(bases[1].base_id, None, "builtins are outside the project");

    let pdf = engine.get_definition("docs.pdf.Pdf").expect("lookup").expect("pdf");
    let pdf_bases: Vec<Option<String>> = engine
        .bases(pdf.definition.id)
        .expect("bases")
        .into_iter()
        .map(|b| b.base_full_name)
        .collect();
    assert_eq!(
        pdf_bases,
        vec![
            Some("docs.base.Document".to_string()),
            Some("docs.base.Printable".to_string())
        ]
    );
}

#[test]
fn subclasses_and_inheritance_walks() {
    let (_dir, sextant) = index_files(HIERARCHY);
    let engine = sextant.query().expect("query engine");

    let direct = engine.subclasses("docs.base.Document").expect("subclasses");
    assert_eq!(class_names(&direct), vec!["docs.pdf.Pdf"]);
    assert_eq!(direct[0].file_path, "docs/pdf.py");

    let down = engine
        .descendants("docs.base.Document", MAX_INHERITANCE_DEPTH)
        .expect("descendants");
    assert_eq!(down.len(), 1);
    assert_eq!(down[0].expanded[0].full_name, "docs.pdf.SignedPdf");

    let up = engine
        .ancestors("docs.pdf.SignedPdf", MAX_INHERITANCE_DEPTH)
        .expect("ancestors");
    assert_eq!(up[0].full_name, "docs.pdf.Pdf");
    let grand: Vec<&str> = up[0].expanded.iter().map(|n| n.full_name.as_str()).collect();
    assert_eq!(grand, vec!["docs.base.Document", "docs.base.Printable"]);
    assert_eq!(up[0].expanded[0].file_path.as_deref(), Some("docs/base.py"));
    assert_eq!(up[1].file_path, None);
}

#[test]
fn show_details_come_from_one_lookup() {
    let (_dir, sextant) = index_files(HIERARCHY);
    let engine = sextant.query().expect("query engine");
    let document = engine
        .get_definition("Document")
        .expect("lookup")
        .expect("found by simple name");

    assert_eq!(document.definition.full_name, "docs.base.Document");
    assert_eq!(
        document.definition.docstring.as_deref(),
        Some("Anything that can be rendered.")
    );

    let members: Vec<String> = engine
        .members(document.definition.id)
        .expect("members")
        .into_iter()
        .map(|m| m.name)
        .collect();
    assert_eq!(members, vec!["render", "title"]);

    let render = engine
        .get_definition("docs.base.Document.render")
        .expect("lookup")
        .expect("method exists");
    let parent = engine
        .definition_by_id(render.definition.parent_id.expect("method has a parent"))
        .expect("lookup")
        .expect("parent exists");
    assert_eq!(parent.definition.full_name, "docs.base.Document");

    let refs = engine.references_to("docs.pdf.SignedPdf").expect("refs");
    assert!(refs.iter().any(|r| r.reference.is_call && r.file_path == "docs/pdf.py"));
}

#[test]
fn source_lines_cover_the_definition() {
    let (_dir, sextant) = index_files(HIERARCHY);
    let engine = sextant.query().expect("query engine");
    let render = engine
        .get_definition("docs.pdf.Pdf.render")
        .expect("lookup")
        .expect("method exists");
    let def = &render.definition;

    let lines = sextant
        .source_lines(&render.file_path, def.line, def.end_line.unwrap_or(def.line))
        .expect("source");
    let text: Vec<&str> = lines.iter().map(|(_, l)| l.trim()).collect();
    assert_eq!(text, vec!["def render(self):", "return \"pdf\""]);

    let all = engine.definitions_named("render").expect("lookup");
    assert_eq!(all.len(), 2);
}

#[rstest]
#[case(ExportFormat::Json)]
#[case(ExportFormat::Csv)]
fn export_writes_every_class(#[case] format: ExportFormat) {
    let (_dir, sextant) = index_files(HIERARCHY);
    let engine = sextant.query().expect("query engine");

    let rows = engine
        .export(ExportTable::Definitions, Some(DefinitionKind::Class))
        .expect("export");
    let mut out = Vec::new();
    rows.write(format, &mut out).expect("write");
    let text = String::from_utf8(out).expect("utf8");

    for class in [
        "docs.base.Document",
        "docs.base.Printable",
        "docs.pdf.Pdf",
        "docs.pdf.SignedPdf",
    ] {
        assert!(text.contains(class), "{class} missing from export");
    }
    assert!(!text.contains("docs.pdf.make"));
}

#[test]
fn clean_keeps_the_live_snapshot_queryable() {
    let (_dir, mut sextant) = index_files(HIERARCHY);
    sextant
        .index(&IndexOptions {
            force: true,
            ..IndexOptions::default()
        })
        .expect("second run");

    let report = sextant.clean(false).expect("clean");
    assert_eq!(report.removed, 1);
    assert_eq!(report.current, Some(2));
    assert!(
        sextant
            .query()
            .expect("query engine")
            .get_definition("docs.pdf.Pdf")
            .expect("lookup")
            .is_some()
    );

    let report = sextant.clean(true).expect("clean all");
    assert_eq!(report.current, None);
    assert!(matches!(sextant.query(), Err(Error::Snapshot(_))));
    assert!(sextant.stats().expect("stats").is_none());
}
