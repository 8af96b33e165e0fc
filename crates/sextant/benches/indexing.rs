//! Benchmarks for Sextant indexing and queries.
//!
//! - Full index of generated projects of increasing size
//! - The no-change run (scan, hash, classify)
//! - Ranked search and call-tree queries on an indexed project

// Benchmark code - performance of the benchmark setup is not critical
#![allow(missing_docs)]
#![allow(clippy::format_push_string)]

use std::fs;
use std::path::PathBuf;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use sextant::{IndexOptions, SearchOptions, Sextant};
use tempfile::TempDir;

/// Generate a Python module that calls into the previous one.
fn generate_python_module(index: usize, num_functions: usize) -> String {
    let mut code = String::new();

    if index > 0 {
        code.push_str(&format!(
            "from pkg.module{} import run_{}\n\n",
            index - 1,
            index - 1
        ));
    }

    code.push_str(&format!(
        "class Service{index}:\n\
         \x20   \"\"\"Service number {index}.\"\"\"\n\n\
         \x20   def __init__(self, name):\n\
         \x20       self.name = name\n\n\
         \x20   def process(self, items):\n\
         \x20       return [self.transform(i) for i in items]\n\n\
         \x20   def transform(self, item):\n\
         \x20       return str(item).upper()\n\n\n"
    ));

    for f in 0..num_functions {
        code.push_str(&format!(
            "def helper_{index}_{f}(value):\n\
             \x20   return max(value, {f}) + len(str(value))\n\n\n"
        ));
    }

    code.push_str(&format!("def run_{index}(items):\n"));
    code.push_str(&format!("    service = Service{index}(\"s{index}\")\n"));
    for f in 0..num_functions.min(5) {
        code.push_str(&format!(
            "    items = [helper_{index}_{f}(i) for i in items]\n"
        ));
    }
    if index > 0 {
        code.push_str(&format!("    run_{}(service.process(items))\n", index - 1));
    }
    code.push_str("    return service.process(items)\n");

    code
}

fn generate_project(num_modules: usize) -> Vec<(String, String)> {
    let mut files = vec![("pkg/__init__.py".to_string(), String::new())];
    for i in 0..num_modules {
        files.push((format!("pkg/module{i}.py"), generate_python_module(i, 8)));
    }
    files
}

fn create_project(files: &[(String, String)]) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    for (path, content) in files {
        let full_path = dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("failed to write file");
    }
    let path = dir.path().to_path_buf();
    (dir, path)
}

fn create_indexed_project(num_modules: usize) -> (TempDir, Sextant) {
    let (dir, path) = create_project(&generate_project(num_modules));
    let mut sextant = Sextant::open(&path).expect("failed to open Sextant");
    sextant
        .index(&IndexOptions::default())
        .expect("index failed");
    (dir, sextant)
}

/// Full index of projects of different sizes.
fn bench_full_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_index");
    group.sample_size(20);

    for num_modules in &[1, 10, 50] {
        let files = generate_project(*num_modules);
        group.throughput(Throughput::Elements(*num_modules as u64));

        group.bench_with_input(
            BenchmarkId::new("modules", num_modules),
            num_modules,
            |b, _| {
                b.iter_with_setup(
                    || {
                        let (dir, path) = create_project(&files);
                        let sextant = Sextant::open(&path).expect("failed to open Sextant");
                        (dir, sextant)
                    },
                    |(_dir, mut sextant)| {
                        let outcome = sextant
                            .index(&IndexOptions::default())
                            .expect("index failed");
                        black_box(outcome)
                    },
                );
            },
        );
    }

    group.finish();
}

/// A run with nothing changed only scans and hashes.
fn bench_unchanged_run(c: &mut Criterion) {
    let (_dir, mut sextant) = create_indexed_project(50);

    c.bench_function("unchanged_run_50_modules", |b| {
        b.iter(|| {
            let outcome = sextant
                .index(&IndexOptions::default())
                .expect("index failed");
            black_box(outcome)
        });
    });
}

fn bench_queries(c: &mut Criterion) {
    let (_dir, sextant) = create_indexed_project(50);
    let engine = sextant.query().expect("query engine");
    let run = engine
        .get_definition("pkg.module49.run_49")
        .expect("lookup failed")
        .expect("run_49 exists");

    let mut group = c.benchmark_group("queries");

    group.bench_function("search_prefix", |b| {
        b.iter(|| {
            let hits = engine
                .search(black_box("helper"), &SearchOptions::default())
                .expect("search failed");
            black_box(hits)
        });
    });

    group.bench_function("call_tree_depth_10", |b| {
        b.iter(|| {
            let tree = engine
                .calls(run.definition.id, black_box(10), false)
                .expect("calls failed");
            black_box(tree)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_full_index, bench_unchanged_run, bench_queries);
criterion_main!(benches);
