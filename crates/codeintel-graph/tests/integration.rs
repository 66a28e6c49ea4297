//! Integration tests for codeintel-graph
//!
//! Scans small on-disk projects through the public API.

use std::fs;
use std::path::Path;

use codeintel_graph::{
    CodeGraph, EntityKind, Metrics, RankedEntry, RelationKind, ScanConfig, ScanError,
    ScanReport, Scanner,
};

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

const BASE: &str = r#"class BaseService:
    def __init__(self):
        self.connected = False

    def connect(self):
        print("Connecting...")

    def disconnect(self):
        print("Disconnecting...")
"#;

const UTILS: &str = r#"def helper_func():
    logger("helping")


def logger(message):
    print(message)
"#;

const MAIN: &str = r#"from base import BaseService
import utils


class mainService(BaseService):
    def run(self):
        utils.logger("Starting run")
        utils.helper_func()

    def process(self):
        print("Processing...")


def entry_point():
    s = mainService()
    s.run()


if __name__ == "__main__":
    entry_point()
"#;

fn sample_project(root: &Path) {
    write(root, "base.py", BASE);
    write(root, "utils.py", UTILS);
    write(root, "main.py", MAIN);
}

fn scan_sample() -> ScanReport {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    Scanner::default().scan_directory(dir.path()).unwrap()
}

fn ranked(entries: &[(&str, usize)]) -> Vec<RankedEntry> {
    entries
        .iter()
        .map(|(name, count)| RankedEntry::new(*name, *count))
        .collect()
}

#[test]
fn sample_project_counts() {
    let report = scan_sample();
    assert!(report.is_complete());
    let graph = &report.graph;

    assert_eq!(graph.entity_count(), 13);
    assert_eq!(graph.nodes_of_kind(EntityKind::Module).count(), 3);
    assert_eq!(graph.nodes_of_kind(EntityKind::Class).count(), 2);
    assert_eq!(graph.nodes_of_kind(EntityKind::Method).count(), 5);
    assert_eq!(graph.nodes_of_kind(EntityKind::Function).count(), 3);

    assert_eq!(graph.in_degree("utils.logger", RelationKind::Calls), 2);
    assert_eq!(graph.out_degree("main.mainService.run", RelationKind::Calls), 2);
    assert_eq!(graph.out_degree("base.BaseService", RelationKind::Defines), 3);
    assert_eq!(graph.out_degree("main", RelationKind::Imports), 2);

    let inherits: Vec<_> = graph
        .edges_by_source("main.mainService", Some(RelationKind::Inherits))
        .map(|r| r.target_id.as_str())
        .collect();
    assert_eq!(inherits, vec!["base.BaseService"]);

    // `s = mainService(); s.run()` resolves through the local binding.
    assert_eq!(graph.in_degree("main.mainService.run", RelationKind::Calls), 1);
    assert_eq!(graph.in_degree("main.entry_point", RelationKind::Calls), 1);
    assert_eq!(graph.node("print").unwrap().kind, EntityKind::External);
}

#[test]
fn sample_project_metrics() {
    let report = scan_sample();
    let metrics = Metrics::new(&report.graph);

    assert_eq!(
        metrics.top_called(4),
        ranked(&[
            ("utils.logger", 2),
            ("main.entry_point", 1),
            ("main.mainService.run", 1),
            ("utils.helper_func", 1),
        ])
    );
    assert_eq!(
        metrics.top_orchestrators(3),
        ranked(&[
            ("main.entry_point", 2),
            ("main.mainService.run", 2),
            ("base.BaseService.connect", 1),
        ])
    );
    assert_eq!(
        metrics.largest_classes(10),
        ranked(&[("base.BaseService", 3), ("main.mainService", 2)])
    );
    assert_eq!(
        metrics.highest_coupling(10),
        ranked(&[("main", 2), ("base", 0), ("utils", 0)])
    );
    assert_eq!(
        metrics.module_fan_in(10),
        ranked(&[("base", 1), ("utils", 1), ("main", 0)])
    );

    let entrypoints: Vec<_> = metrics
        .entrypoints()
        .into_iter()
        .map(|e| e.qualified_name)
        .collect();
    assert_eq!(entrypoints, vec!["main.mainService.run"]);

    let adjacency = metrics.call_adjacency();
    assert_eq!(adjacency["main.entry_point"], vec!["main.mainService", "main.mainService.run"]);
    assert_eq!(adjacency["utils.helper_func"], vec!["utils.logger"]);
}

#[test]
fn relation_sources_are_declared_entities() {
    let report = scan_sample();
    for relation in report.graph.edges() {
        let source = report.graph.node(&relation.source_id).unwrap();
        assert!(
            !source.kind.is_external(),
            "{} originates at an external marker",
            relation.source_id
        );
        assert!(report.graph.contains(&relation.target_id));
    }
}

#[test]
fn defines_matches_declared_methods() {
    let report = scan_sample();
    let graph = &report.graph;
    for class in graph.nodes_of_kind(EntityKind::Class) {
        let methods = graph
            .nodes_of_kind(EntityKind::Method)
            .filter(|m| m.owner_class.as_deref() == Some(class.qualified_name.as_str()))
            .count();
        assert_eq!(
            graph.out_degree(&class.qualified_name, RelationKind::Defines),
            methods
        );
    }
}

#[test]
fn rankings_are_totally_ordered() {
    let report = scan_sample();
    let metrics = Metrics::new(&report.graph).report(100);
    for list in [
        &metrics.top_called,
        &metrics.top_orchestrators,
        &metrics.largest_classes,
        &metrics.highest_coupling,
    ] {
        for pair in list.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.count > b.count || (a.count == b.count && a.qualified_name < b.qualified_name),
                "{a:?} ranks before {b:?}"
            );
        }
    }
}

fn snapshot(graph: &CodeGraph) -> (Vec<String>, Vec<String>) {
    let nodes = graph
        .nodes()
        .map(|n| format!("{}:{}", n.kind, n.qualified_name))
        .collect();
    let edges = graph
        .edges()
        .map(|e| format!("{}->{}:{}@{}", e.source_id, e.target_id, e.kind, e.site))
        .collect();
    (nodes, edges)
}

#[test]
fn repeated_scans_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());

    let first = Scanner::default().scan_directory(dir.path()).unwrap();
    let second = Scanner::default().scan_directory(dir.path()).unwrap();
    assert_eq!(snapshot(&first.graph), snapshot(&second.graph));
}

#[test]
fn import_edges_count_each_statement() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "app.py",
        "import os, sys\nimport os\nfrom collections import OrderedDict, deque\n",
    );

    let report = Scanner::default().scan_directory(dir.path()).unwrap();
    let targets: Vec<_> = report
        .graph
        .edges_by_source("app", Some(RelationKind::Imports))
        .map(|r| r.target_id.as_str())
        .collect();
    assert_eq!(targets, vec!["os", "sys", "os", "collections"]);
}

#[test]
fn packages_and_relative_imports() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "pkg/__init__.py", "from .core import Engine\n");
    write(
        dir.path(),
        "pkg/core.py",
        "class Engine:\n    def start(self):\n        pass\n",
    );
    write(
        dir.path(),
        "app.py",
        "from pkg import Engine\n\n\ndef main():\n    e = Engine()\n    e.start()\n",
    );

    let report = Scanner::default().scan_directory(dir.path()).unwrap();
    let graph = &report.graph;

    assert_eq!(graph.node("pkg").unwrap().kind, EntityKind::Module);
    let pkg_imports: Vec<_> = graph
        .edges_by_source("pkg", Some(RelationKind::Imports))
        .map(|r| r.target_id.as_str())
        .collect();
    assert_eq!(pkg_imports, vec!["pkg.core"]);

    let calls: Vec<_> = graph
        .edges_by_source("app.main", Some(RelationKind::Calls))
        .map(|r| r.target_id.as_str())
        .collect();
    assert_eq!(calls, vec!["pkg.core.Engine", "pkg.core.Engine.start"]);
    assert_eq!(
        graph.node("pkg.core.Engine.start").unwrap().location_string(),
        "pkg/core.py:2"
    );
}

#[test]
fn broken_files_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    write(dir.path(), "broken.py", "def oops(:\n    pass\n");

    let report = Scanner::default().scan_directory(dir.path()).unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "broken.py");
    assert_eq!(report.graph.entity_count(), 13);
    assert_eq!(report.stats.units_failed, 1);

    let strict = Scanner::new(ScanConfig {
        strict: true,
        ..ScanConfig::default()
    });
    let result = strict.scan_directory(dir.path());
    assert!(matches!(result, Err(ScanError::StrictAbort(f)) if f.module == "broken"));
}

#[test]
fn deeply_nested_expression_scans() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    write(
        dir.path(),
        "gen.py",
        &format!("x = g(0){}\n", " + 1".repeat(20_000)),
    );

    let report = Scanner::default().scan_directory(dir.path()).unwrap();
    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.graph.entity_count(), 14);
    assert_eq!(report.graph.in_degree("g", RelationKind::Calls), 1);
}

#[test]
fn unnamed_module_file_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    write(dir.path(), "odd..py", "def f():\n    pass\n");

    let report = Scanner::default().scan_directory(dir.path()).unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].path, "odd..py");
    assert_eq!(report.graph.entity_count(), 13);
}

#[test]
fn graph_is_shareable_across_threads() {
    let report = scan_sample();
    let graph = &report.graph;
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| graph.in_degree("utils.logger", RelationKind::Calls)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 2);
        }
    });
}
