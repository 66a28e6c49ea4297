//! Analysis artifacts: JSON dumps of the graph and the Markdown summary.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codeintel_graph::{
    CallAdjacency, CodeGraph, Entity, GraphStats, MetricsReport, RankedEntry, Relation,
    RelationKind, ScanReport, UnitFailure,
};
use serde::Serialize;
use tracing::debug;

pub const ENTITIES_FILE: &str = "entities.json";
pub const RELATIONSHIPS_FILE: &str = "relationships.json";
pub const GRAPH_FILE: &str = "graph.json";
pub const CALL_GRAPH_FILE: &str = "call_graph.json";
pub const SUMMARY_FILE: &str = "summary.md";

#[derive(Serialize)]
struct GraphContext<'a> {
    total_nodes: usize,
    total_edges: usize,
    stats: &'a GraphStats,
    failures: &'a [UnitFailure],
}

#[derive(Serialize)]
struct GraphDocument<'a> {
    context: GraphContext<'a>,
    nodes: Vec<&'a Entity>,
    edges: Vec<&'a Relation>,
}

#[derive(Serialize)]
struct CallGraphDocument<'a> {
    edges: Vec<&'a Relation>,
    adjacency: &'a CallAdjacency,
}

/// Write every artifact into `dir`, creating it if needed.
///
/// Returns the paths written, in a fixed order.
pub fn write_outputs(
    dir: &Path,
    scan: &ScanReport,
    metrics: &MetricsReport,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let graph = &scan.graph;
    let entities: Vec<&Entity> = graph.nodes().collect();
    let relations: Vec<&Relation> = graph.edges().collect();
    let document = GraphDocument {
        context: GraphContext {
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
            stats: &metrics.stats,
            failures: &scan.failures,
        },
        nodes: entities.clone(),
        edges: relations.clone(),
    };
    let call_graph = CallGraphDocument {
        edges: relations
            .iter()
            .copied()
            .filter(|edge| edge.kind == RelationKind::Calls)
            .collect(),
        adjacency: &metrics.call_adjacency,
    };

    let written = vec![
        write_json(&dir.join(ENTITIES_FILE), &entities)?,
        write_json(&dir.join(RELATIONSHIPS_FILE), &relations)?,
        write_json(&dir.join(GRAPH_FILE), &document)?,
        write_json(&dir.join(CALL_GRAPH_FILE), &call_graph)?,
        write_text(&dir.join(SUMMARY_FILE), &render_summary(graph, metrics, &scan.failures))?,
    ];
    Ok(written)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<PathBuf> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "Wrote JSON artifact");
    Ok(path.to_path_buf())
}

fn write_text(path: &Path, contents: &str) -> Result<PathBuf> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), "Wrote summary");
    Ok(path.to_path_buf())
}

/// Render the Markdown summary.
pub fn render_summary(
    graph: &CodeGraph,
    metrics: &MetricsReport,
    failures: &[UnitFailure],
) -> String {
    let stats = &metrics.stats;
    let mut lines = vec!["# Code Intelligence Report".to_string(), String::new()];

    lines.push("## High Level Stats".to_string());
    lines.push(format!("- Total Nodes: {}", graph.node_count()));
    lines.push(format!("- Total Edges: {}", graph.edge_count()));
    lines.push(format!("- Modules: {}", stats.modules));
    lines.push(format!("- Classes: {}", stats.classes));
    lines.push(format!("- Methods: {}", stats.methods));
    lines.push(format!("- Functions: {}", stats.functions));
    lines.push(format!("- External References: {}", stats.external_markers));
    lines.push(String::new());

    if !failures.is_empty() {
        lines.push("## Skipped Files".to_string());
        for failure in failures {
            lines.push(format!("- `{}`: {}", failure.path, failure.reason));
        }
        lines.push(String::new());
    }

    let limit = metrics.limit;
    section(
        &mut lines,
        &format!("## Top {limit} Most Called Functions"),
        &metrics.top_called,
        "calls",
    );
    section(
        &mut lines,
        &format!("## Top {limit} Orchestrators (Functions calling others)"),
        &metrics.top_orchestrators,
        "outgoing calls",
    );
    section(
        &mut lines,
        "## Largest Classes (by Method count)",
        &metrics.largest_classes,
        "methods",
    );
    section(
        &mut lines,
        "## Highest Coupling (Modules with most imports)",
        &metrics.highest_coupling,
        "imports",
    );
    section(
        &mut lines,
        &format!("## Top {limit} Fan-in (Modules imported by many others)"),
        &metrics.module_fan_in,
        "importers",
    );

    lines.push("## Entrypoints".to_string());
    if metrics.entrypoints.is_empty() {
        lines.push("_None_".to_string());
    }
    for entity in &metrics.entrypoints {
        lines.push(format!("- `{}` ({})", entity.qualified_name, entity.location_string()));
    }
    lines.push(String::new());

    lines.join("\n")
}

fn section(lines: &mut Vec<String>, heading: &str, entries: &[RankedEntry], unit: &str) {
    lines.push(heading.to_string());
    if entries.is_empty() {
        lines.push("_None_".to_string());
    }
    for entry in entries {
        lines.push(format!("- `{}`: {} {unit}", entry.qualified_name, entry.count));
    }
    lines.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeintel_graph::{Metrics, Parser, PythonExtractor, Scanner, SourceUnit};

    fn scan() -> ScanReport {
        let mut parser = Parser::new().unwrap();
        let units: Vec<SourceUnit> = [
            ("utils", "def log(msg):\n    print(msg)\n"),
            (
                "app",
                "import utils\n\nclass App:\n    def run(self):\n        utils.log('x')\n",
            ),
        ]
        .iter()
        .map(|(module, source)| {
            PythonExtractor::parse_unit(&mut parser, source, module, &format!("{module}.py"), false)
                .unwrap()
        })
        .collect();
        Scanner::default().scan(&units).unwrap()
    }

    #[test]
    fn test_render_summary() {
        let scan = scan();
        let metrics = Metrics::new(&scan.graph).report(10);
        let summary = render_summary(&scan.graph, &metrics, &[]);

        assert!(summary.starts_with("# Code Intelligence Report\n"));
        assert!(summary.contains("- Total Nodes: 6"));
        assert!(summary.contains("## Top 10 Most Called Functions\n- `utils.log`: 1 calls"));
        assert!(summary.contains("- `app.App.run`: 1 outgoing calls"));
        assert!(summary.contains("- `app.App`: 1 methods"));
        assert!(summary.contains("- `app`: 1 imports"));
        assert!(summary.contains(
            "## Top 10 Fan-in (Modules imported by many others)\n- `utils`: 1 importers"
        ));
        assert!(summary.contains("## Entrypoints\n- `app.App.run` (app.py:4)"));
        assert!(!summary.contains("## Skipped Files"));
    }

    #[test]
    fn test_render_summary_lists_failures() {
        let scan = scan();
        let metrics = Metrics::new(&scan.graph).report(10);
        let failures = vec![UnitFailure {
            module: "broken".into(),
            path: "broken.py".into(),
            reason: "Syntax error at line 1, column 10".into(),
        }];
        let summary = render_summary(&scan.graph, &metrics, &failures);
        assert!(summary.contains("## Skipped Files\n- `broken.py`: Syntax error at line 1"));
    }

    #[test]
    fn test_write_outputs() {
        let scan = scan();
        let metrics = Metrics::new(&scan.graph).report(10);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("out");

        let written = write_outputs(&out, &scan, &metrics).unwrap();
        assert_eq!(written.len(), 5);
        for path in &written {
            assert!(path.exists(), "{} missing", path.display());
        }

        let entities: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(ENTITIES_FILE)).unwrap()).unwrap();
        assert_eq!(entities.as_array().unwrap().len(), scan.graph.node_count());

        let relations: Vec<Relation> =
            serde_json::from_str(&fs::read_to_string(out.join(RELATIONSHIPS_FILE)).unwrap())
                .unwrap();
        let expected: Vec<Relation> = scan.graph.edges().cloned().collect();
        assert_eq!(relations, expected);

        let graph: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(GRAPH_FILE)).unwrap()).unwrap();
        assert_eq!(graph["context"]["total_nodes"], scan.graph.node_count());
        assert_eq!(graph["context"]["total_edges"], scan.graph.edge_count());
        assert_eq!(graph["edges"].as_array().unwrap().len(), scan.graph.edge_count());
        assert_eq!(graph["nodes"][0]["kind"], "module");

        let calls: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join(CALL_GRAPH_FILE)).unwrap())
                .unwrap();
        assert_eq!(calls["edges"].as_array().unwrap().len(), 2);
        assert_eq!(calls["adjacency"]["app.App.run"][0], "utils.log");
        assert_eq!(calls["adjacency"]["utils.log"][0], "print");

        let summary = fs::read_to_string(out.join(SUMMARY_FILE)).unwrap();
        assert!(summary.contains("## Highest Coupling"));
    }
}
