//! Structural metrics over a finished graph.
//!
//! Every ranking orders by count descending, then qualified name ascending,
//! and keeps at most `limit` entries. Entities with a zero count still rank.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::entities::{Entity, EntityKind};
use crate::graph::{CodeGraph, GraphStats};
use crate::relations::RelationKind;

/// One row of a ranked list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedEntry {
    pub qualified_name: String,
    pub count: usize,
}

impl RankedEntry {
    pub fn new(qualified_name: impl Into<String>, count: usize) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            count,
        }
    }
}

/// Caller to sorted, deduplicated callees.
pub type CallAdjacency = BTreeMap<String, Vec<String>>;

/// Every ranking plus graph totals, entrypoints and the call adjacency.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub limit: usize,
    pub stats: GraphStats,
    pub top_called: Vec<RankedEntry>,
    pub top_orchestrators: Vec<RankedEntry>,
    pub largest_classes: Vec<RankedEntry>,
    pub highest_coupling: Vec<RankedEntry>,
    pub module_fan_in: Vec<RankedEntry>,
    pub entrypoints: Vec<Entity>,
    pub call_adjacency: CallAdjacency,
}

/// Lowercased callable names that mark a likely entrypoint.
const ENTRYPOINT_NAMES: &[&str] = &["main", "run", "cli", "app"];

/// Read-only metrics queries.
pub struct Metrics<'g> {
    graph: &'g CodeGraph,
}

impl<'g> Metrics<'g> {
    pub fn new(graph: &'g CodeGraph) -> Self {
        Self { graph }
    }

    /// Functions and methods by incoming calls.
    pub fn top_called(&self, limit: usize) -> Vec<RankedEntry> {
        self.rank(EntityKind::is_callable, limit, |id| {
            self.graph.in_degree(id, RelationKind::Calls)
        })
    }

    /// Functions and methods by outgoing calls.
    pub fn top_orchestrators(&self, limit: usize) -> Vec<RankedEntry> {
        self.rank(EntityKind::is_callable, limit, |id| {
            self.graph.out_degree(id, RelationKind::Calls)
        })
    }

    /// Classes by number of defined methods.
    pub fn largest_classes(&self, limit: usize) -> Vec<RankedEntry> {
        self.rank(|kind| *kind == EntityKind::Class, limit, |id| {
            self.graph.out_degree(id, RelationKind::Defines)
        })
    }

    /// Modules by number of imported modules.
    pub fn highest_coupling(&self, limit: usize) -> Vec<RankedEntry> {
        self.rank(|kind| *kind == EntityKind::Module, limit, |id| {
            self.graph.out_degree(id, RelationKind::Imports)
        })
    }

    /// Import targets by number of distinct importing modules.
    ///
    /// Every module ranks, imported or not. External markers rank only once
    /// something imports them.
    pub fn module_fan_in(&self, limit: usize) -> Vec<RankedEntry> {
        let mut importers: BTreeMap<&str, BTreeSet<&str>> = self
            .graph
            .nodes_of_kind(EntityKind::Module)
            .map(|module| (module.qualified_name.as_str(), BTreeSet::new()))
            .collect();
        for edge in self
            .graph
            .edges()
            .filter(|edge| edge.kind == RelationKind::Imports)
        {
            importers
                .entry(edge.target_id.as_str())
                .or_default()
                .insert(edge.source_id.as_str());
        }

        let entries = importers
            .into_iter()
            .map(|(target, sources)| RankedEntry::new(target, sources.len()))
            .collect();
        ordered(entries, limit)
    }

    /// Functions and methods that look like program entrypoints.
    ///
    /// A callable qualifies when its lowercased name is `main`, `run`,
    /// `cli` or `app`, or starts with `main_`. Sorted by file, line, then name.
    pub fn entrypoints(&self) -> Vec<Entity> {
        let mut found: Vec<&Entity> = self
            .graph
            .nodes()
            .filter(|entity| entity.kind.is_callable())
            .filter(|entity| {
                let name = entity.name.to_lowercase();
                ENTRYPOINT_NAMES.contains(&name.as_str()) || name.starts_with("main_")
            })
            .collect();

        found.sort_by_key(|entity| {
            let (file, line) = entity
                .location
                .as_ref()
                .map(|loc| (loc.file_path.clone(), loc.line))
                .unwrap_or_default();
            (file, line, entity.name.clone())
        });
        found.into_iter().cloned().collect()
    }

    /// Each caller's callees, from CALLS edges.
    pub fn call_adjacency(&self) -> CallAdjacency {
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for edge in self
            .graph
            .edges()
            .filter(|edge| edge.kind == RelationKind::Calls)
        {
            adjacency
                .entry(edge.source_id.clone())
                .or_default()
                .insert(edge.target_id.clone());
        }
        adjacency
            .into_iter()
            .map(|(caller, callees)| (caller, callees.into_iter().collect()))
            .collect()
    }

    /// Compute every ranking with the same limit.
    pub fn report(&self, limit: usize) -> MetricsReport {
        MetricsReport {
            limit,
            stats: self.graph.stats(),
            top_called: self.top_called(limit),
            top_orchestrators: self.top_orchestrators(limit),
            largest_classes: self.largest_classes(limit),
            highest_coupling: self.highest_coupling(limit),
            module_fan_in: self.module_fan_in(limit),
            entrypoints: self.entrypoints(),
            call_adjacency: self.call_adjacency(),
        }
    }

    fn rank(
        &self,
        kind: impl Fn(&EntityKind) -> bool,
        limit: usize,
        count: impl Fn(&str) -> usize,
    ) -> Vec<RankedEntry> {
        let entries = self
            .graph
            .nodes()
            .filter(|entity| kind(&entity.kind))
            .map(|entity| {
                RankedEntry::new(
                    entity.qualified_name.clone(),
                    count(&entity.qualified_name),
                )
            })
            .collect();
        ordered(entries, limit)
    }
}

fn ordered(mut entries: Vec<RankedEntry>, limit: usize) -> Vec<RankedEntry> {
    entries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.qualified_name.cmp(&b.qualified_name))
    });
    entries.truncate(limit);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Entity, SourceLocation};
    use crate::graph::GraphBuilder;
    use crate::relations::Relation;

    fn loc(line: usize) -> SourceLocation {
        SourceLocation::new("m.py", line, 0)
    }

    fn sample() -> CodeGraph {
        let mut b = GraphBuilder::new();
        b.add_node(Entity::module("m", loc(1)).unwrap()).unwrap();
        b.add_node(Entity::module("n", loc(1)).unwrap()).unwrap();
        b.add_node(Entity::class("m", "m", "A", loc(2)).unwrap()).unwrap();
        b.add_node(Entity::method("m", "m.A", "x", loc(3)).unwrap()).unwrap();
        b.add_node(Entity::method("m", "m.A", "y", loc(4)).unwrap()).unwrap();
        b.add_node(Entity::function("m", "m", "f", loc(5)).unwrap()).unwrap();
        b.add_node(Entity::function("m", "m", "g", loc(6)).unwrap()).unwrap();

        b.add_edge(Relation::defines("m.A", "m.A.x", loc(3))).unwrap();
        b.add_edge(Relation::defines("m.A", "m.A.y", loc(4))).unwrap();
        b.add_edge(Relation::calls("m.f", "m.g", loc(7))).unwrap();
        b.add_edge(Relation::calls("m.f", "m.A.x", loc(8))).unwrap();
        b.add_edge(Relation::calls("m.A.y", "m.g", loc(9))).unwrap();
        b.add_edge(Relation::calls("m.A.y", "print", loc(10))).unwrap();
        b.add_edge(Relation::imports("m", "n", loc(1))).unwrap();
        b.add_edge(Relation::imports("m", "os", loc(2))).unwrap();
        b.finish()
    }

    #[test]
    fn test_top_called_excludes_markers() {
        let graph = sample();
        let ranked = Metrics::new(&graph).top_called(10);
        assert_eq!(
            ranked,
            vec![
                RankedEntry::new("m.g", 2),
                RankedEntry::new("m.A.x", 1),
                RankedEntry::new("m.A.y", 0),
                RankedEntry::new("m.f", 0),
            ]
        );
    }

    #[test]
    fn test_orchestrators_tie_break_by_name() {
        let graph = sample();
        let ranked = Metrics::new(&graph).top_orchestrators(2);
        assert_eq!(
            ranked,
            vec![RankedEntry::new("m.A.y", 2), RankedEntry::new("m.f", 2)]
        );
    }

    #[test]
    fn test_classes_and_coupling() {
        let graph = sample();
        let metrics = Metrics::new(&graph);
        assert_eq!(metrics.largest_classes(10), vec![RankedEntry::new("m.A", 2)]);
        assert_eq!(
            metrics.highest_coupling(10),
            vec![RankedEntry::new("m", 2), RankedEntry::new("n", 0)]
        );
    }

    #[test]
    fn test_module_fan_in_counts_distinct_importers() {
        let mut b = GraphBuilder::new();
        for name in ["a", "b", "core", "unused"] {
            b.add_node(Entity::module(name, loc(1)).unwrap()).unwrap();
        }
        b.add_edge(Relation::imports("a", "core", loc(1))).unwrap();
        b.add_edge(Relation::imports("a", "core", loc(2))).unwrap();
        b.add_edge(Relation::imports("b", "core", loc(1))).unwrap();
        b.add_edge(Relation::imports("b", "json", loc(2))).unwrap();
        let graph = b.finish();

        assert_eq!(
            Metrics::new(&graph).module_fan_in(10),
            vec![
                RankedEntry::new("core", 2),
                RankedEntry::new("json", 1),
                RankedEntry::new("a", 0),
                RankedEntry::new("b", 0),
                RankedEntry::new("unused", 0),
            ]
        );
    }

    #[test]
    fn test_entrypoints() {
        let mut b = GraphBuilder::new();
        b.add_node(Entity::module("cli", SourceLocation::new("cli.py", 1, 0)).unwrap())
            .unwrap();
        b.add_node(Entity::module("app", SourceLocation::new("app.py", 1, 0)).unwrap())
            .unwrap();
        let at = |file: &str, line| SourceLocation::new(file, line, 0);
        b.add_node(Entity::function("cli", "cli", "Main", at("cli.py", 9)).unwrap())
            .unwrap();
        b.add_node(Entity::function("cli", "cli", "main_loop", at("cli.py", 3)).unwrap())
            .unwrap();
        b.add_node(Entity::function("cli", "cli", "mainly", at("cli.py", 5)).unwrap())
            .unwrap();
        b.add_node(Entity::class("app", "app", "App", at("app.py", 2)).unwrap())
            .unwrap();
        b.add_node(Entity::method("app", "app.App", "run", at("app.py", 4)).unwrap())
            .unwrap();
        let graph = b.finish();

        let names: Vec<String> = Metrics::new(&graph)
            .entrypoints()
            .into_iter()
            .map(|e| e.qualified_name)
            .collect();
        assert_eq!(names, vec!["app.App.run", "cli.main_loop", "cli.Main"]);
    }

    #[test]
    fn test_call_adjacency_dedups_and_sorts() {
        let mut b = GraphBuilder::new();
        b.add_node(Entity::module("m", loc(1)).unwrap()).unwrap();
        b.add_node(Entity::function("m", "m", "f", loc(2)).unwrap()).unwrap();
        b.add_node(Entity::function("m", "m", "g", loc(3)).unwrap()).unwrap();
        b.add_edge(Relation::calls("m.f", "print", loc(4))).unwrap();
        b.add_edge(Relation::calls("m.f", "m.g", loc(5))).unwrap();
        b.add_edge(Relation::calls("m.f", "print", loc(6))).unwrap();
        let graph = b.finish();

        let adjacency = Metrics::new(&graph).call_adjacency();
        assert_eq!(adjacency.len(), 1);
        assert_eq!(adjacency["m.f"], vec!["m.g".to_string(), "print".to_string()]);
    }

    #[test]
    fn test_limit_zero_and_report() {
        let graph = sample();
        let metrics = Metrics::new(&graph);
        assert!(metrics.top_called(0).is_empty());

        let report = metrics.report(1);
        assert_eq!(report.limit, 1);
        assert_eq!(report.top_called.len(), 1);
        assert_eq!(report.stats.external_markers, 2);
        assert_eq!(report.stats.calls, 4);
    }

    #[test]
    fn test_empty_graph() {
        let graph = CodeGraph::default();
        let report = Metrics::new(&graph).report(10);
        assert!(report.top_called.is_empty());
        assert!(report.highest_coupling.is_empty());
        assert!(report.entrypoints.is_empty());
        assert!(report.call_adjacency.is_empty());
        assert_eq!(report.stats.node_count, 0);
    }
}
