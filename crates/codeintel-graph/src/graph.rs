//! In-memory code graph.
//!
//! The graph is a directed multigraph stored in a petgraph `DiGraph`, keyed
//! by qualified name. Construction and querying are separate capabilities:
//! [`GraphBuilder`] only inserts, and [`GraphBuilder::finish`] hands back a
//! [`CodeGraph`] that only answers queries. Nothing is ever removed.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::Serialize;
use thiserror::Error;

use crate::entities::{Entity, EntityKind, MalformedEntity};
use crate::relations::{Relation, RelationKind};

/// Errors raised while constructing the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error(transparent)]
    Malformed(#[from] MalformedEntity),

    #[error("Relation source '{0}' is not a declared entity")]
    UnknownSource(String),
}

/// Node and edge counts for a finished graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub modules: usize,
    pub classes: usize,
    pub methods: usize,
    pub functions: usize,
    pub external_markers: usize,
    pub calls: usize,
    pub inherits: usize,
    pub defines: usize,
    pub imports: usize,
}

/// Read-only view of a finished code graph.
///
/// Iteration order is always insertion order, so two runs over the same
/// input produce identical sequences.
#[derive(Debug, Default)]
pub struct CodeGraph {
    graph: DiGraph<Entity, Relation>,
    index: HashMap<String, NodeIndex>,
    outgoing: Vec<Vec<EdgeIndex>>,
    incoming: Vec<Vec<EdgeIndex>>,
}

impl CodeGraph {
    /// Look up a node by qualified name.
    pub fn node(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&ix| &self.graph[ix])
    }

    /// Returns true if a node (entity or marker) exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Entity> + Clone + '_ {
        self.graph.raw_nodes().iter().map(|node| &node.weight)
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = &Relation> + Clone + '_ {
        self.graph.raw_edges().iter().map(|edge| &edge.weight)
    }

    /// Nodes of one kind, in insertion order.
    pub fn nodes_of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> + Clone + '_ {
        self.nodes().filter(move |entity| entity.kind == kind)
    }

    /// Edges leaving `id`, optionally restricted to one kind.
    pub fn edges_by_source(
        &self,
        id: &str,
        kind: Option<RelationKind>,
    ) -> impl Iterator<Item = &Relation> + Clone + '_ {
        self.adjacent(&self.outgoing, id, kind)
    }

    /// Edges arriving at `id`, optionally restricted to one kind.
    pub fn edges_by_target(
        &self,
        id: &str,
        kind: Option<RelationKind>,
    ) -> impl Iterator<Item = &Relation> + Clone + '_ {
        self.adjacent(&self.incoming, id, kind)
    }

    /// Number of `kind` edges leaving `id`.
    pub fn out_degree(&self, id: &str, kind: RelationKind) -> usize {
        self.edges_by_source(id, Some(kind)).count()
    }

    /// Number of `kind` edges arriving at `id`.
    pub fn in_degree(&self, id: &str, kind: RelationKind) -> usize {
        self.edges_by_target(id, Some(kind)).count()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of declared entities (every node except external markers).
    pub fn entity_count(&self) -> usize {
        self.nodes().filter(|e| !e.kind.is_external()).count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Summarize node and edge counts by kind.
    pub fn stats(&self) -> GraphStats {
        let mut stats = GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            ..GraphStats::default()
        };
        for entity in self.nodes() {
            match entity.kind {
                EntityKind::Module => stats.modules += 1,
                EntityKind::Class => stats.classes += 1,
                EntityKind::Method => stats.methods += 1,
                EntityKind::Function => stats.functions += 1,
                EntityKind::External => stats.external_markers += 1,
            }
        }
        for relation in self.edges() {
            match relation.kind {
                RelationKind::Calls => stats.calls += 1,
                RelationKind::Inherits => stats.inherits += 1,
                RelationKind::Defines => stats.defines += 1,
                RelationKind::Imports => stats.imports += 1,
            }
        }
        stats
    }

    fn adjacent<'a>(
        &'a self,
        lists: &'a [Vec<EdgeIndex>],
        id: &str,
        kind: Option<RelationKind>,
    ) -> impl Iterator<Item = &'a Relation> + Clone + 'a {
        let edges: &[EdgeIndex] = self
            .index
            .get(id)
            .map(|ix| lists[ix.index()].as_slice())
            .unwrap_or_default();
        edges
            .iter()
            .map(move |&ix| &self.graph[ix])
            .filter(move |relation| kind.is_none_or(|k| relation.kind == k))
    }

    fn insert_node(&mut self, entity: Entity) -> NodeIndex {
        let id = entity.qualified_name.clone();
        let ix = self.graph.add_node(entity);
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.index.insert(id, ix);
        ix
    }
}

/// Insert-only view used while the scanner populates the graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: CodeGraph,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity.
    ///
    /// Fails with [`GraphError::DuplicateEntity`] if the qualified name is
    /// already taken and with [`GraphError::Malformed`] if the entity breaks
    /// the naming invariants.
    pub fn add_node(&mut self, entity: Entity) -> Result<(), GraphError> {
        entity.validate()?;
        if self.graph.contains(&entity.qualified_name) {
            return Err(GraphError::DuplicateEntity(entity.qualified_name));
        }
        self.graph.insert_node(entity);
        Ok(())
    }

    /// Insert a relation.
    ///
    /// The source must be a declared entity. An unknown target gets an
    /// external marker node on first reference.
    pub fn add_edge(&mut self, relation: Relation) -> Result<(), GraphError> {
        let source = match self.graph.index.get(&relation.source_id).copied() {
            Some(ix) if !self.graph.graph[ix].kind.is_external() => ix,
            _ => return Err(GraphError::UnknownSource(relation.source_id)),
        };
        let target = match self.graph.index.get(&relation.target_id).copied() {
            Some(ix) => ix,
            None => self
                .graph
                .insert_node(Entity::external(relation.target_id.clone())),
        };

        let edge = self.graph.graph.add_edge(source, target, relation);
        self.graph.outgoing[source.index()].push(edge);
        self.graph.incoming[target.index()].push(edge);
        Ok(())
    }

    /// Returns true if a node exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.graph.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Close the graph for writes.
    pub fn finish(self) -> CodeGraph {
        self.graph
    }
}
