//! Two-pass scanner.
//!
//! Pass 1 (discovery) records every declaration of every unit into the
//! symbol table and the graph, one unit at a time. Pass 2 (resolution)
//! starts once the symbol table is closed and turns every call, base class
//! and import into an edge. Pass 2 runs per unit on the rayon pool; edges
//! are collected per unit and merged in unit order.

use std::fmt;
use std::path::Path;
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::entities::EntityKind;
use crate::graph::{CodeGraph, GraphBuilder, GraphError};
use crate::relations::Relation;
use crate::resolver::Resolver;
use crate::source::{LoadError, SourceTree};
use crate::symbols::{SymbolTable, SymbolTableBuilder};
use crate::unit::{ImportKind, Item, SourceUnit};

/// Errors that abort a scan.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Strict scan aborted: {0}")]
    StrictAbort(UnitFailure),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// A unit that could not be loaded or discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub module: String,
    pub path: String,
    pub reason: String,
}

impl fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.module, self.path, self.reason)
    }
}

/// Scanner settings.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// File extensions to load, without the dot
    pub extensions: Vec<String>,
    /// Abort on the first unit failure instead of recording it
    pub strict: bool,
    /// Parse and resolve units on the rayon pool
    pub parallel: bool,
    /// Honor `.gitignore` and related ignore files
    pub follow_gitignore: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            strict: false,
            parallel: true,
            follow_gitignore: true,
        }
    }
}

impl ScanConfig {
    /// Returns true if `path` has one of the configured extensions.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

/// Timing and volume for one scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub units_scanned: usize,
    pub units_failed: usize,
    pub entities: usize,
    pub relations: usize,
    pub discovery_time_ms: u64,
    pub resolution_time_ms: u64,
}

/// Result of a scan: the frozen graph plus every unit that was left out.
#[derive(Debug)]
pub struct ScanReport {
    pub graph: CodeGraph,
    pub failures: Vec<UnitFailure>,
    pub stats: ScanStats,
}

impl ScanReport {
    /// True when no unit failed to load or discover.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs discovery and resolution over a set of units.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    config: ScanConfig,
}

impl Scanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Load the tree under `root` and scan it.
    pub fn scan_directory(&self, root: &Path) -> Result<ScanReport> {
        let tree = SourceTree::load(root, &self.config)?;
        self.scan_tree(tree)
    }

    /// Scan a loaded tree. Load failures are carried into the report.
    pub fn scan_tree(&self, tree: SourceTree) -> Result<ScanReport> {
        let (units, load_failures) = tree.into_parts();
        if self.config.strict {
            if let Some(failure) = load_failures.into_iter().next() {
                return Err(ScanError::StrictAbort(failure));
            }
            return self.scan(&units);
        }

        let mut report = self.scan(&units)?;
        report.stats.units_failed += load_failures.len();
        let mut failures = load_failures;
        failures.append(&mut report.failures);
        report.failures = failures;
        Ok(report)
    }

    /// Scan units in the given order.
    pub fn scan(&self, units: &[SourceUnit]) -> Result<ScanReport> {
        let mut stats = ScanStats::default();
        let mut graph = GraphBuilder::new();
        let mut failures = Vec::new();

        let discovery_start = Instant::now();
        let (table, discovered) = self.discover(units, &mut graph, &mut failures)?;
        stats.discovery_time_ms = discovery_start.elapsed().as_millis() as u64;
        stats.entities = graph.node_count();
        info!(
            units = discovered.len(),
            failed = failures.len(),
            entities = stats.entities,
            "Discovery complete"
        );

        let resolution_start = Instant::now();
        let resolver = Resolver::new(&table);
        let edges: Vec<Vec<Relation>> = if self.config.parallel {
            discovered
                .par_iter()
                .map(|unit| resolve_unit(&resolver, unit))
                .collect()
        } else {
            discovered
                .iter()
                .map(|unit| resolve_unit(&resolver, unit))
                .collect()
        };
        for relation in edges.into_iter().flatten() {
            graph.add_edge(relation)?;
        }
        stats.resolution_time_ms = resolution_start.elapsed().as_millis() as u64;
        stats.relations = graph.edge_count();
        stats.units_scanned = discovered.len();
        stats.units_failed = failures.len();

        let graph = graph.finish();
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Resolution complete"
        );

        Ok(ScanReport {
            graph,
            failures,
            stats,
        })
    }

    /// Pass 1. Returns the closed table and the units that made it in.
    fn discover<'u>(
        &self,
        units: &'u [SourceUnit],
        graph: &mut GraphBuilder,
        failures: &mut Vec<UnitFailure>,
    ) -> Result<(SymbolTable, Vec<&'u SourceUnit>)> {
        let mut symbols = SymbolTableBuilder::new();
        let mut discovered = Vec::with_capacity(units.len());

        for unit in units {
            match symbols.stage(unit) {
                Ok(staged) => {
                    for entity in staged.entities() {
                        graph.add_node(entity.clone())?;
                    }
                    debug!(
                        module = %unit.module,
                        entities = staged.entities().len(),
                        "Discovered unit"
                    );
                    symbols.commit(staged);
                    discovered.push(unit);
                }
                Err(e) => {
                    // Duplicates and malformed names fail this unit only.
                    let reason = match &e {
                        GraphError::DuplicateEntity(name) => format!("duplicate entity '{name}'"),
                        other => other.to_string(),
                    };
                    let failure = UnitFailure {
                        module: unit.module.clone(),
                        path: unit.path.clone(),
                        reason,
                    };
                    if self.config.strict {
                        return Err(ScanError::StrictAbort(failure));
                    }
                    warn!(module = %unit.module, reason = %failure.reason, "Skipping unit");
                    failures.push(failure);
                }
            }
        }

        Ok((symbols.finish(), discovered))
    }
}

/// Pass 2 for one unit.
fn resolve_unit(resolver: &Resolver<'_>, unit: &SourceUnit) -> Vec<Relation> {
    let mut edges = Vec::new();
    resolve_items(
        resolver,
        unit,
        &unit.module,
        EntityKind::Module,
        &unit.body,
        &mut edges,
    );
    debug!(module = %unit.module, edges = edges.len(), "Resolved unit");
    edges
}

fn resolve_items(
    resolver: &Resolver<'_>,
    unit: &SourceUnit,
    scope: &str,
    scope_kind: EntityKind,
    items: &[Item],
    edges: &mut Vec<Relation>,
) {
    for item in items {
        match item {
            Item::Class(class) => {
                let qn = format!("{scope}.{}", class.name);
                for base in &class.bases {
                    let Some(path) = &base.path else { continue };
                    let target = resolver.resolve_base(&qn, path);
                    edges.push(Relation::inherits(
                        &qn,
                        resolver.target_id(target),
                        unit.location(base.position),
                    ));
                }
                resolve_items(resolver, unit, &qn, EntityKind::Class, &class.body, edges);
            }
            Item::Function(function) => {
                let qn = format!("{scope}.{}", function.name);
                let kind = if scope_kind == EntityKind::Class {
                    edges.push(Relation::defines(
                        scope,
                        &qn,
                        unit.location(function.position),
                    ));
                    EntityKind::Method
                } else {
                    EntityKind::Function
                };
                resolve_items(resolver, unit, &qn, kind, &function.body, edges);
            }
            Item::Call(call) => {
                // Computed callees cannot be named statically.
                let Some(callee) = &call.callee else { continue };
                let target = resolver.resolve(scope, callee, call.position);
                edges.push(Relation::calls(
                    scope,
                    resolver.target_id(target),
                    unit.location(call.position),
                ));
            }
            Item::Import(stmt) => {
                let path = match &stmt.kind {
                    ImportKind::Module { path, .. } => path.clone(),
                    ImportKind::From { module, level, .. } => {
                        unit.absolute_module(module.as_deref(), *level)
                    }
                };
                let target = resolver.resolve_module(&path);
                edges.push(Relation::imports(
                    &unit.module,
                    resolver.target_id(target),
                    unit.location(stmt.position),
                ));
            }
            Item::Binding(_) => {}
        }
    }
}
