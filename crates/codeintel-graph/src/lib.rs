//! codeintel-graph: code entity graph and structural metrics
//!
//! This crate turns a Python source tree into a directed graph of code
//! entities and computes metrics over it:
//! - Source loading and tree-sitter parsing into language-neutral units
//! - Two-pass scanning: discovery into a symbol table, then resolution
//! - In-memory graph storage with separate build and query views
//! - Ranked metrics (call hotspots, orchestrators, class size, coupling)

pub mod entities;
pub mod graph;
pub mod lang;
pub mod metrics;
pub mod parser;
pub mod relations;
pub mod resolver;
pub mod scanner;
pub mod source;
pub mod symbols;
pub mod unit;

pub use entities::{Entity, EntityKind, MalformedEntity, SourceLocation};
pub use graph::{CodeGraph, GraphBuilder, GraphError, GraphStats};
pub use lang::PythonExtractor;
pub use metrics::{CallAdjacency, Metrics, MetricsReport, RankedEntry};
pub use parser::{ParseError, ParsedFile, Parser};
pub use relations::{Relation, RelationKind};
pub use resolver::{Resolution, Resolver};
pub use scanner::{ScanConfig, ScanError, ScanReport, ScanStats, Scanner, UnitFailure};
pub use source::{LoadError, SourceTree};
pub use symbols::{SymbolTable, SymbolTableBuilder};
pub use unit::SourceUnit;
