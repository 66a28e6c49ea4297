//! Relation types: the directed edges of the code graph.
//!
//! A relation links two entities by qualified name and records the source
//! location of the reference that produced it. Two references at different
//! sites are distinct relations, so counts derived from the graph are exact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entities::SourceLocation;

/// The kind of relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Caller (function, method, class body, or module) calls callee
    Calls,
    /// Class inherits from base class
    Inherits,
    /// Class defines method
    Defines,
    /// Module imports module
    Imports,
}

impl RelationKind {
    /// Returns the string representation for queries and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationKind::Calls => "calls",
            RelationKind::Inherits => "inherits",
            RelationKind::Defines => "defines",
            RelationKind::Imports => "imports",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed relation between two entities.
///
/// Identity is the full `(source, target, kind, site)` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    /// Qualified name of the originating entity
    pub source_id: String,

    /// Qualified name of the target entity or external marker
    pub target_id: String,

    /// The kind of relationship
    pub kind: RelationKind,

    /// Where the reference appears in source
    pub site: SourceLocation,
}

impl Relation {
    /// Create a new relation.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: RelationKind,
        site: SourceLocation,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            site,
        }
    }

    /// Create a CALLS relation.
    pub fn calls(
        caller_id: impl Into<String>,
        callee_id: impl Into<String>,
        site: SourceLocation,
    ) -> Self {
        Self::new(caller_id, callee_id, RelationKind::Calls, site)
    }

    /// Create an INHERITS relation.
    pub fn inherits(
        class_id: impl Into<String>,
        base_id: impl Into<String>,
        site: SourceLocation,
    ) -> Self {
        Self::new(class_id, base_id, RelationKind::Inherits, site)
    }

    /// Create a DEFINES relation.
    pub fn defines(
        class_id: impl Into<String>,
        method_id: impl Into<String>,
        site: SourceLocation,
    ) -> Self {
        Self::new(class_id, method_id, RelationKind::Defines, site)
    }

    /// Create an IMPORTS relation.
    pub fn imports(
        module_id: impl Into<String>,
        imported_id: impl Into<String>,
        site: SourceLocation,
    ) -> Self {
        Self::new(module_id, imported_id, RelationKind::Imports, site)
    }
}
