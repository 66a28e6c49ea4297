//! Entity types: the nodes of the code graph.
//!
//! Every entity is keyed by a dot-separated qualified name that encodes its
//! nesting path (e.g. `service.Worker.run`). The constructors validate the
//! naming invariants so that a malformed entity never reaches the graph.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of entity represented by a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A source file / importable module
    Module,
    /// A class definition
    Class,
    /// A function defined directly in a class body
    Method,
    /// Any other function (module level or nested)
    Function,
    /// Synthetic target for references that leave the analyzed tree
    External,
}

impl EntityKind {
    /// Returns the string representation used in reports and queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Method => "method",
            EntityKind::Function => "function",
            EntityKind::External => "external",
        }
    }

    /// Returns true for functions and methods.
    pub fn is_callable(&self) -> bool {
        matches!(self, EntityKind::Function | EntityKind::Method)
    }

    /// Returns true for the synthetic external marker kind.
    pub fn is_external(&self) -> bool {
        matches!(self, EntityKind::External)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position in a source file.
///
/// Lines are 1-indexed, columns are 0-indexed byte offsets within the line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    /// File path as given to the loader
    pub file_path: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column (0-indexed)
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file_path: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file_path, self.line, self.column)
    }
}

/// An entity violated the qualified-name invariants.
///
/// This only happens when the scanner produces inconsistent output and is
/// treated as an internal error, never as a user-facing failure path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed entity '{qualified_name}': {reason}")]
pub struct MalformedEntity {
    pub qualified_name: String,
    pub reason: String,
}

impl MalformedEntity {
    fn new(qualified_name: &str, reason: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.to_string(),
            reason: reason.into(),
        }
    }
}

/// A code entity: one node of the graph.
///
/// Equality and hashing use the qualified name only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique dotted name (the node key)
    pub qualified_name: String,

    /// The local (declared) name
    pub name: String,

    /// What kind of entity this is
    pub kind: EntityKind,

    /// Qualified name of the containing module (absent for modules and markers)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub declaring_module: Option<String>,

    /// Qualified name of the defining class (methods only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub owner_class: Option<String>,

    /// Where the entity is declared (absent for markers)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub location: Option<SourceLocation>,
}

impl Entity {
    /// Create a module entity.
    pub fn module(
        qualified_name: impl Into<String>,
        location: SourceLocation,
    ) -> Result<Self, MalformedEntity> {
        let qualified_name = qualified_name.into();
        let name = last_segment(&qualified_name).to_string();
        Self {
            qualified_name,
            name,
            kind: EntityKind::Module,
            declaring_module: None,
            owner_class: None,
            location: Some(location),
        }
        .validated()
    }

    /// Create a class declared in `scope` (a module, class, or function) of `module`.
    pub fn class(
        module: &str,
        scope: &str,
        name: &str,
        location: SourceLocation,
    ) -> Result<Self, MalformedEntity> {
        Self::scoped(EntityKind::Class, module, scope, name, None, location)
    }

    /// Create a function declared in `scope` of `module`.
    pub fn function(
        module: &str,
        scope: &str,
        name: &str,
        location: SourceLocation,
    ) -> Result<Self, MalformedEntity> {
        Self::scoped(EntityKind::Function, module, scope, name, None, location)
    }

    /// Create a method defined directly in `class`.
    pub fn method(
        module: &str,
        class: &str,
        name: &str,
        location: SourceLocation,
    ) -> Result<Self, MalformedEntity> {
        Self::scoped(
            EntityKind::Method,
            module,
            class,
            name,
            Some(class.to_string()),
            location,
        )
    }

    /// Create an external marker for a reference that left the analyzed tree.
    pub fn external(name: impl Into<String>) -> Self {
        let qualified_name = name.into();
        Self {
            name: qualified_name.clone(),
            qualified_name,
            kind: EntityKind::External,
            declaring_module: None,
            owner_class: None,
            location: None,
        }
    }

    fn scoped(
        kind: EntityKind,
        module: &str,
        scope: &str,
        name: &str,
        owner_class: Option<String>,
        location: SourceLocation,
    ) -> Result<Self, MalformedEntity> {
        Self {
            qualified_name: format!("{scope}.{name}"),
            name: name.to_string(),
            kind,
            declaring_module: Some(module.to_string()),
            owner_class,
            location: Some(location),
        }
        .validated()
    }

    fn validated(self) -> Result<Self, MalformedEntity> {
        self.validate()?;
        Ok(self)
    }

    /// Check the qualified-name invariants.
    pub fn validate(&self) -> Result<(), MalformedEntity> {
        let qn = self.qualified_name.as_str();
        if qn.is_empty() {
            return Err(MalformedEntity::new(qn, "empty qualified name"));
        }
        if self.kind.is_external() {
            return Ok(());
        }
        if qn.split('.').any(str::is_empty) {
            return Err(MalformedEntity::new(qn, "empty name segment"));
        }
        if self.name.is_empty() || last_segment(qn) != self.name {
            return Err(MalformedEntity::new(
                qn,
                format!("local name '{}' does not end the qualified name", self.name),
            ));
        }

        match (self.kind, &self.declaring_module, &self.owner_class) {
            (EntityKind::Module, None, None) => Ok(()),
            (EntityKind::Module, _, _) => Err(MalformedEntity::new(
                qn,
                "module cannot have a declaring module or owner class",
            )),
            (_, None, _) => Err(MalformedEntity::new(qn, "missing declaring module")),
            (kind, Some(module), owner) => {
                if !is_strict_prefix(module, qn) {
                    return Err(MalformedEntity::new(
                        qn,
                        format!("not prefixed by declaring module '{module}'"),
                    ));
                }
                match (kind, owner) {
                    (EntityKind::Method, Some(class)) if is_strict_prefix(class, qn) => {
                        if is_strict_prefix(module, class) {
                            Ok(())
                        } else {
                            Err(MalformedEntity::new(
                                qn,
                                format!("owner class '{class}' is outside module '{module}'"),
                            ))
                        }
                    }
                    (EntityKind::Method, Some(class)) => Err(MalformedEntity::new(
                        qn,
                        format!("not prefixed by owner class '{class}'"),
                    )),
                    (EntityKind::Method, None) => {
                        Err(MalformedEntity::new(qn, "method without owner class"))
                    }
                    (_, Some(_)) => Err(MalformedEntity::new(
                        qn,
                        "only methods have an owner class",
                    )),
                    (_, None) => Ok(()),
                }
            }
        }
    }

    /// Qualified name of the enclosing scope (`None` for top-level modules).
    pub fn parent_scope(&self) -> Option<&str> {
        match self.kind {
            EntityKind::External => None,
            _ => self.qualified_name.rsplit_once('.').map(|(parent, _)| parent),
        }
    }

    /// Returns a location string for display (file:line), or `<external>`.
    pub fn location_string(&self) -> String {
        match &self.location {
            Some(loc) => format!("{}:{}", loc.file_path, loc.line),
            None => "<external>".to_string(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified_name.hash(state);
    }
}

fn last_segment(qualified_name: &str) -> &str {
    qualified_name
        .rsplit_once('.')
        .map_or(qualified_name, |(_, last)| last)
}

/// True when `prefix` is a proper dotted prefix of `name` (`a.b` of `a.b.c`).
fn is_strict_prefix(prefix: &str, name: &str) -> bool {
    name.len() > prefix.len() + 1
        && name.starts_with(prefix)
        && name.as_bytes()[prefix.len()] == b'.'
}
