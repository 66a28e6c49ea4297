//! Reference resolution against a closed symbol table.
//!
//! A reference written `head.rest...` in some scope is resolved in a fixed
//! order:
//!
//! 1. A dotted reference that is already a qualified name in the table.
//! 2. `head` in the innermost enclosing function scope, then outward.
//!    Class bodies are not visible from their methods. `self` and `cls`
//!    inside a method name the owner class, and `x = ClassName(...)` makes
//!    `x` an instance of that class.
//! 3. `head` in the module: declarations, import bindings, local
//!    bindings, then `from m import *` modules.
//! 4. Anything else is external.
//!
//! The remaining segments are followed from the head: through modules by
//! qualified name, through classes by member lookup across in-tree bases.
//! Resolution never fails; it falls back to an external name.

use std::collections::HashSet;

use crate::entities::EntityKind;
use crate::symbols::{Scope, SymbolTable};
use crate::unit::Position;

/// Nested resolutions (base classes, binding callees) stop at this depth.
const MAX_DEPTH: usize = 8;

/// Namespace for external markers whose name spells a declared entity.
pub const UNRESOLVED_PREFIX: &str = "<unresolved>.";

/// Outcome of resolving a reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A declared entity, by qualified name
    Entity(String),
    /// Outside the analyzed tree; the best known dotted name
    External(String),
}

impl Resolution {
    /// The qualified name or the external name, untagged.
    pub fn into_target(self) -> String {
        match self {
            Resolution::Entity(name) | Resolution::External(name) => name,
        }
    }
}

enum Head {
    Entity(String),
    Import(String),
}

/// Resolves references in Pass 2.
pub struct Resolver<'a> {
    table: &'a SymbolTable,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a SymbolTable) -> Self {
        Self { table }
    }

    /// Graph node id for a resolution.
    ///
    /// An external name spelled like a declared entity (`utils()` with no
    /// import of `utils`) gets a marker of its own under
    /// [`UNRESOLVED_PREFIX`], so the edge never lands on that entity.
    pub fn target_id(&self, resolution: Resolution) -> String {
        match resolution {
            Resolution::External(name) if self.table.contains(&name) => {
                format!("{UNRESOLVED_PREFIX}{name}")
            }
            resolution => resolution.into_target(),
        }
    }

    /// Resolve `reference` as written in `scope` at position `at`.
    ///
    /// `at` selects which `x = Callee(...)` binding is in effect.
    pub fn resolve(&self, scope: &str, reference: &str, at: Position) -> Resolution {
        self.resolve_in(scope, reference, Some(at), 0)
    }

    /// Resolve a base class reference of `class`.
    ///
    /// Bases are looked up in the scope enclosing the class.
    pub fn resolve_base(&self, class: &str, base: &str) -> Resolution {
        match self.table.scope(class).and_then(|s| s.parent.as_deref()) {
            Some(parent) => self.resolve_in(parent, base, None, 0),
            None => Resolution::External(base.to_string()),
        }
    }

    /// Resolve an absolute module path from an import statement.
    pub fn resolve_module(&self, path: &str) -> Resolution {
        if self.table.contains(path) {
            Resolution::Entity(path.to_string())
        } else {
            Resolution::External(path.to_string())
        }
    }

    fn resolve_in(
        &self,
        scope: &str,
        reference: &str,
        at: Option<Position>,
        depth: usize,
    ) -> Resolution {
        let as_written = || Resolution::External(reference.to_string());
        if depth > MAX_DEPTH {
            return as_written();
        }
        if reference.contains('.') && self.table.contains(reference) {
            return Resolution::Entity(reference.to_string());
        }

        let mut segments = reference.split('.');
        let head = segments.next().unwrap_or(reference);
        let rest: Vec<&str> = segments.collect();

        match self.lookup_head(scope, head, at, depth) {
            Some(Head::Entity(qn)) => self
                .walk(&qn, &rest, depth)
                .map(Resolution::Entity)
                .unwrap_or_else(as_written),
            Some(Head::Import(path)) => self.resolve_import(&path, &rest, depth),
            None => as_written(),
        }
    }

    fn lookup_head(
        &self,
        scope: &str,
        head: &str,
        at: Option<Position>,
        depth: usize,
    ) -> Option<Head> {
        let start = self.table.scope(scope)?;

        let mut current = Some(start);
        let mut innermost = true;
        while let Some(s) = current {
            if s.kind == EntityKind::Module {
                break;
            }
            if s.kind != EntityKind::Class || innermost {
                if let Some(found) = self.lookup_in_scope(s, head, at, depth) {
                    return Some(found);
                }
            }
            innermost = false;
            current = s.parent.as_deref().and_then(|p| self.table.scope(p));
        }

        let module = self.table.scope(&start.module)?;
        self.lookup_in_scope(module, head, at, depth).or_else(|| {
            module
                .star_imports()
                .iter()
                .map(|star| format!("{star}.{head}"))
                .find(|qn| self.table.contains(qn))
                .map(Head::Entity)
        })
    }

    fn lookup_in_scope(
        &self,
        scope: &Scope,
        head: &str,
        at: Option<Position>,
        depth: usize,
    ) -> Option<Head> {
        if scope.kind == EntityKind::Method && matches!(head, "self" | "cls") {
            return self
                .table
                .entity(&scope.qualified_name)
                .and_then(|method| method.owner_class.clone())
                .map(Head::Entity);
        }
        if let Some(qn) = scope.local(head) {
            return Some(Head::Entity(qn.to_string()));
        }
        if let Some(path) = scope.import(head) {
            return Some(Head::Import(path.to_string()));
        }

        let callee = scope.binding_before(head, at?)?;
        // Bindings are not consulted while resolving a binding's callee.
        match self.resolve_in(&scope.qualified_name, callee, None, depth + 1) {
            Resolution::Entity(qn) if self.table.kind(&qn) == Some(EntityKind::Class) => {
                Some(Head::Entity(qn))
            }
            _ => None,
        }
    }

    /// Follow `segments` from the entity `start`.
    fn walk(&self, start: &str, segments: &[&str], depth: usize) -> Option<String> {
        let mut current = start.to_string();
        for segment in segments {
            current = match self.table.kind(&current)? {
                EntityKind::Module => {
                    let candidate = format!("{current}.{segment}");
                    if self.table.contains(&candidate) {
                        candidate
                    } else {
                        // Re-exported through an import in that module.
                        let path = self.table.scope(&current)?.import(segment)?;
                        if !self.table.contains(path) {
                            return None;
                        }
                        path.to_string()
                    }
                }
                EntityKind::Class => self.member(&current, segment, &mut HashSet::new(), depth)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Depth-first member lookup through `class` and its in-tree bases.
    fn member(
        &self,
        class: &str,
        name: &str,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Option<String> {
        if depth > MAX_DEPTH || !visited.insert(class.to_string()) {
            return None;
        }

        let candidate = format!("{class}.{name}");
        if self.table.contains(&candidate) {
            return Some(candidate);
        }

        let scope = self.table.scope(class)?;
        let parent = scope.parent.as_deref()?;
        for base in scope.bases() {
            if let Resolution::Entity(base) = self.resolve_in(parent, base, None, depth + 1) {
                if self.table.kind(&base) != Some(EntityKind::Class) {
                    continue;
                }
                if let Some(found) = self.member(&base, name, visited, depth + 1) {
                    return Some(found);
                }
            }
        }
        None
    }

    fn resolve_import(&self, path: &str, rest: &[&str], depth: usize) -> Resolution {
        let segments: Vec<&str> = path.split('.').chain(rest.iter().copied()).collect();
        let full = segments.join(".");
        if self.table.contains(&full) {
            return Resolution::Entity(full);
        }

        let imported = path.split('.').count();
        for split in (1..=imported).rev() {
            let prefix = segments[..split].join(".");
            if self.table.contains(&prefix) {
                return match self.walk(&prefix, &segments[split..], depth) {
                    Some(qn) => Resolution::Entity(qn),
                    None => Resolution::External(full),
                };
            }
        }
        Resolution::External(full)
    }
}
