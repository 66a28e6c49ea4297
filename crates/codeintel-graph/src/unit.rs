//! Language-neutral source units.
//!
//! A [`SourceUnit`] is what the scanner consumes: one module's class and
//! function declarations, call sites, local bindings, and import statements,
//! arranged as a tree that mirrors lexical nesting. Front ends (see
//! [`crate::lang`]) lower concrete syntax trees into this shape.

use crate::entities::SourceLocation;

/// A line/column position within a unit's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    /// 1-indexed line
    pub line: usize,
    /// 0-indexed column
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// One parsed module.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// Qualified module name (e.g. `pkg.service`)
    pub module: String,
    /// File path used for source locations
    pub path: String,
    /// True for package initializers (`pkg/__init__.py`)
    pub is_package: bool,
    /// Top-level items in source order
    pub body: Vec<Item>,
}

impl SourceUnit {
    pub fn new(module: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: path.into(),
            is_package: false,
            body: Vec::new(),
        }
    }

    /// Mark the unit as a package initializer.
    pub fn as_package(mut self) -> Self {
        self.is_package = true;
        self
    }

    /// Set the top-level items.
    pub fn with_body(mut self, body: Vec<Item>) -> Self {
        self.body = body;
        self
    }

    /// Build a source location in this unit's file.
    pub fn location(&self, position: Position) -> SourceLocation {
        SourceLocation::new(self.path.clone(), position.line, position.column)
    }

    /// The package that relative imports in this unit are resolved against.
    pub fn package(&self) -> &str {
        if self.is_package {
            &self.module
        } else {
            self.module
                .rsplit_once('.')
                .map_or("", |(package, _)| package)
        }
    }

    /// Absolute module path for `from <dots><module> import ...`.
    ///
    /// Each dot past the first climbs one package. When the dots climb past
    /// the top of the tree the relative spelling is kept as written.
    pub fn absolute_module(&self, module: Option<&str>, level: usize) -> String {
        let module = module.unwrap_or_default();
        if level == 0 {
            return module.to_string();
        }

        let mut base: Vec<&str> = self.package().split('.').filter(|s| !s.is_empty()).collect();
        if level - 1 > base.len() || (base.len() == level - 1 && module.is_empty()) {
            return format!("{}{module}", ".".repeat(level));
        }
        base.truncate(base.len() - (level - 1));
        if !module.is_empty() {
            base.push(module);
        }
        if base.is_empty() {
            return format!("{}{module}", ".".repeat(level));
        }
        base.join(".")
    }
}

/// A node of a unit's item tree.
#[derive(Debug, Clone)]
pub enum Item {
    Class(ClassDecl),
    Function(FunctionDecl),
    Call(CallSite),
    Import(ImportStmt),
    Binding(Binding),
}

/// `class Name(bases): body`
#[derive(Debug, Clone)]
pub struct ClassDecl {
    pub name: String,
    pub position: Position,
    pub bases: Vec<Reference>,
    pub body: Vec<Item>,
}

/// `def name(...): body` (sync or async)
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub position: Position,
    pub body: Vec<Item>,
}

/// A reference to a named entity, such as a base class.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Dotted name as written, or `None` when the reference is an arbitrary expression
    pub path: Option<String>,
    pub position: Position,
}

/// A call expression.
#[derive(Debug, Clone)]
pub struct CallSite {
    /// Dotted callee as written (`f`, `self.run`, `os.path.join`), or
    /// `None` when the callee is computed (`f()()`, `handlers[k]()`)
    pub callee: Option<String>,
    pub position: Position,
}

/// `name = Callee(...)`: a local whose class may be inferred from the callee.
#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub callee: String,
    pub position: Position,
}

/// One imported module of an import statement.
#[derive(Debug, Clone)]
pub struct ImportStmt {
    pub position: Position,
    pub kind: ImportKind,
}

#[derive(Debug, Clone)]
pub enum ImportKind {
    /// `import a.b` or `import a.b as c`
    Module { path: String, alias: Option<String> },
    /// `from .a import b as c` (`level` counts the leading dots)
    From {
        module: Option<String>,
        level: usize,
        names: Vec<ImportedName>,
    },
}

/// A name brought in by `from x import ...`; `*` for wildcard imports.
#[derive(Debug, Clone)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

impl ImportedName {
    /// The local name this import binds.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_for_relative_imports() {
        assert_eq!(SourceUnit::new("pkg.sub.mod", "pkg/sub/mod.py").package(), "pkg.sub");
        assert_eq!(
            SourceUnit::new("pkg.sub", "pkg/sub/__init__.py")
                .as_package()
                .package(),
            "pkg.sub"
        );
        assert_eq!(SourceUnit::new("main", "main.py").package(), "");
    }

    #[test]
    fn test_absolute_module() {
        let unit = SourceUnit::new("pkg.sub.mod", "pkg/sub/mod.py");
        assert_eq!(unit.absolute_module(Some("os.path"), 0), "os.path");
        assert_eq!(unit.absolute_module(Some("helpers"), 1), "pkg.sub.helpers");
        assert_eq!(unit.absolute_module(None, 1), "pkg.sub");
        assert_eq!(unit.absolute_module(Some("core"), 2), "pkg.core");
        assert_eq!(unit.absolute_module(Some("top"), 3), "top");
        assert_eq!(unit.absolute_module(Some("beyond"), 4), "....beyond");

        let init = SourceUnit::new("pkg", "pkg/__init__.py").as_package();
        assert_eq!(init.absolute_module(Some("mod"), 1), "pkg.mod");

        let top = SourceUnit::new("main", "main.py");
        assert_eq!(top.absolute_module(None, 1), ".");
        assert_eq!(top.absolute_module(Some("utils"), 1), "utils");
    }

    #[test]
    fn test_location() {
        let unit = SourceUnit::new("main", "src/main.py");
        let loc = unit.location(Position::new(4, 8));
        assert_eq!(loc.file_path, "src/main.py");
        assert_eq!(loc.line, 4);
        assert_eq!(loc.column, 8);
    }

    #[test]
    fn test_imported_name_binding() {
        let plain = ImportedName {
            name: "helper".into(),
            alias: None,
        };
        let aliased = ImportedName {
            name: "helper".into(),
            alias: Some("h".into()),
        };
        assert_eq!(plain.local_name(), "helper");
        assert_eq!(aliased.local_name(), "h");
        assert!(!plain.is_wildcard());
    }
}
