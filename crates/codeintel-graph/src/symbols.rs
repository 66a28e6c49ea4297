//! Symbol table: the output of discovery.
//!
//! Discovery walks each [`SourceUnit`] and records every declaration under
//! its qualified name, along with what each scope can see by local name:
//! nested declarations, import bindings, and `x = Callee(...)` bindings.
//! Classes also keep their base references as written.
//!
//! Units are staged first and committed as a whole, so a unit whose
//! declarations collide leaves no trace. Once every unit is committed the
//! table is closed with [`SymbolTableBuilder::finish`] and becomes read-only.

use std::collections::HashMap;

use crate::entities::{Entity, EntityKind};
use crate::graph::GraphError;
use crate::unit::{ImportKind, ImportStmt, Item, Position, SourceUnit};

/// Everything visible by local name inside one entity's body.
#[derive(Debug, Clone)]
pub struct Scope {
    /// Qualified name of the entity owning this scope
    pub qualified_name: String,
    pub kind: EntityKind,
    /// Qualified name of the module the scope belongs to
    pub module: String,
    /// Enclosing scope (`None` for modules)
    pub parent: Option<String>,
    locals: HashMap<String, String>,
    imports: HashMap<String, String>,
    star_imports: Vec<String>,
    bindings: HashMap<String, Vec<(Position, String)>>,
    bases: Vec<String>,
}

impl Scope {
    fn new(entity: &Entity) -> Self {
        let module = entity
            .declaring_module
            .clone()
            .unwrap_or_else(|| entity.qualified_name.clone());
        Self {
            qualified_name: entity.qualified_name.clone(),
            kind: entity.kind,
            module,
            parent: entity.parent_scope().map(str::to_string).filter(|_| {
                entity.kind != EntityKind::Module
            }),
            locals: HashMap::new(),
            imports: HashMap::new(),
            star_imports: Vec::new(),
            bindings: HashMap::new(),
            bases: Vec::new(),
        }
    }

    /// Declaration named `name` directly inside this scope.
    pub fn local(&self, name: &str) -> Option<&str> {
        self.locals.get(name).map(String::as_str)
    }

    /// Dotted path an import in this scope bound to `name`.
    pub fn import(&self, name: &str) -> Option<&str> {
        self.imports.get(name).map(String::as_str)
    }

    /// Modules pulled in with `from x import *`.
    pub fn star_imports(&self) -> &[String] {
        &self.star_imports
    }

    /// Callee of the latest `name = Callee(...)` written before `at`.
    pub fn binding_before(&self, name: &str, at: Position) -> Option<&str> {
        self.bindings
            .get(name)?
            .iter()
            .rev()
            .find(|(position, _)| *position < at)
            .map(|(_, callee)| callee.as_str())
    }

    /// Base class references as written (classes only).
    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    fn record_import(&mut self, unit: &SourceUnit, stmt: &ImportStmt) {
        match &stmt.kind {
            ImportKind::Module { path, alias: Some(alias) } => {
                self.imports.insert(alias.clone(), path.clone());
            }
            ImportKind::Module { path, alias: None } => {
                // `import a.b` binds `a`
                let head = path.split('.').next().unwrap_or(path);
                self.imports.insert(head.to_string(), head.to_string());
            }
            ImportKind::From { module, level, names } => {
                let base = unit.absolute_module(module.as_deref(), *level);
                for name in names {
                    if name.is_wildcard() {
                        self.star_imports.push(base.clone());
                    } else {
                        self.imports
                            .insert(name.local_name().to_string(), format!("{base}.{}", name.name));
                    }
                }
            }
        }
    }
}

/// One unit's declarations, staged but not yet committed.
#[derive(Debug)]
pub struct UnitSymbols {
    module: String,
    entities: Vec<Entity>,
    scopes: HashMap<String, Scope>,
}

impl UnitSymbols {
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Declared entities in discovery order, module first.
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    fn scope_mut(&mut self, qualified_name: &str) -> Option<&mut Scope> {
        self.scopes.get_mut(qualified_name)
    }
}

/// Mutable symbol table used during discovery.
#[derive(Debug, Default)]
pub struct SymbolTableBuilder {
    entities: HashMap<String, Entity>,
    scopes: HashMap<String, Scope>,
}

impl SymbolTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.entities.contains_key(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Discover the declarations of `unit` without committing them.
    ///
    /// Fails with [`GraphError::DuplicateEntity`] when a qualified name is
    /// declared twice in the unit or was already committed by an earlier unit.
    pub fn stage(&self, unit: &SourceUnit) -> Result<UnitSymbols, GraphError> {
        let module = Entity::module(&unit.module, unit.location(Position::new(1, 0)))?;
        let mut staged = UnitSymbols {
            module: unit.module.clone(),
            entities: Vec::new(),
            scopes: HashMap::new(),
        };
        self.declare(&mut staged, module)?;
        self.discover(&mut staged, unit, &unit.module, EntityKind::Module, &unit.body)?;
        Ok(staged)
    }

    /// Commit a staged unit.
    pub fn commit(&mut self, staged: UnitSymbols) {
        for entity in staged.entities {
            self.entities.insert(entity.qualified_name.clone(), entity);
        }
        self.scopes.extend(staged.scopes);
    }

    /// Close the table for writes.
    pub fn finish(self) -> SymbolTable {
        SymbolTable {
            entities: self.entities,
            scopes: self.scopes,
        }
    }

    fn declare(&self, staged: &mut UnitSymbols, entity: Entity) -> Result<(), GraphError> {
        let qn = entity.qualified_name.clone();
        if self.contains(&qn) || staged.scopes.contains_key(&qn) {
            return Err(GraphError::DuplicateEntity(qn));
        }

        let scope = Scope::new(&entity);
        if let Some(parent) = scope.parent.as_deref().and_then(|p| staged.scope_mut(p)) {
            parent.locals.insert(entity.name.clone(), qn.clone());
        }
        staged.scopes.insert(qn, scope);
        staged.entities.push(entity);
        Ok(())
    }

    fn discover(
        &self,
        staged: &mut UnitSymbols,
        unit: &SourceUnit,
        scope: &str,
        scope_kind: EntityKind,
        items: &[Item],
    ) -> Result<(), GraphError> {
        for item in items {
            match item {
                Item::Class(class) => {
                    let entity = Entity::class(
                        &unit.module,
                        scope,
                        &class.name,
                        unit.location(class.position),
                    )?;
                    let qn = entity.qualified_name.clone();
                    self.declare(staged, entity)?;
                    if let Some(class_scope) = staged.scope_mut(&qn) {
                        class_scope.bases = class
                            .bases
                            .iter()
                            .filter_map(|base| base.path.clone())
                            .collect();
                    }
                    self.discover(staged, unit, &qn, EntityKind::Class, &class.body)?;
                }
                Item::Function(function) => {
                    let location = unit.location(function.position);
                    let (entity, kind) = if scope_kind == EntityKind::Class {
                        let method = Entity::method(&unit.module, scope, &function.name, location)?;
                        (method, EntityKind::Method)
                    } else {
                        let function =
                            Entity::function(&unit.module, scope, &function.name, location)?;
                        (function, EntityKind::Function)
                    };
                    let qn = entity.qualified_name.clone();
                    self.declare(staged, entity)?;
                    self.discover(staged, unit, &qn, kind, &function.body)?;
                }
                Item::Import(stmt) => {
                    if let Some(current) = staged.scope_mut(scope) {
                        current.record_import(unit, stmt);
                    }
                }
                Item::Binding(binding) => {
                    if let Some(current) = staged.scope_mut(scope) {
                        current
                            .bindings
                            .entry(binding.name.clone())
                            .or_default()
                            .push((binding.position, binding.callee.clone()));
                    }
                }
                Item::Call(_) => {}
            }
        }
        Ok(())
    }
}

/// Closed symbol table consulted during resolution.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entities: HashMap<String, Entity>,
    scopes: HashMap<String, Scope>,
}

impl SymbolTable {
    pub fn entity(&self, qualified_name: &str) -> Option<&Entity> {
        self.entities.get(qualified_name)
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.entities.contains_key(qualified_name)
    }

    pub fn kind(&self, qualified_name: &str) -> Option<EntityKind> {
        self.entity(qualified_name).map(|entity| entity.kind)
    }

    pub fn scope(&self, qualified_name: &str) -> Option<&Scope> {
        self.scopes.get(qualified_name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
