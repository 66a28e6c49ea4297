//! Python front end.
//!
//! Lowers a tree-sitter Python syntax tree into a [`SourceUnit`]: classes,
//! functions (sync, async and decorated), call sites, `x = Callee(...)`
//! bindings, and import statements, nested the way they are nested in
//! source.

use tree_sitter::Node;

use crate::parser::{ParseError, ParsedFile, Parser};
use crate::unit::{
    Binding, CallSite, ClassDecl, FunctionDecl, ImportKind, ImportStmt, ImportedName, Item,
    Position, Reference, SourceUnit,
};

/// Python-specific lowering into source units.
pub struct PythonExtractor;

impl PythonExtractor {
    /// Lower a parsed file into a source unit for `module`.
    ///
    /// The syntax tree is walked with an explicit work stack, so expression
    /// depth is bounded by memory rather than by the thread's stack.
    /// Declarations nested deeper than [`MAX_NESTING`] are rejected.
    pub fn lower(
        parsed: &ParsedFile,
        module: &str,
        path: &str,
        is_package: bool,
    ) -> Result<SourceUnit, ParseError> {
        let lowering = Lowering {
            source: parsed.source_bytes(),
        };
        let body = lowering.lower(parsed.root_node())?;

        let unit = SourceUnit::new(module, path).with_body(body);
        Ok(if is_package { unit.as_package() } else { unit })
    }

    /// Parse and lower Python source in one step.
    pub fn parse_unit(
        parser: &mut Parser,
        source: &str,
        module: &str,
        path: &str,
        is_package: bool,
    ) -> Result<SourceUnit, ParseError> {
        let parsed = parser.parse_source(source)?;
        Self::lower(&parsed, module, path, is_package)
    }
}

/// Deepest class/function nesting accepted. CPython's tokenizer stops at 100
/// indentation levels.
pub const MAX_NESTING: usize = 100;

/// A class or function whose body is still being collected.
enum Open {
    Module,
    Class {
        name: String,
        position: Position,
        bases: Vec<Reference>,
    },
    Function {
        name: String,
        position: Position,
    },
}

/// One scope on the work stack: the declaration plus the items seen so far.
struct Frame {
    open: Open,
    parent: usize,
    depth: usize,
    items: Vec<Item>,
}

enum Task<'t> {
    Visit(Node<'t>, usize),
    Close(usize),
}

struct Lowering<'a> {
    source: &'a [u8],
}

impl Lowering<'_> {
    fn lower(&self, root: Node) -> Result<Vec<Item>, ParseError> {
        let mut frames = vec![Frame {
            open: Open::Module,
            parent: 0,
            depth: 0,
            items: Vec::new(),
        }];
        let mut tasks = Vec::new();
        push_children(&mut tasks, root, 0);

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(node, frame) => self.visit(node, frame, &mut frames, &mut tasks)?,
                Task::Close(frame) => close(&mut frames, frame),
            }
        }
        Ok(std::mem::take(&mut frames[0].items))
    }

    fn visit<'t>(
        &self,
        node: Node<'t>,
        frame: usize,
        frames: &mut Vec<Frame>,
        tasks: &mut Vec<Task<'t>>,
    ) -> Result<(), ParseError> {
        match node.kind() {
            "class_definition" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return Ok(());
                };
                let open = Open::Class {
                    name: self.text(name).to_string(),
                    position: position(node),
                    bases: self.bases(node),
                };
                let index = open_frame(frames, frame, open, node)?;
                tasks.push(Task::Close(index));
                if let Some(block) = node.child_by_field_name("body") {
                    push_children(tasks, block, index);
                }
                // `class A(make_base()):` is attributed to the class body.
                if let Some(superclasses) = node.child_by_field_name("superclasses") {
                    push_children(tasks, superclasses, index);
                }
            }
            "function_definition" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return Ok(());
                };
                let open = Open::Function {
                    name: self.text(name).to_string(),
                    position: position(node),
                };
                let index = open_frame(frames, frame, open, node)?;
                tasks.push(Task::Close(index));
                if let Some(block) = node.child_by_field_name("body") {
                    push_children(tasks, block, index);
                }
                // Defaults and annotations are attributed to the function itself.
                if let Some(parameters) = node.child_by_field_name("parameters") {
                    push_children(tasks, parameters, index);
                }
            }
            "decorated_definition" => {
                if let Some(definition) = node.child_by_field_name("definition") {
                    tasks.push(Task::Visit(definition, frame));
                }
                // Decorator expressions run in the enclosing scope, first.
                let mut cursor = node.walk();
                let decorators: Vec<Node<'t>> = node
                    .named_children(&mut cursor)
                    .filter(|child| child.kind() == "decorator")
                    .collect();
                for decorator in decorators.into_iter().rev() {
                    push_children(tasks, decorator, frame);
                }
            }
            "call" => {
                let callee = node
                    .child_by_field_name("function")
                    .and_then(|function| self.dotted_path(function));
                frames[frame].items.push(Item::Call(CallSite {
                    callee,
                    position: position(node),
                }));
                push_children(tasks, node, frame);
            }
            "assignment" => {
                if let Some(binding) = self.lower_binding(node) {
                    frames[frame].items.push(Item::Binding(binding));
                }
                push_children(tasks, node, frame);
            }
            "import_statement" => self.lower_import(node, &mut frames[frame].items),
            "import_from_statement" => self.lower_import_from(node, &mut frames[frame].items),
            "future_import_statement" => {
                let names = self.imported_names(node);
                frames[frame].items.push(Item::Import(ImportStmt {
                    position: position(node),
                    kind: ImportKind::From {
                        module: Some("__future__".to_string()),
                        level: 0,
                        names,
                    },
                }));
            }
            "comment" | "identifier" => {}
            _ => push_children(tasks, node, frame),
        }
        Ok(())
    }

    fn bases(&self, class: Node) -> Vec<Reference> {
        let mut bases = Vec::new();
        if let Some(superclasses) = class.child_by_field_name("superclasses") {
            let mut cursor = superclasses.walk();
            for base in superclasses.named_children(&mut cursor) {
                match base.kind() {
                    // metaclass=..., comments
                    "keyword_argument" | "comment" => {}
                    _ => bases.push(Reference {
                        path: self.dotted_path(base),
                        position: position(base),
                    }),
                }
            }
        }
        bases
    }

    fn lower_binding(&self, node: Node) -> Option<Binding> {
        let left = node.child_by_field_name("left")?;
        let right = node.child_by_field_name("right")?;
        if left.kind() != "identifier" || right.kind() != "call" {
            return None;
        }
        let callee = self.dotted_path(right.child_by_field_name("function")?)?;
        Some(Binding {
            name: self.text(left).to_string(),
            callee,
            position: position(node),
        })
    }

    /// `import a.b, c as d` yields one statement per imported module.
    fn lower_import(&self, node: Node, items: &mut Vec<Item>) {
        let mut cursor = node.walk();
        for name in node.children_by_field_name("name", &mut cursor) {
            let (path, alias) = match name.kind() {
                "dotted_name" => (self.text(name).to_string(), None),
                "aliased_import" => {
                    let Some(path) = name.child_by_field_name("name") else {
                        continue;
                    };
                    let alias = name
                        .child_by_field_name("alias")
                        .map(|alias| self.text(alias).to_string());
                    (self.text(path).to_string(), alias)
                }
                _ => continue,
            };
            items.push(Item::Import(ImportStmt {
                position: position(name),
                kind: ImportKind::Module { path, alias },
            }));
        }
    }

    fn lower_import_from(&self, node: Node, items: &mut Vec<Item>) {
        let (module, level) = match node.child_by_field_name("module_name") {
            Some(module) if module.kind() == "relative_import" => {
                let mut level = 0;
                let mut name = None;
                let mut cursor = module.walk();
                for child in module.named_children(&mut cursor) {
                    match child.kind() {
                        "import_prefix" => level = self.text(child).matches('.').count(),
                        "dotted_name" => name = Some(self.text(child).to_string()),
                        _ => {}
                    }
                }
                (name, level)
            }
            Some(module) => (Some(self.text(module).to_string()), 0),
            None => (None, 0),
        };

        items.push(Item::Import(ImportStmt {
            position: position(node),
            kind: ImportKind::From {
                module,
                level,
                names: self.imported_names(node),
            },
        }));
    }

    fn imported_names(&self, node: Node) -> Vec<ImportedName> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            match child.kind() {
                "dotted_name" => names.push(ImportedName {
                    name: self.text(child).to_string(),
                    alias: None,
                }),
                "aliased_import" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        names.push(ImportedName {
                            name: self.text(name).to_string(),
                            alias: child
                                .child_by_field_name("alias")
                                .map(|alias| self.text(alias).to_string()),
                        });
                    }
                }
                _ => {}
            }
        }

        let mut cursor = node.walk();
        if node
            .named_children(&mut cursor)
            .any(|child| child.kind() == "wildcard_import")
        {
            names.push(ImportedName {
                name: "*".to_string(),
                alias: None,
            });
        }
        names
    }

    /// Dotted path for identifier/attribute chains; `None` for any other expression.
    fn dotted_path(&self, node: Node) -> Option<String> {
        let mut attributes = Vec::new();
        let mut current = node;
        while current.kind() == "attribute" {
            attributes.push(self.text(current.child_by_field_name("attribute")?));
            current = current.child_by_field_name("object")?;
        }
        if current.kind() != "identifier" {
            return None;
        }

        let mut path = self.text(current).to_string();
        for attribute in attributes.iter().rev() {
            path.push('.');
            path.push_str(attribute);
        }
        Some(path)
    }

    fn text(&self, node: Node) -> &str {
        node.utf8_text(self.source).unwrap_or("")
    }
}

fn push_children<'t>(tasks: &mut Vec<Task<'t>>, node: Node<'t>, frame: usize) {
    let start = tasks.len();
    let mut cursor = node.walk();
    tasks.extend(
        node.named_children(&mut cursor)
            .map(|child| Task::Visit(child, frame)),
    );
    // Popped in source order.
    tasks[start..].reverse();
}

fn open_frame(
    frames: &mut Vec<Frame>,
    parent: usize,
    open: Open,
    node: Node,
) -> Result<usize, ParseError> {
    let depth = frames[parent].depth + 1;
    if depth > MAX_NESTING {
        let start = node.start_position();
        return Err(ParseError::NestingTooDeep {
            line: start.row + 1,
            limit: MAX_NESTING,
        });
    }
    frames.push(Frame {
        open,
        parent,
        depth,
        items: Vec::new(),
    });
    Ok(frames.len() - 1)
}

/// Finish a declaration and append it to its enclosing scope.
fn close(frames: &mut [Frame], index: usize) {
    let frame = &mut frames[index];
    let body = std::mem::take(&mut frame.items);
    let parent = frame.parent;
    let item = match std::mem::replace(&mut frame.open, Open::Module) {
        Open::Class {
            name,
            position,
            bases,
        } => Item::Class(ClassDecl {
            name,
            position,
            bases,
            body,
        }),
        Open::Function { name, position } => Item::Function(FunctionDecl {
            name,
            position,
            body,
        }),
        Open::Module => return,
    };
    frames[parent].items.push(item);
}

fn position(node: Node) -> Position {
    let start = node.start_position();
    Position::new(start.row + 1, start.column)
}
