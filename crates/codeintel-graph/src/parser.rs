//! Tree-sitter based Python parser.
//!
//! Produces syntax trees for the Python front end. Trees containing syntax
//! errors are rejected so that a unit is either lowered completely or
//! reported as a failure.

use thiserror::Error;

/// Errors that can occur during parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to parse source code")]
    ParseFailed,

    #[error("Failed to set parser language: {0}")]
    LanguageError(String),

    #[error("Syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("Declarations nested more than {limit} levels deep at line {line}")]
    NestingTooDeep { line: usize, limit: usize },
}

/// A parsed source file with its syntax tree.
pub struct ParsedFile {
    /// The tree-sitter syntax tree.
    pub tree: tree_sitter::Tree,
    /// The source code (owned for lifetime management).
    pub source: String,
}

impl ParsedFile {
    /// Get the root node of the syntax tree.
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    /// Get the source code as bytes.
    pub fn source_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }
}

/// Python source parser.
///
/// Wraps a tree-sitter parser configured for the Python grammar. A parser
/// is not `Sync`; parallel callers create one per worker.
pub struct Parser {
    ts_parser: tree_sitter::Parser,
}

impl Parser {
    /// Create a parser for the Python grammar.
    pub fn new() -> Result<Self, ParseError> {
        let mut ts_parser = tree_sitter::Parser::new();
        ts_parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::LanguageError(e.to_string()))?;
        Ok(Self { ts_parser })
    }

    /// Parse a source string.
    pub fn parse_source(&mut self, source: &str) -> Result<ParsedFile, ParseError> {
        let tree = self
            .ts_parser
            .parse(source, None)
            .ok_or(ParseError::ParseFailed)?;

        if tree.root_node().has_error() {
            let (line, column) = first_error(tree.root_node())
                .map(|node| {
                    let pos = node.start_position();
                    (pos.row + 1, pos.column)
                })
                .unwrap_or((1, 0));
            return Err(ParseError::Syntax { line, column });
        }

        Ok(ParsedFile {
            tree,
            source: source.to_string(),
        })
    }
}

/// First error or missing node in document order.
///
/// Walks with a cursor and only descends into subtrees that contain an
/// error, so deep trees do not grow the call stack.
fn first_error(root: tree_sitter::Node) -> Option<tree_sitter::Node> {
    let mut cursor = root.walk();
    loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return None;
            }
        }
    }
}
