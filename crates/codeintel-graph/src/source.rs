//! Source tree loading.
//!
//! Walks a project directory (respecting `.gitignore`), derives module names
//! from paths, and parses every matching file into a [`SourceUnit`]. Parsing
//! runs on the rayon pool with one tree-sitter parser per worker.

use std::fs;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::lang::PythonExtractor;
use crate::parser::{ParseError, Parser};
use crate::scanner::{ScanConfig, UnitFailure};
use crate::unit::SourceUnit;

/// Errors that prevent a source tree from being loaded at all.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Parser setup failed: {0}")]
    Parser(#[from] ParseError),
}

/// Module name derived from a file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath {
    pub name: String,
    pub is_package: bool,
}

/// Derive the module name for a path relative to the project root.
///
/// `pkg/mod.py` is `pkg.mod`; `pkg/__init__.py` is the package `pkg`. A
/// root-level `__init__.py` keeps the name `__init__`.
pub fn module_path(relative: &Path) -> Option<ModulePath> {
    let stem = relative.file_stem()?.to_str()?;
    let mut segments = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_str()?),
                Component::CurDir => {}
                _ => return None,
            }
        }
    }

    let is_package = stem == "__init__" && !segments.is_empty();
    if !is_package {
        segments.push(stem);
    }
    // `odd..py` or `a.b/c.py` would not name a single dotted segment each.
    if segments
        .iter()
        .any(|segment| segment.is_empty() || segment.contains('.'))
    {
        return None;
    }

    Some(ModulePath {
        name: segments.join("."),
        is_package,
    })
}

/// A loaded project: parsed units in path order plus load failures.
#[derive(Debug, Default)]
pub struct SourceTree {
    units: Vec<SourceUnit>,
    failures: Vec<UnitFailure>,
}

impl SourceTree {
    /// Discover and parse every matching file under `root`.
    pub fn load(root: &Path, config: &ScanConfig) -> Result<Self, LoadError> {
        let files = Self::discover(root, config)?;
        info!(root = %root.display(), files = files.len(), "Discovered source files");

        // Surface a broken grammar once instead of once per file.
        Parser::new()?;

        let results: Vec<Result<SourceUnit, UnitFailure>> = if config.parallel {
            files
                .par_iter()
                .map_init(Parser::new, |parser, path| match parser {
                    Ok(parser) => load_unit(parser, root, path),
                    Err(e) => Err(failure_for(root, path, e.to_string())),
                })
                .collect()
        } else {
            let mut parser = Parser::new()?;
            files
                .iter()
                .map(|path| load_unit(&mut parser, root, path))
                .collect()
        };

        let mut tree = SourceTree::default();
        for result in results {
            match result {
                Ok(unit) => tree.units.push(unit),
                Err(failure) => {
                    warn!(path = %failure.path, reason = %failure.reason, "Failed to load unit");
                    tree.failures.push(failure);
                }
            }
        }

        info!(
            units = tree.units.len(),
            failures = tree.failures.len(),
            "Loaded source tree"
        );
        Ok(tree)
    }

    /// List matching files under `root`, sorted by path.
    pub fn discover(root: &Path, config: &ScanConfig) -> Result<Vec<PathBuf>, LoadError> {
        if !root.is_dir() {
            return Err(LoadError::NotADirectory(root.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(config.follow_gitignore)
            .git_global(config.follow_gitignore)
            .git_exclude(config.follow_gitignore)
            .require_git(false)
            .follow_links(false)
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| config.matches_extension(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        files.sort();
        Ok(files)
    }

    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    /// Files that could not be read or parsed.
    pub fn failures(&self) -> &[UnitFailure] {
        &self.failures
    }

    pub fn into_parts(self) -> (Vec<SourceUnit>, Vec<UnitFailure>) {
        (self.units, self.failures)
    }
}

/// Path relative to the root plus its `/`-joined spelling for reports.
fn relative_path(root: &Path, path: &Path) -> (PathBuf, String) {
    let relative = path.strip_prefix(root).unwrap_or(path).to_path_buf();
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    (relative, joined)
}

fn failure_for(root: &Path, path: &Path, reason: String) -> UnitFailure {
    let (relative, joined) = relative_path(root, path);
    UnitFailure {
        module: module_path(&relative).map(|m| m.name).unwrap_or_default(),
        path: joined,
        reason,
    }
}

fn load_unit(parser: &mut Parser, root: &Path, path: &Path) -> Result<SourceUnit, UnitFailure> {
    let (relative, joined) = relative_path(root, path);
    let Some(module) = module_path(&relative) else {
        return Err(failure_for(root, path, "cannot derive a module name".into()));
    };

    let source = fs::read_to_string(path)
        .map_err(|e| failure_for(root, path, format!("failed to read file: {e}")))?;
    let unit =
        PythonExtractor::parse_unit(parser, &source, &module.name, &joined, module.is_package)
            .map_err(|e| failure_for(root, path, e.to_string()))?;

    debug!(module = %unit.module, path = %unit.path, "Parsed unit");
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_module_path() {
        let m = module_path(Path::new("pkg/service.py")).unwrap();
        assert_eq!(m.name, "pkg.service");
        assert!(!m.is_package);

        let p = module_path(Path::new("pkg/sub/__init__.py")).unwrap();
        assert_eq!(p.name, "pkg.sub");
        assert!(p.is_package);

        let root_init = module_path(Path::new("__init__.py")).unwrap();
        assert_eq!(root_init.name, "__init__");
        assert!(!root_init.is_package);

        assert_eq!(module_path(Path::new("main.py")).unwrap().name, "main");

        assert!(module_path(Path::new("odd..py")).is_none());
        assert!(module_path(Path::new("a.b/c.py")).is_none());
    }

    #[test]
    fn test_load_skips_file_without_module_name() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.py", "def f():\n    pass\n");
        write(dir.path(), "odd..py", "def g():\n    pass\n");

        let tree = SourceTree::load(dir.path(), &ScanConfig::default()).unwrap();
        assert_eq!(tree.units().len(), 1);
        assert_eq!(tree.units()[0].module, "good");
        assert_eq!(tree.failures().len(), 1);
        assert_eq!(tree.failures()[0].path, "odd..py");
        assert!(tree.failures()[0].reason.contains("module name"));
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.py", "");
        write(dir.path(), "a.py", "");
        write(dir.path(), "pkg/__init__.py", "");
        write(dir.path(), "notes.txt", "");
        write(dir.path(), ".hidden/skip.py", "");

        let files = SourceTree::discover(dir.path(), &ScanConfig::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| relative_path(dir.path(), p).1)
            .collect();
        assert_eq!(names, vec!["a.py", "b.py", "pkg/__init__.py"]);
    }

    #[test]
    fn test_discover_respects_gitignore() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "build/\n");
        write(dir.path(), "build/gen.py", "");
        write(dir.path(), "app.py", "");

        let files = SourceTree::discover(dir.path(), &ScanConfig::default()).unwrap();
        assert_eq!(files.len(), 1);

        let config = ScanConfig {
            follow_gitignore: false,
            ..ScanConfig::default()
        };
        let files = SourceTree::discover(dir.path(), &config).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_load_records_failures() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.py", "def f():\n    pass\n");
        write(dir.path(), "bad.py", "def broken(:\n");

        for parallel in [true, false] {
            let config = ScanConfig {
                parallel,
                ..ScanConfig::default()
            };
            let tree = SourceTree::load(dir.path(), &config).unwrap();
            assert_eq!(tree.units().len(), 1);
            assert_eq!(tree.units()[0].module, "good");
            assert_eq!(tree.units()[0].path, "good.py");

            assert_eq!(tree.failures().len(), 1);
            assert_eq!(tree.failures()[0].module, "bad");
            assert!(tree.failures()[0].reason.contains("Syntax error"));
        }
    }

    #[test]
    fn test_load_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = SourceTree::load(&dir.path().join("missing"), &ScanConfig::default());
        assert!(matches!(result, Err(LoadError::NotADirectory(_))));
    }
}
