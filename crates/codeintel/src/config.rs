//! Configuration file support for codeintel.
//!
//! Project settings live in a `.codeintel/` directory:
//! - `.codeintel/config.toml` - Configuration file
//! - `.codeintel/logs/` - Log files when file logging is enabled
//!
//! Config discovery searches for `.codeintel/config.toml` starting from the
//! current directory and walking up to parent directories. Relative paths in
//! the file are resolved against the project directory that holds
//! `.codeintel/`, so the default `root = "."` names the project itself.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codeintel_graph::ScanConfig;
use serde::{Deserialize, Serialize};

/// The codeintel data directory name.
pub const CODEINTEL_DIR: &str = ".codeintel";
/// The config file name within the codeintel directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Project settings.
    pub project: ProjectConfig,
    /// Source discovery and scanning.
    pub scan: ScanSection,
    /// Metric ranking settings.
    pub report: ReportConfig,
    /// Where analysis artifacts are written.
    pub output: OutputConfig,
    /// Log file settings.
    pub logging: LoggingConfig,
}

/// Project configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Root directory of the project.
    pub root: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

/// Scan configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanSection {
    /// File extensions to analyze.
    pub extensions: Vec<String>,
    /// Abort on the first file that fails to load or declares a duplicate.
    pub strict: bool,
    /// Parse and resolve files in parallel.
    pub parallel: bool,
    /// Skip files matched by `.gitignore`.
    pub follow_gitignore: bool,
}

impl Default for ScanSection {
    fn default() -> Self {
        let defaults = ScanConfig::default();
        Self {
            extensions: defaults.extensions,
            strict: defaults.strict,
            parallel: defaults.parallel,
            follow_gitignore: defaults.follow_gitignore,
        }
    }
}

/// Report configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Entries kept per ranked list.
    pub limit: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for the JSON artifacts and summary.md.
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("codeintel-out"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rotating log files. Logs go to stderr when unset.
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Find and load configuration from current or parent directories.
    pub fn find_and_load() -> Result<Option<(Self, PathBuf)>> {
        let current = std::env::current_dir()?;
        Self::find_and_load_from(&current)
    }

    /// Find and load configuration starting from a specific directory.
    ///
    /// Looks for `.codeintel/config.toml` in the directory and its parents and
    /// returns the config together with its `.codeintel/` directory.
    pub fn find_and_load_from(start: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start.to_path_buf();

        loop {
            let codeintel_dir = dir.join(CODEINTEL_DIR);
            let config_path = codeintel_dir.join(CONFIG_FILE);
            if config_path.exists() {
                let config = Self::from_file(&config_path)?;
                return Ok(Some((config, codeintel_dir)));
            }

            if !dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Scanner settings from the `[scan]` section.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            extensions: self.scan.extensions.clone(),
            strict: self.scan.strict,
            parallel: self.scan.parallel,
            follow_gitignore: self.scan.follow_gitignore,
        }
    }

    /// Resolve the project root against the project directory.
    pub fn resolve_root(&self, config_dir: Option<&Path>) -> PathBuf {
        resolve(&self.project.root, config_dir)
    }

    /// Resolve the output directory against the project directory.
    pub fn resolve_output_dir(&self, config_dir: Option<&Path>) -> PathBuf {
        resolve(&self.output.dir, config_dir)
    }

    /// Resolve the log directory, if file logging is configured.
    pub fn resolve_log_dir(&self, config_dir: Option<&Path>) -> Option<PathBuf> {
        self.logging.dir.as_deref().map(|dir| resolve(dir, config_dir))
    }

    /// Validate the configuration.
    ///
    /// Returns a list of validation errors if any are found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        if self.scan.extensions.is_empty() {
            errors.push(ConfigValidationError {
                field: "scan.extensions".to_string(),
                message: "At least one file extension is required.".to_string(),
            });
        }

        for ext in &self.scan.extensions {
            if ext.is_empty() || ext.starts_with('.') {
                errors.push(ConfigValidationError {
                    field: "scan.extensions".to_string(),
                    message: format!("Invalid extension '{ext}'. Use the bare extension, e.g. \"py\"."),
                });
            }
        }

        if self.report.limit == 0 {
            errors.push(ConfigValidationError {
                field: "report.limit".to_string(),
                message: "Report limit must be greater than zero.".to_string(),
            });
        }

        if self.output.dir.as_os_str().is_empty() {
            errors.push(ConfigValidationError {
                field: "output.dir".to_string(),
                message: "Output directory cannot be empty.".to_string(),
            });
        }

        errors
    }
}

/// The directory relative paths are resolved against: the parent of a
/// `.codeintel/` directory, or the directory of a config file kept elsewhere.
fn project_dir(config_dir: &Path) -> &Path {
    match (config_dir.file_name(), config_dir.parent()) {
        (Some(name), Some(parent)) if name == CODEINTEL_DIR => parent,
        _ => config_dir,
    }
}

fn resolve(path: &Path, config_dir: Option<&Path>) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if let Some(dir) = config_dir {
        project_dir(dir).join(path)
    } else {
        path.to_path_buf()
    }
}

/// Configuration validation error.
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigValidationError {}

/// Config written by `codeintel init`.
pub const DEFAULT_CONFIG: &str = r#"# codeintel configuration
# Relative paths are resolved against the directory holding .codeintel/

[project]
root = "."

[scan]
extensions = ["py"]
strict = false  # Abort on the first file that fails to parse or declares a duplicate
parallel = true
follow_gitignore = true

[report]
limit = 10  # Entries per ranked list in summary.md

[output]
dir = "codeintel-out"

# [logging]
# dir = ".codeintel/logs"  # Daily-rotated codeintel.log
"#;
