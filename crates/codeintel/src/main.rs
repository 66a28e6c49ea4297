//! codeintel: static code intelligence for Python source trees
//!
//! Builds a graph of modules, classes, methods and functions with their
//! call, inheritance, definition and import relationships, then reports the
//! structural hotspots of the project.

mod config;
mod report;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeintel_graph::{Metrics, ScanConfig, ScanReport, Scanner};
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::{CODEINTEL_DIR, CONFIG_FILE, Config};

/// Static code intelligence: entity graph and structural metrics
#[derive(Parser)]
#[command(name = "codeintel")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .codeintel directory (default: search for .codeintel/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write daily-rotated logs to this directory instead of stderr
    #[arg(long, global = true, env = "CODEINTEL_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a source tree and write the graph and summary
    Analyze {
        /// Directory to analyze (default: project root from config or current dir)
        path: Option<PathBuf>,

        /// Output directory for the JSON artifacts and summary.md
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Entries per ranked list
        #[arg(long)]
        limit: Option<usize>,

        /// Abort on the first file that fails to parse or declares a duplicate
        #[arg(long)]
        strict: bool,
    },

    /// Print graph statistics and rankings without writing files
    Stats {
        /// Directory to analyze (default: project root from config or current dir)
        path: Option<PathBuf>,

        /// Entries per ranked list
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Initialize a new .codeintel directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize logging to stderr.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(verbose))
        .init();
}

/// Initialize logging to daily-rotated files in `log_dir`.
fn init_file_logging(log_dir: &Path, verbose: bool) {
    if let Err(e) = std::fs::create_dir_all(log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
        // Fall back to stderr logging
        init_logging(verbose);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "codeintel.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(env_filter(verbose))
        .init();
}

/// Load the config named on the command line, or search for one.
///
/// Returns the config and the directory holding the config file.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        // Explicit path override - treat as path to .codeintel directory
        let config_file = if path.is_dir() {
            path.join(CONFIG_FILE)
        } else {
            path.clone()
        };
        let config_dir = config_file.parent().unwrap_or(path).to_path_buf();
        let config = Config::from_file(&config_file)?;
        return Ok((config, Some(config_dir)));
    }

    // Auto-discover by walking up directory tree
    match Config::find_and_load()? {
        Some((config, config_dir)) => Ok((config, Some(config_dir))),
        None => Ok((Config::default(), None)),
    }
}

fn run_scan(root: &Path, scan_config: ScanConfig) -> Result<ScanReport> {
    let root = root
        .canonicalize()
        .with_context(|| format!("Project root not found: {}", root.display()))?;
    info!("Analyzing {}", root.display());

    let report = Scanner::new(scan_config)
        .scan_directory(&root)
        .with_context(|| format!("Failed to analyze {}", root.display()))?;

    for failure in &report.failures {
        warn!("Skipped {}: {}", failure.path, failure.reason);
    }
    info!(
        "Scanned {} files, {} entities, {} relations (discovery: {}ms, resolution: {}ms)",
        report.stats.units_scanned,
        report.stats.entities,
        report.stats.relations,
        report.stats.discovery_time_ms,
        report.stats.resolution_time_ms
    );
    Ok(report)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_dir) = load_config(cli.config.as_ref())?;

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.resolve_log_dir(config_dir.as_deref()));
    match &log_dir {
        Some(dir) => init_file_logging(dir, cli.verbose),
        None => init_logging(cli.verbose),
    }
    if let Some(dir) = &config_dir {
        info!("Found config at {}", dir.display());
    }

    let errors = config.validate();
    if !errors.is_empty() {
        let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", messages.join("\n  "));
    }

    match cli.command {
        Commands::Analyze {
            path,
            output,
            limit,
            strict,
        } => {
            let root = path.unwrap_or_else(|| config.resolve_root(config_dir.as_deref()));
            let mut scan_config = config.scan_config();
            scan_config.strict |= strict;

            let report = run_scan(&root, scan_config)?;
            let metrics = Metrics::new(&report.graph).report(limit.unwrap_or(config.report.limit));

            let output_dir =
                output.unwrap_or_else(|| config.resolve_output_dir(config_dir.as_deref()));
            let written = report::write_outputs(&output_dir, &report, &metrics)?;
            for path in &written {
                info!("Wrote {}", path.display());
            }

            println!(
                "Analyzed {} files: {} nodes, {} edges -> {}",
                report.stats.units_scanned,
                report.graph.node_count(),
                report.graph.edge_count(),
                output_dir.display()
            );
            if !report.is_complete() {
                println!(
                    "{} files skipped; see {}",
                    report.failures.len(),
                    output_dir.join(report::SUMMARY_FILE).display()
                );
            }
        }

        Commands::Stats { path, limit } => {
            let root = path.unwrap_or_else(|| config.resolve_root(config_dir.as_deref()));
            let report = run_scan(&root, config.scan_config())?;
            let metrics = Metrics::new(&report.graph).report(limit.unwrap_or(config.report.limit));
            println!(
                "{}",
                report::render_summary(&report.graph, &metrics, &report.failures)
            );
        }

        Commands::Init { force } => {
            let codeintel_dir = PathBuf::from(CODEINTEL_DIR);
            let config_path = codeintel_dir.join(CONFIG_FILE);

            if config_path.exists() && !force {
                anyhow::bail!(".codeintel/config.toml already exists. Use --force to overwrite.");
            }

            if !codeintel_dir.exists() {
                std::fs::create_dir_all(&codeintel_dir).with_context(|| {
                    format!("Failed to create {}", codeintel_dir.display())
                })?;
                info!("Created {}/", codeintel_dir.display());
            }

            std::fs::write(&config_path, config::DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write {}", config_path.display()))?;
            info!("Created {}", config_path.display());
            info!("Next steps:");
            info!("  1. Edit .codeintel/config.toml to configure your project");
            info!("  2. Run 'codeintel analyze' to build the graph and summary");
        }
    }

    Ok(())
}
