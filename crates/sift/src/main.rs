//! # sift CLI
//!
//! Command-line interface for sift, a filesystem change monitor and
//! desktop content indexer.
//!
//! ## Commands
//!
//! - `sift watch <PATH>...` - Print reconciled change events for directories
//! - `sift index <PATH>...` - Crawl and extract files, optionally keep watching
//! - `sift probe` - Show the notification backend and its watch ceiling
//! - `sift config show|init|path` - Inspect configuration
//!
//! ## Examples
//!
//! ```bash
//! # Watch a tree and print events as JSON lines
//! sift --format json watch ~/Documents
//!
//! # Index a directory and keep it up to date
//! sift index ~/Documents --watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sift_core::MonitorEvent;
use sift_extract::ExtractorRegistry;
use sift_index::{CrawlPolicy, IndexUpdate, IndexerConfig, IndexerService};
use sift_monitor::{probe_backend, MonitorConfig, MonitorService, NotifyBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Filesystem change monitor and content indexer")]
#[command(version)]
struct Cli {
    /// Path to config file (default: ~/.config/sift/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch directories and print change events until Ctrl+C
    Watch {
        /// Directories to watch
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Watch only the given directories, not their subdirectories
        #[arg(long)]
        shallow: bool,
    },

    /// Crawl directories and extract their files
    Index {
        /// Directories to index
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Keep watching for changes after the initial crawl
        #[arg(short, long)]
        watch: bool,
    },

    /// Show the notification backend and its limits
    Probe,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Print sample configuration file
    Init,
    /// Show config file path
    Path,
}

/// Output structure for probe.
#[derive(Serialize)]
struct ProbeOutput {
    backend: String,
    has_distinct_changes_done: bool,
    ceiling: usize,
}

/// Output structure for index progress in JSON mode.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IndexOutput<'a> {
    Indexed {
        record: &'a sift_core::FileRecord,
    },
    Removed {
        path: &'a PathBuf,
        is_directory: bool,
    },
    Moved {
        from: &'a PathBuf,
        to: &'a PathBuf,
        is_directory: bool,
    },
    Error {
        path: &'a PathBuf,
        error: &'a str,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(Some(path.clone()))
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().context("Failed to load config"),
    }
}

fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.logging.max_level().unwrap_or(Level::INFO)
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    if config.logging.max_level().is_none() {
        warn!("Unknown log level '{}', using info", config.logging.level);
    }
    Ok(())
}

/// Canonicalize user-supplied roots, failing on the first missing one.
fn resolve_roots(paths: Vec<PathBuf>) -> Result<Vec<PathBuf>> {
    paths
        .into_iter()
        .map(|path| {
            path.canonicalize()
                .with_context(|| format!("Directory does not exist: {}", path.display()))
        })
        .collect()
}

fn print_event(format: OutputFormat, event: &MonitorEvent) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(event)?),
        OutputFormat::Text => println!("{event}"),
    }
    Ok(())
}

async fn run_watch(
    format: OutputFormat,
    monitor_config: &MonitorConfig,
    exclude_patterns: Vec<String>,
    paths: Vec<PathBuf>,
    shallow: bool,
) -> Result<()> {
    let roots = resolve_roots(paths)?;
    let (handle, mut events) =
        MonitorService::start(monitor_config).context("Failed to start monitor")?;

    let directories = if shallow {
        roots
    } else {
        let policy = CrawlPolicy::new(&IndexerConfig {
            watch_roots: roots.clone(),
            exclude_patterns,
            ..Default::default()
        })?;
        tokio::task::spawn_blocking(move || {
            roots
                .iter()
                .flat_map(|root| policy.crawl_tree(root).directories)
                .collect::<Vec<_>>()
        })
        .await
        .context("Directory walk failed")?
    };

    let mut added = 0usize;
    for dir in directories {
        if handle.add(dir).await {
            added += 1;
        }
    }

    let capability = handle.capability();
    info!(
        "Watching {} directories on {} (ceiling {}, {} refused). Press Ctrl+C to stop.",
        added,
        capability.family,
        capability.ceiling,
        handle.ignored_count().await
    );

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(format, &event)?,
                None => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to wait for Ctrl+C")?;
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

async fn run_index(
    format: OutputFormat,
    config: Config,
    paths: Vec<PathBuf>,
    watch: bool,
) -> Result<()> {
    let roots = resolve_roots(paths)?;

    let mut index_config = config.index;
    if watch {
        index_config.watch_roots = roots;
    } else {
        index_config.crawl_roots = roots;
    }

    let extractors = Arc::new(ExtractorRegistry::with_defaults(index_config.max_bytes));
    let indexer = IndexerService::new(index_config, config.monitor, extractors);

    // Subscribe to updates for progress
    let mut updates = indexer.subscribe();
    let progress_handle = tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => {
                    if let Err(e) = report(format, &update) {
                        warn!("Failed to print update: {}", e);
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Skipped {} progress updates", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    indexer.start().await.context("Failed to start indexer")?;

    if watch {
        info!("Watching for changes. Press Ctrl+C to stop.");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to wait for Ctrl+C")?;
    }
    indexer.stop().await;
    drop(indexer);
    // The update channel closes with the indexer
    let _ = progress_handle.await;

    Ok(())
}

fn report(format: OutputFormat, update: &IndexUpdate) -> Result<()> {
    if format == OutputFormat::Json {
        let output = match update {
            IndexUpdate::FileIndexed { record } => IndexOutput::Indexed { record },
            IndexUpdate::FileRemoved { path, is_directory } => IndexOutput::Removed {
                path,
                is_directory: *is_directory,
            },
            IndexUpdate::FileMoved {
                from,
                to,
                is_directory,
            } => IndexOutput::Moved {
                from,
                to,
                is_directory: *is_directory,
            },
            IndexUpdate::FileError { path, error } => IndexOutput::Error { path, error },
            _ => return Ok(()),
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    match update {
        IndexUpdate::FileIndexed { record } => {
            let words = record.metadata.word_count.unwrap_or(0);
            info!(
                "Indexed: {:?} ({}, {} words)",
                record.path, record.mime_type, words
            );
        }
        IndexUpdate::FileRemoved { path, .. } => info!("Removed: {:?}", path),
        IndexUpdate::FileMoved { from, to, .. } => info!("Moved: {:?} -> {:?}", from, to),
        IndexUpdate::FileError { path, error } => warn!("Error: {:?}: {}", path, error),
        IndexUpdate::CrawlFinished {
            root,
            directories,
            files,
            watched,
        } => info!(
            "Crawled {:?}: {} files in {} directories, {} watched",
            root, files, directories, watched
        ),
        IndexUpdate::CrawlStarted { .. } | IndexUpdate::IndexingStarted { .. } => {}
    }
    Ok(())
}

fn run_probe(format: OutputFormat, monitor_config: &MonitorConfig) -> Result<()> {
    let (raw_tx, _raw_rx) = mpsc::unbounded_channel();
    let mut backend = NotifyBackend::new(raw_tx).context("Failed to create native watcher")?;
    let capability = probe_backend(&mut backend, monitor_config);

    match format {
        OutputFormat::Json => {
            let output = ProbeOutput {
                backend: capability.family.to_string(),
                has_distinct_changes_done: capability.has_distinct_changes_done,
                ceiling: capability.ceiling,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Backend:      {}", capability.family);
            println!(
                "Changes done: {}",
                if capability.has_distinct_changes_done {
                    "distinct"
                } else {
                    "implied"
                }
            );
            println!("Ceiling:      {}", capability.ceiling);
        }
    }
    Ok(())
}

fn run_config(format: OutputFormat, config: &Config, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => match format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(config).context("Failed to serialize config")?
                );
            }
            OutputFormat::Text => {
                println!(
                    "{}",
                    toml::to_string_pretty(config).context("Failed to serialize config")?
                );
            }
        },
        ConfigAction::Init => {
            println!("{}", Config::sample_toml());
        }
        ConfigAction::Path => {
            if let Some(path) = Config::config_path() {
                println!("{}", path.display());
            } else {
                println!("Could not determine config directory");
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_logging(&cli, &config)?;

    match cli.command {
        Commands::Watch { paths, shallow } => {
            run_watch(
                cli.format,
                &config.monitor,
                config.index.exclude_patterns.clone(),
                paths,
                shallow,
            )
            .await?;
        }
        Commands::Index { paths, watch } => {
            run_index(cli.format, config, paths, watch).await?;
        }
        Commands::Probe => run_probe(cli.format, &config.monitor)?,
        Commands::Config { action } => run_config(cli.format, &config, &action)?,
    }

    Ok(())
}
