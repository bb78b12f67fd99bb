//! Basic example: indexing a directory and following its changes
//!
//! Run with:
//! ```bash
//! cargo run -p sift-index --example basic_index -- /path/to/directory
//! ```

use anyhow::{Context, Result};
use sift_extract::ExtractorRegistry;
use sift_index::{IndexUpdate, IndexerConfig, IndexerService};
use sift_monitor::MonitorConfig;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <directory>", args[0]);
        std::process::exit(1);
    }

    let source = PathBuf::from(&args[1])
        .canonicalize()
        .context("Directory does not exist")?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = IndexerConfig {
        watch_roots: vec![source.clone()],
        ..Default::default()
    };
    let extractors = Arc::new(ExtractorRegistry::with_defaults(config.max_bytes));
    let indexer = IndexerService::new(config, MonitorConfig::default(), extractors);

    let mut updates = indexer.subscribe();
    let progress_task = tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            match update {
                IndexUpdate::FileIndexed { record } => {
                    info!("Indexed: {:?} ({})", record.path, record.mime_type);
                }
                IndexUpdate::FileError { path, error } => warn!("Error indexing {:?}: {}", path, error),
                IndexUpdate::FileRemoved { path, .. } => info!("Removed: {:?}", path),
                IndexUpdate::FileMoved { from, to, .. } => info!("Moved: {:?} -> {:?}", from, to),
                _ => {}
            }
        }
    });

    info!("Indexing {:?}", source);
    indexer.start().await.context("Failed to start indexer")?;

    let stats = indexer.stats().await;
    info!(
        "Initial crawl done: {} files, {} errors. Watching, press Ctrl+C to stop.",
        stats.indexed_files, stats.error_files
    );

    tokio::signal::ctrl_c().await?;
    indexer.stop().await;
    progress_task.abort();

    Ok(())
}
