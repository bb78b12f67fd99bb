//! Crawling and indexing pipeline for sift.
//!
//! The pipeline walks the configured roots once at startup, places a
//! monitor watch on every directory the policy allows, and afterwards
//! reacts to the monitor's semantic events:
//!
//! - a created directory is crawled with the same policy (the monitor
//!   never adds watches on its own)
//! - created and updated files are extracted into a [`FileRecord`]
//! - deletions and moves are forwarded as updates
//!
//! # Components
//!
//! - [`IndexerService`]: Owns the monitor and the event loop
//! - [`IndexerConfig`]: Roots, exclusions and extraction limits
//! - [`CrawlPolicy`]: Decides what gets watched, crawled or skipped
//! - [`IndexUpdate`]: Progress broadcast to subscribers
//!
//! # Example
//!
//! ```rust,no_run
//! use sift_extract::ExtractorRegistry;
//! use sift_index::{IndexUpdate, IndexerConfig, IndexerService};
//! use sift_monitor::MonitorConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> sift_core::Result<()> {
//! let config = IndexerConfig {
//!     watch_roots: vec!["/home/user/Documents".into()],
//!     ..Default::default()
//! };
//! let extractors = Arc::new(ExtractorRegistry::with_defaults(config.max_bytes));
//! let indexer = IndexerService::new(config, MonitorConfig::default(), extractors);
//!
//! let mut updates = indexer.subscribe();
//! indexer.start().await?;
//!
//! while let Ok(update) = updates.recv().await {
//!     if let IndexUpdate::FileIndexed { record } = update {
//!         println!("{}", record.path.display());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`FileRecord`]: sift_core::FileRecord

pub mod indexer;
pub mod policy;

pub use indexer::{IndexUpdate, IndexerConfig, IndexerService};
pub use policy::{CrawlPolicy, CrawlResult};
