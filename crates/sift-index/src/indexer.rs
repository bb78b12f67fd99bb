//! Main indexing service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sift_core::{
    ContentMetadataInfo, Error, ExtractError, FileRecord, FileStatus, IndexStats, MonitorEvent,
    Result,
};
use sift_extract::{ExtractorRegistry, DEFAULT_MAX_BYTES};
use sift_monitor::{MonitorConfig, MonitorHandle, MonitorService};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use crate::policy::CrawlPolicy;

/// Index update events.
#[derive(Debug, Clone)]
pub enum IndexUpdate {
    CrawlStarted {
        root: PathBuf,
    },
    CrawlFinished {
        root: PathBuf,
        directories: usize,
        files: usize,
        watched: usize,
    },
    IndexingStarted {
        path: PathBuf,
    },
    FileIndexed {
        record: FileRecord,
    },
    FileRemoved {
        path: PathBuf,
        is_directory: bool,
    },
    FileMoved {
        from: PathBuf,
        to: PathBuf,
        is_directory: bool,
    },
    FileError {
        path: PathBuf,
        error: String,
    },
}

/// Configuration for the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Crawled and watched recursively
    pub watch_roots: Vec<PathBuf>,
    /// Crawled once, never watched
    pub crawl_roots: Vec<PathBuf>,
    /// Subtrees that are crawled but never watched
    pub no_watch_roots: Vec<PathBuf>,
    /// Exclude patterns (glob), relative to the closest root
    pub exclude_patterns: Vec<String>,
    /// Maximum bytes of text extracted per file
    pub max_bytes: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            watch_roots: Vec::new(),
            crawl_roots: Vec::new(),
            no_watch_roots: Vec::new(),
            exclude_patterns: vec![
                "**/.*".to_string(),
                "**/node_modules".to_string(),
                "**/target".to_string(),
                "**/__pycache__".to_string(),
                "**/*.lock".to_string(),
            ],
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

/// Main indexing service.
pub struct IndexerService {
    /// Indexer configuration
    config: IndexerConfig,
    /// Configuration for the monitor started by [`IndexerService::start`]
    monitor_config: MonitorConfig,
    /// Extractor registry
    extractors: Arc<ExtractorRegistry>,
    /// Indexing statistics
    stats: Arc<RwLock<IndexStats>>,
    /// Whether the last pass over each known file succeeded
    outcomes: Arc<RwLock<HashMap<PathBuf, bool>>>,
    /// Update broadcast channel
    update_tx: broadcast::Sender<IndexUpdate>,
    /// Monitor handle (if running)
    monitor: Arc<RwLock<Option<MonitorHandle>>>,
    /// Event processing task
    event_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl IndexerService {
    /// Create a new indexer service.
    pub fn new(
        config: IndexerConfig,
        monitor_config: MonitorConfig,
        extractors: Arc<ExtractorRegistry>,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);

        Self {
            config,
            monitor_config,
            extractors,
            stats: Arc::new(RwLock::new(IndexStats::default())),
            outcomes: Arc::new(RwLock::new(HashMap::new())),
            update_tx,
            monitor: Arc::new(RwLock::new(None)),
            event_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.update_tx.subscribe()
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Start a native monitor, then crawl the configured roots.
    pub async fn start(&self) -> Result<()> {
        if self.is_running().await {
            return Ok(());
        }

        let (handle, events) = MonitorService::start(&self.monitor_config)?;
        self.start_with(handle, events).await
    }

    /// Start on an already running monitor.
    ///
    /// Events from `events` are processed on a background task until the
    /// monitor shuts down. The initial crawl has completed when this
    /// returns.
    pub async fn start_with(
        &self,
        handle: MonitorHandle,
        mut events: mpsc::UnboundedReceiver<MonitorEvent>,
    ) -> Result<()> {
        {
            let mut monitor = self.monitor.write().await;
            if monitor.is_some() {
                return Ok(());
            }
            *monitor = Some(handle.clone());
        }

        let capability = handle.capability();
        info!(
            "Starting indexer on {} backend (ceiling {})",
            capability.family, capability.ceiling
        );

        let pipeline = Pipeline {
            policy: Arc::new(CrawlPolicy::new(&self.config)?),
            monitor: handle,
            extractors: Arc::clone(&self.extractors),
            stats: Arc::clone(&self.stats),
            outcomes: Arc::clone(&self.outcomes),
            update_tx: self.update_tx.clone(),
        };

        // Spawn event processing task
        let event_pipeline = pipeline.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                event_pipeline.handle_event(event).await;
            }
            debug!("Monitor event stream closed");
        });
        *self.event_task.lock().await = Some(task);

        // Initial crawl
        for root in pipeline.policy.startup_roots() {
            pipeline.crawl(&root).await?;
        }

        Ok(())
    }

    /// Whether the indexer has been started and not stopped.
    pub async fn is_running(&self) -> bool {
        self.monitor.read().await.is_some()
    }

    /// Handle to the running monitor.
    pub async fn monitor(&self) -> Option<MonitorHandle> {
        self.monitor.read().await.clone()
    }

    /// Current statistics.
    pub async fn stats(&self) -> IndexStats {
        self.stats.read().await.clone()
    }

    /// Extract a single file without touching statistics or subscribers.
    ///
    /// Returns `None` when the path is not a regular file.
    pub async fn index_path(&self, path: &Path) -> Result<Option<FileRecord>> {
        process_file(path, &self.extractors).await
    }

    /// Shut the monitor down and wait for pending events to be processed.
    pub async fn stop(&self) {
        let Some(handle) = self.monitor.write().await.take() else {
            return;
        };

        info!("Stopping indexer");
        handle.shutdown().await;

        if let Some(task) = self.event_task.lock().await.take() {
            if let Err(e) = task.await {
                error!("Event task failed: {}", e);
            }
        }
    }
}

/// Shared state of the crawl and event handling.
#[derive(Clone)]
struct Pipeline {
    policy: Arc<CrawlPolicy>,
    monitor: MonitorHandle,
    extractors: Arc<ExtractorRegistry>,
    stats: Arc<RwLock<IndexStats>>,
    outcomes: Arc<RwLock<HashMap<PathBuf, bool>>>,
    update_tx: broadcast::Sender<IndexUpdate>,
}

impl Pipeline {
    /// Walk a subtree, watch its directories, then index its files.
    async fn crawl(&self, root: &Path) -> Result<()> {
        info!("Crawling {:?}", root);
        let _ = self.update_tx.send(IndexUpdate::CrawlStarted {
            root: root.to_path_buf(),
        });

        // Walk directory in background thread (blocking I/O)
        let policy = Arc::clone(&self.policy);
        let walk_root = root.to_path_buf();
        let result = tokio::task::spawn_blocking(move || policy.crawl_tree(&walk_root))
            .await
            .map_err(|e| Error::Other(format!("crawl task failed: {e}")))?;

        let mut watched = 0;
        for dir in &result.directories {
            if self.policy.should_watch(dir) && self.monitor.add(dir.clone()).await {
                watched += 1;
            }
        }

        for file in &result.files {
            self.index_file(file).await;
        }

        info!(
            "Crawled {:?}: {} directories ({} watched), {} files",
            root,
            result.directories.len(),
            watched,
            result.files.len()
        );
        let _ = self.update_tx.send(IndexUpdate::CrawlFinished {
            root: root.to_path_buf(),
            directories: result.directories.len(),
            files: result.files.len(),
            watched,
        });

        Ok(())
    }

    async fn index_file(&self, path: &Path) {
        let _ = self.update_tx.send(IndexUpdate::IndexingStarted {
            path: path.to_path_buf(),
        });

        match process_file(path, &self.extractors).await {
            Ok(Some(record)) => {
                debug!("Indexed {:?} ({})", path, record.mime_type);

                self.record_outcome(path, true).await;
                let _ = self.update_tx.send(IndexUpdate::FileIndexed { record });
            }
            Ok(None) => {
                debug!("{:?} is not a regular file, skipping", path);
            }
            Err(e) => {
                error!("Failed to index {:?}: {}", path, e);

                self.record_outcome(path, false).await;
                let _ = self.update_tx.send(IndexUpdate::FileError {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                });
            }
        }
    }

    /// Count a pass over `path`; a file is counted once however often it
    /// is re-indexed.
    async fn record_outcome(&self, path: &Path, indexed: bool) {
        let previous = self
            .outcomes
            .write()
            .await
            .insert(path.to_path_buf(), indexed);

        let mut s = self.stats.write().await;
        match previous {
            Some(true) => s.indexed_files -= 1,
            Some(false) => s.error_files -= 1,
            None => s.total_files += 1,
        }
        if indexed {
            s.indexed_files += 1;
        } else {
            s.error_files += 1;
        }
        s.last_update = Some(Utc::now());
    }

    /// Drop `path`, and everything beneath it for a directory, from the
    /// counts.
    async fn forget(&self, path: &Path, is_directory: bool) {
        let mut outcomes = self.outcomes.write().await;
        let gone: Vec<PathBuf> = if is_directory {
            outcomes
                .keys()
                .filter(|known| known.starts_with(path))
                .cloned()
                .collect()
        } else {
            vec![path.to_path_buf()]
        };

        let mut s = self.stats.write().await;
        for known in gone {
            match outcomes.remove(&known) {
                Some(true) => s.indexed_files -= 1,
                Some(false) => s.error_files -= 1,
                None => continue,
            }
            s.total_files -= 1;
        }
    }

    /// Re-key the files of a moved directory.
    async fn rebase(&self, from: &Path, to: &Path) {
        let mut outcomes = self.outcomes.write().await;
        let moved: Vec<PathBuf> = outcomes
            .keys()
            .filter(|known| known.starts_with(from))
            .cloned()
            .collect();

        for old in moved {
            let Ok(relative) = old.strip_prefix(from) else {
                continue;
            };
            let new = to.join(relative);
            if let Some(indexed) = outcomes.remove(&old) {
                outcomes.insert(new, indexed);
            }
        }
    }

    async fn handle_event(&self, event: MonitorEvent) {
        debug!("Received monitor event: {}", event);

        match event {
            MonitorEvent::Created {
                path,
                is_directory: true,
            } => {
                if self.policy.is_excluded(&path) {
                    trace!("Ignoring excluded directory {:?}", path);
                    return;
                }
                if let Err(e) = self.crawl(&path).await {
                    error!("Failed to crawl {:?}: {}", path, e);
                }
            }
            MonitorEvent::Created {
                path,
                is_directory: false,
            }
            | MonitorEvent::Updated {
                path,
                is_directory: false,
            } => {
                if self.policy.is_excluded(&path) {
                    trace!("Ignoring excluded file {:?}", path);
                    return;
                }
                self.index_file(&path).await;
            }
            MonitorEvent::Updated {
                is_directory: true, ..
            } => {}
            MonitorEvent::Deleted { path, is_directory } => {
                self.forget(&path, is_directory).await;
                {
                    let mut s = self.stats.write().await;
                    s.removed_entries += 1;
                    s.last_update = Some(Utc::now());
                }
                let _ = self
                    .update_tx
                    .send(IndexUpdate::FileRemoved { path, is_directory });
            }
            MonitorEvent::Moved {
                from,
                to,
                is_directory,
                ..
            } => {
                if is_directory {
                    self.rebase(&from, &to).await;
                } else {
                    self.forget(&from, false).await;
                }
                {
                    let mut s = self.stats.write().await;
                    s.moved_entries += 1;
                    s.last_update = Some(Utc::now());
                }
                let _ = self.update_tx.send(IndexUpdate::FileMoved {
                    from,
                    to: to.clone(),
                    is_directory,
                });

                if !is_directory && !self.policy.is_excluded(&to) {
                    self.index_file(&to).await;
                }
            }
        }
    }
}

/// Extract a file into a [`FileRecord`].
///
/// Files no extractor handles are still recorded, with default metadata
/// and no text.
async fn process_file(path: &Path, extractors: &ExtractorRegistry) -> Result<Option<FileRecord>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if !metadata.is_file() {
        return Ok(None);
    }

    // Compute content hash
    let content_hash = compute_hash(path).await?;

    // Determine MIME type
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    let (content_metadata, plain_text_content) = match extractors.extract(path, &mime_type).await
    {
        Ok(content) => {
            let text = (!content.text.is_empty()).then_some(content.text);
            (content.metadata, text)
        }
        Err(ExtractError::UnsupportedType(_)) => {
            debug!("No extractor for {:?} ({}), recording metadata only", path, mime_type);
            (ContentMetadataInfo::default(), None)
        }
        Err(e) => return Err(e.into()),
    };

    let now = Utc::now();
    Ok(Some(FileRecord {
        id: Uuid::new_v4(),
        path: path.to_path_buf(),
        size_bytes: metadata.len(),
        mime_type,
        content_hash,
        modified_at: metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(now),
        indexed_at: Some(now),
        status: FileStatus::Indexed,
        metadata: content_metadata,
        plain_text_content,
        error_message: None,
    }))
}

/// Compute blake3 hash of file content.
async fn compute_hash(path: &Path) -> Result<String> {
    let content = tokio::fs::read(path).await?;
    Ok(blake3::hash(&content).to_hex().to_string())
}
