//! Watch placement and crawl policy.
//!
//! Roots come in three flavours:
//!
//! - **watch roots** are crawled and every directory beneath them is watched
//! - **crawl roots** are crawled once, never watched
//! - **no-watch roots** carve unwatched subtrees out of the other two
//!
//! Exclude patterns are globs matched against paths relative to the
//! closest configured root. An entry is excluded when it, or any of its
//! ancestors below that root, matches.

use globset::{Glob, GlobSet, GlobSetBuilder};
use sift_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::indexer::IndexerConfig;

/// Entries found by walking one root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlResult {
    /// Directories, the crawled root first
    pub directories: Vec<PathBuf>,
    /// Regular files, including symlinks to regular files
    pub files: Vec<PathBuf>,
}

/// Decides which paths are crawled, watched or skipped.
#[derive(Debug, Clone)]
pub struct CrawlPolicy {
    watch_roots: Vec<PathBuf>,
    crawl_roots: Vec<PathBuf>,
    no_watch_roots: Vec<PathBuf>,
    exclude: GlobSet,
}

impl CrawlPolicy {
    /// Build the policy from indexer configuration.
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.exclude_patterns {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::Config(format!("invalid exclude pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }
        let exclude = builder
            .build()
            .map_err(|e| Error::Config(format!("invalid exclude patterns: {e}")))?;

        Ok(Self {
            watch_roots: config.watch_roots.clone(),
            crawl_roots: config.crawl_roots.clone(),
            no_watch_roots: config.no_watch_roots.clone(),
            exclude,
        })
    }

    /// Roots walked at startup: every watch root, then every crawl root
    /// not already covered by a watch root.
    #[must_use]
    pub fn startup_roots(&self) -> Vec<PathBuf> {
        let mut roots = self.watch_roots.clone();
        for root in &self.crawl_roots {
            if self.watch_roots.iter().any(|w| root.starts_with(w)) {
                debug!("Crawl root {:?} is already under a watch root", root);
                continue;
            }
            roots.push(root.clone());
        }
        roots
    }

    /// Whether a directory should get a monitor watch.
    #[must_use]
    pub fn should_watch(&self, dir: &Path) -> bool {
        self.watch_roots.iter().any(|root| dir.starts_with(root))
            && !self.no_watch_roots.iter().any(|root| dir.starts_with(root))
            && !self.is_excluded(dir)
    }

    /// Whether an entry matches an exclude pattern.
    ///
    /// Configured roots themselves are never excluded.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        let relative = self
            .closest_root(path)
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);

        relative
            .ancestors()
            .filter(|p| !p.as_os_str().is_empty())
            .any(|p| self.exclude.is_match(p))
    }

    fn closest_root(&self, path: &Path) -> Option<&Path> {
        self.watch_roots
            .iter()
            .chain(&self.crawl_roots)
            .chain(&self.no_watch_roots)
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    /// Walk `root`, skipping excluded entries and their contents.
    ///
    /// Blocking; run it on a blocking thread. Unreadable entries are logged
    /// and skipped. Symlinked directories are not followed.
    #[must_use]
    pub fn crawl_tree(&self, root: &Path) -> CrawlResult {
        let mut result = CrawlResult::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !self.is_excluded(entry.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read entry under {:?}: {}", root, e);
                    continue;
                }
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                result.directories.push(entry.into_path());
            } else if file_type.is_file() {
                result.files.push(entry.into_path());
            } else if file_type.is_symlink()
                && std::fs::metadata(entry.path()).is_ok_and(|m| m.is_file())
            {
                result.files.push(entry.into_path());
            }
        }

        result
    }
}
