//! Registry of watched directories.
//!
//! Maps each watched directory to its native subscription, enforces the
//! watch ceiling and applies the global enable switch. While monitoring is
//! disabled entries stay registered without a subscription, so enabling
//! again restores exactly the previous set.

use sift_core::{MonitorError, WatchPath};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::backend::NativeBackend;

/// Watch ceiling bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchLimit {
    /// Maximum number of registered directories
    pub ceiling: usize,
    /// Adds refused because the ceiling was reached
    pub ignored: u64,
    /// Whether the ceiling warning was logged since the last drop below it
    pub warned: bool,
}

impl WatchLimit {
    fn new(ceiling: usize) -> Self {
        Self {
            ceiling,
            ignored: 0,
            warned: false,
        }
    }
}

/// Watched directories and their native subscriptions.
pub struct MonitorRegistry<B: NativeBackend> {
    backend: B,
    watches: HashMap<WatchPath, Option<B::Handle>>,
    limit: WatchLimit,
    enabled: bool,
}

impl<B: NativeBackend> MonitorRegistry<B> {
    /// Create an empty registry.
    pub fn new(backend: B, ceiling: usize, enabled: bool) -> Self {
        Self {
            backend,
            watches: HashMap::new(),
            limit: WatchLimit::new(ceiling),
            enabled,
        }
    }

    /// Register a directory.
    ///
    /// Returns true if the directory is watched afterwards (including when it
    /// already was). Returns false, leaving the registry unchanged, when the
    /// ceiling is reached or the backend refuses the subscription.
    pub fn add(&mut self, path: &WatchPath) -> bool {
        if self.watches.contains_key(path) {
            return true;
        }

        if self.watches.len() >= self.limit.ceiling {
            self.limit.ignored += 1;
            if !self.limit.warned {
                warn!(
                    "{}, not adding any new monitors",
                    MonitorError::ResourceExhausted {
                        ceiling: self.limit.ceiling
                    }
                );
                self.limit.warned = true;
            }
            debug!("Not monitoring '{path}', {} ignored so far", self.limit.ignored);
            return false;
        }

        let handle = if self.enabled {
            match self.backend.subscribe(path) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!("Could not add monitor for path:'{path}', {e}");
                    return false;
                }
            }
        } else {
            None
        };

        self.watches.insert(path.clone(), handle);
        debug!(
            "Added monitor for path:'{path}', total monitors:{}",
            self.watches.len()
        );
        true
    }

    /// Unregister exactly `path`. Returns whether it was registered.
    pub fn remove(&mut self, path: &WatchPath) -> bool {
        let Some(handle) = self.watches.remove(path) else {
            return false;
        };

        if let Some(handle) = handle {
            self.backend.cancel(handle);
        }
        if self.watches.len() < self.limit.ceiling {
            self.limit.warned = false;
        }
        debug!(
            "Removed monitor for path:'{path}', total monitors:{}",
            self.watches.len()
        );
        true
    }

    /// Unregister `root` and every registered directory beneath it.
    ///
    /// Returns whether anything was removed.
    pub fn remove_recursive(&mut self, root: &WatchPath) -> bool {
        let doomed: Vec<WatchPath> = self
            .watches
            .keys()
            .filter(|path| path.is_within(root))
            .cloned()
            .collect();

        for path in &doomed {
            if let Some(Some(handle)) = self.watches.remove(path) {
                self.backend.cancel(handle);
            }
            debug!(
                "Removed monitor for path:'{path}', total monitors:{}",
                self.watches.len()
            );
        }

        if doomed.is_empty() {
            return false;
        }
        if self.watches.len() < self.limit.ceiling {
            self.limit.warned = false;
        }
        true
    }

    /// Switch native subscriptions on or off for every registered directory.
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;

        let backend = &mut self.backend;
        if enabled {
            debug!("Enabling monitors for {} directories", self.watches.len());
            for (path, handle) in &mut self.watches {
                match backend.subscribe(path) {
                    Ok(h) => *handle = Some(h),
                    Err(e) => warn!("Could not re-enable monitor for path:'{path}', {e}"),
                }
            }
        } else {
            debug!("Disabling monitors for {} directories", self.watches.len());
            for handle in self.watches.values_mut() {
                if let Some(h) = handle.take() {
                    backend.cancel(h);
                }
            }
        }
    }

    /// Cancel every subscription and forget all directories.
    pub fn shutdown(&mut self) {
        for handle in self.watches.drain().filter_map(|(_, handle)| handle) {
            self.backend.cancel(handle);
        }
    }

    /// Whether `path` is registered, regardless of the enable switch.
    #[must_use]
    pub fn is_watched(&self, path: &WatchPath) -> bool {
        self.watches.contains_key(path)
    }

    /// Whether `path` currently holds a native subscription.
    #[must_use]
    pub fn is_subscribed(&self, path: &WatchPath) -> bool {
        matches!(self.watches.get(path), Some(Some(_)))
    }

    /// Number of registered directories.
    #[must_use]
    pub fn count(&self) -> usize {
        self.watches.len()
    }

    /// Number of adds refused at the ceiling.
    #[must_use]
    pub fn ignored_count(&self) -> u64 {
        self.limit.ignored
    }

    #[must_use]
    pub fn limit(&self) -> WatchLimit {
        self.limit
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Registered directories, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &WatchPath> {
        self.watches.keys()
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}
