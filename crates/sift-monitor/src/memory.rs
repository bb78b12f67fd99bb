//! In-memory backend for testing.
//!
//! This backend never touches the OS. It's useful for:
//! - Unit and integration tests of the registry and reconciler
//! - Driving the engine with synthetic [`RawEvent`](sift_core::RawEvent)s
//! - Simulating a specific backend family or a failing subscription

use sift_core::{BackendFamily, MonitorError, WatchPath};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::backend::NativeBackend;

#[derive(Debug, Default)]
struct MemoryState {
    next_handle: u64,
    active: HashMap<u64, PathBuf>,
    failing: HashSet<PathBuf>,
    subscribe_calls: u64,
    cancel_calls: u64,
}

/// Backend that records subscriptions instead of creating them.
///
/// Clones share state, so a test can keep one clone for inspection while
/// the monitor owns another.
///
/// # Example
///
/// ```rust
/// use sift_core::{BackendFamily, WatchPath};
/// use sift_monitor::{MemoryBackend, NativeBackend};
///
/// let mut backend = MemoryBackend::new(BackendFamily::Inotify);
/// let inspect = backend.clone();
///
/// let handle = backend.subscribe(&WatchPath::new("/data").unwrap()).unwrap();
/// assert!(inspect.is_subscribed("/data"));
///
/// backend.cancel(handle);
/// assert_eq!(inspect.active_count(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    family: BackendFamily,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Create a backend reporting the given family.
    #[must_use]
    pub fn new(family: BackendFamily) -> Self {
        Self {
            family,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every future subscription of `path` fail.
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.state().failing.insert(path.into());
    }

    /// Whether `path` currently has a live subscription.
    #[must_use]
    pub fn is_subscribed(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        self.state().active.values().any(|p| p == path)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state().active.len()
    }

    /// Paths with a live subscription, sorted.
    #[must_use]
    pub fn active_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state().active.values().cloned().collect();
        paths.sort();
        paths
    }

    /// Total calls to `subscribe`, including failed ones.
    #[must_use]
    pub fn subscribe_calls(&self) -> u64 {
        self.state().subscribe_calls
    }

    /// Total calls to `cancel`.
    #[must_use]
    pub fn cancel_calls(&self) -> u64 {
        self.state().cancel_calls
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(BackendFamily::Inotify)
    }
}

impl NativeBackend for MemoryBackend {
    type Handle = u64;

    fn family(&self) -> BackendFamily {
        self.family
    }

    fn subscribe(&mut self, path: &WatchPath) -> Result<u64, MonitorError> {
        let mut state = self.state();
        state.subscribe_calls += 1;

        if state.failing.contains(path.as_path()) {
            return Err(MonitorError::BackendUnavailable {
                path: path.as_path().to_path_buf(),
                reason: "simulated failure".to_string(),
            });
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        state.active.insert(handle, path.as_path().to_path_buf());
        Ok(handle)
    }

    fn cancel(&mut self, handle: u64) {
        let mut state = self.state();
        state.cancel_calls += 1;
        if state.active.remove(&handle).is_none() {
            debug!("Cancel of unknown handle {handle}");
        }
    }
}
