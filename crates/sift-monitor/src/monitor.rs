//! The monitoring engine facade.
//!
//! [`Monitor`] ties the registry, the reconciler and the sweep timer
//! together. It is synchronous and clock-agnostic: every entry point that
//! depends on time takes `now`, so the engine can be driven step by step in
//! tests or by the async [`MonitorService`](crate::MonitorService).

use sift_core::{BackendCapability, MonitorError, RawEvent, RawEventKind, WatchPath};
use std::collections::HashMap;
use std::path::Path;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::backend::NativeBackend;
use crate::classify::{EntryKind, FileTypeProbe, StatProbe};
use crate::config::MonitorConfig;
use crate::probe::probe_backend;
use crate::reconciler::{PendingEvent, Reconciler};
use crate::registry::MonitorRegistry;
use crate::relocate::relocate;
use crate::sink::EventSink;
use crate::sweep::SweepTimer;

/// Directory monitor with event reconciliation.
pub struct Monitor<B: NativeBackend, S: EventSink, P: FileTypeProbe = StatProbe> {
    registry: MonitorRegistry<B>,
    reconciler: Reconciler,
    timer: SweepTimer,
    capability: BackendCapability,
    sink: S,
    probe: P,
    /// Watched directories recently deleted or moved away, kept for one
    /// grace window so late notifications about them still count as
    /// directories
    departed: HashMap<WatchPath, Instant>,
}

impl<B: NativeBackend, S: EventSink> Monitor<B, S, StatProbe> {
    /// Probe the backend and create a monitor classifying paths with `stat`.
    pub fn new(backend: B, sink: S, config: &MonitorConfig) -> Self {
        Self::with_probe(backend, sink, StatProbe, config)
    }
}

impl<B: NativeBackend, S: EventSink, P: FileTypeProbe> Monitor<B, S, P> {
    /// Probe the backend and create a monitor with a custom file-type probe.
    pub fn with_probe(mut backend: B, sink: S, probe: P, config: &MonitorConfig) -> Self {
        let capability = probe_backend(&mut backend, config);
        Self::with_capability(backend, sink, probe, capability, config)
    }

    /// Create a monitor with a known capability, skipping the probe.
    pub fn with_capability(
        backend: B,
        sink: S,
        probe: P,
        capability: BackendCapability,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            registry: MonitorRegistry::new(backend, capability.ceiling, config.enabled),
            reconciler: Reconciler::new(config.grace_window(), capability.has_distinct_changes_done),
            timer: SweepTimer::new(config.sweep_interval()),
            capability,
            sink,
            probe,
            departed: HashMap::new(),
        }
    }

    // ========== Registry ==========

    /// Watch a directory. See [`MonitorRegistry::add`].
    pub fn add(&mut self, path: impl AsRef<Path>) -> bool {
        match validate(path.as_ref()) {
            Some(path) => self.registry.add(&path),
            None => false,
        }
    }

    /// Stop watching exactly this directory.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> bool {
        match validate(path.as_ref()) {
            Some(path) => self.registry.remove(&path),
            None => false,
        }
    }

    /// Stop watching a directory and everything beneath it.
    pub fn remove_recursive(&mut self, path: impl AsRef<Path>) -> bool {
        match validate(path.as_ref()) {
            Some(path) => self.registry.remove_recursive(&path),
            None => false,
        }
    }

    /// Turn native subscriptions on or off without forgetting directories.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.registry.set_enabled(enabled);
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.registry.is_enabled()
    }

    #[must_use]
    pub fn is_watched(&self, path: impl AsRef<Path>) -> bool {
        WatchPath::new(path).is_ok_and(|path| self.registry.is_watched(&path))
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.registry.count()
    }

    #[must_use]
    pub fn ignored_count(&self) -> u64 {
        self.registry.ignored_count()
    }

    #[must_use]
    pub fn capability(&self) -> BackendCapability {
        self.capability
    }

    // ========== Events ==========

    /// Feed one raw notification.
    ///
    /// Dropped silently while monitoring is disabled.
    pub fn handle_raw(&mut self, event: RawEvent, now: Instant) {
        if !self.registry.is_enabled() {
            trace!("Silently dropping monitor event, monitor disabled");
            return;
        }
        if event.kind == RawEventKind::Moved && event.other.is_none() {
            warn!(
                "{}",
                MonitorError::InvalidInput(format!("move of '{}' without destination", event.path))
            );
            return;
        }

        let is_directory = self.is_directory(&event.path);
        trace!(
            "Received monitor event:{} for {}:'{}'{}",
            event.kind,
            if is_directory { "directory" } else { "file" },
            event.path,
            event
                .other
                .as_ref()
                .map(|other| format!(" ({other})"))
                .unwrap_or_default()
        );

        for pending in self.reconciler.process(event, is_directory, now) {
            self.emit(&pending, now);
        }
        self.update_timer(now);
    }

    /// Release pending events older than the grace window.
    ///
    /// Reschedules the sweep while anything is still pending or a departed
    /// directory is still remembered, and cancels it otherwise.
    pub fn sweep(&mut self, now: Instant) {
        for pending in self.reconciler.expire(now) {
            debug!(
                "Event '{}' for '{}' has timed out ({:?} have elapsed)",
                pending.kind,
                pending.path,
                pending.age(now)
            );
            self.emit(&pending, now);
        }

        let grace = self.reconciler.grace_window();
        self.departed
            .retain(|_, departed_at| now.saturating_duration_since(*departed_at) < grace);

        if self.is_idle() {
            self.timer.cancel();
        } else {
            self.timer.reschedule(now);
        }
    }

    /// When the next sweep is due, if one is scheduled.
    #[must_use]
    pub fn next_sweep_at(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Number of buffered raw events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.reconciler.pending_count()
    }

    /// Cancel the sweep and every subscription. Buffered events are dropped.
    pub fn shutdown(&mut self) {
        self.timer.cancel();
        self.departed.clear();
        let discarded = self.reconciler.clear();
        if discarded > 0 {
            debug!("Discarded {discarded} pending events on shutdown");
        }
        self.registry.shutdown();
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    #[must_use]
    pub fn registry(&self) -> &MonitorRegistry<B> {
        &self.registry
    }

    fn is_directory(&self, path: &WatchPath) -> bool {
        match self.probe.probe(path.as_path()) {
            EntryKind::Directory => true,
            EntryKind::Other => false,
            EntryKind::Missing => {
                self.registry.is_watched(path) || self.departed.contains_key(path)
            }
        }
    }

    fn emit(&mut self, pending: &PendingEvent, now: Instant) {
        let Some(event) = pending.to_monitor_event() else {
            return;
        };
        debug!("Emitting {event}");
        self.sink.emit(event);

        if !pending.is_directory {
            return;
        }
        if matches!(pending.kind, RawEventKind::Deleted | RawEventKind::Moved) {
            self.remember_departed(&pending.path, now);
        }
        match (pending.kind, &pending.other) {
            (RawEventKind::Deleted, _) => {
                self.registry.remove_recursive(&pending.path);
            }
            (RawEventKind::Moved, Some(to)) => {
                relocate(&mut self.registry, &pending.path, to);
            }
            _ => {}
        }
    }

    fn remember_departed(&mut self, root: &WatchPath, now: Instant) {
        let gone: Vec<WatchPath> = self
            .registry
            .paths()
            .filter(|path| path.is_descendant_of(root))
            .cloned()
            .collect();
        self.departed.insert(root.clone(), now);
        for path in gone {
            self.departed.insert(path, now);
        }
    }

    fn is_idle(&self) -> bool {
        self.reconciler.is_empty() && self.departed.is_empty()
    }

    fn update_timer(&mut self, now: Instant) {
        if self.is_idle() {
            self.timer.cancel();
        } else {
            self.timer.arm(now);
        }
    }
}

fn validate(path: &Path) -> Option<WatchPath> {
    match WatchPath::new(path) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Rejected monitor request: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use sift_core::{BackendFamily, MonitorEvent};
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type TestMonitor = Monitor<MemoryBackend, Vec<MonitorEvent>, DirSet>;

    /// Probe that reports directories from a shared set, everything else
    /// missing.
    #[derive(Clone, Default)]
    struct DirSet(Arc<Mutex<HashSet<PathBuf>>>);

    impl DirSet {
        fn insert(&self, path: &str) {
            self.0.lock().unwrap().insert(PathBuf::from(path));
        }

        fn remove(&self, path: &str) {
            self.0.lock().unwrap().remove(Path::new(path));
        }
    }

    impl FileTypeProbe for DirSet {
        fn probe(&self, path: &Path) -> EntryKind {
            if self.0.lock().unwrap().contains(path) {
                EntryKind::Directory
            } else {
                EntryKind::Missing
            }
        }
    }

    fn capability(ceiling: usize) -> BackendCapability {
        BackendCapability {
            family: BackendFamily::Inotify,
            has_distinct_changes_done: true,
            ceiling,
        }
    }

    fn monitor(ceiling: usize) -> (TestMonitor, DirSet) {
        let dirs = DirSet::default();
        let monitor = Monitor::with_capability(
            MemoryBackend::default(),
            Vec::new(),
            dirs.clone(),
            capability(ceiling),
            &MonitorConfig::default(),
        );
        (monitor, dirs)
    }

    fn wp(path: &str) -> WatchPath {
        WatchPath::new(path).unwrap()
    }

    fn raw(kind: RawEventKind, path: &str) -> RawEvent {
        RawEvent::new(kind, wp(path))
    }

    impl TestMonitor {
        fn reconciler_has_delete(&self, path: &str) -> bool {
            self.reconciler.pending_delete(&wp(path)).is_some()
        }
    }

    #[test]
    fn test_invalid_paths_rejected() {
        let (mut monitor, _) = monitor(10);
        assert!(!monitor.add("relative/dir"));
        assert!(!monitor.add(""));
        assert!(!monitor.remove("relative"));
        assert!(!monitor.is_watched("relative"));
        assert_eq!(monitor.count(), 0);
    }

    #[test]
    fn test_timer_follows_pending_tables() {
        let (mut monitor, _) = monitor(10);
        let now = Instant::now();
        assert!(monitor.next_sweep_at().is_none());

        monitor.handle_raw(raw(RawEventKind::Created, "/d/f"), now);
        assert_eq!(monitor.next_sweep_at(), Some(now + Duration::from_secs(1)));

        monitor.handle_raw(raw(RawEventKind::ChangesDone, "/d/f"), now);
        assert!(monitor.next_sweep_at().is_none());
        assert_eq!(monitor.sink().len(), 1);
    }

    #[test]
    fn test_sweep_reschedules_until_empty() {
        let (mut monitor, _) = monitor(10);
        let start = Instant::now();
        monitor.handle_raw(raw(RawEventKind::Created, "/d/f"), start);

        let first = start + Duration::from_secs(1);
        monitor.sweep(first);
        assert!(monitor.sink().is_empty());
        assert_eq!(monitor.next_sweep_at(), Some(first + Duration::from_secs(1)));

        monitor.sweep(start + Duration::from_secs(2));
        assert_eq!(
            monitor.sink().as_slice(),
            &[MonitorEvent::Created {
                path: "/d/f".into(),
                is_directory: false
            }]
        );
        assert!(monitor.next_sweep_at().is_none());
    }

    #[test]
    fn test_disabled_monitor_drops_events() {
        let (mut monitor, _) = monitor(10);
        monitor.set_enabled(false);

        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/f"), Instant::now());
        assert!(monitor.sink().is_empty());
        assert_eq!(monitor.pending_count(), 0);
    }

    #[test]
    fn test_move_without_destination_rejected() {
        let (mut monitor, _) = monitor(10);
        let event = RawEvent {
            path: wp("/d/a"),
            other: None,
            kind: RawEventKind::Moved,
        };
        monitor.handle_raw(event, Instant::now());
        assert!(monitor.sink().is_empty());
    }

    #[test]
    fn test_vanished_watched_path_is_directory() {
        let (mut monitor, _) = monitor(10);
        monitor.add("/d/sub");

        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/sub"), Instant::now());
        // Buffered as a directory delete rather than emitted as a file delete
        assert!(monitor.sink().is_empty());
        assert_eq!(monitor.pending_count(), 1);
    }

    #[test]
    fn test_directory_delete_removes_watches_after_emission() {
        let (mut monitor, dirs) = monitor(10);
        dirs.insert("/d/sub");
        monitor.add("/d/sub");
        monitor.add("/d/sub/deeper");
        dirs.remove("/d/sub");

        let start = Instant::now();
        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/sub"), start);
        assert!(monitor.is_watched("/d/sub/deeper"));

        monitor.sweep(start + Duration::from_secs(2));
        assert_eq!(
            monitor.sink().as_slice(),
            &[MonitorEvent::Deleted {
                path: "/d/sub".into(),
                is_directory: true
            }]
        );
        assert_eq!(monitor.count(), 0);
    }

    #[test]
    fn test_late_notifications_for_moved_directory_are_directories() {
        let (mut monitor, dirs) = monitor(10);
        dirs.insert("/d/a");
        monitor.add("/d/a");
        monitor.add("/d/a/inner");
        dirs.remove("/d/a");
        dirs.insert("/d/b");

        let start = Instant::now();
        monitor.handle_raw(RawEvent::moved(wp("/d/a"), wp("/d/b")), start);
        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/a"), start);
        assert_eq!(monitor.sink().len(), 1);
        assert!(!monitor.is_watched("/d/a/inner"));
        assert!(monitor.is_watched("/d/b/inner"));

        let late = start + Duration::from_millis(10);
        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/a"), late);
        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/a/inner"), late);

        // Buffered as directory deletes instead of emitted as file deletes
        assert_eq!(monitor.sink().len(), 1);
        assert!(monitor.reconciler_has_delete("/d/a"));
        assert!(monitor.reconciler_has_delete("/d/a/inner"));
    }

    #[test]
    fn test_departed_directories_forgotten_after_grace_window() {
        let (mut monitor, dirs) = monitor(10);
        dirs.insert("/d/sub");
        monitor.add("/d/sub");
        dirs.remove("/d/sub");

        let start = Instant::now();
        monitor.handle_raw(raw(RawEventKind::Deleted, "/d/sub"), start);
        let emitted = start + Duration::from_secs(2);
        monitor.sweep(emitted);
        assert_eq!(monitor.sink().len(), 1);
        // Still remembered, so the sweep keeps running
        assert!(monitor.next_sweep_at().is_some());

        monitor.sweep(emitted + Duration::from_secs(2));
        assert!(monitor.next_sweep_at().is_none());

        // A missing, unwatched, forgotten path is a file again
        monitor.handle_raw(
            raw(RawEventKind::Deleted, "/d/sub"),
            emitted + Duration::from_secs(3),
        );
        assert_eq!(
            monitor.sink().last(),
            Some(&MonitorEvent::Deleted {
                path: "/d/sub".into(),
                is_directory: false
            })
        );
    }

    #[test]
    fn test_directory_created_does_not_add_watch() {
        let (mut monitor, dirs) = monitor(10);
        dirs.insert("/d/new");

        let start = Instant::now();
        monitor.handle_raw(raw(RawEventKind::Created, "/d/new"), start);
        monitor.sweep(start + Duration::from_secs(3));

        assert_eq!(monitor.sink().len(), 1);
        assert!(!monitor.is_watched("/d/new"));
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let (mut monitor, _) = monitor(10);
        monitor.add("/d");
        monitor.handle_raw(raw(RawEventKind::Created, "/d/f"), Instant::now());

        monitor.shutdown();
        assert_eq!(monitor.count(), 0);
        assert_eq!(monitor.pending_count(), 0);
        assert!(monitor.next_sweep_at().is_none());
        assert_eq!(monitor.registry().backend().active_count(), 0);
    }

    #[test]
    fn test_new_runs_probe() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = MonitorConfig {
            probe_path: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let monitor = Monitor::new(
            MemoryBackend::new(BackendFamily::Fam),
            Vec::<MonitorEvent>::new(),
            &config,
        );

        assert_eq!(monitor.capability().family, BackendFamily::Fam);
        assert_eq!(monitor.capability().ceiling, 400);
        assert!(!monitor.capability().has_distinct_changes_done);
    }
}
