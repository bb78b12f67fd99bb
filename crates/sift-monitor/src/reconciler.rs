//! Event pairing state machine.
//!
//! Raw notifications arrive noisy: a file write shows up as a create
//! followed by a burst of changes and a final "changes done"; a directory
//! rename may be reported as a delete plus a move, in either order. The
//! [`Reconciler`] buffers the ambiguous ones in two tables keyed by path:
//!
//! - `pre_update`: creations and attribute changes waiting for "changes done"
//! - `pre_delete`: directory deletes and moves waiting for their counterpart
//!
//! It returns, in order, the events that are resolved by each notification.
//! Entries that never find a partner are released by [`Reconciler::expire`]
//! once they are older than the grace window.
//!
//! The reconciler is pure: it does not look at the filesystem or the clock.
//! Callers pass whether the path is a directory and the current instant.

use sift_core::{MonitorEvent, RawEvent, RawEventKind, WatchPath};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A buffered (or immediately resolved) notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEvent {
    pub path: WatchPath,
    /// Move destination
    pub other: Option<WatchPath>,
    pub is_directory: bool,
    pub kind: RawEventKind,
    pub created_at: Instant,
}

impl PendingEvent {
    fn new(event: &RawEvent, is_directory: bool, now: Instant) -> Self {
        Self {
            path: event.path.clone(),
            other: event.other.clone(),
            is_directory,
            kind: event.kind,
            created_at: now,
        }
    }

    /// How long the event has been waiting.
    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// The semantic event this resolves to.
    ///
    /// Mount notifications and moves without a destination resolve to
    /// nothing.
    #[must_use]
    pub fn to_monitor_event(&self) -> Option<MonitorEvent> {
        let path = self.path.as_path().to_path_buf();
        let is_directory = self.is_directory;

        match self.kind {
            RawEventKind::Created => Some(MonitorEvent::Created { path, is_directory }),
            RawEventKind::Changed
            | RawEventKind::AttributeChanged
            | RawEventKind::ChangesDone => Some(MonitorEvent::Updated { path, is_directory }),
            RawEventKind::Deleted => Some(MonitorEvent::Deleted { path, is_directory }),
            RawEventKind::Moved => self.other.as_ref().map(|to| MonitorEvent::Moved {
                from: path,
                to: to.as_path().to_path_buf(),
                is_directory,
                is_source_known: true,
            }),
            RawEventKind::PreUnmount | RawEventKind::Unmounted => None,
        }
    }
}

/// Pairs raw notifications into semantic events.
#[derive(Debug)]
pub struct Reconciler {
    pre_update: HashMap<WatchPath, PendingEvent>,
    pre_delete: HashMap<WatchPath, PendingEvent>,
    grace_window: Duration,
    has_distinct_changes_done: bool,
}

impl Reconciler {
    /// Create an empty reconciler.
    ///
    /// Without a distinct "changes done" signal, plain changes are buffered
    /// like attribute changes and resolved by the grace window.
    #[must_use]
    pub fn new(grace_window: Duration, has_distinct_changes_done: bool) -> Self {
        Self {
            pre_update: HashMap::new(),
            pre_delete: HashMap::new(),
            grace_window,
            has_distinct_changes_done,
        }
    }

    /// Feed one notification and collect whatever it resolves.
    pub fn process(&mut self, event: RawEvent, is_directory: bool, now: Instant) -> Vec<PendingEvent> {
        let mut resolved = Vec::new();
        if is_directory {
            self.process_directory(&event, now, &mut resolved);
        } else {
            self.process_file(&event, now, &mut resolved);
        }
        resolved
    }

    fn process_file(&mut self, event: &RawEvent, now: Instant, out: &mut Vec<PendingEvent>) {
        match event.kind {
            RawEventKind::Created => {
                self.pre_update
                    .insert(event.path.clone(), PendingEvent::new(event, false, now));
            }
            RawEventKind::Changed if self.has_distinct_changes_done => {
                let attribute_pending = self
                    .pre_update
                    .get(&event.path)
                    .is_some_and(|p| p.kind == RawEventKind::AttributeChanged);
                if attribute_pending {
                    // Superseded by the changes-done that follows
                    self.pre_update.remove(&event.path);
                }
            }
            RawEventKind::Changed | RawEventKind::AttributeChanged => {
                self.buffer_update_if_absent(event, false, now);
            }
            RawEventKind::ChangesDone => self.resolve_update(event, false, now, out),
            RawEventKind::Deleted | RawEventKind::Moved => {
                out.push(PendingEvent::new(event, false, now));
            }
            RawEventKind::PreUnmount | RawEventKind::Unmounted => {}
        }
    }

    fn process_directory(&mut self, event: &RawEvent, now: Instant, out: &mut Vec<PendingEvent>) {
        match event.kind {
            RawEventKind::Created
            | RawEventKind::Changed
            | RawEventKind::AttributeChanged
            | RawEventKind::ChangesDone => {
                if let Some(stale) = self.pre_delete.remove(&event.path) {
                    out.push(stale);
                }
                match event.kind {
                    RawEventKind::Created => {
                        self.pre_update
                            .insert(event.path.clone(), PendingEvent::new(event, true, now));
                    }
                    RawEventKind::ChangesDone => self.resolve_update(event, true, now, out),
                    _ => self.buffer_update_if_absent(event, true, now),
                }
            }
            RawEventKind::Deleted => {
                if let Some(stale) = self.pre_update.remove(&event.path) {
                    out.push(stale);
                }
                match self.pre_delete.remove(&event.path) {
                    Some(pending) if pending.kind == RawEventKind::Moved => {
                        debug!(
                            "Processing MOVE(A->B) + DELETE(A) as MOVE(A->B) for directory '{}'",
                            pending.path
                        );
                        out.push(pending);
                    }
                    _ => {
                        self.pre_delete
                            .insert(event.path.clone(), PendingEvent::new(event, true, now));
                    }
                }
            }
            RawEventKind::Moved => {
                if let Some(stale) = self.pre_update.remove(&event.path) {
                    out.push(stale);
                }
                let delete_pending = self
                    .pre_delete
                    .get(&event.path)
                    .is_some_and(|p| p.kind == RawEventKind::Deleted);
                if delete_pending {
                    debug!(
                        "Processing DELETE(A) + MOVE(A->B) as MOVE(A->B) for directory '{}'",
                        event.path
                    );
                    self.pre_delete.remove(&event.path);
                    out.push(PendingEvent::new(event, true, now));
                } else {
                    self.pre_delete
                        .insert(event.path.clone(), PendingEvent::new(event, true, now));
                }
            }
            RawEventKind::PreUnmount | RawEventKind::Unmounted => {}
        }
    }

    fn buffer_update_if_absent(&mut self, event: &RawEvent, is_directory: bool, now: Instant) {
        self.pre_update
            .entry(event.path.clone())
            .or_insert_with(|| PendingEvent::new(event, is_directory, now));
    }

    fn resolve_update(
        &mut self,
        event: &RawEvent,
        is_directory: bool,
        now: Instant,
        out: &mut Vec<PendingEvent>,
    ) {
        match self.pre_update.remove(&event.path) {
            Some(pending) => out.push(pending),
            None => out.push(PendingEvent::new(event, is_directory, now)),
        }
    }

    /// Release every entry that has waited at least the grace window.
    ///
    /// Expired updates come before expired deletes; each group is ordered by
    /// arrival.
    pub fn expire(&mut self, now: Instant) -> Vec<PendingEvent> {
        let mut expired = drain_expired(&mut self.pre_update, now, self.grace_window);
        expired.extend(drain_expired(&mut self.pre_delete, now, self.grace_window));
        expired
    }

    /// Both tables are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pre_update.is_empty() && self.pre_delete.is_empty()
    }

    /// Total buffered entries.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pre_update.len() + self.pre_delete.len()
    }

    #[must_use]
    pub fn pending_update(&self, path: &WatchPath) -> Option<&PendingEvent> {
        self.pre_update.get(path)
    }

    #[must_use]
    pub fn pending_delete(&self, path: &WatchPath) -> Option<&PendingEvent> {
        self.pre_delete.get(path)
    }

    /// Drop everything buffered. Returns how many entries were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending_count();
        self.pre_update.clear();
        self.pre_delete.clear();
        discarded
    }

    #[must_use]
    pub fn grace_window(&self) -> Duration {
        self.grace_window
    }
}

fn drain_expired(
    table: &mut HashMap<WatchPath, PendingEvent>,
    now: Instant,
    grace_window: Duration,
) -> Vec<PendingEvent> {
    let keys: Vec<WatchPath> = table
        .iter()
        .filter(|(_, pending)| pending.age(now) >= grace_window)
        .map(|(path, _)| path.clone())
        .collect();

    let mut expired: Vec<PendingEvent> = keys.iter().filter_map(|k| table.remove(k)).collect();
    expired.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.path.cmp(&b.path))
    });
    expired
}
