//! Native backend built on the `notify` crate.
//!
//! inotify reports one rename three times: the source half, the
//! destination half and a combined event, all sharing a tracker cookie.
//! A watched directory that is renamed also reports the move about itself.
//! [`RenamePairer`] folds all of that into a single `Moved`, and turns a
//! half whose partner never shows up into a plain delete or create.

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, WatcherKind};
use sift_core::{BackendFamily, MonitorError, RawEvent, RawEventKind, WatchPath};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::backend::NativeBackend;
use crate::service::sleep_until_deadline;

/// How long one half of a rename waits for the other.
pub(crate) const PAIRING_WINDOW: Duration = Duration::from_millis(100);

/// One OS watcher shared by every subscription.
///
/// Each watched directory is registered non-recursively; the handle is the
/// path itself. Notifications leave the watcher's thread as-is and are
/// converted to [`RawEvent`]s on a pairing task, which sends them to the
/// channel given at construction.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Create the platform watcher.
    ///
    /// Must be called from within a Tokio runtime, which hosts the pairing
    /// task. The task ends when the backend is dropped.
    pub fn new(event_tx: mpsc::UnboundedSender<RawEvent>) -> Result<Self, MonitorError> {
        let runtime = Handle::try_current().map_err(|e| MonitorError::BackendUnavailable {
            path: PathBuf::new(),
            reason: format!("no async runtime for the watcher: {e}"),
        })?;
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if notify_tx.send(event).is_err() {
                        trace!("Pairing task stopped, dropping notification");
                    }
                }
                Err(e) => error!("Watch error: {e}"),
            }
        })
        .map_err(|e| MonitorError::BackendUnavailable {
            path: PathBuf::new(),
            reason: format!("failed to create watcher: {e}"),
        })?;

        runtime.spawn(pair_renames(notify_rx, event_tx));
        Ok(Self { watcher })
    }
}

impl NativeBackend for NotifyBackend {
    type Handle = WatchPath;

    fn family(&self) -> BackendFamily {
        family_for_kind(<RecommendedWatcher as Watcher>::kind())
    }

    fn subscribe(&mut self, path: &WatchPath) -> Result<WatchPath, MonitorError> {
        self.watcher
            .watch(path.as_path(), RecursiveMode::NonRecursive)
            .map_err(|e| MonitorError::BackendUnavailable {
                path: path.as_path().to_path_buf(),
                reason: e.to_string(),
            })?;
        Ok(path.clone())
    }

    fn cancel(&mut self, handle: WatchPath) {
        // The kernel drops watches on deleted directories by itself
        if let Err(e) = self.watcher.unwatch(handle.as_path()) {
            debug!("Could not unwatch {handle}: {e}");
        }
    }
}

/// Map a `notify` watcher implementation onto a backend family.
pub(crate) fn family_for_kind(kind: WatcherKind) -> BackendFamily {
    match kind {
        WatcherKind::Inotify => BackendFamily::Inotify,
        WatcherKind::Fsevent => BackendFamily::FsEvents,
        WatcherKind::Kqueue => BackendFamily::Kqueue,
        WatcherKind::ReadDirectoryChangesWatcher => BackendFamily::Windows,
        WatcherKind::PollWatcher => BackendFamily::Fam,
        _ => BackendFamily::Unknown,
    }
}

async fn pair_renames(
    mut notifications: mpsc::UnboundedReceiver<Event>,
    event_tx: mpsc::UnboundedSender<RawEvent>,
) {
    let mut pairer = RenamePairer::default();

    loop {
        let deadline = pairer.next_deadline();

        let raws = tokio::select! {
            event = notifications.recv() => match event {
                Some(event) => pairer.convert(&event, Instant::now()),
                None => break,
            },
            () = sleep_until_deadline(deadline) => pairer.expire(Instant::now()),
        };

        for raw in raws {
            if event_tx.send(raw).is_err() {
                warn!("Raw event channel closed");
                return;
            }
        }
    }
    debug!("Watcher dropped, rename pairing stopped");
}

/// Turns `notify` events into raw events, pairing the halves of renames.
#[derive(Debug, Default)]
pub(crate) struct RenamePairer {
    /// Source halves waiting for their destination, by tracker
    unpaired: HashMap<usize, (WatchPath, Instant)>,
    /// Trackers already emitted as a move; their combined event is redundant
    paired: HashMap<usize, Instant>,
    /// Sources of recent moves
    moved_away: HashMap<PathBuf, Instant>,
}

impl RenamePairer {
    pub(crate) fn convert(&mut self, event: &Event, now: Instant) -> Vec<RawEvent> {
        let EventKind::Modify(ModifyKind::Name(mode)) = event.kind else {
            return convert_event(event);
        };

        match (mode, event.attrs.tracker()) {
            (RenameMode::From, Some(tracker)) => {
                if let Some(from) = first_watch_path(event) {
                    self.unpaired.insert(tracker, (from, now));
                }
                Vec::new()
            }
            (RenameMode::To, Some(tracker)) => {
                let Some(to) = first_watch_path(event) else {
                    return Vec::new();
                };
                match self.unpaired.remove(&tracker) {
                    Some((from, _)) => {
                        self.paired.insert(tracker, now);
                        self.moved(from, to, now)
                    }
                    // Moved in from outside the watched directories
                    None => vec![RawEvent::new(RawEventKind::Created, to)],
                }
            }
            (RenameMode::Both, tracker) => {
                if let Some(tracker) = tracker {
                    self.unpaired.remove(&tracker);
                    if self.paired.remove(&tracker).is_some() {
                        return Vec::new();
                    }
                }
                match event.paths.as_slice() {
                    [from, to, ..] => match (to_watch_path(from), to_watch_path(to)) {
                        (Some(from), Some(to)) => self.moved(from, to, now),
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                }
            }
            // Only one side is known: look at what is left
            _ => event
                .paths
                .iter()
                .filter(|p| {
                    let own_move = self.moved_away.contains_key(p.as_path());
                    if own_move {
                        trace!("Dropping self notification of moved directory {:?}", p);
                    }
                    !own_move
                })
                .filter_map(|p| {
                    let kind = if p.exists() {
                        RawEventKind::Created
                    } else {
                        RawEventKind::Deleted
                    };
                    to_watch_path(p).map(|path| RawEvent::new(kind, path))
                })
                .collect(),
        }
    }

    fn moved(&mut self, from: WatchPath, to: WatchPath, now: Instant) -> Vec<RawEvent> {
        self.moved_away.insert(from.as_path().to_path_buf(), now);
        vec![RawEvent::moved(from, to)]
    }

    /// Release source halves that waited out the pairing window as deletes,
    /// oldest first, and forget old moves.
    pub(crate) fn expire(&mut self, now: Instant) -> Vec<RawEvent> {
        let is_old = |at: &Instant| now.saturating_duration_since(*at) >= PAIRING_WINDOW;

        let mut stale: Vec<(WatchPath, Instant)> = Vec::new();
        self.unpaired.retain(|_, (path, at)| {
            if is_old(at) {
                stale.push((path.clone(), *at));
                false
            } else {
                true
            }
        });
        self.paired.retain(|_, at| !is_old(at));
        self.moved_away.retain(|_, at| !is_old(at));

        stale.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        stale
            .into_iter()
            .map(|(path, _)| {
                debug!("Rename of '{path}' has no destination, treating as delete");
                RawEvent::new(RawEventKind::Deleted, path)
            })
            .collect()
    }

    /// When the oldest remembered half leaves the pairing window.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.unpaired
            .values()
            .map(|(_, at)| at)
            .chain(self.paired.values())
            .chain(self.moved_away.values())
            .min()
            .map(|at| *at + PAIRING_WINDOW)
    }
}

fn convert_event(event: &Event) -> Vec<RawEvent> {
    let kind = match &event.kind {
        EventKind::Create(_) => RawEventKind::Created,
        EventKind::Modify(ModifyKind::Metadata(_)) => RawEventKind::AttributeChanged,
        EventKind::Modify(_) | EventKind::Any => RawEventKind::Changed,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => RawEventKind::ChangesDone,
        EventKind::Remove(_) => RawEventKind::Deleted,
        EventKind::Access(_) | EventKind::Other => return Vec::new(),
    };

    event
        .paths
        .iter()
        .filter_map(|p| to_watch_path(p))
        .map(|path| RawEvent::new(kind, path))
        .collect()
}

fn first_watch_path(event: &Event) -> Option<WatchPath> {
    event.paths.first().and_then(|p| to_watch_path(p))
}

fn to_watch_path(path: &Path) -> Option<WatchPath> {
    match WatchPath::new(path) {
        Ok(path) => Some(path),
        Err(e) => {
            trace!("Dropping notification: {e}");
            None
        }
    }
}
