//! Async service running a [`Monitor`] on its own task.
//!
//! The task owns the monitor and multiplexes three inputs:
//! raw notifications from the backend, requests from [`MonitorHandle`]s,
//! and the sweep deadline. All mutation happens on that task, so the
//! engine itself needs no locking.

use sift_core::{BackendCapability, MonitorError, MonitorEvent, RawEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::backend::NativeBackend;
use crate::classify::FileTypeProbe;
use crate::config::MonitorConfig;
use crate::monitor::Monitor;
use crate::notify_backend::NotifyBackend;
use crate::sink::EventSink;

enum Command {
    Add(PathBuf, oneshot::Sender<bool>),
    Remove(PathBuf, oneshot::Sender<bool>),
    RemoveRecursive(PathBuf, oneshot::Sender<bool>),
    SetEnabled(bool, oneshot::Sender<()>),
    IsWatched(PathBuf, oneshot::Sender<bool>),
    Count(oneshot::Sender<usize>),
    IgnoredCount(oneshot::Sender<u64>),
    Shutdown(oneshot::Sender<()>),
}

/// Entry points for starting the monitor task.
pub struct MonitorService;

impl MonitorService {
    /// Start a monitor on the platform's native backend.
    ///
    /// Returns the control handle and the stream of reconciled events.
    pub fn start(
        config: &MonitorConfig,
    ) -> Result<(MonitorHandle, mpsc::UnboundedReceiver<MonitorEvent>), MonitorError> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let backend = NotifyBackend::new(raw_tx)?;
        let monitor = Monitor::new(backend, event_tx, config);

        Ok((Self::spawn(monitor, raw_rx), event_rx))
    }

    /// Run an already built monitor fed by `raw_rx`.
    pub fn spawn<B, S, P>(
        monitor: Monitor<B, S, P>,
        raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    ) -> MonitorHandle
    where
        B: NativeBackend + Send + 'static,
        B::Handle: Send,
        S: EventSink + Send + 'static,
        P: FileTypeProbe + Send + 'static,
    {
        let capability = monitor.capability();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(monitor, raw_rx, command_rx));

        MonitorHandle {
            commands: command_tx,
            capability,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }
}

async fn run<B, S, P>(
    mut monitor: Monitor<B, S, P>,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
) where
    B: NativeBackend,
    S: EventSink,
    P: FileTypeProbe,
{
    info!("Monitor service started");
    let mut raw_open = true;

    loop {
        let deadline = monitor.next_sweep_at();

        tokio::select! {
            biased;

            command = command_rx.recv() => match command {
                Some(Command::Shutdown(done)) => {
                    monitor.shutdown();
                    let _ = done.send(());
                    break;
                }
                Some(command) => apply(&mut monitor, command),
                None => {
                    debug!("All monitor handles dropped");
                    monitor.shutdown();
                    break;
                }
            },

            raw = raw_rx.recv(), if raw_open => match raw {
                Some(event) => monitor.handle_raw(event, Instant::now()),
                None => {
                    debug!("Raw event source closed");
                    raw_open = false;
                }
            },

            () = sleep_until_deadline(deadline) => monitor.sweep(Instant::now()),
        }
    }

    info!("Monitor service stopped");
}

pub(crate) async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn apply<B, S, P>(monitor: &mut Monitor<B, S, P>, command: Command)
where
    B: NativeBackend,
    S: EventSink,
    P: FileTypeProbe,
{
    // Replies fail only when the requester gave up waiting
    match command {
        Command::Add(path, reply) => {
            let _ = reply.send(monitor.add(path));
        }
        Command::Remove(path, reply) => {
            let _ = reply.send(monitor.remove(path));
        }
        Command::RemoveRecursive(path, reply) => {
            let _ = reply.send(monitor.remove_recursive(path));
        }
        Command::SetEnabled(enabled, reply) => {
            monitor.set_enabled(enabled);
            let _ = reply.send(());
        }
        Command::IsWatched(path, reply) => {
            let _ = reply.send(monitor.is_watched(path));
        }
        Command::Count(reply) => {
            let _ = reply.send(monitor.count());
        }
        Command::IgnoredCount(reply) => {
            let _ = reply.send(monitor.ignored_count());
        }
        Command::Shutdown(reply) => {
            let _ = reply.send(());
        }
    }
}

/// Cloneable handle to a running monitor task.
///
/// Once the task has stopped every query answers with a neutral value
/// (`false`, `0`).
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    capability: BackendCapability,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MonitorHandle {
    async fn request<T: Default>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> T {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(command(reply_tx)).is_err() {
            debug!("Monitor task is not running");
            return T::default();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Watch a directory.
    pub async fn add(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.request(|reply| Command::Add(path, reply)).await
    }

    /// Stop watching exactly this directory.
    pub async fn remove(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.request(|reply| Command::Remove(path, reply)).await
    }

    /// Stop watching a directory and everything beneath it.
    pub async fn remove_recursive(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.request(|reply| Command::RemoveRecursive(path, reply)).await
    }

    /// Switch native subscriptions on or off.
    pub async fn set_enabled(&self, enabled: bool) {
        self.request(|reply| Command::SetEnabled(enabled, reply)).await;
    }

    pub async fn is_watched(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        self.request(|reply| Command::IsWatched(path, reply)).await
    }

    pub async fn count(&self) -> usize {
        self.request(Command::Count).await
    }

    pub async fn ignored_count(&self) -> u64 {
        self.request(Command::IgnoredCount).await
    }

    /// Backend capability detected at startup.
    #[must_use]
    pub fn capability(&self) -> BackendCapability {
        self.capability
    }

    /// Stop the task, cancelling the sweep and all subscriptions.
    ///
    /// Waits for the task to finish; safe to call more than once.
    pub async fn shutdown(&self) {
        self.request(Command::Shutdown).await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                debug!("Monitor task ended abnormally: {e}");
            }
        }
    }
}
