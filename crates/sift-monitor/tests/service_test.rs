//! Tests for the async monitor service.
//!
//! Most tests run on a paused clock so the sweep deadline can be reached
//! without waiting in real time.

use sift_core::{BackendCapability, BackendFamily, MonitorEvent, RawEvent, RawEventKind, WatchPath};
use sift_monitor::{EntryKind, MemoryBackend, Monitor, MonitorConfig, MonitorHandle, MonitorService};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

fn wp(path: &str) -> WatchPath {
    WatchPath::new(path).unwrap()
}

type MemoryService = (
    MonitorHandle,
    MemoryBackend,
    mpsc::UnboundedSender<RawEvent>,
    mpsc::UnboundedReceiver<MonitorEvent>,
);

fn spawn_memory_service(ceiling: usize) -> MemoryService {
    spawn_memory_service_with(ceiling, &MonitorConfig::default())
}

fn spawn_memory_service_with(ceiling: usize, config: &MonitorConfig) -> MemoryService {
    let backend = MemoryBackend::default();
    let (raw_tx, raw_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let monitor = Monitor::with_capability(
        backend.clone(),
        event_tx,
        |_: &Path| EntryKind::Missing,
        BackendCapability {
            family: BackendFamily::Inotify,
            has_distinct_changes_done: true,
            ceiling,
        },
        config,
    );

    (MonitorService::spawn(monitor, raw_rx), backend, raw_tx, event_rx)
}

#[tokio::test(start_paused = true)]
async fn test_registry_requests() {
    let (handle, backend, _raw_tx, _events) = spawn_memory_service(2);

    assert!(handle.add("/data/a").await);
    assert!(handle.add("/data/a/b").await);
    assert!(!handle.add("/data/c").await);
    assert!(!handle.add("relative").await);

    assert_eq!(handle.count().await, 2);
    assert_eq!(handle.ignored_count().await, 1);
    assert!(handle.is_watched("/data/a/b").await);
    assert_eq!(backend.active_count(), 2);

    assert!(handle.remove_recursive("/data/a").await);
    assert_eq!(handle.count().await, 0);
    assert!(!handle.remove("/data/a").await);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_set_enabled_round_trip() {
    let (handle, backend, _raw_tx, _events) = spawn_memory_service(10);
    handle.add("/data").await;

    handle.set_enabled(false).await;
    assert_eq!(backend.active_count(), 0);
    assert!(handle.is_watched("/data").await);

    handle.set_enabled(true).await;
    assert!(backend.is_subscribed("/data"));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_sweep_fires_after_grace_window() {
    let (handle, _backend, raw_tx, mut events) = spawn_memory_service(10);

    raw_tx
        .send(RawEvent::new(RawEventKind::Created, wp("/data/new.txt")))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(events.try_recv().is_err());

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(
        events.try_recv().unwrap(),
        MonitorEvent::Created {
            path: "/data/new.txt".into(),
            is_directory: false
        }
    );
    assert!(events.try_recv().is_err());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_intervals_still_release_events() {
    let config = MonitorConfig {
        grace_window_ms: 0,
        sweep_interval_ms: 0,
        ..Default::default()
    };
    let (handle, _backend, raw_tx, mut events) = spawn_memory_service_with(10, &config);

    raw_tx
        .send(RawEvent::new(RawEventKind::Created, wp("/data/quick.txt")))
        .unwrap();

    // The paused clock only advances while the service task is idle
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("sweep never released the event")
        .unwrap();
    assert_eq!(event.path(), Path::new("/data/quick.txt"));
    assert!(events.try_recv().is_err());

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_paired_events_emitted_without_waiting() {
    let (handle, _backend, raw_tx, mut events) = spawn_memory_service(10);

    raw_tx
        .send(RawEvent::new(RawEventKind::Changed, wp("/data/f")))
        .unwrap();
    raw_tx
        .send(RawEvent::new(RawEventKind::ChangesDone, wp("/data/f")))
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.kind_name(), "updated");

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_everything() {
    let (handle, backend, raw_tx, mut events) = spawn_memory_service(10);
    handle.add("/data").await;
    raw_tx
        .send(RawEvent::new(RawEventKind::Created, wp("/data/pending")))
        .unwrap();
    // Let the service take the event before stopping it
    assert_eq!(handle.count().await, 1);

    handle.shutdown().await;
    assert_eq!(backend.active_count(), 0);

    // No late sweep after teardown
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(events.recv().await.is_none());

    // Requests after shutdown get neutral answers
    assert!(!handle.add("/data").await);
    assert_eq!(handle.count().await, 0);
    handle.shutdown().await;
}

#[tokio::test]
async fn test_native_backend_reports_new_file() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    let config = MonitorConfig {
        probe_path: Some(root.clone()),
        grace_window_ms: 200,
        sweep_interval_ms: 100,
        ..Default::default()
    };

    let (handle, mut events) = MonitorService::start(&config).unwrap();
    assert!(handle.add(&root).await);

    let file = root.join("hello.txt");
    std::fs::write(&file, "hello").unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Some(event) if event.path() == file => break Some(event),
                Some(_) => continue,
                None => break None,
            }
        }
    })
    .await
    .expect("no event for the new file");

    let event = event.unwrap();
    assert!(!event.is_directory());
    handle.shutdown().await;
}

/// Everything the service emits until it has been quiet for `quiet`.
async fn drain_until_quiet(
    events: &mut mpsc::UnboundedReceiver<MonitorEvent>,
    quiet: Duration,
) -> Vec<MonitorEvent> {
    let mut seen = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(quiet, events.recv()).await {
        seen.push(event);
    }
    seen
}

#[tokio::test]
async fn test_native_backend_reports_each_rename_once() {
    let temp = tempfile::TempDir::new().unwrap();
    let root = temp.path().canonicalize().unwrap();
    std::fs::write(root.join("a.txt"), "a").unwrap();
    std::fs::create_dir(root.join("dir_a")).unwrap();

    let config = MonitorConfig {
        probe_path: Some(root.clone()),
        grace_window_ms: 200,
        sweep_interval_ms: 50,
        ..Default::default()
    };
    let (handle, mut events) = MonitorService::start(&config).unwrap();
    assert!(handle.add(&root).await);
    assert!(handle.add(root.join("dir_a")).await);

    std::fs::rename(root.join("a.txt"), root.join("b.txt")).unwrap();
    let seen = drain_until_quiet(&mut events, Duration::from_secs(1)).await;
    assert_eq!(
        seen,
        vec![MonitorEvent::Moved {
            from: root.join("a.txt"),
            to: root.join("b.txt"),
            is_directory: false,
            is_source_known: true,
        }]
    );

    std::fs::rename(root.join("dir_a"), root.join("dir_b")).unwrap();
    let seen = drain_until_quiet(&mut events, Duration::from_secs(1)).await;
    assert_eq!(
        seen,
        vec![MonitorEvent::Moved {
            from: root.join("dir_a"),
            to: root.join("dir_b"),
            is_directory: true,
            is_source_known: true,
        }]
    );
    assert!(handle.is_watched(root.join("dir_b")).await);
    assert!(!handle.is_watched(root.join("dir_a")).await);

    handle.shutdown().await;
}
