//! Filesystem change monitoring for sift.
//!
//! This crate watches an explicit set of directories (one non-recursive
//! native subscription each) and turns the backend's noisy notifications
//! into a clean stream of [`MonitorEvent`](sift_core::MonitorEvent)s.
//!
//! | Component | Role |
//! |-----------|------|
//! | [`probe`] | Identify the backend and derive the watch ceiling |
//! | [`MonitorRegistry`] | Watched directories, ceiling, enable switch |
//! | [`Reconciler`] | Pair and buffer raw notifications |
//! | [`SweepTimer`] | Release events that waited past the grace window |
//! | [`relocate()`] | Move watches along with a renamed directory tree |
//! | [`Monitor`] | Synchronous facade over all of the above |
//! | [`MonitorService`] | Async task driving a [`Monitor`] |
//!
//! # Example
//!
//! ```rust,no_run
//! use sift_monitor::{MonitorConfig, MonitorService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (monitor, mut events) = MonitorService::start(&MonitorConfig::default())?;
//! monitor.add("/home/user/Documents").await;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod classify;
pub mod config;
pub mod memory;
pub mod monitor;
pub mod notify_backend;
pub mod probe;
pub mod reconciler;
pub mod registry;
pub mod relocate;
pub mod service;
pub mod sink;
pub mod sweep;

pub use backend::NativeBackend;
pub use classify::{EntryKind, FileTypeProbe, StatProbe};
pub use config::MonitorConfig;
pub use memory::MemoryBackend;
pub use monitor::Monitor;
pub use notify_backend::NotifyBackend;
pub use probe::{capability_for, probe_backend};
pub use reconciler::{PendingEvent, Reconciler};
pub use registry::{MonitorRegistry, WatchLimit};
pub use relocate::{relocate, relocation_targets};
pub use service::{MonitorHandle, MonitorService};
pub use sink::EventSink;
pub use sweep::SweepTimer;
