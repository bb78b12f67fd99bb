//! Monitor configuration.
//!
//! Every value has a default, so an empty `[monitor]` table is valid.
//! Durations are expressed in milliseconds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::sweep::MIN_PERIOD;

/// Tunables of the monitoring engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Create native subscriptions at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// How long an unpaired event may wait before it is force-emitted (ms)
    #[serde(default = "default_grace_window_ms")]
    pub grace_window_ms: u64,

    /// Period of the sweep over pending events (ms)
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// inotify watches left for other processes
    #[serde(default = "default_inotify_headroom")]
    pub inotify_headroom: usize,

    /// inotify limit assumed when the kernel tunable cannot be read
    #[serde(default = "default_inotify_fallback_limit")]
    pub inotify_fallback_limit: usize,

    /// Kernel tunable holding the per-user inotify watch limit
    #[serde(default = "default_inotify_limit_path")]
    pub inotify_limit_path: PathBuf,

    /// Ceiling for FAM-like backends
    #[serde(default = "default_fam_ceiling")]
    pub fam_ceiling: usize,

    /// Ceiling for known backends without a queryable limit
    #[serde(default = "default_guessed_ceiling")]
    pub guessed_ceiling: usize,

    /// Ceiling when the backend could not be classified
    #[serde(default = "default_unknown_ceiling")]
    pub unknown_ceiling: usize,

    /// Directory used for the startup probe (defaults to the home directory)
    #[serde(default)]
    pub probe_path: Option<PathBuf>,
}

fn default_enabled() -> bool {
    true
}

fn default_grace_window_ms() -> u64 {
    2000
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

fn default_inotify_headroom() -> usize {
    500
}

fn default_inotify_fallback_limit() -> usize {
    8192
}

fn default_inotify_limit_path() -> PathBuf {
    PathBuf::from("/proc/sys/fs/inotify/max_user_watches")
}

fn default_fam_ceiling() -> usize {
    400
}

fn default_guessed_ceiling() -> usize {
    8192
}

fn default_unknown_ceiling() -> usize {
    100
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            grace_window_ms: default_grace_window_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            inotify_headroom: default_inotify_headroom(),
            inotify_fallback_limit: default_inotify_fallback_limit(),
            inotify_limit_path: default_inotify_limit_path(),
            fam_ceiling: default_fam_ceiling(),
            guessed_ceiling: default_guessed_ceiling(),
            unknown_ceiling: default_unknown_ceiling(),
            probe_path: None,
        }
    }
}

impl MonitorConfig {
    /// Grace window as a `Duration`, at least one millisecond.
    #[must_use]
    pub fn grace_window(&self) -> Duration {
        Duration::from_millis(self.grace_window_ms).max(MIN_PERIOD)
    }

    /// Sweep period as a `Duration`, at least one millisecond.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms).max(MIN_PERIOD)
    }
}
