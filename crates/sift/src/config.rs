//! Configuration handling for sift.
//!
//! The file is TOML with one section per component. Every field has a
//! default, so a missing file or a partial one is fine.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sift_index::IndexerConfig;
use sift_monitor::MonitorConfig;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Change monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Crawl and extraction configuration
    #[serde(default)]
    pub index: IndexerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Parsed level, `None` if the configured name is not a level.
    pub fn max_level(&self) -> Option<Level> {
        self.level.parse().ok()
    }
}

impl Config {
    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file yields the defaults; an explicitly given file must
    /// exist.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::read(&path),
            None => match Self::config_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Annotated sample configuration file.
    pub fn sample_toml() -> &'static str {
        SAMPLE_CONFIG
    }
}

/// Get the XDG config directory for sift.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SIFT_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "sift").map(|dirs| dirs.config_dir().to_path_buf())
}

const SAMPLE_CONFIG: &str = r#"# sift configuration

[monitor]
# Set to false to keep watches registered without native subscriptions
enabled = true
# How long a buffered event waits for its partner (ms)
grace_window_ms = 2000
# How often buffered events are checked (ms)
sweep_interval_ms = 1000
# Watches left for other inotify users
inotify_headroom = 500
# Used when the inotify limit cannot be read
inotify_fallback_limit = 8192
inotify_limit_path = "/proc/sys/fs/inotify/max_user_watches"
fam_ceiling = 400
guessed_ceiling = 8192
unknown_ceiling = 100
# Directory subscribed once at startup to detect the backend
# probe_path = "/home/user"

[index]
# Crawled and watched
watch_roots = []
# Crawled once, never watched
crawl_roots = []
# Crawled but never watched
no_watch_roots = []
exclude_patterns = ["**/.*", "**/node_modules", "**/target", "**/__pycache__", "**/*.lock"]
# Bytes of text read per file, 0 to skip text
max_bytes = 65536

[logging]
level = "info"
"#;
