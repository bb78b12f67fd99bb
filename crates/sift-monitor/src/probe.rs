//! Startup probe of the notification backend.
//!
//! A throwaway subscription on the probe directory tells us which family
//! serves watches; the family decides the watch ceiling and whether a
//! separate "changes done" signal follows content changes.

use sift_core::{BackendCapability, BackendFamily, MonitorError, WatchPath};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backend::NativeBackend;
use crate::config::MonitorConfig;

/// Identify the backend and derive its capability.
///
/// Never fails: an unreadable limit or an unclassified backend fall back to
/// conservative values with a warning.
pub fn probe_backend<B: NativeBackend>(backend: &mut B, config: &MonitorConfig) -> BackendCapability {
    let family = match probe_target(config) {
        Some(target) => match backend.subscribe(&target) {
            Ok(handle) => {
                let family = backend.family();
                backend.cancel(handle);
                family
            }
            Err(e) => {
                warn!("Could not create probe watch: {e}");
                backend.family()
            }
        },
        None => backend.family(),
    };

    let capability = capability_for(family, config);
    info!("Monitor backend is {}", capability.family);
    info!("Monitor limit is {}", capability.ceiling);
    capability
}

fn probe_target(config: &MonitorConfig) -> Option<WatchPath> {
    let path: PathBuf = match &config.probe_path {
        Some(path) => path.clone(),
        None => match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().to_path_buf(),
            None => {
                warn!("No home directory to probe the monitor backend with");
                return None;
            }
        },
    };

    match WatchPath::new(&path) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Unusable probe path: {e}");
            None
        }
    }
}

/// Capability of a backend family under the given configuration.
#[must_use]
pub fn capability_for(family: BackendFamily, config: &MonitorConfig) -> BackendCapability {
    let (ceiling, has_distinct_changes_done) = match family {
        BackendFamily::Inotify => {
            let limit = read_inotify_limit(&config.inotify_limit_path).unwrap_or_else(|e| {
                warn!(
                    "Could not read {}: {e}, assuming {}",
                    config.inotify_limit_path.display(),
                    config.inotify_fallback_limit
                );
                config.inotify_fallback_limit
            });
            (limit.saturating_sub(config.inotify_headroom), true)
        }
        BackendFamily::Fam => (config.fam_ceiling, false),
        BackendFamily::Fen
        | BackendFamily::Windows
        | BackendFamily::FsEvents
        | BackendFamily::Kqueue => (config.guessed_ceiling, false),
        BackendFamily::Unknown => {
            warn!(
                "{}, guessing a limit of {}",
                MonitorError::UnknownBackend("unrecognised notification subsystem".to_string()),
                config.unknown_ceiling
            );
            (config.unknown_ceiling, false)
        }
    };

    BackendCapability {
        family,
        has_distinct_changes_done,
        ceiling,
    }
}

fn read_inotify_limit(path: &Path) -> io::Result<usize> {
    fs::read_to_string(path)?
        .trim()
        .parse::<usize>()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use tempfile::TempDir;

    fn config_with_limit_file(temp: &TempDir, contents: &str) -> MonitorConfig {
        let limit_path = temp.path().join("max_user_watches");
        fs::write(&limit_path, contents).unwrap();
        MonitorConfig {
            inotify_limit_path: limit_path,
            probe_path: Some(temp.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_inotify_reads_kernel_limit() {
        let temp = TempDir::new().unwrap();
        let config = config_with_limit_file(&temp, "65536\n");

        let capability = capability_for(BackendFamily::Inotify, &config);
        assert_eq!(capability.ceiling, 65036);
        assert!(capability.has_distinct_changes_done);
    }

    #[test]
    fn test_inotify_unreadable_limit_falls_back() {
        let temp = TempDir::new().unwrap();
        let config = MonitorConfig {
            inotify_limit_path: temp.path().join("missing"),
            ..Default::default()
        };

        let capability = capability_for(BackendFamily::Inotify, &config);
        assert_eq!(capability.ceiling, 8192 - 500);
    }

    #[test]
    fn test_inotify_garbage_limit_falls_back() {
        let temp = TempDir::new().unwrap();
        let config = config_with_limit_file(&temp, "lots");

        assert_eq!(capability_for(BackendFamily::Inotify, &config).ceiling, 7692);
    }

    #[test]
    fn test_inotify_small_limit_clamps_to_zero() {
        let temp = TempDir::new().unwrap();
        let config = config_with_limit_file(&temp, "100");

        assert_eq!(capability_for(BackendFamily::Inotify, &config).ceiling, 0);
    }

    #[test]
    fn test_fam_capability() {
        let capability = capability_for(BackendFamily::Fam, &MonitorConfig::default());
        assert_eq!(capability.ceiling, 400);
        assert!(!capability.has_distinct_changes_done);
    }

    #[test]
    fn test_guessed_and_unknown_ceilings() {
        let config = MonitorConfig::default();
        assert_eq!(capability_for(BackendFamily::Fen, &config).ceiling, 8192);
        assert_eq!(capability_for(BackendFamily::Windows, &config).ceiling, 8192);
        assert_eq!(capability_for(BackendFamily::Unknown, &config).ceiling, 100);
    }

    #[test]
    fn test_probe_releases_its_watch() {
        let temp = TempDir::new().unwrap();
        let config = config_with_limit_file(&temp, "10000");
        let mut backend = MemoryBackend::new(BackendFamily::Inotify);

        let capability = probe_backend(&mut backend, &config);

        assert_eq!(capability.family, BackendFamily::Inotify);
        assert_eq!(capability.ceiling, 9500);
        assert_eq!(backend.subscribe_calls(), 1);
        assert_eq!(backend.active_count(), 0);
    }

    #[test]
    fn test_probe_survives_subscription_failure() {
        let temp = TempDir::new().unwrap();
        let config = MonitorConfig {
            probe_path: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let mut backend = MemoryBackend::new(BackendFamily::Fam);
        backend.fail_on(temp.path());

        let capability = probe_backend(&mut backend, &config);
        assert_eq!(capability.family, BackendFamily::Fam);
        assert_eq!(capability.ceiling, 400);
    }
}
