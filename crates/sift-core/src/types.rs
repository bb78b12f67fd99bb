//! Core types for sift.
//!
//! This module contains all shared data structures used across sift:
//!
//! ## Path Identity
//! - [`WatchPath`]: Normalised absolute path, the key of every watch and
//!   pending event
//!
//! ## Change Events
//! - [`RawEventKind`] / [`RawEvent`]: Notifications from a native backend
//! - [`MonitorEvent`]: Reconciled semantic events for the pipeline
//!
//! ## Backends
//! - [`BackendFamily`]: The notification subsystem serving the watches
//! - [`BackendCapability`]: Ceiling and feature flags derived at startup
//!
//! ## Indexing
//! - [`FileRecord`]: Metadata about an indexed file
//! - [`FileStatus`]: Current indexing state of a file
//! - [`ExtractedContent`]: Content extracted from a file
//! - [`IndexStats`]: Running counters of the pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::MonitorError;

// ============================================================================
// Path Identity
// ============================================================================

/// Canonical identity of a filesystem entry.
///
/// Always absolute, with duplicate separators, `.` components and trailing
/// separators removed. `..` components are rejected rather than resolved,
/// since resolving them lexically can name a different entry than the
/// kernel would.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct WatchPath(PathBuf);

impl WatchPath {
    /// Validate and normalise a path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let path = path.as_ref();

        if path.as_os_str().is_empty() {
            return Err(MonitorError::InvalidInput("empty path".to_string()));
        }
        if !path.is_absolute() {
            return Err(MonitorError::InvalidInput(format!(
                "relative path: {}",
                path.display()
            )));
        }

        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(MonitorError::InvalidInput(format!(
                        "parent directory component in {}",
                        path.display()
                    )));
                }
                other => normalized.push(other.as_os_str()),
            }
        }

        Ok(Self(normalized))
    }

    /// Borrow the underlying path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Consume into a `PathBuf`.
    #[must_use]
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// True if `self` equals `root` or lies beneath it.
    ///
    /// Compared component by component: `/home/ab` is not within `/home/a`.
    #[must_use]
    pub fn is_within(&self, root: &WatchPath) -> bool {
        self.0.starts_with(&root.0)
    }

    /// True if `self` lies strictly beneath `root`.
    #[must_use]
    pub fn is_descendant_of(&self, root: &WatchPath) -> bool {
        self != root && self.is_within(root)
    }

    /// Map `self` from the `old_root` hierarchy into the `new_root` one.
    ///
    /// Returns `None` when `self` is not within `old_root`.
    #[must_use]
    pub fn rebase(&self, old_root: &WatchPath, new_root: &WatchPath) -> Option<WatchPath> {
        let relative = self.0.strip_prefix(&old_root.0).ok()?;
        if relative.as_os_str().is_empty() {
            return Some(new_root.clone());
        }
        Some(Self(new_root.0.join(relative)))
    }
}

impl fmt::Display for WatchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for WatchPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl TryFrom<PathBuf> for WatchPath {
    type Error = MonitorError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<WatchPath> for PathBuf {
    fn from(path: WatchPath) -> Self {
        path.0
    }
}

// ============================================================================
// Change Events
// ============================================================================

/// Kind of a low-level notification, as reported by a native backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    /// Entry appeared
    Created,
    /// Content changed, more changes may follow
    Changed,
    /// Metadata (permissions, timestamps, xattrs) changed
    AttributeChanged,
    /// A burst of changes finished (e.g. close after write)
    ChangesDone,
    /// Entry disappeared
    Deleted,
    /// Entry was renamed; the destination travels in [`RawEvent::other`]
    Moved,
    /// The containing mount is about to go away
    PreUnmount,
    /// The containing mount went away
    Unmounted,
}

impl RawEventKind {
    /// Stable lowercase name, used in log lines.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::AttributeChanged => "attribute-changed",
            Self::ChangesDone => "changes-done",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
            Self::PreUnmount => "pre-unmount",
            Self::Unmounted => "unmounted",
        }
    }
}

impl fmt::Display for RawEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single notification from a native backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Entry the notification is about (the source, for moves)
    pub path: WatchPath,
    /// Move destination; only meaningful for [`RawEventKind::Moved`]
    pub other: Option<WatchPath>,
    /// What happened
    pub kind: RawEventKind,
}

impl RawEvent {
    /// A notification about a single entry.
    #[must_use]
    pub fn new(kind: RawEventKind, path: WatchPath) -> Self {
        Self {
            path,
            other: None,
            kind,
        }
    }

    /// A move notification.
    #[must_use]
    pub fn moved(from: WatchPath, to: WatchPath) -> Self {
        Self {
            path: from,
            other: Some(to),
            kind: RawEventKind::Moved,
        }
    }
}

/// Semantic filesystem event emitted by the monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    Created {
        path: PathBuf,
        is_directory: bool,
    },
    Updated {
        path: PathBuf,
        is_directory: bool,
    },
    Deleted {
        path: PathBuf,
        is_directory: bool,
    },
    Moved {
        from: PathBuf,
        to: PathBuf,
        is_directory: bool,
        is_source_known: bool,
    },
}

impl MonitorEvent {
    /// The entry the event is about (the source, for moves).
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created { path, .. } | Self::Updated { path, .. } | Self::Deleted { path, .. } => {
                path
            }
            Self::Moved { from, .. } => from,
        }
    }

    /// Whether the entry is a directory.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        match self {
            Self::Created { is_directory, .. }
            | Self::Updated { is_directory, .. }
            | Self::Deleted { is_directory, .. }
            | Self::Moved { is_directory, .. } => *is_directory,
        }
    }

    /// Short name of the event kind.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::Deleted { .. } => "deleted",
            Self::Moved { .. } => "moved",
        }
    }
}

impl fmt::Display for MonitorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = if self.is_directory() {
            "DIRECTORY"
        } else {
            "FILE"
        };
        match self {
            Self::Moved { from, to, .. } => {
                write!(f, "moved ({entry}) {} -> {}", from.display(), to.display())
            }
            other => write!(f, "{} ({entry}) {}", other.kind_name(), other.path().display()),
        }
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Family of the OS notification subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendFamily {
    /// Linux inotify; watches are a per-user kernel resource
    Inotify,
    /// FAM-like backends: plain change events, no completion signal
    Fam,
    /// Solaris file event notification
    Fen,
    /// Win32 `ReadDirectoryChangesW`
    Windows,
    /// macOS FSEvents
    FsEvents,
    /// BSD kqueue
    Kqueue,
    /// Could not be classified
    Unknown,
}

impl BackendFamily {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inotify => "inotify",
            Self::Fam => "fam",
            Self::Fen => "fen",
            Self::Windows => "windows",
            Self::FsEvents => "fsevents",
            Self::Kqueue => "kqueue",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the notification backend can do, derived once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendCapability {
    /// Backend family
    pub family: BackendFamily,
    /// Whether "changed" is followed by a separate "changes done" signal
    pub has_distinct_changes_done: bool,
    /// Maximum number of watches this process may hold
    pub ceiling: usize,
}

// ============================================================================
// File Records
// ============================================================================

/// Metadata about an indexed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique file identifier
    pub id: Uuid,
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
    /// MIME type
    pub mime_type: String,
    /// Content hash for change detection (blake3)
    pub content_hash: String,
    /// Last modification time
    pub modified_at: DateTime<Utc>,
    /// When the file was indexed (None if not yet indexed)
    pub indexed_at: Option<DateTime<Utc>>,
    /// Current indexing status
    pub status: FileStatus,
    /// Document metadata from extraction
    pub metadata: ContentMetadataInfo,
    /// Extracted text, absent for unsupported types or when no text was requested
    #[serde(default)]
    pub plain_text_content: Option<String>,
    /// Error message if status is Error
    pub error_message: Option<String>,
}

/// File indexing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    /// Waiting to be indexed
    Pending,
    /// Successfully indexed
    Indexed,
    /// Indexing failed
    Error,
    /// File was deleted
    Deleted,
}

// ============================================================================
// Extraction
// ============================================================================

/// Content extracted from a file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedContent {
    /// Plain text content
    pub text: String,
    /// Document-level metadata
    pub metadata: ContentMetadataInfo,
}

/// Metadata extracted from file content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadataInfo {
    /// Kind of document, e.g. `plain-text`
    pub document_type: Option<String>,
    /// Document title
    pub title: Option<String>,
    /// Author
    pub author: Option<String>,
    /// Language (from extension or content)
    pub language: Option<String>,
    /// Number of whitespace separated words in the extracted text
    pub word_count: Option<usize>,
    /// Whether extraction stopped at the byte limit
    #[serde(default)]
    pub truncated: bool,
}

// ============================================================================
// Index Status
// ============================================================================

/// Overall index statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Distinct files currently known to the pipeline
    pub total_files: u64,
    /// Known files whose last pass succeeded
    pub indexed_files: u64,
    /// Known files whose last pass failed
    pub error_files: u64,
    /// Files and directories reported deleted
    pub removed_entries: u64,
    /// Files and directories reported moved
    pub moved_entries: u64,
    /// Last update time
    pub last_update: Option<DateTime<Utc>>,
}
