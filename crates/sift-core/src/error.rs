//! Error types for sift.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sift operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Change monitoring failed
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Content extraction failed
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Change monitoring errors.
///
/// None of these are fatal: the monitor degrades to fewer watches instead
/// of aborting.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The watch ceiling has been reached.
    #[error("watch limit reached ({ceiling} watches)")]
    ResourceExhausted { ceiling: usize },

    /// The native backend refused a subscription.
    #[error("could not watch {}: {reason}", path.display())]
    BackendUnavailable { path: PathBuf, reason: String },

    /// The capability probe could not classify the backend.
    #[error("unknown monitor backend: {0}")]
    UnknownBackend(String),

    /// A malformed path or event reached the API boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Content extraction errors.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// Result type alias for sift operations.
pub type Result<T> = std::result::Result<T, Error>;
