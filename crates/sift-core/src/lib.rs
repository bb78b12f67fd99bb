//! # sift-core
//!
//! Core types and traits for sift, a desktop content indexer.
//!
//! This crate provides the foundational abstractions used throughout sift:
//!
//! - **Path identity**: [`WatchPath`], the canonical key every watched
//!   directory and pending event is stored under
//! - **Change events**: [`RawEvent`] as delivered by a native notification
//!   backend, and [`MonitorEvent`], the reconciled semantic event
//! - **Backends**: [`BackendFamily`] and [`BackendCapability`], computed once
//!   at startup by the monitor's capability probe
//! - **Content Extraction**: [`ContentExtractor`] trait for extracting text
//!   and document metadata from files
//!
//! ## Architecture
//!
//! ```text
//! native notifications -> RawEvent -> reconciler -> MonitorEvent
//!                                                     |
//!                                   indexer -> ContentExtractor -> FileRecord
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`WatchPath`] | Normalised absolute path used as identity |
//! | [`RawEvent`] | One low-level notification |
//! | [`MonitorEvent`] | Created / updated / deleted / moved |
//! | [`BackendCapability`] | Family, watch ceiling, feature flags |
//! | [`FileRecord`] | Metadata about an indexed file |
//! | [`ExtractedContent`] | Text and metadata extracted from a file |
//!
//! ## Related Crates
//!
//! - `sift-monitor`: Change monitoring and event reconciliation
//! - `sift-extract`: Content extraction implementations
//! - `sift-index`: Crawling and indexing pipeline

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, ExtractError, MonitorError, Result};
pub use traits::*;
pub use types::*;
