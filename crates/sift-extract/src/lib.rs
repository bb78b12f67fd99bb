//! # sift-extract
//!
//! Content extraction for the sift indexing pipeline.
//!
//! Extractors read a file and produce
//! [`ExtractedContent`](sift_core::ExtractedContent): the text and a small
//! set of document metadata. Format-specific extractors plug in through the
//! [`ContentExtractor`](sift_core::ContentExtractor) trait.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ExtractorRegistry`] | Routes files to extractors by MIME type, then extension |
//! | [`TextExtractor`] | Plain text, read up to a byte limit |
//! | [`OfficeXmlExtractor`] | Word, PowerPoint and Excel documents (docx, pptx, xlsx) |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sift_extract::ExtractorRegistry;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), sift_core::ExtractError> {
//! let registry = ExtractorRegistry::with_defaults(65_536);
//! let content = registry.extract(Path::new("/notes/todo.txt"), "text/plain").await?;
//! println!("{} words", content.metadata.word_count.unwrap_or(0));
//! # Ok(())
//! # }
//! ```

pub mod ooxml;
pub mod registry;
pub mod text;

pub use ooxml::{OfficeKind, OfficeXmlExtractor};
pub use registry::ExtractorRegistry;
pub use text::{TextExtractor, DEFAULT_MAX_BYTES, PLAIN_TEXT_DOCUMENT};
