//! Core traits for sift components.
//!
//! - [`ContentExtractor`]: Extract text and document metadata from files
//!
//! Extractors are pluggable: the indexing pipeline only ever talks to this
//! trait, so format-specific readers (office documents, PDFs) can live in
//! their own crates.

use async_trait::async_trait;
use std::path::Path;

use crate::error::ExtractError;
use crate::types::ExtractedContent;

// ============================================================================
// Content Extraction
// ============================================================================

/// Trait for extracting content from files.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Returns the MIME types this extractor can handle.
    fn supported_types(&self) -> &[&str];

    /// Check if this extractor can handle the given file.
    fn can_extract(&self, path: &Path, mime_type: &str) -> bool {
        self.supported_types().contains(&mime_type) || self.can_extract_by_extension(path)
    }

    /// Check if extractor can handle based on file extension.
    fn can_extract_by_extension(&self, _path: &Path) -> bool {
        false
    }

    /// Extract content from a file.
    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MarkdownOnly;

    #[async_trait]
    impl ContentExtractor for MarkdownOnly {
        fn supported_types(&self) -> &[&str] {
            &["text/markdown"]
        }

        async fn extract(&self, _path: &Path) -> Result<ExtractedContent, ExtractError> {
            Ok(ExtractedContent::default())
        }
    }

    #[test]
    fn test_can_extract_by_mime() {
        let extractor = MarkdownOnly;
        assert!(extractor.can_extract(Path::new("/notes/a.md"), "text/markdown"));
        assert!(!extractor.can_extract(Path::new("/notes/a.md"), "text/plain"));
    }

    #[tokio::test]
    async fn test_extract_default_content() {
        let content = MarkdownOnly.extract(Path::new("/notes/a.md")).await.unwrap();
        assert!(content.text.is_empty());
    }
}
