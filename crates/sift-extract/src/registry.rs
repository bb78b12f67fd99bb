//! Extractor registry for routing files to content extractors.

use sift_core::{ContentExtractor, ExtractError, ExtractedContent};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::ooxml::OfficeXmlExtractor;
use crate::text::TextExtractor;

/// Registry of content extractors.
///
/// Files are routed by MIME type first, then by asking each extractor in
/// registration order whether it recognises the file.
pub struct ExtractorRegistry {
    /// Extractors in registration order
    extractors: Vec<(String, Arc<dyn ContentExtractor>)>,
    /// MIME type to index into `extractors`
    mime_mapping: HashMap<String, usize>,
}

impl ExtractorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
            mime_mapping: HashMap::new(),
        }
    }

    /// Create a registry with the built-in plain-text extractor.
    #[must_use]
    pub fn with_text(max_bytes: usize) -> Self {
        let mut registry = Self::new();
        registry.register("text", TextExtractor::with_max_bytes(max_bytes));
        registry
    }

    /// Create a registry with every built-in extractor: plain text and
    /// Office Open XML documents, both bounded by `max_bytes`.
    #[must_use]
    pub fn with_defaults(max_bytes: usize) -> Self {
        let mut registry = Self::with_text(max_bytes);
        registry.register("ooxml", OfficeXmlExtractor::with_max_bytes(max_bytes));
        registry
    }

    /// Register an extractor under `name`.
    ///
    /// Re-registering a name replaces the previous extractor; MIME types
    /// claimed by an earlier extractor are taken over.
    pub fn register<E: ContentExtractor + 'static>(&mut self, name: &str, extractor: E) {
        let extractor: Arc<dyn ContentExtractor> = Arc::new(extractor);

        let index = match self.extractors.iter().position(|(n, _)| n == name) {
            Some(index) => {
                self.extractors[index].1 = Arc::clone(&extractor);
                index
            }
            None => {
                self.extractors.push((name.to_string(), Arc::clone(&extractor)));
                self.extractors.len() - 1
            }
        };

        for mime in extractor.supported_types() {
            self.mime_mapping.insert((*mime).to_string(), index);
        }
    }

    /// Get the extractor registered for a MIME type.
    #[must_use]
    pub fn get_for_mime(&self, mime_type: &str) -> Option<Arc<dyn ContentExtractor>> {
        self.mime_mapping
            .get(mime_type)
            .and_then(|&index| self.extractors.get(index))
            .map(|(_, extractor)| Arc::clone(extractor))
    }

    /// Get an extractor that can handle a file.
    #[must_use]
    pub fn get_for_file(&self, path: &Path, mime_type: &str) -> Option<Arc<dyn ContentExtractor>> {
        if let Some(extractor) = self.get_for_mime(mime_type) {
            return Some(extractor);
        }

        self.extractors
            .iter()
            .find(|(_, extractor)| extractor.can_extract(path, mime_type))
            .map(|(name, extractor)| {
                debug!("Routing '{}' to '{name}' by extension", path.display());
                Arc::clone(extractor)
            })
    }

    /// Whether any extractor handles the file.
    #[must_use]
    pub fn supports(&self, path: &Path, mime_type: &str) -> bool {
        self.get_for_file(path, mime_type).is_some()
    }

    /// Extract content from a file.
    pub async fn extract(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractedContent, ExtractError> {
        let extractor = self
            .get_for_file(path, mime_type)
            .ok_or_else(|| ExtractError::UnsupportedType(mime_type.to_string()))?;

        extractor.extract(path).await
    }

    /// Registered extractor names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extractors.iter().map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sift_core::ContentMetadataInfo;
    use tempfile::tempdir;

    struct CsvOnly;

    #[async_trait]
    impl ContentExtractor for CsvOnly {
        fn supported_types(&self) -> &[&str] {
            &["text/csv"]
        }

        async fn extract(&self, _path: &Path) -> Result<ExtractedContent, ExtractError> {
            Ok(ExtractedContent {
                text: String::new(),
                metadata: ContentMetadataInfo {
                    document_type: Some("spreadsheet".to_string()),
                    ..Default::default()
                },
            })
        }
    }

    #[test]
    fn test_new_registry_is_empty() {
        let registry = ExtractorRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.mime_mapping.is_empty());
    }

    #[test]
    fn test_with_text() {
        let registry = ExtractorRegistry::with_text(1024);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["text"]);
        assert!(registry.get_for_mime("text/plain").is_some());
    }

    #[test]
    fn test_with_defaults_routes_office_documents() {
        let registry = ExtractorRegistry::with_defaults(1024);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["text", "ooxml"]);
        assert!(registry
            .get_for_mime("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
            .is_some());
        assert!(registry.supports(Path::new("/d/deck.pptx"), "application/octet-stream"));
        assert!(registry.supports(Path::new("/d/notes.txt"), "text/plain"));
    }

    #[test]
    fn test_get_for_mime_nonexistent() {
        let registry = ExtractorRegistry::with_text(1024);
        assert!(registry.get_for_mime("video/mp4").is_none());
    }

    #[test]
    fn test_get_for_file_by_extension() {
        let registry = ExtractorRegistry::with_text(1024);

        assert!(registry.supports(Path::new("/notes/todo.md"), "application/octet-stream"));
        assert!(!registry.supports(Path::new("/notes/photo.jpg"), "image/jpeg"));
    }

    #[test]
    fn test_later_registration_takes_over_mime() {
        let mut registry = ExtractorRegistry::with_text(1024);
        registry.register("csv", CsvOnly);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.mime_mapping.get("text/csv"), Some(&1));
        assert_eq!(registry.mime_mapping.get("text/plain"), Some(&0));
    }

    #[test]
    fn test_reregister_replaces() {
        let mut registry = ExtractorRegistry::with_text(1024);
        registry.register("text", TextExtractor::with_max_bytes(10));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_extract_routes_by_mime() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("table.csv");
        std::fs::write(&file_path, "a,b\n1,2").unwrap();

        let mut registry = ExtractorRegistry::with_text(1024);
        registry.register("csv", CsvOnly);

        let content = registry.extract(&file_path, "text/csv").await.unwrap();
        assert_eq!(content.metadata.document_type.as_deref(), Some("spreadsheet"));
    }

    #[tokio::test]
    async fn test_extract_unsupported_type() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.bin");
        std::fs::write(&file_path, [0u8; 10]).unwrap();

        let registry = ExtractorRegistry::with_text(1024);
        let result = registry
            .extract(&file_path, "application/octet-stream")
            .await;

        match result {
            Err(ExtractError::UnsupportedType(mime)) => {
                assert_eq!(mime, "application/octet-stream");
            }
            _ => panic!("Expected UnsupportedType error"),
        }
    }
}
