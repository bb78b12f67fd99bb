//! Plain-text extractor.

use async_trait::async_trait;
use sift_core::{ContentExtractor, ContentMetadataInfo, ExtractError, ExtractedContent};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Default number of bytes read from each file.
pub const DEFAULT_MAX_BYTES: usize = 65_536;

/// Document type reported for everything this extractor reads.
pub const PLAIN_TEXT_DOCUMENT: &str = "plain-text";

/// Extractor for plain text files.
///
/// Reads at most `max_bytes` from the start of the file. The result is
/// always valid UTF-8: a multi-byte character cut by the limit is dropped
/// and invalid sequences are replaced. With `max_bytes == 0` no content is
/// read and only the document type is reported.
#[derive(Debug, Clone)]
pub struct TextExtractor {
    max_bytes: usize,
}

impl TextExtractor {
    /// Create a text extractor with the default byte limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_BYTES)
    }

    /// Create a text extractor reading at most `max_bytes` per file.
    #[must_use]
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for TextExtractor {
    fn supported_types(&self) -> &[&str] {
        &[
            "text/plain",
            "text/markdown",
            "text/x-markdown",
            "text/csv",
            "text/x-log",
            "text/x-rust",
            "text/x-python",
            "text/x-c",
            "text/x-c++",
            "text/javascript",
            "application/json",
            "application/xml",
            "text/xml",
            "text/html",
            "text/css",
            "application/toml",
            "application/yaml",
            "application/x-sh",
        ]
    }

    fn can_extract_by_extension(&self, path: &Path) -> bool {
        const EXTENSIONS: &[&str] = &[
            "txt", "text", "md", "markdown", "rst", "org", "csv", "tsv", "log", "ini", "conf",
            "cfg", "toml", "yaml", "yml", "json", "xml", "html", "htm", "css", "rs", "py", "c",
            "h", "cpp", "hpp", "js", "ts", "go", "java", "sh", "bash", "sql",
        ];

        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext.to_lowercase().as_str()))
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError> {
        let language = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);

        let mut metadata = ContentMetadataInfo {
            document_type: Some(PLAIN_TEXT_DOCUMENT.to_string()),
            language,
            ..Default::default()
        };

        if self.max_bytes == 0 {
            return Ok(ExtractedContent {
                text: String::new(),
                metadata,
            });
        }

        debug!(
            "Starting to read '{}' up to {} bytes...",
            path.display(),
            self.max_bytes
        );

        let file = File::open(path).await?;
        // One extra byte tells whether anything was left unread
        let mut buffer = Vec::with_capacity(self.max_bytes.min(DEFAULT_MAX_BYTES) + 1);
        file.take(self.max_bytes as u64 + 1)
            .read_to_end(&mut buffer)
            .await?;

        let truncated = buffer.len() > self.max_bytes;
        if truncated {
            buffer.truncate(self.max_bytes);
            buffer.truncate(complete_prefix_len(&buffer));
        }

        let text = String::from_utf8_lossy(&buffer).into_owned();
        metadata.word_count = Some(text.split_whitespace().count());
        metadata.truncated = truncated;

        Ok(ExtractedContent { text, metadata })
    }
}

/// Length of `bytes` without a trailing, incomplete UTF-8 sequence.
fn complete_prefix_len(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_limit() {
        assert_eq!(TextExtractor::new().max_bytes(), 65_536);
        assert_eq!(TextExtractor::default().max_bytes(), DEFAULT_MAX_BYTES);
    }

    #[test]
    fn test_supported_types_includes_common_types() {
        let extractor = TextExtractor::new();
        let types = extractor.supported_types();

        assert!(types.contains(&"text/plain"));
        assert!(types.contains(&"text/markdown"));
        assert!(types.contains(&"application/json"));
    }

    #[test]
    fn test_can_extract_by_extension() {
        let extractor = TextExtractor::new();

        assert!(extractor.can_extract_by_extension(Path::new("/test/file.txt")));
        assert!(extractor.can_extract_by_extension(Path::new("/test/README.md")));
        assert!(extractor.can_extract_by_extension(Path::new("/test/FILE.TXT")));
        assert!(!extractor.can_extract_by_extension(Path::new("/test/image.png")));
        assert!(!extractor.can_extract_by_extension(Path::new("/test/no_extension")));
    }

    #[test]
    fn test_complete_prefix_len() {
        assert_eq!(complete_prefix_len(b"abc"), 3);
        assert_eq!(complete_prefix_len(&[]), 0);
        // "é" is C3 A9: a lone C3 is incomplete
        assert_eq!(complete_prefix_len(&[b'a', 0xC3]), 1);
        assert_eq!(complete_prefix_len(&[b'a', 0xC3, 0xA9]), 3);
        // Four-byte emoji cut after three bytes
        assert_eq!(complete_prefix_len(&[0xF0, 0x9F, 0x8C]), 0);
    }

    #[tokio::test]
    async fn test_extract_simple_text() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, "Hello, world!").unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();

        assert_eq!(content.text, "Hello, world!");
        assert_eq!(content.metadata.document_type.as_deref(), Some("plain-text"));
        assert_eq!(content.metadata.word_count, Some(2));
        assert_eq!(content.metadata.language.as_deref(), Some("txt"));
        assert!(!content.metadata.truncated);
    }

    #[tokio::test]
    async fn test_extract_respects_limit() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("long.txt");
        std::fs::write(&file_path, "one two three four").unwrap();

        let content = TextExtractor::with_max_bytes(7)
            .extract(&file_path)
            .await
            .unwrap();

        assert_eq!(content.text, "one two");
        assert!(content.metadata.truncated);
        assert_eq!(content.metadata.word_count, Some(2));
    }

    #[tokio::test]
    async fn test_extract_exact_limit_not_truncated() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("exact.txt");
        std::fs::write(&file_path, "12345").unwrap();

        let content = TextExtractor::with_max_bytes(5)
            .extract(&file_path)
            .await
            .unwrap();

        assert_eq!(content.text, "12345");
        assert!(!content.metadata.truncated);
    }

    #[tokio::test]
    async fn test_extract_cuts_on_char_boundary() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("unicode.txt");
        std::fs::write(&file_path, "caf\u{e9} ok").unwrap();

        // The limit falls between the two bytes of "é"
        let content = TextExtractor::with_max_bytes(4)
            .extract(&file_path)
            .await
            .unwrap();

        assert_eq!(content.text, "caf");
        assert!(content.metadata.truncated);
    }

    #[tokio::test]
    async fn test_extract_invalid_utf8_is_replaced() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("latin1.txt");
        std::fs::write(&file_path, [b'a', 0xFF, b'b']).unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();
        assert_eq!(content.text, "a\u{FFFD}b");
    }

    #[tokio::test]
    async fn test_extract_zero_limit_reads_nothing() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test.txt");
        std::fs::write(&file_path, "content").unwrap();

        let content = TextExtractor::with_max_bytes(0)
            .extract(&file_path)
            .await
            .unwrap();

        assert!(content.text.is_empty());
        assert_eq!(content.metadata.document_type.as_deref(), Some("plain-text"));
        assert!(content.metadata.word_count.is_none());
    }

    #[tokio::test]
    async fn test_extract_handles_empty_file() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("empty.txt");
        std::fs::write(&file_path, "").unwrap();

        let content = TextExtractor::new().extract(&file_path).await.unwrap();
        assert_eq!(content.text, "");
        assert_eq!(content.metadata.word_count, Some(0));
    }

    #[tokio::test]
    async fn test_extract_nonexistent_file_fails() {
        let result = TextExtractor::new()
            .extract(Path::new("/nonexistent/file.txt"))
            .await;
        assert!(matches!(result, Err(ExtractError::Io(_))));
    }
}
