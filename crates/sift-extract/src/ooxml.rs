//! Office Open XML extractor (docx, xlsx, pptx).
//!
//! A package is a zip archive. `[Content_Types].xml` declares every part
//! and its content type, which tells us what kind of document this is,
//! where the properties live and which parts carry the text:
//!
//! - documents: the main `word/document.xml` part, `w:t` runs
//! - presentations: every slide in slide-number order, `a:t` runs
//! - spreadsheets: the shared string table first, then each worksheet's
//!   inline strings and literal values
//!
//! Title, author and language come from the core properties part.

use async_trait::async_trait;
use roxmltree::{Document, Node, NodeId};
use sift_core::{ContentExtractor, ContentMetadataInfo, ExtractError, ExtractedContent};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::text::DEFAULT_MAX_BYTES;

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

/// Upper bound on the uncompressed size of any single part read.
const MAX_PART_BYTES: u64 = 64 * 1024 * 1024;

const CORE_PROPERTIES: &str = "application/vnd.openxmlformats-package.core-properties+xml";
const EXTENDED_PROPERTIES: &str =
    "application/vnd.openxmlformats-officedocument.extended-properties+xml";

const WORD_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml";
const PRESENTATION_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
const SLIDESHOW_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideshow.main+xml";
const SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
const WORKBOOK_MAIN: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const SHARED_STRINGS: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
const WORKSHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// Kind of Office Open XML package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeKind {
    Document,
    Presentation,
    Spreadsheet,
}

impl OfficeKind {
    fn from_main_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            WORD_MAIN => Some(Self::Document),
            PRESENTATION_MAIN | SLIDESHOW_MAIN => Some(Self::Presentation),
            WORKBOOK_MAIN => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "docx" | "docm" | "dotx" => Some(Self::Document),
            "pptx" | "ppsx" | "pptm" => Some(Self::Presentation),
            "xlsx" | "xlsm" | "xltx" => Some(Self::Spreadsheet),
            _ => None,
        }
    }

    /// Document type reported in the extracted metadata.
    #[must_use]
    pub fn document_type(self) -> &'static str {
        match self {
            Self::Document => "word-processing",
            Self::Presentation => "presentation",
            Self::Spreadsheet => "spreadsheet",
        }
    }

    /// Text-bearing parts, in reading order.
    fn content_parts(self, parts: &[Part]) -> Vec<String> {
        match self {
            Self::Document => names_of(parts, WORD_MAIN).collect(),
            Self::Presentation => {
                let mut slides: Vec<String> = names_of(parts, SLIDE).collect();
                slides.sort_by(|a, b| {
                    slide_number(a)
                        .cmp(&slide_number(b))
                        .then_with(|| a.cmp(b))
                });
                slides
            }
            // Worksheets refer to the shared strings, which come first
            Self::Spreadsheet => names_of(parts, SHARED_STRINGS)
                .chain(names_of(parts, WORKSHEET))
                .collect(),
        }
    }
}

fn names_of<'a>(parts: &'a [Part], content_type: &'a str) -> impl Iterator<Item = String> + 'a {
    parts
        .iter()
        .filter(move |part| part.content_type == content_type)
        .map(|part| part.name.clone())
}

/// Extractor for Office Open XML documents.
///
/// Text is read up to `max_bytes`; later parts are not opened once the
/// limit is reached. With `max_bytes == 0` only the properties are read.
#[derive(Debug, Clone)]
pub struct OfficeXmlExtractor {
    max_bytes: usize,
}

impl OfficeXmlExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_bytes(DEFAULT_MAX_BYTES)
    }

    #[must_use]
    pub fn with_max_bytes(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    #[must_use]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl Default for OfficeXmlExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for OfficeXmlExtractor {
    fn supported_types(&self) -> &[&str] {
        &[
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.openxmlformats-officedocument.presentationml.slideshow",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ]
    }

    fn can_extract_by_extension(&self, path: &Path) -> bool {
        OfficeKind::from_extension(path).is_some()
    }

    async fn extract(&self, path: &Path) -> Result<ExtractedContent, ExtractError> {
        let path = path.to_path_buf();
        let max_bytes = self.max_bytes;

        // Zip and XML parsing are blocking and CPU bound
        tokio::task::spawn_blocking(move || {
            let file = File::open(&path)?;
            extract_package(file, &path, max_bytes)
        })
        .await
        .map_err(|e| ExtractError::Failed(format!("extraction task failed: {e}")))?
    }
}

/// A part declared in `[Content_Types].xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    /// Archive entry name, without the leading slash
    name: String,
    content_type: String,
}

fn extract_package<R: Read + Seek>(
    reader: R,
    path: &Path,
    max_bytes: usize,
) -> Result<ExtractedContent, ExtractError> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| ExtractError::Parse(format!("not an Office Open XML package: {e}")))?;

    let manifest = read_part(&mut archive, CONTENT_TYPES_PART)?
        .ok_or_else(|| ExtractError::Parse(format!("missing {CONTENT_TYPES_PART}")))?;
    let parts = parse_parts(&manifest)?;

    let kind = parts
        .iter()
        .find_map(|part| OfficeKind::from_main_content_type(&part.content_type))
        .or_else(|| OfficeKind::from_extension(path))
        .ok_or_else(|| {
            ExtractError::UnsupportedType(format!("no main document part in {}", path.display()))
        })?;
    debug!("Extracting {} from '{}'", kind.document_type(), path.display());

    let mut metadata = ContentMetadataInfo {
        document_type: Some(kind.document_type().to_string()),
        ..Default::default()
    };
    let mut declared_words = None;

    for part in &parts {
        let is_properties =
            part.content_type == CORE_PROPERTIES || part.content_type == EXTENDED_PROPERTIES;
        if !is_properties {
            continue;
        }
        let Some(xml) = read_part(&mut archive, &part.name)? else {
            continue;
        };
        match Document::parse(&xml) {
            Ok(doc) if part.content_type == CORE_PROPERTIES => {
                apply_core_properties(&doc, &mut metadata);
            }
            Ok(doc) => declared_words = element_text(&doc, "Words").and_then(|w| w.parse().ok()),
            Err(e) => warn!(
                "Ignoring malformed properties '{}' in '{}': {e}",
                part.name,
                path.display()
            ),
        }
    }

    if max_bytes == 0 {
        metadata.word_count = declared_words;
        return Ok(ExtractedContent {
            text: String::new(),
            metadata,
        });
    }

    let mut buffer = TextBuffer::new(max_bytes);
    for name in kind.content_parts(&parts) {
        if buffer.is_full() {
            debug!("Skipping '{name}' as already reached max bytes to extract");
            break;
        }
        let Some(xml) = read_part(&mut archive, &name)? else {
            warn!("Part '{name}' is declared but missing from '{}'", path.display());
            continue;
        };
        let doc = Document::parse(&xml)
            .map_err(|e| ExtractError::Parse(format!("{name}: {e}")))?;

        match kind {
            OfficeKind::Spreadsheet => collect_cells(&doc, &mut buffer),
            OfficeKind::Document | OfficeKind::Presentation => collect_runs(&doc, &mut buffer),
        }
    }

    metadata.word_count = Some(buffer.text.split_whitespace().count());
    metadata.truncated = buffer.truncated;

    Ok(ExtractedContent {
        text: buffer.text,
        metadata,
    })
}

fn read_part<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, ExtractError> {
    match archive.by_name(name) {
        Ok(entry) => {
            let mut xml = String::new();
            entry.take(MAX_PART_BYTES).read_to_string(&mut xml)?;
            Ok(Some(xml))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(ExtractError::Parse(format!("{name}: {e}"))),
    }
}

fn parse_parts(manifest: &str) -> Result<Vec<Part>, ExtractError> {
    let doc = Document::parse(manifest)
        .map_err(|e| ExtractError::Parse(format!("{CONTENT_TYPES_PART}: {e}")))?;

    Ok(doc
        .descendants()
        .filter(|n| n.is_element() && n.has_tag_name("Override"))
        .filter_map(|n| {
            let name = n.attribute("PartName")?.trim_start_matches('/');
            let content_type = n.attribute("ContentType")?;
            Some(Part {
                name: name.to_string(),
                content_type: content_type.to_string(),
            })
        })
        .collect())
}

fn apply_core_properties(doc: &Document<'_>, metadata: &mut ContentMetadataInfo) {
    metadata.title = element_text(doc, "title");
    metadata.author = element_text(doc, "creator");
    metadata.language = element_text(doc, "language");
}

/// Trimmed text of the first element with this local name, if not blank.
fn element_text(doc: &Document<'_>, local_name: &str) -> Option<String> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == local_name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Text runs (`w:t`, `a:t`), one line per paragraph.
///
/// A word may be split over several runs, so runs of one paragraph are
/// joined without a separator.
fn collect_runs(doc: &Document<'_>, buffer: &mut TextBuffer) {
    let mut paragraph: Option<NodeId> = None;
    let mut first = true;

    for run in doc
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "t")
    {
        let owner = run
            .ancestors()
            .find(|a| a.is_element() && a.tag_name().name() == "p")
            .map(|p| p.id());
        let separator = if first || owner != paragraph {
            Some('\n')
        } else {
            None
        };
        first = false;
        paragraph = owner;

        buffer.push(separator, run.text().unwrap_or_default());
        if buffer.is_full() {
            return;
        }
    }
}

/// Shared strings (`si`) one per line, then cells, tab separated within a
/// row.
fn collect_cells(doc: &Document<'_>, buffer: &mut TextBuffer) {
    let mut row: Option<NodeId> = None;

    for node in doc.descendants().filter(Node::is_element) {
        let (separator, text) = match node.tag_name().name() {
            "si" => ('\n', joined_text(&node)),
            "c" => {
                let owner = node.parent().map(|p| p.id());
                let separator = if owner == row { '\t' } else { '\n' };
                row = owner;
                match node.attribute("t") {
                    // Index into the shared strings, already read
                    Some("s") => continue,
                    Some("inlineStr") => (separator, joined_text(&node)),
                    _ => match node
                        .children()
                        .find(|c| c.is_element() && c.tag_name().name() == "v")
                        .and_then(|v| v.text())
                    {
                        Some(value) => (separator, value.to_string()),
                        None => continue,
                    },
                }
            }
            _ => continue,
        };

        if text.is_empty() {
            continue;
        }
        buffer.push(Some(separator), &text);
        if buffer.is_full() {
            return;
        }
    }
}

/// Concatenated `t` descendants, skipping phonetic hints.
fn joined_text(node: &Node<'_, '_>) -> String {
    node.descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "t")
        .filter(|t| t.parent().map_or(true, |p| p.tag_name().name() != "rPh"))
        .filter_map(|t| t.text())
        .collect()
}

fn slide_number(name: &str) -> Option<u32> {
    name.rsplit('/')
        .next()?
        .strip_prefix("slide")?
        .strip_suffix(".xml")?
        .parse()
        .ok()
}

/// Extracted text bounded by a byte limit.
#[derive(Debug)]
struct TextBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl TextBuffer {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    fn is_full(&self) -> bool {
        self.truncated || self.text.len() >= self.limit
    }

    /// Append `piece`, preceded by `separator` unless the buffer is empty.
    fn push(&mut self, separator: Option<char>, piece: &str) {
        if self.is_full() {
            return;
        }
        if let Some(separator) = separator.filter(|_| !self.text.is_empty()) {
            self.push_str(&separator.to_string());
        }
        self.push_str(piece);
    }

    fn push_str(&mut self, piece: &str) {
        let room = self.limit.saturating_sub(self.text.len());
        if piece.len() <= room {
            self.text.push_str(piece);
            return;
        }

        let mut end = room;
        while !piece.is_char_boundary(end) {
            end -= 1;
        }
        self.text.push_str(&piece[..end]);
        self.truncated = true;
    }
}
