//! Per-format text extraction.
//!
//! Each supported format has an [`Extractor`] that turns one file into one
//! [`Document`]. The [`ExtractorRegistry`] maps lowercase extensions to
//! extractors; the ingestor asks it for a handler per discovered file.
//!
//! Extraction never panics. A file that cannot be read or parsed yields an
//! [`ExtractError`] and the caller skips it.

use std::io::Read;
use std::path::Path;

use rag_core::models::{Document, Metadata, META_FORMAT, META_SOURCE, META_TITLE};
use thiserror::Error;

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no extractor registered for extension '{0}'")]
    Unsupported(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Turns a file of one format into a [`Document`].
pub trait Extractor: Send + Sync {
    /// Value stored under the `format` metadata key.
    fn format_name(&self) -> &'static str;

    /// Lowercase extensions without the leading dot.
    fn extensions(&self) -> &'static [&'static str];

    fn can_handle(&self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        self.extensions().iter().any(|e| *e == ext)
    }

    fn extract(&self, path: &Path) -> Result<Document, ExtractError>;
}

fn base_metadata(path: &Path, format: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(META_SOURCE.to_string(), path.display().to_string());
    metadata.insert(META_FORMAT.to_string(), format.to_string());
    metadata
}

fn read_to_string(path: &Path) -> Result<String, ExtractError> {
    let bytes = read_bytes(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ExtractError> {
    std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Plain UTF-8 text. Invalid sequences are replaced, not rejected.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn format_name(&self) -> &'static str {
        "text"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["txt", "text", "log"]
    }

    fn extract(&self, path: &Path) -> Result<Document, ExtractError> {
        let content = read_to_string(path)?;
        Ok(Document::new(content, base_metadata(path, self.format_name())))
    }
}

/// Markdown is kept as-is; the first `# ` heading becomes the title.
pub struct MarkdownExtractor;

impl Extractor for MarkdownExtractor {
    fn format_name(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown"]
    }

    fn extract(&self, path: &Path) -> Result<Document, ExtractError> {
        let content = read_to_string(path)?;
        let mut metadata = base_metadata(path, self.format_name());
        if let Some(title) = markdown_title(&content) {
            metadata.insert(META_TITLE.to_string(), title);
        }
        Ok(Document::new(content, metadata))
    }
}

fn markdown_title(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn format_name(&self) -> &'static str {
        "pdf"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["pdf"]
    }

    fn extract(&self, path: &Path) -> Result<Document, ExtractError> {
        let bytes = read_bytes(path)?;
        let content = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| ExtractError::Pdf(e.to_string()))?;
        Ok(Document::new(content, base_metadata(path, self.format_name())))
    }
}

/// Word documents: concatenated `w:t` runs, one line per `w:p` paragraph.
pub struct DocxExtractor;

impl Extractor for DocxExtractor {
    fn format_name(&self) -> &'static str {
        "docx"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["docx"]
    }

    fn extract(&self, path: &Path) -> Result<Document, ExtractError> {
        let bytes = read_bytes(path)?;
        let content = extract_docx(&bytes)?;
        Ok(Document::new(content, base_metadata(path, self.format_name())))
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Ooxml(format!("word/document.xml: {}", e)))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    paragraphs_text(&xml)
}

fn paragraphs_text(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

/// Extension-keyed lookup over the registered extractors.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Text, markdown, PDF and DOCX.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TextExtractor));
        registry.register(Box::new(MarkdownExtractor));
        registry.register(Box::new(PdfExtractor));
        registry.register(Box::new(DocxExtractor));
        registry
    }

    /// Later registrations take precedence for overlapping extensions.
    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.insert(0, extractor);
    }

    pub fn for_extension(&self, extension: &str) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.can_handle(extension))
            .map(|e| e.as_ref())
    }

    pub fn extract(&self, path: &Path) -> Result<Document, ExtractError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match self.for_extension(ext) {
            Some(extractor) => extractor.extract(path),
            None => Err(ExtractError::Unsupported(ext.to_string())),
        }
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
