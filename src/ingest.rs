//! Document discovery and chunking.
//!
//! [`DocumentIngestor::load`] walks the documents directory, hands each file
//! with an accepted extension to the matching extractor, and returns one
//! [`Document`] per readable file. Files that fail to extract are logged and
//! skipped. When nothing usable is found, a placeholder document is written
//! to the directory and returned instead, so downstream indexing always has
//! something to work with.
//!
//! [`DocumentIngestor::chunk`] runs the overlapping splitter from
//! `rag_core::chunk` over the loaded documents.

use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rag_core::models::{Chunk, Document, Metadata, META_FORMAT, META_SOURCE};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::extract::ExtractorRegistry;

/// File name used when the documents directory yields nothing.
pub const PLACEHOLDER_FILE: &str = "placeholder.txt";

pub const PLACEHOLDER_TEXT: &str = "This knowledge base is empty. \
Add .txt, .md or .pdf files to the documents directory and run ingestion again.";

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

pub struct DocumentIngestor {
    registry: ExtractorRegistry,
    excludes: GlobSet,
    follow_symlinks: bool,
}

impl DocumentIngestor {
    pub fn new(registry: ExtractorRegistry, exclude_globs: &[String]) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(exclude_globs.iter().cloned());
        Ok(Self {
            registry,
            excludes: build_globset(&patterns)?,
            follow_symlinks: false,
        })
    }

    pub fn from_config(config: &DocumentsConfig) -> Result<Self> {
        let mut ingestor = Self::new(ExtractorRegistry::with_defaults(), &config.exclude_globs)?;
        ingestor.follow_symlinks = config.follow_symlinks;
        Ok(ingestor)
    }

    /// Load every file under `dir` whose extension is in `formats`.
    ///
    /// The directory is created if missing. Documents come back sorted by
    /// source path so repeated runs index in the same order. The `source`
    /// metadata is the path relative to `dir`, with `/` separators.
    pub fn load(&self, dir: &Path, formats: &[String]) -> Result<Vec<Document>> {
        if !dir.exists() {
            warn!(dir = %dir.display(), "documents directory missing, creating it");
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create documents directory: {}", dir.display()))?;

        let formats: Vec<String> = formats
            .iter()
            .map(|f| f.trim_start_matches('.').to_ascii_lowercase())
            .collect();

        let mut documents = Vec::new();
        let walker = WalkDir::new(dir)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(path);
            let rel_str = relative.to_string_lossy().replace('\\', "/");

            if self.excludes.is_match(&rel_str) {
                continue;
            }

            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            if !formats.contains(&ext) {
                continue;
            }

            let Some(extractor) = self.registry.for_extension(&ext) else {
                warn!(file = %rel_str, extension = %ext, "no extractor for accepted format");
                continue;
            };

            match extractor.extract(path) {
                Ok(mut doc) => {
                    doc.metadata.insert(META_SOURCE.to_string(), rel_str.clone());
                    debug!(file = %rel_str, chars = doc.content.chars().count(), "extracted");
                    documents.push(doc);
                }
                Err(e) => {
                    warn!(file = %rel_str, error = %e, "failed to extract document, skipping");
                }
            }
        }

        if documents.is_empty() {
            warn!(
                dir = %dir.display(),
                "no documents found, writing placeholder document"
            );
            return Ok(vec![write_placeholder(dir)?]);
        }

        info!(count = documents.len(), dir = %dir.display(), "documents loaded");
        Ok(documents)
    }

    /// Split documents into overlapping chunks.
    pub fn chunk(
        &self,
        documents: &[Document],
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> rag_core::Result<Vec<Chunk>> {
        let chunks = rag_core::chunk::chunk_documents(documents, chunk_size, chunk_overlap)?;
        debug!(
            documents = documents.len(),
            chunks = chunks.len(),
            "chunked documents"
        );
        Ok(chunks)
    }
}

fn write_placeholder(dir: &Path) -> Result<Document> {
    let path = dir.join(PLACEHOLDER_FILE);
    std::fs::write(&path, PLACEHOLDER_TEXT)
        .with_context(|| format!("Failed to write placeholder: {}", path.display()))?;

    let mut metadata = Metadata::new();
    metadata.insert(META_SOURCE.to_string(), PLACEHOLDER_FILE.to_string());
    metadata.insert(META_FORMAT.to_string(), "text".to_string());
    Ok(Document::new(PLACEHOLDER_TEXT, metadata))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
