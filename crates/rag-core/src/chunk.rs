//! Recursive, overlapping text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters
//! (Unicode scalar values, so CJK text is budgeted per character). Each
//! chunk after the first starts exactly `chunk_overlap` characters before
//! the previous chunk's end.
//!
//! # Algorithm
//!
//! 1. Take the window `[start, start + chunk_size)`.
//! 2. If the window reaches the end of the text, emit it and stop.
//! 3. Otherwise walk the window end backwards looking for a natural break,
//!    trying paragraph breaks first, then line breaks, sentence ends,
//!    clause separators and finally whitespace.
//! 4. A break is only accepted if the chunk keeps at least half of the
//!    window and still advances past the overlap; otherwise the window is
//!    hard-cut at `chunk_size`.
//! 5. The next window starts at `end - chunk_overlap`.
//!
//! Chunks are exact substrings of the source text (nothing is trimmed), so
//! the overlap between neighbours is always exactly `chunk_overlap`.
//!
//! # Example
//!
//! ```rust
//! use rag_core::chunk::split_text;
//!
//! let pieces = split_text("First sentence. Second sentence.", 20, 5).unwrap();
//! assert!(pieces.iter().all(|p| p.chars().count() <= 20));
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{RagError, Result};
use crate::models::{Chunk, Document, META_CHUNK_ID};

/// A predicate deciding whether a chunk may end at `end` (exclusive).
type BreakRule = fn(&[char], usize) -> bool;

/// Break rules in order of preference.
const BREAK_RULES: [BreakRule; 5] = [
    paragraph_break,
    line_break,
    sentence_break,
    clause_break,
    word_break,
];

fn paragraph_break(chars: &[char], end: usize) -> bool {
    end >= 2 && chars[end - 2] == '\n' && chars[end - 1] == '\n'
}

fn line_break(chars: &[char], end: usize) -> bool {
    chars[end - 1] == '\n'
}

fn sentence_break(chars: &[char], end: usize) -> bool {
    match chars[end - 1] {
        '。' | '！' | '？' | '；' => true,
        // "3.14" and "e.g." must not end a sentence
        '.' | '!' | '?' | ';' => chars.get(end).map_or(true, |c| c.is_whitespace()),
        _ => false,
    }
}

fn clause_break(chars: &[char], end: usize) -> bool {
    matches!(chars[end - 1], '，' | '、' | ',' | ':' | '：')
}

fn word_break(chars: &[char], end: usize) -> bool {
    chars[end - 1].is_whitespace()
}

/// Check that a chunking configuration can make progress.
pub fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfig(
            "chunk_size must be > 0".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::InvalidConfig(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            chunk_overlap, chunk_size
        )));
    }
    Ok(())
}

/// Split `text` into overlapping pieces. Whitespace-only text yields nothing.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<String>> {
    validate(chunk_size, chunk_overlap)?;

    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Ok(Vec::new());
    }

    Ok(split_spans(&chars, chunk_size, chunk_overlap)
        .into_iter()
        .map(|(start, end)| chars[start..end].iter().collect())
        .collect())
}

fn split_spans(chars: &[char], chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
    let len = chars.len();
    let mut spans = Vec::new();
    let mut start = 0;

    loop {
        let hard_end = (start + chunk_size).min(len);
        if hard_end == len {
            spans.push((start, len));
            break;
        }

        let min_end = start + (chunk_overlap + 1).max(chunk_size / 2);
        let end = natural_break(chars, min_end, hard_end).unwrap_or(hard_end);
        spans.push((start, end));
        start = end - chunk_overlap;
    }

    spans
}

fn natural_break(chars: &[char], min_end: usize, hard_end: usize) -> Option<usize> {
    BREAK_RULES
        .iter()
        .find_map(|rule| (min_end..=hard_end).rev().find(|&end| rule(chars, end)))
}

/// Chunk a single document. Chunks inherit the document's metadata and
/// gain a `chunk_id` entry.
pub fn chunk_document(
    document: &Document,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    Ok(split_text(&document.content, chunk_size, chunk_overlap)?
        .into_iter()
        .enumerate()
        .map(|(i, text)| make_chunk(document, i as i64, text))
        .collect())
}

/// Chunk every document in order, in a single pass.
pub fn chunk_documents(
    documents: &[Document],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Chunk>> {
    validate(chunk_size, chunk_overlap)?;
    let mut chunks = Vec::new();
    for doc in documents {
        chunks.extend(chunk_document(doc, chunk_size, chunk_overlap)?);
    }
    Ok(chunks)
}

fn make_chunk(document: &Document, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = Uuid::new_v4().to_string();
    let mut metadata = document.metadata.clone();
    metadata.insert(META_CHUNK_ID.to_string(), id.clone());

    Chunk {
        id,
        document_id: document.id.clone(),
        chunk_index: index,
        text,
        hash,
        metadata,
    }
}
