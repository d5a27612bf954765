//! Core data models that flow through ingestion, indexing, retrieval and
//! generation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// String metadata attached to documents and inherited by their chunks.
pub type Metadata = BTreeMap<String, String>;

/// Metadata key holding the document's origin (file path or caller label).
pub const META_SOURCE: &str = "source";
/// Metadata key holding the extractor format name (`text`, `markdown`, ...).
pub const META_FORMAT: &str = "format";
/// Metadata key holding a chunk's identifier.
pub const META_CHUNK_ID: &str = "chunk_id";
/// Metadata key holding a human-readable title, when one was found.
pub const META_TITLE: &str = "title";

/// Source label used when neither the caller nor the extractor named one.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Raw text plus metadata, produced by an extractor or supplied by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            metadata,
        }
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get(META_SOURCE)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// A contiguous slice of a [`Document`], the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
    /// Document metadata plus `chunk_id`.
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> &str {
        self.metadata
            .get(META_SOURCE)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_SOURCE)
    }
}

/// A chunk and its embedding vector, as owned by the vector index.
#[derive(Debug, Clone)]
pub struct EmbeddingEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// One ranked hit for a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
    pub source: String,
}

/// Compact citation returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub chunk_id: String,
    pub score: f32,
}

impl From<&RetrievalResult> for SourceRef {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            source: r.source.clone(),
            chunk_id: r.chunk.id.clone(),
            score: r.score,
        }
    }
}

/// A user question and the assistant's reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

impl ConversationTurn {
    pub fn new(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            assistant: assistant.into(),
        }
    }
}

/// A supervised training record in instruction-tuning layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackSample {
    pub instruction: String,
    #[serde(default)]
    pub input: String,
    pub output: String,
}

impl FeedbackSample {
    pub fn new(question: impl Into<String>, correct_answer: impl Into<String>) -> Self {
        Self {
            instruction: question.into(),
            input: String::new(),
            output: correct_answer.into(),
        }
    }
}

/// Exact-match metadata filter. Every key must be present with the same value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter(pub Metadata);

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict results to a single source.
    pub fn source(source: impl Into<String>) -> Self {
        Self::new().with(META_SOURCE, source)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.0
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }
}
