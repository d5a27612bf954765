//! Storage abstraction for embedding entries.
//!
//! The [`VectorStore`] trait is what the vector index talks to. The
//! application ships a SQLite implementation; [`memory::InMemoryStore`] is
//! used for tests and ephemeral indexes.
//!
//! All stores rank with [`rank_candidates`], so the ordering contract is
//! identical whichever backend is plugged in:
//!
//! - descending cosine score,
//! - ties broken by insertion order (earlier first),
//! - metadata filter applied before truncation to `limit`.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::models::{Chunk, EmbeddingEntry, MetadataFilter};

/// A chunk paired with its similarity to the query vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Per-source entry count, as reported by [`VectorStore::sources`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    pub source: String,
    pub chunks: u64,
    /// Unix seconds of the most recent insert, when the store tracks it.
    pub last_indexed: Option<i64>,
}

/// Durable or ephemeral home of embedding entries.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorStore::insert) | Append entries |
/// | [`query`](VectorStore::query) | Ranked cosine search |
/// | [`remove_source`](VectorStore::remove_source) | Drop every entry of one source |
/// | [`replace_sources`](VectorStore::replace_sources) | Swap sources' entries in one write |
/// | [`clear`](VectorStore::clear) | Drop everything |
/// | [`count`](VectorStore::count) | Number of stored entries |
/// | [`sources`](VectorStore::sources) | Entry counts grouped by source |
/// | [`flush`](VectorStore::flush) | Make prior writes durable |
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, entries: &[EmbeddingEntry]) -> Result<()>;

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Returns the number of entries removed.
    async fn remove_source(&self, source: &str) -> Result<u64>;

    /// Remove every entry of `sources` and insert `entries` as one atomic
    /// write. Readers see either the old entries or the new ones. Returns the
    /// number of entries removed.
    async fn replace_sources(&self, sources: &[String], entries: &[EmbeddingEntry]) -> Result<u64>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self) -> Result<u64>;

    /// Sorted by source name.
    async fn sources(&self) -> Result<Vec<SourceCount>>;

    async fn flush(&self) -> Result<()>;
}

/// Score and rank candidates given in insertion order.
pub fn rank_candidates<I>(
    query: &[f32],
    candidates: I,
    limit: usize,
    filter: Option<&MetadataFilter>,
) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (Chunk, Vec<f32>)>,
{
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|(chunk, _)| filter.map_or(true, |f| f.matches(&chunk.metadata)))
        .map(|(chunk, vector)| ScoredChunk {
            score: cosine_similarity(query, &vector),
            chunk,
        })
        .collect();

    // stable: equal scores keep insertion order
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, META_SOURCE};

    fn chunk(id: &str, source: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source.to_string());
        Chunk {
            id: id.to_string(),
            document_id: format!("doc-{}", id),
            chunk_index: 0,
            text: id.to_string(),
            hash: String::new(),
            metadata,
        }
    }

    fn ids(results: &[ScoredChunk]) -> Vec<&str> {
        results.iter().map(|r| r.chunk.id.as_str()).collect()
    }

    #[test]
    fn test_rank_descending_and_bounded() {
        let candidates = vec![
            (chunk("low", "a"), vec![0.0, 1.0]),
            (chunk("high", "a"), vec![1.0, 0.0]),
            (chunk("mid", "a"), vec![1.0, 1.0]),
        ];
        let ranked = rank_candidates(&[1.0, 0.0], candidates, 2, None);
        assert_eq!(ids(&ranked), vec!["high", "mid"]);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let candidates = vec![
            (chunk("first", "a"), vec![1.0, 0.0]),
            (chunk("second", "a"), vec![2.0, 0.0]),
            (chunk("third", "a"), vec![3.0, 0.0]),
        ];
        let ranked = rank_candidates(&[1.0, 0.0], candidates, 10, None);
        assert_eq!(ids(&ranked), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_filter_before_truncation() {
        let candidates = vec![
            (chunk("a1", "a.md"), vec![1.0, 0.0]),
            (chunk("a2", "a.md"), vec![0.9, 0.1]),
            (chunk("b1", "b.md"), vec![0.5, 0.5]),
            (chunk("b2", "b.md"), vec![0.1, 0.9]),
        ];
        let filter = MetadataFilter::source("b.md");
        let ranked = rank_candidates(&[1.0, 0.0], candidates, 2, Some(&filter));
        assert_eq!(ids(&ranked), vec!["b1", "b2"]);
    }
}
