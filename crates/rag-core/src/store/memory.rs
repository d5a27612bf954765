//! In-memory [`VectorStore`] for tests and throwaway indexes.
//!
//! Entries live in a `Vec` behind a `std::sync::RwLock`; search is a
//! brute-force cosine scan. Nothing survives the process, so
//! [`flush`](VectorStore::flush) is a no-op.

use std::collections::BTreeMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{EmbeddingEntry, MetadataFilter};

use super::{rank_candidates, ScoredChunk, SourceCount, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<EmbeddingEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory vector store lock poisoned")
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn insert(&self, entries: &[EmbeddingEntry]) -> Result<()> {
        let mut stored = self.entries.write().map_err(poisoned)?;
        stored.extend_from_slice(entries);
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let stored = self.entries.read().map_err(poisoned)?;
        Ok(rank_candidates(
            vector,
            stored.iter().map(|e| (e.chunk.clone(), e.vector.clone())),
            limit,
            filter,
        ))
    }

    async fn remove_source(&self, source: &str) -> Result<u64> {
        let mut stored = self.entries.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|e| e.chunk.source() != source);
        Ok((before - stored.len()) as u64)
    }

    async fn replace_sources(&self, sources: &[String], entries: &[EmbeddingEntry]) -> Result<u64> {
        let mut stored = self.entries.write().map_err(poisoned)?;
        let before = stored.len();
        stored.retain(|e| !sources.iter().any(|s| s == e.chunk.source()));
        let removed = (before - stored.len()) as u64;
        stored.extend_from_slice(entries);
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.entries.read().map_err(poisoned)?.len() as u64)
    }

    async fn sources(&self) -> Result<Vec<SourceCount>> {
        let stored = self.entries.read().map_err(poisoned)?;
        let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
        for entry in stored.iter() {
            *counts.entry(entry.chunk.source()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(source, chunks)| SourceCount {
                source: source.to_string(),
                chunks,
                last_indexed: None,
            })
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
