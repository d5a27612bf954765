//! The vector index: embeds chunks and answers nearest-neighbour queries.
//!
//! A [`VectorIndex`] is built unprepared and becomes usable once a storage
//! backend is attached, either with [`VectorIndex::open`] (SQLite under a
//! directory) or [`VectorIndex::attach`] (any [`VectorStore`]). Calling
//! `add` or `search` before that fails with [`RagError::NotInitialized`].
//!
//! Embedding happens in batches of `batch_size` texts, and every batch is
//! embedded before anything is written. A batch that keeps failing after the
//! retry policy is exhausted aborts with [`RagError::EmbeddingBackend`] and
//! leaves the store untouched.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use rag_core::embedding::EmbeddingProvider;
use rag_core::models::{Chunk, EmbeddingEntry, MetadataFilter};
use rag_core::retry::RetryPolicy;
use rag_core::store::{ScoredChunk, SourceCount, VectorStore};
use rag_core::{RagError, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::retry::{is_transient, retry_async_when};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub count: u64,
    pub embedding_model: String,
    pub sources: Vec<SourceCount>,
}

pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: OnceLock<Arc<dyn VectorStore>>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, batch_size: usize, retry: RetryPolicy) -> Self {
        Self {
            embedder,
            store: OnceLock::new(),
            batch_size: batch_size.max(1),
            retry,
        }
    }

    /// Prepare SQLite storage under `dir`. A second call is a no-op.
    pub async fn open(&self, dir: &Path) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        let store = SqliteStore::open(dir).await?;
        self.attach(Arc::new(store));
        info!(path = %dir.display(), "vector index opened");
        Ok(())
    }

    /// Use `store` as the backing storage. Returns `false`, leaving the
    /// current storage in place, if one is already attached.
    pub fn attach(&self, store: Arc<dyn VectorStore>) -> bool {
        let attached = self.store.set(store).is_ok();
        if !attached {
            warn!("vector index already has storage; ignoring attach");
        }
        attached
    }

    pub fn is_ready(&self) -> bool {
        self.store.get().is_some()
    }

    fn store(&self) -> Result<&Arc<dyn VectorStore>> {
        self.store
            .get()
            .ok_or(RagError::NotInitialized("vector index"))
    }

    /// Embed and store `chunks`. Returns the number of entries written.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        let store = self.store()?;
        if chunks.is_empty() {
            return Ok(0);
        }
        let entries = self.embed_chunks(chunks).await?;
        store.insert(&entries).await?;

        info!(chunks = entries.len(), model = self.embedder.model_name(), "indexed chunks");
        Ok(entries.len())
    }

    /// Replace every entry of `sources` with `chunks`.
    ///
    /// The old entries are only dropped once all new embeddings exist, and
    /// the swap is a single store write.
    pub async fn replace(&self, sources: &[String], chunks: &[Chunk]) -> Result<usize> {
        let store = self.store()?;
        let entries = self.embed_chunks(chunks).await?;
        let removed = store.replace_sources(sources, &entries).await?;

        info!(
            sources = sources.len(),
            removed,
            chunks = entries.len(),
            model = self.embedder.model_name(),
            "replaced sources"
        );
        Ok(entries.len())
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddingEntry>> {
        let mut entries = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embed_batch(&texts).await?;
            entries.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddingEntry { chunk, vector }),
            );
            debug!(batch = batch_no, size = batch.len(), "embedded batch");
        }
        Ok(entries)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embedder = &self.embedder;
        retry_async_when(self.retry, "embed", is_transient, || async move {
            let vectors = embedder.embed(texts).await?;
            if vectors.len() != texts.len() {
                anyhow::bail!(
                    "expected {} vectors, backend returned {}",
                    texts.len(),
                    vectors.len()
                );
            }
            Ok::<_, anyhow::Error>(vectors)
        })
        .await
        .map_err(|(e, attempts)| RagError::EmbeddingBackend {
            attempts,
            message: format!("{:#}", e),
        })
    }

    /// The `k` stored chunks most similar to `query`, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        self.search_filtered(query, k, None).await
    }

    pub async fn search_filtered(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let store = self.store()?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.embed_batch(&[query.to_string()]).await?;
        let query_vec = vectors.pop().unwrap_or_default();
        let filter = filter.filter(|f| !f.is_empty());
        Ok(store.query(&query_vec, k, filter).await?)
    }

    /// Make everything added so far durable.
    pub async fn persist(&self) -> Result<()> {
        self.store()?.flush().await?;
        debug!("vector index persisted");
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let store = self.store()?;
        Ok(IndexStats {
            count: store.count().await?,
            embedding_model: self.embedder.model_name().to_string(),
            sources: store.sources().await?,
        })
    }

    pub async fn remove_source(&self, source: &str) -> Result<u64> {
        let removed = self.store()?.remove_source(source).await?;
        if removed > 0 {
            info!(source, removed, "removed entries");
        }
        Ok(removed)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store()?.clear().await?;
        info!("vector index cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rag_core::models::{Document, Metadata, META_SOURCE};
    use rag_core::store::memory::InMemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Vowel histogram; enough structure for similarity to mean something.
    struct VowelEmbedder {
        calls: AtomicU32,
        fail_first: u32,
    }

    impl VowelEmbedder {
        fn new(fail_first: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for VowelEmbedder {
        fn model_name(&self) -> &str {
            "vowels"
        }

        fn dims(&self) -> usize {
            5
        }

        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_first {
                anyhow::bail!("backend down (call {})", n);
            }
            Ok(texts
                .iter()
                .map(|t| {
                    "aeiou"
                        .chars()
                        .map(|v| t.chars().filter(|c| *c == v).count() as f32 + 0.01)
                        .collect()
                })
                .collect())
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        let docs: Vec<Document> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut metadata = Metadata::new();
                metadata.insert(META_SOURCE.to_string(), format!("doc{}.txt", i));
                Document::new(*t, metadata)
            })
            .collect();
        rag_core::chunk::chunk_documents(&docs, 200, 0).unwrap()
    }

    fn ready_index(embedder: VowelEmbedder, batch_size: usize, retry: RetryPolicy) -> VectorIndex {
        let index = VectorIndex::new(Arc::new(embedder), batch_size, retry);
        index.attach(Arc::new(InMemoryStore::new()));
        index
    }

    #[tokio::test]
    async fn test_not_initialized() {
        let index = VectorIndex::new(Arc::new(VowelEmbedder::new(0)), 8, RetryPolicy::once());
        assert!(matches!(
            index.search("q", 3).await,
            Err(RagError::NotInitialized(_))
        ));
        assert!(matches!(
            index.add(&chunks(&["a"])).await,
            Err(RagError::NotInitialized(_))
        ));
        assert!(matches!(index.persist().await, Err(RagError::NotInitialized(_))));
    }

    #[tokio::test]
    async fn test_add_in_batches_and_search() {
        let index = ready_index(VowelEmbedder::new(0), 2, RetryPolicy::once());
        let added = index
            .add(&chunks(&["aaaa", "eeee", "iiii", "oooo", "uuuu"]))
            .await
            .unwrap();
        assert_eq!(added, 5);
        assert_eq!(index.stats().await.unwrap().count, 5);

        let hits = index.search("iii", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "iiii");
        assert!(hits[0].score >= hits[1].score);
        assert!(index.search("iii", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let index = ready_index(VowelEmbedder::new(2), 8, RetryPolicy::immediate(3));
        assert_eq!(index.add(&chunks(&["aaaa"])).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_backend_error() {
        let index = ready_index(VowelEmbedder::new(10), 8, RetryPolicy::immediate(3));
        match index.add(&chunks(&["aaaa"])).await {
            Err(RagError::EmbeddingBackend { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("backend down"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(index.stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_remove_source_and_clear() {
        let index = ready_index(VowelEmbedder::new(0), 8, RetryPolicy::once());
        index.add(&chunks(&["aaaa", "eeee"])).await.unwrap();
        assert_eq!(index.remove_source("doc0.txt").await.unwrap(), 1);
        assert_eq!(index.stats().await.unwrap().sources.len(), 1);
        index.clear().await.unwrap();
        assert_eq!(index.stats().await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_old_entries() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new());
        let healthy = VectorIndex::new(Arc::new(VowelEmbedder::new(0)), 1, RetryPolicy::once());
        healthy.attach(store.clone());
        healthy.add(&chunks(&["aaaa", "eeee"])).await.unwrap();

        let broken = VectorIndex::new(Arc::new(VowelEmbedder::new(10)), 1, RetryPolicy::immediate(2));
        broken.attach(store.clone());
        let result = broken
            .replace(&["doc0.txt".to_string()], &chunks(&["iiii"]))
            .await;
        assert!(matches!(result, Err(RagError::EmbeddingBackend { .. })));
        assert_eq!(store.count().await.unwrap(), 2);

        healthy
            .replace(&["doc0.txt".to_string()], &chunks(&["iiii"]))
            .await
            .unwrap();
        let hits = healthy.search("iii", 1).await.unwrap();
        assert_eq!(hits[0].chunk.text, "iiii");
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[test]
    fn test_second_attach_is_rejected() {
        let index = VectorIndex::new(Arc::new(VowelEmbedder::new(0)), 8, RetryPolicy::once());
        assert!(index.attach(Arc::new(InMemoryStore::new())));
        assert!(!index.attach(Arc::new(InMemoryStore::new())));
        assert!(index.is_ready());
    }
}
