//! Query-time lookup on top of the vector index.

use std::sync::Arc;

use rag_core::models::{MetadataFilter, RetrievalResult};
use rag_core::Result;
use tracing::debug;

use crate::index::VectorIndex;

#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Up to `top_k` results, best first; equal scores keep insertion order.
    ///
    /// An empty index or a query with no hits yields an empty vector. The
    /// filter narrows the candidate set before ranking, so it never reorders
    /// what remains.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        let hits = self.index.search_filtered(query, top_k, filter).await?;
        debug!(query, hits = hits.len(), "retrieved");

        Ok(hits
            .into_iter()
            .map(|hit| RetrievalResult {
                source: hit.chunk.source().to_string(),
                score: hit.score,
                chunk: hit.chunk,
            })
            .collect())
    }
}
