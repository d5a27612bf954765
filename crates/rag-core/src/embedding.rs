//! Embedding backend contract and vector helpers.
//!
//! The pipeline never computes embeddings itself. It calls an
//! [`EmbeddingProvider`] with batches of text and stores whatever vectors
//! come back. Concrete HTTP providers live in the application crate.

use anyhow::Result;
use async_trait::async_trait;

/// An external service turning text into fixed-dimension vectors.
///
/// `embed` performs exactly one backend call; batching and retries are
/// the caller's job (see the vector index).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, e.g. `"nomic-embed-text"`.
    fn model_name(&self) -> &str;

    /// Vector dimensionality. `0` when unknown until the first call.
    fn dims(&self) -> usize;

    /// Embed `texts`, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Encode a vector as little-endian `f32` bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode bytes written by [`vec_to_blob`]. Trailing partial values are dropped.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Mismatched lengths, empty vectors and zero vectors score `0.0`, so a
/// malformed entry sinks to the bottom of a ranking instead of failing it.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
