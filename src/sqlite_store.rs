//! SQLite-backed [`VectorStore`].
//!
//! One row per embedding entry. Vectors are little-endian f32 BLOBs and
//! chunk metadata is a JSON object. Queries load candidates in `seq` order
//! and rank them in process with [`rank_candidates`], so ordering matches
//! the in-memory store exactly.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rag_core::embedding::{blob_to_vec, vec_to_blob};
use rag_core::models::{Chunk, EmbeddingEntry, Metadata, MetadataFilter, META_SOURCE};
use rag_core::store::{rank_candidates, ScoredChunk, SourceCount, VectorStore};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;

use crate::db;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn open(index_dir: &Path) -> Result<Self> {
        Ok(Self::new(db::connect(index_dir).await?))
    }
}

fn row_to_candidate(row: &sqlx::sqlite::SqliteRow) -> Result<(Chunk, Vec<f32>)> {
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: Metadata =
        serde_json::from_str(&metadata_json).context("corrupt metadata_json in index")?;
    let blob: Vec<u8> = row.try_get("embedding")?;

    let chunk = Chunk {
        id: row.try_get("chunk_id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: row.try_get("chunk_index")?,
        text: row.try_get("text")?,
        hash: row.try_get("hash")?,
        metadata,
    };
    Ok((chunk, blob_to_vec(&blob)))
}

async fn insert_rows(conn: &mut SqliteConnection, entries: &[EmbeddingEntry]) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    for entry in entries {
        let chunk = &entry.chunk;
        let metadata_json = serde_json::to_string(&chunk.metadata)?;
        // re-adding a chunk id moves it to the end of the insertion order
        sqlx::query("DELETE FROM entries WHERE chunk_id = ?")
            .bind(&chunk.id)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            r#"
            INSERT INTO entries (chunk_id, document_id, chunk_index, text, hash,
                                 source, metadata_json, embedding, dims, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.document_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(chunk.source())
        .bind(&metadata_json)
        .bind(vec_to_blob(&entry.vector))
        .bind(entry.vector.len() as i64)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn insert(&self, entries: &[EmbeddingEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_rows(&mut *tx, entries).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let source = filter.and_then(|f| f.0.get(META_SOURCE));

        let rows = match source {
            Some(source) => {
                sqlx::query(
                    r#"
                    SELECT chunk_id, document_id, chunk_index, text, hash, metadata_json, embedding
                    FROM entries WHERE source = ? ORDER BY seq
                    "#,
                )
                .bind(source)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT chunk_id, document_id, chunk_index, text, hash, metadata_json, embedding
                    FROM entries ORDER BY seq
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
        };

        let candidates = rows
            .iter()
            .map(row_to_candidate)
            .collect::<Result<Vec<_>>>()?;

        Ok(rank_candidates(vector, candidates, limit, filter))
    }

    async fn remove_source(&self, source: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM entries WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn replace_sources(&self, sources: &[String], entries: &[EmbeddingEntry]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for source in sources {
            removed += sqlx::query("DELETE FROM entries WHERE source = ?")
                .bind(source)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        insert_rows(&mut *tx, entries).await?;
        tx.commit().await?;
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM entries").execute(&self.pool).await?;
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn sources(&self) -> Result<Vec<SourceCount>> {
        let rows = sqlx::query(
            r#"
            SELECT source, COUNT(*) AS chunks, MAX(indexed_at) AS last_indexed
            FROM entries GROUP BY source ORDER BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<SourceCount> {
                let chunks: i64 = row.try_get("chunks")?;
                Ok(SourceCount {
                    source: row.try_get("source")?,
                    chunks: chunks as u64,
                    last_indexed: row.try_get("last_indexed")?,
                })
            })
            .collect()
    }

    async fn flush(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("WAL checkpoint failed")?;
        Ok(())
    }
}
