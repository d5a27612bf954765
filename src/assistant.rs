//! The question-answering front door.
//!
//! [`QaAssistant`] wires ingestion, the vector index, the retriever, the
//! generator and the feedback store together. Every dependency is passed in
//! at construction; there is no global state.
//!
//! # Answer flow
//!
//! ```text
//! question ──► retrieve(top_k, filters) ──► caller context + retrieved blocks
//!                                                   │
//!                                                   ▼
//!                                         generator (mode, history)
//!                                                   │
//!                                                   ▼
//!                                   QaResponse { answer, retrieved, metrics }
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use rag_core::embedding::EmbeddingProvider;
use rag_core::models::{
    ConversationTurn, Document, Metadata, MetadataFilter, RetrievalResult, META_SOURCE,
};
use rag_core::prompt::{AnswerMode, FALLBACK_ANSWER};
use rag_core::{RagError, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::backend::{create_backend, BackendAdapter, GenerationBackend};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::feedback::FeedbackStore;
use crate::generator::{Answer, GenerationRequest, Generator};
use crate::index::{IndexStats, VectorIndex};
use crate::ingest::DocumentIngestor;
use crate::retriever::Retriever;

/// Timings and counts for one `answer_question` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AnswerMetrics {
    pub retrieval_ms: u64,
    pub generation_ms: u64,
    pub retrieved: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct QaResponse {
    pub question: String,
    pub answer: String,
    pub retrieved_documents: Vec<RetrievalResult>,
    pub metrics: AnswerMetrics,
}

/// Caller-provided text to index, as accepted by [`QaAssistant::add_documents`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), source.into());
        Self {
            content: content.into(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Conversation turns owned by one chat.
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    turns: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.turns.push(ConversationTurn::new(user, assistant));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

pub struct QaAssistant {
    ingestor: DocumentIngestor,
    retriever: Retriever,
    generator: Generator,
    feedback: FeedbackStore,
    documents_dir: PathBuf,
    formats: Vec<String>,
    chunk_size: usize,
    chunk_overlap: usize,
    retrieval_enabled: bool,
    top_k: usize,
    mode: AnswerMode,
}

impl QaAssistant {
    /// Build backends from the configuration and connect.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_embedder(&config.embedding)?);
        let backend = create_backend(&config.generation)?;
        Self::connect(config, embedder, backend).await
    }

    /// Open the on-disk index and health-check the generation backend.
    pub async fn connect(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn GenerationBackend>,
    ) -> Result<Self> {
        let index = Arc::new(VectorIndex::new(
            embedder,
            config.index.batch_size,
            config.index.retry_policy(),
        ));
        index.open(&config.index.path).await?;

        let adapter = BackendAdapter::connect(
            backend,
            config.generation.health_check_policy(),
            config.generation.retry_policy(),
            config.generation.seed,
        )
        .await?;

        Self::from_parts(config, index, adapter)
    }

    /// Assemble from prepared components. The index may still be unprepared;
    /// queries then fail with [`RagError::NotInitialized`].
    pub fn from_parts(config: &Config, index: Arc<VectorIndex>, adapter: BackendAdapter) -> Result<Self> {
        rag_core::chunk::validate(config.chunking.chunk_size, config.chunking.chunk_overlap)?;
        let ingestor = DocumentIngestor::from_config(&config.documents)?;
        let generator =
            Generator::new(adapter, &config.generation).with_history_turns(config.retrieval.history_turns);

        Ok(Self {
            ingestor,
            retriever: Retriever::new(index),
            generator,
            feedback: FeedbackStore::new(&config.feedback.path),
            documents_dir: config.documents.dir.clone(),
            formats: config.documents.formats.clone(),
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            retrieval_enabled: config.retrieval.enabled,
            top_k: config.retrieval.top_k,
            mode: config.retrieval.mode,
        })
    }

    pub fn with_mode(mut self, mode: AnswerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn mode(&self) -> AnswerMode {
        self.mode
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        self.retriever.index()
    }

    /// Ingest the configured documents directory into the index.
    ///
    /// Sources that were indexed before are replaced, not duplicated. If
    /// embedding fails the previous entries are kept.
    pub async fn load_documents(&self) -> Result<IngestReport> {
        let documents = self
            .ingestor
            .load(&self.documents_dir, &self.formats)
            .map_err(RagError::Other)?;
        self.index_documents(&documents).await
    }

    /// Index caller-supplied texts. A missing `source` becomes `unknown`.
    pub async fn add_documents(&self, documents: Vec<NewDocument>) -> Result<IngestReport> {
        let documents: Vec<Document> = documents
            .into_iter()
            .map(|d| Document::new(d.content, d.metadata))
            .collect();
        self.index_documents(&documents).await
    }

    async fn index_documents(&self, documents: &[Document]) -> Result<IngestReport> {
        let chunks = self
            .ingestor
            .chunk(documents, self.chunk_size, self.chunk_overlap)?;

        let index = self.index();
        let sources: Vec<String> = documents
            .iter()
            .filter(|d| d.metadata.contains_key(META_SOURCE))
            .map(|d| d.source().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        index.replace(&sources, &chunks).await?;
        index.persist().await?;

        let report = IngestReport {
            documents: documents.len(),
            chunks: chunks.len(),
        };
        info!(documents = report.documents, chunks = report.chunks, "ingestion complete");
        Ok(report)
    }

    /// Answer one question, optionally with extra caller context and filters.
    pub async fn answer_question(
        &self,
        question: &str,
        context: Option<&str>,
        filters: Option<&MetadataFilter>,
    ) -> Result<QaResponse> {
        let (answer, retrieved, metrics) = self.run(question, &[], context, filters).await?;
        Ok(QaResponse {
            question: question.to_string(),
            answer: answer.answer,
            retrieved_documents: retrieved,
            metrics,
        })
    }

    /// Answer with prior conversation turns as context.
    pub async fn ask(
        &self,
        question: &str,
        history: &[ConversationTurn],
        filters: Option<&MetadataFilter>,
    ) -> Result<Answer> {
        let (answer, _, _) = self.run(question, history, None, filters).await?;
        Ok(answer)
    }

    /// [`ask`](Self::ask) within a session, recording the new turn.
    pub async fn chat(&self, session: &mut ChatSession, question: &str) -> Result<Answer> {
        let answer = self.ask(question, session.turns(), None).await?;
        session.push(question, answer.answer.clone());
        Ok(answer)
    }

    async fn run(
        &self,
        question: &str,
        history: &[ConversationTurn],
        context: Option<&str>,
        filters: Option<&MetadataFilter>,
    ) -> Result<(Answer, Vec<RetrievalResult>, AnswerMetrics)> {
        let mut metrics = AnswerMetrics::default();

        let retrieved = if self.retrieval_enabled {
            let started = Instant::now();
            let results = match self.retriever.retrieve(question, self.top_k, filters).await {
                Ok(results) => results,
                Err(RagError::EmbeddingBackend { attempts, message }) => {
                    error!(attempts, error = %message, "query embedding failed");
                    let answer = Answer {
                        answer: FALLBACK_ANSWER.to_string(),
                        sources: Vec::new(),
                    };
                    return Ok((answer, Vec::new(), metrics));
                }
                Err(e) => return Err(e),
            };
            metrics.retrieval_ms = started.elapsed().as_millis() as u64;
            results
        } else {
            Vec::new()
        };
        metrics.retrieved = retrieved.len();

        let started = Instant::now();
        let answer = self
            .generator
            .answer(
                GenerationRequest::new(question, &retrieved)
                    .history(history)
                    .mode(self.mode)
                    .extra_context(context),
            )
            .await;
        metrics.generation_ms = started.elapsed().as_millis() as u64;

        info!(
            retrieved = metrics.retrieved,
            retrieval_ms = metrics.retrieval_ms,
            generation_ms = metrics.generation_ms,
            "question answered"
        );
        Ok((answer, retrieved, metrics))
    }

    /// Store a corrected answer for later fine-tuning.
    pub fn record_feedback(&self, question: &str, correct_answer: &str) -> Result<()> {
        self.feedback.record(question, correct_answer)?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index().stats().await
    }
}
