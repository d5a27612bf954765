//! Implementations of the `rag` subcommands.
//!
//! Each `run_*` function owns one command: it builds only the components the
//! command needs and prints human-readable output to stdout. Diagnostics go
//! through `tracing` to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use rag_core::embedding::EmbeddingProvider;
use rag_core::models::{Metadata, MetadataFilter, META_SOURCE};
use rag_core::prompt::AnswerMode;

use crate::assistant::{NewDocument, QaAssistant, QaResponse};
use crate::backend::{create_backend, BackendAdapter};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::evaluate::{evaluate_recall, load_cases};
use crate::feedback::FeedbackStore;
use crate::index::VectorIndex;
use crate::retriever::Retriever;

async fn open_index(config: &Config) -> Result<Arc<VectorIndex>> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_embedder(&config.embedding)?);
    let index = Arc::new(VectorIndex::new(
        embedder,
        config.index.batch_size,
        config.index.retry_policy(),
    ));
    index.open(&config.index.path).await?;
    Ok(index)
}

/// An assistant for indexing only; the generation backend is not probed.
async fn offline_assistant(config: &Config) -> Result<QaAssistant> {
    let index = open_index(config).await?;
    let adapter = BackendAdapter::from_config(create_backend(&config.generation)?, &config.generation);
    Ok(QaAssistant::from_parts(config, index, adapter)?)
}

fn source_filter(source: Option<String>) -> Option<MetadataFilter> {
    source.map(MetadataFilter::source)
}

pub async fn run_ingest(config: &Config) -> Result<()> {
    let assistant = offline_assistant(config).await?;
    let report = assistant.load_documents().await?;
    println!(
        "Ingested {} document(s) into {} chunk(s) from {}",
        report.documents,
        report.chunks,
        config.documents.dir.display()
    );
    Ok(())
}

pub async fn run_add(config: &Config, files: &[PathBuf], source: Option<String>) -> Result<()> {
    if source.is_some() && files.len() > 1 {
        bail!("--source can only be used with a single file");
    }

    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let content = std::fs::read_to_string(file)?;
        let label = source
            .clone()
            .unwrap_or_else(|| file.display().to_string());
        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.to_string(), label);
        documents.push(NewDocument { content, metadata });
    }

    let assistant = offline_assistant(config).await?;
    let report = assistant.add_documents(documents).await?;
    println!(
        "Added {} document(s) as {} chunk(s)",
        report.documents, report.chunks
    );
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    question: &str,
    mode: Option<AnswerMode>,
    source: Option<String>,
    context: Option<String>,
    json: bool,
) -> Result<()> {
    let mut assistant = QaAssistant::from_config(config).await?;
    if let Some(mode) = mode {
        assistant = assistant.with_mode(mode);
    }

    let filter = source_filter(source);
    let response = assistant
        .answer_question(question, context.as_deref(), filter.as_ref())
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }
    Ok(())
}

fn print_response(response: &QaResponse) {
    println!("{}", response.answer);
    if response.retrieved_documents.is_empty() {
        return;
    }
    println!();
    println!("Sources:");
    for (i, r) in response.retrieved_documents.iter().enumerate() {
        println!("  [{}] {} ({:.2})", i + 1, r.source, r.score);
    }
    println!();
    println!(
        "retrieval {} ms, generation {} ms",
        response.metrics.retrieval_ms, response.metrics.generation_ms
    );
}

pub async fn run_retrieve(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    source: Option<String>,
) -> Result<()> {
    let retriever = Retriever::new(open_index(config).await?);
    let filter = source_filter(source);
    let results = retriever
        .retrieve(query, top_k.unwrap_or(config.retrieval.top_k), filter.as_ref())
        .await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, r) in results.iter().enumerate() {
        println!("{}. [{:.4}] {} (chunk {})", i + 1, r.score, r.source, r.chunk.chunk_index);
        println!("    {}", snippet(&r.chunk.text, 160));
        println!();
    }
    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let index = open_index(config).await?;
    let stats = index.stats().await?;

    println!("RAG Assistant Index Stats");
    println!("========================");
    println!();
    println!("  Index:       {}", config.index.path.display());
    println!("  Model:       {}", stats.embedding_model);
    println!("  Chunks:      {}", stats.count);

    if !stats.sources.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<40} {:>8}   {}", "SOURCE", "CHUNKS", "LAST INDEXED");
        println!("  {}", "-".repeat(72));
        for s in &stats.sources {
            let indexed = s
                .last_indexed
                .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            println!("  {:<40} {:>8}   {}", s.source, s.chunks, indexed);
        }
    }
    println!();
    Ok(())
}

pub fn run_feedback(config: &Config, question: &str, answer: &str) -> Result<()> {
    let store = FeedbackStore::new(&config.feedback.path);
    let total = store.record(question, answer)?;
    println!(
        "Feedback recorded ({} total) in {}",
        total,
        store.path().display()
    );
    Ok(())
}

pub async fn run_eval(
    config: &Config,
    cases_path: &Path,
    top_k: Option<usize>,
    min_recall: Option<f64>,
) -> Result<()> {
    let cases = load_cases(cases_path)?;
    let retriever = Retriever::new(open_index(config).await?);
    let threshold = min_recall.unwrap_or(config.retrieval.min_recall);
    let report = evaluate_recall(
        &retriever,
        &cases,
        top_k.unwrap_or(config.retrieval.top_k),
        threshold,
    )
    .await?;

    for case in &report.cases {
        let rank = case
            .rank
            .map(|r| format!("hit @{}", r))
            .unwrap_or_else(|| "miss".to_string());
        println!("  {:<8} {}  ->  {}", rank, case.query, case.expected_source);
    }
    println!();
    println!(
        "Recall: {}/{} = {:.2} (threshold {:.2}) {}",
        report.hits,
        report.total,
        report.recall,
        report.threshold,
        if report.passed { "PASS" } else { "FAIL" }
    );

    if !report.passed {
        bail!("recall {:.2} below threshold {:.2}", report.recall, report.threshold);
    }
    Ok(())
}
