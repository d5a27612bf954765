//! End-to-end tests over the real ingestor, SQLite index and assistant,
//! with deterministic embedding and generation fakes.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{adapter, test_config, DownBackend, EchoBackend, HashEmbedder};
use rag_assistant::assistant::{ChatSession, NewDocument, QaAssistant};
use rag_assistant::backend::BackendAdapter;
use rag_assistant::config::Config;
use rag_assistant::evaluate::{evaluate_recall, RecallCase};
use rag_assistant::index::VectorIndex;
use rag_assistant::ingest::PLACEHOLDER_TEXT;
use rag_assistant::rag_core::models::{FeedbackSample, MetadataFilter};
use rag_assistant::rag_core::prompt::{AnswerMode, FALLBACK_ANSWER, NO_INFORMATION_ANSWER};
use rag_assistant::rag_core::retry::RetryPolicy;
use rag_assistant::rag_core::RagError;
use tempfile::TempDir;

const SCENARIO_TEXT: &str = "AIOps平台支持异常检测、根因分析与负载预测。";

async fn open_index(config: &Config) -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::new(
        Arc::new(HashEmbedder::default()),
        config.index.batch_size,
        config.index.retry_policy(),
    ));
    index.open(&config.index.path).await.unwrap();
    index
}

async fn assistant_with(config: &Config, backend: BackendAdapter) -> QaAssistant {
    QaAssistant::from_parts(config, open_index(config).await, backend).unwrap()
}

fn ops_documents() -> Vec<NewDocument> {
    vec![
        NewDocument::new(
            "Disk usage alerts fire when a volume passes ninety percent.",
            "alerts.md",
        ),
        NewDocument::new(
            "Load forecasting uses seasonal models trained on weekly traffic.",
            "forecast.md",
        ),
        NewDocument::new(
            "Root cause analysis correlates deploy events with error spikes.",
            "rca.md",
        ),
        NewDocument::new(
            "On-call rotations hand over every Monday at ten in the morning.",
            "oncall.md",
        ),
    ]
}

#[tokio::test]
async fn test_single_file_scenario() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    std::fs::create_dir_all(&config.documents.dir).unwrap();
    std::fs::write(config.documents.dir.join("aiops.txt"), SCENARIO_TEXT).unwrap();

    let backend = Arc::new(EchoBackend::new("支持异常检测。"));
    let assistant = assistant_with(&config, adapter(backend.clone(), 1)).await;

    let report = assistant.load_documents().await.unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.chunks, 1);

    let response = assistant.answer_question("异常检测", None, None).await.unwrap();
    assert_eq!(response.question, "异常检测");
    assert_eq!(response.answer, "支持异常检测。");
    assert_eq!(response.retrieved_documents.len(), 1);
    assert_eq!(response.retrieved_documents[0].source, "aiops.txt");
    assert_eq!(response.retrieved_documents[0].chunk.text, SCENARIO_TEXT);
    assert_eq!(response.metrics.retrieved, 1);
    assert!(backend.last_prompt().contains("source: aiops.txt"));
}

#[tokio::test]
async fn test_empty_directory_gets_placeholder() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;

    let report = assistant.load_documents().await.unwrap();
    assert_eq!(report.documents, 1);
    assert!(config.documents.dir.is_dir());

    let hits = assistant
        .retriever()
        .retrieve("knowledge base", 3, None)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert!(PLACEHOLDER_TEXT.contains(hits[0].chunk.text.trim()));
}

#[tokio::test]
async fn test_search_round_trip_and_bounds() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;
    assistant.add_documents(ops_documents()).await.unwrap();

    let index = assistant.index();
    let stats = index.stats().await.unwrap();
    assert!(stats.count >= 4);

    let target = index.search("Root cause analysis", 1).await.unwrap();
    let target_text = target[0].chunk.text.clone();

    let hits = index.search(&target_text, 3).await.unwrap();
    assert_eq!(hits[0].chunk.text, target_text);
    assert!((hits[0].score - 1.0).abs() < 1e-5);

    for k in [1, 2, 5, 100] {
        let hits = index.search("traffic models", k).await.unwrap();
        assert!(hits.len() <= k);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }
}

#[tokio::test]
async fn test_reingest_replaces_source() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;

    assistant.add_documents(ops_documents()).await.unwrap();
    let first = assistant.stats().await.unwrap().count;
    assistant.add_documents(ops_documents()).await.unwrap();
    assert_eq!(assistant.stats().await.unwrap().count, first);
}

#[tokio::test]
async fn test_failed_reingest_keeps_previous_entries() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = Arc::new(HashEmbedder::default());
    let index = Arc::new(VectorIndex::new(
        embedder.clone(),
        config.index.batch_size,
        config.index.retry_policy(),
    ));
    index.open(&config.index.path).await.unwrap();
    let assistant = QaAssistant::from_parts(
        &config,
        index,
        adapter(Arc::new(EchoBackend::new("ok")), 1),
    )
    .unwrap();

    let alerts = || {
        vec![NewDocument::new(
            "Disk usage alerts fire when a volume passes ninety percent.",
            "alerts.md",
        )]
    };
    assistant.add_documents(alerts()).await.unwrap();
    let before = assistant.stats().await.unwrap().count;
    assert!(before > 0);

    embedder.offline.store(true, Ordering::SeqCst);
    let result = assistant.add_documents(alerts()).await;
    assert!(matches!(result, Err(RagError::EmbeddingBackend { .. })));

    embedder.offline.store(false, Ordering::SeqCst);
    assert_eq!(assistant.stats().await.unwrap().count, before);
    let hits = assistant.retriever().retrieve("disk alerts", 1, None).await.unwrap();
    assert_eq!(hits[0].source, "alerts.md");

    // and from disk
    let reopened = open_index(&config).await;
    assert_eq!(reopened.stats().await.unwrap().count, before);
}

#[tokio::test]
async fn test_index_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let count = {
        let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;
        assistant.add_documents(ops_documents()).await.unwrap();
        assistant.stats().await.unwrap().count
    };

    let index = open_index(&config).await;
    assert_eq!(index.stats().await.unwrap().count, count);
    let hits = index.search("on-call rotation Monday", 1).await.unwrap();
    assert_eq!(hits[0].chunk.source(), "oncall.md");
}

#[tokio::test]
async fn test_retrieve_on_empty_index() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;
    let hits = assistant.retriever().retrieve("anything", 5, None).await.unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn test_no_results_and_dead_backend_says_no_information() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = Arc::new(DownBackend::default());
    let assistant = assistant_with(&config, adapter(backend.clone(), 3)).await;

    let response = assistant.answer_question("what?", None, None).await.unwrap();
    assert_eq!(response.answer, NO_INFORMATION_ANSWER);
    assert!(response.retrieved_documents.is_empty());
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_exhaustion_returns_fallback() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = Arc::new(DownBackend::default());
    let assistant = assistant_with(&config, adapter(backend.clone(), 2)).await;
    assistant.add_documents(ops_documents()).await.unwrap();

    let response = assistant
        .answer_question("How does load forecasting work?", None, None)
        .await
        .unwrap();
    assert_eq!(response.answer, FALLBACK_ANSWER);
    assert!(!response.retrieved_documents.is_empty());
    assert_eq!(backend.chat_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_connect_fails_when_backend_is_down() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = Arc::new(DownBackend::default());

    let result = QaAssistant::connect(&config, Arc::new(HashEmbedder::default()), backend.clone()).await;
    match result {
        Err(RagError::BackendUnavailable { attempts, .. }) => assert_eq!(attempts, 2),
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("connect should fail"),
    }
    assert_eq!(backend.health_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unprepared_index_is_not_initialized() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let index = Arc::new(VectorIndex::new(
        Arc::new(HashEmbedder::default()),
        4,
        RetryPolicy::once(),
    ));
    let assistant =
        QaAssistant::from_parts(&config, index, adapter(Arc::new(EchoBackend::new("ok")), 1)).unwrap();

    assert!(matches!(
        assistant.answer_question("q", None, None).await,
        Err(RagError::NotInitialized(_))
    ));
    assert!(matches!(
        assistant.add_documents(ops_documents()).await,
        Err(RagError::NotInitialized(_))
    ));
}

#[tokio::test]
async fn test_filters_and_extra_context() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = Arc::new(EchoBackend::new("ok"));
    let assistant = assistant_with(&config, adapter(backend.clone(), 1)).await;
    assistant.add_documents(ops_documents()).await.unwrap();

    let filter = MetadataFilter::source("rca.md");
    let response = assistant
        .answer_question(
            "How is load forecast?",
            Some("Ticket OPS-42 is about forecasting."),
            Some(&filter),
        )
        .await
        .unwrap();
    assert!(!response.retrieved_documents.is_empty());
    assert!(response
        .retrieved_documents
        .iter()
        .all(|r| r.source == "rca.md"));

    let prompt = backend.last_prompt();
    let extra = prompt.find("Ticket OPS-42").unwrap();
    let block = prompt.find("source: rca.md").unwrap();
    assert!(extra < block);
}

#[tokio::test]
async fn test_retrieval_disabled_skips_index() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.enabled = false;
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("free answer")), 1)).await;
    assistant.add_documents(ops_documents()).await.unwrap();

    let response = assistant.answer_question("anything", None, None).await.unwrap();
    assert_eq!(response.answer, "free answer");
    assert!(response.retrieved_documents.is_empty());
}

#[tokio::test]
async fn test_chat_session_carries_history() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let backend = Arc::new(EchoBackend::new("Seasonal models."));
    let assistant = assistant_with(&config, adapter(backend.clone(), 1))
        .await
        .with_mode(AnswerMode::Conversational);
    assistant.add_documents(ops_documents()).await.unwrap();

    let mut session = ChatSession::new();
    let first = assistant
        .chat(&mut session, "How is load forecast?")
        .await
        .unwrap();
    assert_eq!(first.answer, "Seasonal models.");
    assert!(!first.sources.is_empty());

    assistant.chat(&mut session, "Trained on what?").await.unwrap();
    assert_eq!(session.turns().len(), 2);
    assert!(backend
        .last_prompt()
        .contains("User: How is load forecast?\nAssistant: Seasonal models."));
}

#[tokio::test]
async fn test_feedback_round_trip_over_corrupted_file() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    std::fs::write(&config.feedback.path, "[{ broken").unwrap();
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;

    assistant.record_feedback("q1", "a1").unwrap();
    assistant.record_feedback("q2", "a2").unwrap();

    let stored: Vec<FeedbackSample> =
        serde_json::from_str(&std::fs::read_to_string(&config.feedback.path).unwrap()).unwrap();
    assert_eq!(
        stored,
        vec![FeedbackSample::new("q1", "a1"), FeedbackSample::new("q2", "a2")]
    );
}

#[tokio::test]
async fn test_recall_evaluation() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let assistant = assistant_with(&config, adapter(Arc::new(EchoBackend::new("ok")), 1)).await;
    assistant.add_documents(ops_documents()).await.unwrap();

    let cases = vec![
        RecallCase {
            query: "Disk usage alerts volume percent".to_string(),
            expected_source: "alerts.md".to_string(),
        },
        RecallCase {
            query: "On-call rotations hand over".to_string(),
            expected_source: "oncall.md".to_string(),
        },
    ];
    let report = evaluate_recall(assistant.retriever(), &cases, 3, 0.1)
        .await
        .unwrap();
    assert_eq!(report.total, 2);
    assert!(report.hits >= 1);
    assert!(report.passed);

    let empty = evaluate_recall(assistant.retriever(), &[], 3, 0.1).await.unwrap();
    assert!(!empty.passed);
}
