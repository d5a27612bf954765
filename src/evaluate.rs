//! Retrieval recall against a labelled question set.
//!
//! A case is a query plus the source that should answer it. A case counts
//! as a hit when that source appears among the top `k` results. The run
//! passes when `hits / total >= min_recall`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::retriever::Retriever;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallCase {
    pub query: String,
    pub expected_source: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub query: String,
    pub expected_source: String,
    /// 1-based rank of the expected source, if retrieved.
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecallReport {
    pub hits: usize,
    pub total: usize,
    pub recall: f64,
    pub threshold: f64,
    pub passed: bool,
    pub cases: Vec<CaseOutcome>,
}

/// Read cases from a JSON array file.
pub fn load_cases(path: &Path) -> Result<Vec<RecallCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read eval cases: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid eval cases file: {}", path.display()))
}

pub async fn evaluate_recall(
    retriever: &Retriever,
    cases: &[RecallCase],
    top_k: usize,
    min_recall: f64,
) -> Result<RecallReport> {
    let mut outcomes = Vec::with_capacity(cases.len());

    for case in cases {
        let results = retriever.retrieve(&case.query, top_k, None).await?;
        let rank = results
            .iter()
            .position(|r| r.source == case.expected_source)
            .map(|i| i + 1);
        outcomes.push(CaseOutcome {
            query: case.query.clone(),
            expected_source: case.expected_source.clone(),
            rank,
        });
    }

    let hits = outcomes.iter().filter(|o| o.rank.is_some()).count();
    let total = outcomes.len();
    let recall = if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    };
    let passed = total > 0 && recall >= min_recall;

    info!(hits, total, recall, threshold = min_recall, passed, "recall evaluated");

    Ok(RecallReport {
        hits,
        total,
        recall,
        threshold: min_recall,
        passed,
        cases: outcomes,
    })
}
