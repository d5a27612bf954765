//! TOML configuration parsing and validation.
//!
//! The configuration is read once at startup by [`load_config`] and then
//! passed by reference into every component constructor. Nothing reads it
//! from a global.
//!
//! ```toml
//! [documents]
//! dir = "./data/documents"
//! formats = ["txt", "md", "pdf"]
//!
//! [chunking]
//! chunk_size = 500
//! chunk_overlap = 50
//!
//! [index]
//! path = "./data/index"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//!
//! [generation]
//! provider = "ollama"
//! model = "qwen2.5:7b"
//!
//! [retrieval]
//! top_k = 4
//!
//! [feedback]
//! path = "./data/feedback.json"
//! ```
//!
//! Every section has defaults, so an empty file is a valid (if
//! embedding-less) configuration.

use anyhow::{bail, Context, Result};
use rag_core::prompt::{AnswerMode, DEFAULT_HISTORY_TURNS, DEFAULT_SYSTEM_PROMPT};
use rag_core::retry::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    /// Accepted file extensions, without the dot.
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            formats: default_formats(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("./data/documents")
}
fn default_formats() -> Vec<String> {
    vec!["txt".to_string(), "md".to_string(), "pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_chunk_overlap() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding `index.sqlite`.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Retries per embedding batch after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl IndexConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.max_retries.saturating_add(1),
            Duration::from_millis(self.retry_delay_ms),
        )
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/index")
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    3
}

/// Upper bound for `max_retries` and `health_check_attempts`.
pub const MAX_RETRIES_LIMIT: u32 = 100;
fn default_retry_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL; provider-specific default when unset.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Fixed sampling seed for reproducible answers.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_health_check_attempts")]
    pub health_check_attempts: u32,
    #[serde(default = "default_health_check_delay_ms")]
    pub health_check_delay_ms: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            seed: None,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            health_check_attempts: default_health_check_attempts(),
            health_check_delay_ms: default_health_check_delay_ms(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.max_retries.saturating_add(1),
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    pub fn health_check_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.health_check_attempts,
            Duration::from_millis(self.health_check_delay_ms),
        )
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "qwen2.5:7b".to_string()
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.2
}
fn default_health_check_attempts() -> u32 {
    5
}
fn default_health_check_delay_ms() -> u64 {
    2000
}
fn default_generation_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// When false, questions go to the generator without retrieved context.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default)]
    pub mode: AnswerMode,
    /// Acceptance threshold for `rag eval`.
    #[serde(default = "default_min_recall")]
    pub min_recall: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: default_top_k(),
            history_turns: default_history_turns(),
            mode: AnswerMode::default(),
            min_recall: default_min_recall(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    4
}
fn default_history_turns() -> usize {
    DEFAULT_HISTORY_TURNS
}
fn default_min_recall() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedbackConfig {
    #[serde(default = "default_feedback_path")]
    pub path: PathBuf,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            path: default_feedback_path(),
        }
    }
}

fn default_feedback_path() -> PathBuf {
    PathBuf::from("./data/feedback.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Read, parse and validate a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Check cross-field constraints that serde defaults cannot express.
pub fn validate(config: &Config) -> Result<()> {
    rag_core::chunk::validate(config.chunking.chunk_size, config.chunking.chunk_overlap)
        .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

    if config.documents.formats.is_empty() {
        bail!("documents.formats must list at least one extension");
    }

    if config.index.batch_size == 0 {
        bail!("index.batch_size must be >= 1");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.min_recall) {
        bail!("retrieval.min_recall must be in [0.0, 1.0]");
    }

    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }

    if config.generation.health_check_attempts == 0 {
        bail!("generation.health_check_attempts must be >= 1");
    }

    for (key, value) in [
        ("index.max_retries", config.index.max_retries),
        ("generation.max_retries", config.generation.max_retries),
        ("generation.health_check_attempts", config.generation.health_check_attempts),
    ] {
        if value > MAX_RETRIES_LIMIT {
            bail!("{} must be <= {}", key, MAX_RETRIES_LIMIT);
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims == Some(0) {
            bail!("embedding.dims must be > 0 when set");
        }
    }

    match config.generation.provider.as_str() {
        "ollama" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be ollama or openai.",
            other
        ),
    }

    Ok(())
}
