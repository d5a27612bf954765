//! Deterministic fakes shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rag_assistant::backend::{BackendAdapter, GenerationBackend, GenerationOptions};
use rag_assistant::config::Config;
use rag_assistant::rag_core::embedding::EmbeddingProvider;
use rag_assistant::rag_core::retry::RetryPolicy;

pub const DIMS: usize = 1024;

/// Hashes character unigrams and bigrams into a fixed-size vector.
///
/// Texts sharing characters point in similar directions, which is all the
/// ranking tests need. Setting `offline` makes every call fail.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicU32,
    pub offline: AtomicBool,
}

fn bucket(s: &str) -> usize {
    // FNV-1a
    let mut h: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    (h % DIMS as u64) as usize
}

pub fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    for c in &chars {
        v[bucket(&c.to_string())] += 1.0;
    }
    for pair in chars.windows(2) {
        v[bucket(&pair.iter().collect::<String>())] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bigram"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unreachable");
        }
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Answers every prompt with a fixed reply and keeps the prompts it saw.
pub struct EchoBackend {
    pub reply: String,
    pub prompts: Mutex<Vec<String>>,
    pub options: Mutex<Vec<GenerationOptions>>,
}

impl EchoBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn chat(&self, _system: &str, user: &str, options: &GenerationOptions) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        self.options.lock().unwrap().push(*options);
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails every chat call and every health check.
#[derive(Default)]
pub struct DownBackend {
    pub chat_calls: AtomicU32,
    pub health_calls: AtomicU32,
}

#[async_trait]
impl GenerationBackend for DownBackend {
    fn name(&self) -> &str {
        "down"
    }

    async fn chat(&self, _system: &str, _user: &str, _options: &GenerationOptions) -> anyhow::Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("connection refused")
    }

    async fn health_check(&self) -> anyhow::Result<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("connection refused")
    }
}

/// A config rooted in `root` with zero retry delays.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.documents.dir = root.join("documents");
    config.index.path = root.join("index");
    config.index.retry_delay_ms = 0;
    config.index.batch_size = 4;
    config.feedback.path = root.join("feedback.json");
    config.chunking.chunk_size = 50;
    config.chunking.chunk_overlap = 10;
    config.generation.retry_delay_ms = 0;
    config.generation.health_check_delay_ms = 0;
    config.generation.max_retries = 2;
    config.generation.health_check_attempts = 2;
    config
}

pub fn adapter(backend: Arc<dyn GenerationBackend>, attempts: u32) -> BackendAdapter {
    BackendAdapter::unchecked(backend, RetryPolicy::immediate(attempts), None)
}
