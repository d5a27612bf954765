//! Generation backends and the retrying adapter in front of them.
//!
//! A [`GenerationBackend`] is one chat-completion service. Two HTTP
//! implementations ship here:
//!
//! | Provider | Chat | Health probe |
//! |----------|------|--------------|
//! | `ollama` | `POST {url}/api/chat` | `GET {url}/api/tags` |
//! | `openai` | `POST {url}/v1/chat/completions` | `GET {url}/v1/models` |
//!
//! [`BackendAdapter`] wraps a backend with two retry policies. Connecting
//! probes health until it succeeds or fails with
//! [`RagError::BackendUnavailable`]. Each generation call is retried on
//! transient failures, and if it still fails the adapter answers with
//! [`FALLBACK_ANSWER`] instead of an error. A permanent HTTP status such as
//! 401 or 404 is not retried.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rag_core::prompt::FALLBACK_ANSWER;
use rag_core::retry::RetryPolicy;
use rag_core::RagError;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::GenerationConfig;
use crate::retry::{error_for_status, is_transient, retry_async_when};

pub const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";
pub const OPENAI_DEFAULT_URL: &str = "https://api.openai.com";

/// Sampling knobs passed through to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Fixed seed for reproducible sampling, when the backend supports it.
    pub seed: Option<u64>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.2,
            seed: None,
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    /// One chat completion. No retries.
    async fn chat(&self, system: &str, user: &str, options: &GenerationOptions) -> Result<String>;

    async fn health_check(&self) -> Result<()>;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

// ============ Ollama ============

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

fn messages(system: &str, user: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system.to_string(),
        },
        ChatMessage {
            role: "user".to_string(),
            content: user.to_string(),
        },
    ]
}

#[async_trait]
impl GenerationBackend for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, system: &str, user: &str, options: &GenerationOptions) -> Result<String> {
        let mut sampling = serde_json::json!({
            "temperature": options.temperature,
            "num_predict": options.max_tokens,
        });
        if let Some(seed) = options.seed {
            sampling["seed"] = serde_json::json!(seed);
        }
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages(system, user),
            "stream": false,
            "options": sampling,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;
        let parsed: OllamaChatResponse = error_for_status(response, "Ollama")
            .await?
            .json()
            .await
            .context("Invalid Ollama chat response")?;
        Ok(parsed.message.content)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.url))
            .send()
            .await
            .with_context(|| format!("Ollama not reachable at {}", self.url))?;
        error_for_status(response, "Ollama").await?;
        Ok(())
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiChat {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChat {
    /// `api_key` may be `None` for local OpenAI-compatible servers.
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            url: url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[async_trait]
impl GenerationBackend for OpenAiChat {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, system: &str, user: &str, options: &GenerationOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages(system, user),
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
        });
        if let Some(seed) = options.seed {
            body["seed"] = serde_json::json!(seed);
        }

        let response = self
            .request(self.client.post(format!("{}/v1/chat/completions", self.url)))
            .json(&body)
            .send()
            .await
            .context("OpenAI chat request failed")?;
        let parsed: OpenAiChatResponse = error_for_status(response, "OpenAI")
            .await?
            .json()
            .await
            .context("Invalid OpenAI chat response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("OpenAI response contained no choices"))
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .request(self.client.get(format!("{}/v1/models", self.url)))
            .send()
            .await
            .context("OpenAI endpoint not reachable")?;
        error_for_status(response, "OpenAI").await?;
        Ok(())
    }
}

/// Build the backend named by `generation.provider`.
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(
            config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_URL),
            &config.model,
            config.timeout_secs,
        )?)),
        "openai" => {
            let url = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_URL);
            let api_key = std::env::var("OPENAI_API_KEY").ok();
            if api_key.is_none() && url == OPENAI_DEFAULT_URL {
                bail!("OPENAI_API_KEY environment variable not set");
            }
            Ok(Arc::new(OpenAiChat::new(
                url,
                &config.model,
                api_key,
                config.timeout_secs,
            )?))
        }
        other => bail!("Unknown generation provider: {}", other),
    }
}

/// A health-checked backend with bounded retries per call.
#[derive(Clone)]
pub struct BackendAdapter {
    backend: Arc<dyn GenerationBackend>,
    retry: RetryPolicy,
    seed: Option<u64>,
}

impl BackendAdapter {
    /// Probe `backend` under `health` before handing out an adapter.
    pub async fn connect(
        backend: Arc<dyn GenerationBackend>,
        health: RetryPolicy,
        retry: RetryPolicy,
        seed: Option<u64>,
    ) -> rag_core::Result<Self> {
        let probe = &backend;
        retry_async_when(health, "health_check", is_transient, || async move {
            probe.health_check().await
        })
        .await
        .map_err(|(e, attempts)| RagError::BackendUnavailable {
            attempts,
            message: format!("{:#}", e),
        })?;

        info!(backend = backend.name(), "generation backend ready");
        Ok(Self::unchecked(backend, retry, seed))
    }

    /// Skip the health probe.
    pub fn unchecked(backend: Arc<dyn GenerationBackend>, retry: RetryPolicy, seed: Option<u64>) -> Self {
        Self {
            backend,
            retry,
            seed,
        }
    }

    pub fn from_config(backend: Arc<dyn GenerationBackend>, config: &GenerationConfig) -> Self {
        Self::unchecked(backend, config.retry_policy(), config.seed)
    }

    /// Generate with retries, returning the last error on exhaustion.
    pub async fn try_generate(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String> {
        let options = GenerationOptions {
            max_tokens,
            temperature,
            seed: self.seed,
        };
        let backend = &self.backend;
        let options = &options;
        retry_async_when(self.retry, "generate", is_transient, || async move {
            backend.chat(system_prompt, prompt, options).await
        })
        .await
        .map_err(|(e, attempts)| e.context(format!("generation failed after {} attempt(s)", attempts)))
    }

    /// Generate with retries; never fails, answering [`FALLBACK_ANSWER`] instead.
    pub async fn generate_response(
        &self,
        prompt: &str,
        system_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> String {
        match self
            .try_generate(prompt, system_prompt, max_tokens, temperature)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                let message = format!("{:#}", e);
                error!(backend = self.backend.name(), error = %message, "generation failed");
                FALLBACK_ANSWER.to_string()
            }
        }
    }
}
