//! Turns retrieval results into an answer.
//!
//! The generator builds a prompt for the requested [`AnswerMode`], sends it
//! through the [`BackendAdapter`], and returns the text together with the
//! sources it was given. Backend failures never escape: the caller gets an
//! answer string either way, and the sources are always returned.

use rag_core::models::{ConversationTurn, RetrievalResult, SourceRef};
use rag_core::prompt::{
    build_prompt, AnswerMode, PromptRequest, DEFAULT_HISTORY_TURNS, FALLBACK_ANSWER,
    NO_INFORMATION_ANSWER,
};
use serde::Serialize;
use tracing::{debug, error};

use crate::backend::BackendAdapter;
use crate::config::GenerationConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub query: &'a str,
    pub results: &'a [RetrievalResult],
    pub history: &'a [ConversationTurn],
    pub mode: AnswerMode,
    /// Caller context placed ahead of the retrieved blocks.
    pub extra_context: Option<&'a str>,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(query: &'a str, results: &'a [RetrievalResult]) -> Self {
        Self {
            query,
            results,
            history: &[],
            mode: AnswerMode::default(),
            extra_context: None,
        }
    }

    pub fn history(mut self, history: &'a [ConversationTurn]) -> Self {
        self.history = history;
        self
    }

    pub fn mode(mut self, mode: AnswerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn extra_context(mut self, context: Option<&'a str>) -> Self {
        self.extra_context = context;
        self
    }
}

#[derive(Clone)]
pub struct Generator {
    adapter: BackendAdapter,
    system_prompt: String,
    max_tokens: u32,
    temperature: f32,
    history_turns: usize,
}

impl Generator {
    pub fn new(adapter: BackendAdapter, config: &GenerationConfig) -> Self {
        Self {
            adapter,
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub async fn answer(&self, req: GenerationRequest<'_>) -> Answer {
        let sources: Vec<SourceRef> = req.results.iter().map(SourceRef::from).collect();

        let prompt = build_prompt(&PromptRequest {
            question: req.query,
            results: req.results,
            history: req.history,
            extra_context: req.extra_context,
            mode: req.mode,
            system_prompt: &self.system_prompt,
            history_turns: self.history_turns,
        });
        debug!(mode = %req.mode, chars = prompt.user.chars().count(), "prompt built");

        let answer = match self
            .adapter
            .try_generate(&prompt.user, &prompt.system, self.max_tokens, self.temperature)
            .await
        {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                let message = format!("{:#}", e);
                error!(error = %message, "generation failed, answering with fallback");
                if req.results.is_empty() {
                    NO_INFORMATION_ANSWER.to_string()
                } else {
                    FALLBACK_ANSWER.to_string()
                }
            }
        };

        Answer { answer, sources }
    }
}
