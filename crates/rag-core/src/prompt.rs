//! Prompt construction for grounded answers.
//!
//! Turns a question, its retrieval results, optional caller context and
//! recent conversation history into a system/user prompt pair for the
//! generation backend. Output shape depends on [`AnswerMode`]:
//!
//! | Mode | Includes history | Output instructions |
//! |------|------------------|---------------------|
//! | `simple` | no | terse answer, or [`NO_ANSWER_FOUND`] |
//! | `conversational` | yes | free-form |
//! | `json` | yes | object with `answer`, `reasoning`, `sources`, `confidence` |
//! | `markdown` | yes | `## Answer`, `## Reasoning`, `## Sources` sections |
//!
//! Retrieved chunks are rendered in retrieval order as numbered blocks so
//! the model can cite them as `[n]`:
//!
//! ```text
//! [1] source: docs/runbook.md | id: 5f0c… | relevance: 0.87
//! Restart the collector before re-running the detector.
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{ConversationTurn, RetrievalResult};

/// Number of most recent turns included in a prompt by default.
pub const DEFAULT_HISTORY_TURNS: usize = 5;

/// Context text used when retrieval produced nothing.
pub const NO_DOCUMENTS_FOUND: &str = "No relevant documents found.";

/// Reply the `simple` mode asks for when the context lacks the answer.
pub const NO_ANSWER_FOUND: &str = "No answer was found in the given context.";

/// Answer returned when nothing was retrieved and generation failed too.
pub const NO_INFORMATION_ANSWER: &str =
    "I could not find any relevant information in the knowledge base to answer this question.";

/// Answer returned when every generation attempt failed.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I was unable to generate an answer right now. Please try again later.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable operations assistant. \
Answer using the provided context, cite the blocks you rely on as [n], \
and say so plainly when the context is insufficient.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuredFormat {
    Json,
    Markdown,
}

/// Requested answer shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AnswerMode {
    Simple,
    #[default]
    Conversational,
    Structured(StructuredFormat),
}

impl FromStr for AnswerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "conversational" | "chat" => Ok(Self::Conversational),
            "json" | "structured" | "structured-json" => {
                Ok(Self::Structured(StructuredFormat::Json))
            }
            "markdown" | "structured-markdown" => Ok(Self::Structured(StructuredFormat::Markdown)),
            other => Err(format!(
                "unknown answer mode '{}'. Use simple, conversational, json, or markdown.",
                other
            )),
        }
    }
}

impl TryFrom<String> for AnswerMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AnswerMode> for String {
    fn from(mode: AnswerMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "simple",
            Self::Conversational => "conversational",
            Self::Structured(StructuredFormat::Json) => "json",
            Self::Structured(StructuredFormat::Markdown) => "markdown",
        };
        f.write_str(name)
    }
}

/// Inputs for [`build_prompt`].
#[derive(Debug, Clone)]
pub struct PromptRequest<'a> {
    pub question: &'a str,
    pub results: &'a [RetrievalResult],
    pub history: &'a [ConversationTurn],
    /// Caller-supplied context; retrieved blocks are appended after it.
    pub extra_context: Option<&'a str>,
    pub mode: AnswerMode,
    pub system_prompt: &'a str,
    pub history_turns: usize,
}

/// A ready-to-send prompt pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Render retrieval results as numbered context blocks.
pub fn format_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return NO_DOCUMENTS_FOUND.to_string();
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] source: {} | id: {} | relevance: {:.2}\n{}",
                i + 1,
                r.source,
                r.chunk.id,
                r.score,
                r.chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render the last `max_turns` turns, oldest first.
pub fn format_history(history: &[ConversationTurn], max_turns: usize) -> String {
    let skip = history.len().saturating_sub(max_turns);
    history[skip..]
        .iter()
        .map(|t| format!("User: {}\nAssistant: {}", t.user, t.assistant))
        .collect::<Vec<_>>()
        .join("\n")
}

fn context_section(req: &PromptRequest<'_>) -> String {
    let retrieved = format_context(req.results);
    match req.extra_context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(extra) => format!("{}\n\n{}", extra, retrieved),
        None => retrieved,
    }
}

fn history_section(req: &PromptRequest<'_>) -> String {
    let history = format_history(req.history, req.history_turns);
    if history.is_empty() {
        String::new()
    } else {
        format!("Conversation so far:\n{}\n\n", history)
    }
}

const JSON_INSTRUCTIONS: &str = "Respond with a single JSON object and nothing else. \
It must have exactly these fields:\n\
- \"answer\": string, the answer to the question\n\
- \"reasoning\": string, how the context supports the answer\n\
- \"sources\": array of strings, the source labels you used\n\
- \"confidence\": number between 0 and 1\n\
Do not wrap the object in code fences.";

const MARKDOWN_INSTRUCTIONS: &str = "Format the response as Markdown with exactly these sections:\n\
## Answer\n\
## Reasoning\n\
## Sources";

/// Build the system and user prompts for one generation call.
pub fn build_prompt(req: &PromptRequest<'_>) -> Prompt {
    let context = context_section(req);

    let user = match req.mode {
        AnswerMode::Simple => format!(
            "Answer the question using only the context below. Keep the answer short.\n\
             If the context does not contain the answer, reply exactly: \"{}\"\n\n\
             Context:\n{}\n\nQuestion: {}\nAnswer:",
            NO_ANSWER_FOUND, context, req.question
        ),
        AnswerMode::Conversational => format!(
            "{}Context:\n{}\n\nQuestion: {}",
            history_section(req),
            context,
            req.question
        ),
        AnswerMode::Structured(format) => {
            let instructions = match format {
                StructuredFormat::Json => JSON_INSTRUCTIONS,
                StructuredFormat::Markdown => MARKDOWN_INSTRUCTIONS,
            };
            format!(
                "{}Context:\n{}\n\nQuestion: {}\n\n{}",
                history_section(req),
                context,
                req.question,
                instructions
            )
        }
    };

    Prompt {
        system: req.system_prompt.to_string(),
        user,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Metadata};

    fn result(id: &str, source: &str, text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id: id.to_string(),
                document_id: "doc".to_string(),
                chunk_index: 0,
                text: text.to_string(),
                hash: String::new(),
                metadata: Metadata::new(),
            },
            score,
            source: source.to_string(),
        }
    }

    fn request<'a>(
        results: &'a [RetrievalResult],
        history: &'a [ConversationTurn],
        mode: AnswerMode,
    ) -> PromptRequest<'a> {
        PromptRequest {
            question: "How is load forecast?",
            results,
            history,
            extra_context: None,
            mode,
            system_prompt: DEFAULT_SYSTEM_PROMPT,
            history_turns: DEFAULT_HISTORY_TURNS,
        }
    }

    #[test]
    fn test_context_blocks_in_retrieval_order() {
        let results = vec![
            result("c1", "docs/a.md", "Alpha text.", 0.876),
            result("c2", "docs/b.md", "Beta text.", 0.5),
        ];
        let ctx = format_context(&results);
        assert_eq!(
            ctx,
            "[1] source: docs/a.md | id: c1 | relevance: 0.88\nAlpha text.\n\n\
             [2] source: docs/b.md | id: c2 | relevance: 0.50\nBeta text."
        );
    }

    #[test]
    fn test_empty_context_says_so() {
        assert_eq!(format_context(&[]), NO_DOCUMENTS_FOUND);
        let prompt = build_prompt(&request(&[], &[], AnswerMode::Conversational));
        assert!(prompt.user.contains(NO_DOCUMENTS_FOUND));
    }

    #[test]
    fn test_history_window_keeps_latest_oldest_first() {
        let history: Vec<ConversationTurn> = (1..=7)
            .map(|i| ConversationTurn::new(format!("q{}", i), format!("a{}", i)))
            .collect();
        let rendered = format_history(&history, 5);
        assert!(!rendered.contains("q2"));
        assert!(rendered.starts_with("User: q3\nAssistant: a3"));
        assert!(rendered.ends_with("User: q7\nAssistant: a7"));
        assert_eq!(rendered.lines().count(), 10);
    }

    #[test]
    fn test_simple_mode_is_terse_and_ignores_history() {
        let history = vec![ConversationTurn::new("earlier", "reply")];
        let prompt = build_prompt(&request(&[], &history, AnswerMode::Simple));
        assert!(prompt.user.contains(NO_ANSWER_FOUND));
        assert!(!prompt.user.contains("earlier"));
        assert!(prompt.user.ends_with("Answer:"));
    }

    #[test]
    fn test_conversational_includes_history_and_context() {
        let results = vec![result("c1", "a.md", "Forecasts use ARIMA.", 0.9)];
        let history = vec![ConversationTurn::new("hi", "hello")];
        let prompt = build_prompt(&request(&results, &history, AnswerMode::Conversational));
        assert_eq!(prompt.system, DEFAULT_SYSTEM_PROMPT);
        assert!(prompt.user.starts_with("Conversation so far:\nUser: hi\nAssistant: hello"));
        assert!(prompt.user.contains("Forecasts use ARIMA."));
        assert!(prompt.user.ends_with("Question: How is load forecast?"));
    }

    #[test]
    fn test_structured_modes_append_schema() {
        let json = build_prompt(&request(&[], &[], AnswerMode::Structured(StructuredFormat::Json)));
        for field in ["\"answer\"", "\"reasoning\"", "\"sources\"", "\"confidence\""] {
            assert!(json.user.contains(field), "missing {}", field);
        }

        let md = build_prompt(&request(
            &[],
            &[],
            AnswerMode::Structured(StructuredFormat::Markdown),
        ));
        for section in ["## Answer", "## Reasoning", "## Sources"] {
            assert!(md.user.contains(section), "missing {}", section);
        }
    }

    #[test]
    fn test_extra_context_precedes_retrieved_blocks() {
        let results = vec![result("c1", "a.md", "Retrieved.", 0.7)];
        let mut req = request(&results, &[], AnswerMode::Conversational);
        req.extra_context = Some("Caller note.");
        let prompt = build_prompt(&req);
        let caller = prompt.user.find("Caller note.").unwrap();
        let retrieved = prompt.user.find("Retrieved.").unwrap();
        assert!(caller < retrieved);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("simple".parse::<AnswerMode>().unwrap(), AnswerMode::Simple);
        assert_eq!(
            "Markdown".parse::<AnswerMode>().unwrap(),
            AnswerMode::Structured(StructuredFormat::Markdown)
        );
        assert_eq!(
            "structured".parse::<AnswerMode>().unwrap(),
            AnswerMode::Structured(StructuredFormat::Json)
        );
        assert!("verbose".parse::<AnswerMode>().is_err());
        assert_eq!(AnswerMode::default().to_string(), "conversational");
    }
}
