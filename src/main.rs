//! # RAG Assistant CLI (`rag`)
//!
//! ```bash
//! rag --config ./config/rag.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rag ingest` | Load, chunk, embed and store the documents directory |
//! | `rag add <file>...` | Index individual files as raw text |
//! | `rag ask "<question>"` | Answer a question with sources |
//! | `rag retrieve "<query>"` | Show the ranked chunks for a query |
//! | `rag stats` | Index size and per-source counts |
//! | `rag feedback "<question>" "<answer>"` | Record a corrected answer |
//! | `rag eval <cases.json>` | Measure retrieval recall |

use clap::{Parser, Subcommand};
use rag_assistant::rag_core::prompt::AnswerMode;
use rag_assistant::{commands, config, logging};
use std::path::PathBuf;

/// Retrieval-augmented question answering over a local document folder.
///
/// All commands read their settings from a TOML configuration file.
/// See `config/rag.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "rag", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest the configured documents directory.
    ///
    /// Sources indexed before are replaced. An empty or missing directory
    /// gets a placeholder document.
    Ingest,

    /// Index files as raw text, outside the documents directory.
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Source label to store instead of the file path (single file only).
        #[arg(long)]
        source: Option<String>,
    },

    /// Answer a question from the indexed documents.
    Ask {
        question: String,

        /// Answer mode: simple, conversational, json, markdown.
        #[arg(long)]
        mode: Option<AnswerMode>,

        /// Only retrieve from this source.
        #[arg(long)]
        source: Option<String>,

        /// Extra context placed ahead of the retrieved passages.
        #[arg(long)]
        context: Option<String>,

        /// Print the full response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Retrieve chunks without generating an answer.
    Retrieve {
        query: String,

        #[arg(long)]
        top_k: Option<usize>,

        #[arg(long)]
        source: Option<String>,
    },

    /// Show index statistics.
    Stats,

    /// Record the correct answer to a question.
    Feedback { question: String, answer: String },

    /// Evaluate retrieval recall against a JSON file of
    /// `{"query", "expected_source"}` cases.
    Eval {
        cases: PathBuf,

        #[arg(long)]
        top_k: Option<usize>,

        /// Overrides `retrieval.min_recall`.
        #[arg(long)]
        min_recall: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging)?;

    match cli.command {
        Commands::Ingest => commands::run_ingest(&cfg).await?,
        Commands::Add { files, source } => commands::run_add(&cfg, &files, source).await?,
        Commands::Ask {
            question,
            mode,
            source,
            context,
            json,
        } => commands::run_ask(&cfg, &question, mode, source, context, json).await?,
        Commands::Retrieve {
            query,
            top_k,
            source,
        } => commands::run_retrieve(&cfg, &query, top_k, source).await?,
        Commands::Stats => commands::run_stats(&cfg).await?,
        Commands::Feedback { question, answer } => {
            commands::run_feedback(&cfg, &question, &answer)?
        }
        Commands::Eval {
            cases,
            top_k,
            min_recall,
        } => commands::run_eval(&cfg, &cases, top_k, min_recall).await?,
    }

    Ok(())
}
