//! Errors surfaced to callers of the pipeline.
//!
//! Only structural misuse and exhausted backends become errors. Ingestion
//! problems and corrupted feedback files are logged by the application and
//! never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// A component was used before its storage or backend was prepared.
    #[error("{0} used before initialization")]
    NotInitialized(&'static str),

    /// The embedding backend kept failing after the retry budget ran out.
    #[error("embedding backend failed after {attempts} attempt(s): {message}")]
    EmbeddingBackend { attempts: u32, message: String },

    /// The generation backend never answered its health check.
    #[error("generation backend unavailable after {attempts} health check(s): {message}")]
    BackendUnavailable { attempts: u32, message: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
