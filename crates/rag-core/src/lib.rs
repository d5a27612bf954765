//! # rag-core
//!
//! Shared, I/O-free logic for the retrieval-augmented question answerer:
//! data models, the overlapping chunker, the vector store abstraction and
//! its in-memory implementation, prompt construction, retry policy values,
//! and the error taxonomy.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem code. Backends
//! and persistence live in the `rag-assistant` application crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod prompt;
pub mod retry;
pub mod store;

pub use error::{RagError, Result};
