//! # RAG Assistant
//!
//! A retrieval-augmented question answerer. Documents from a local
//! directory are extracted, split into overlapping chunks, embedded and
//! stored in a SQLite-backed vector index. Questions are answered by
//! retrieving the most similar chunks and handing them, with optional chat
//! history, to a chat-completion backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────┐   ┌──────────────┐
//! │ documents │──▶│   ingest     │──▶│ vector index │
//! │ txt/md/pdf│   │ extract+chunk│   │ SQLite+embed │
//! └───────────┘   └──────────────┘   └──────┬───────┘
//!                                           │ retrieve
//!                                           ▼
//!                 ┌──────────────┐   ┌──────────────┐
//!                 │   backend    │◀──│  generator   │
//!                 │ ollama/openai│   │ prompt modes │
//!                 └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag ingest                          # index ./data/documents
//! rag ask "How is load forecast?"     # answer with sources
//! rag ask "..." --mode json           # structured answer
//! rag feedback "question" "answer"    # record a correction
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Per-format text extraction |
//! | [`ingest`] | Document discovery and chunking |
//! | [`embedding`] | HTTP embedding backends |
//! | [`db`] / [`sqlite_store`] | Index persistence |
//! | [`index`] | Vector index |
//! | [`retriever`] | Filtered top-k retrieval |
//! | [`backend`] | Generation backends and retrying adapter |
//! | [`generator`] | Prompt building and answer generation |
//! | [`assistant`] | End-to-end question answering |
//! | [`feedback`] | Correction store |
//! | [`evaluate`] | Retrieval recall evaluation |
//!
//! Data types, chunking, prompt construction and the storage traits live in
//! the `rag-core` crate, re-exported here as [`rag_core`].

pub use rag_core;

pub mod assistant;
pub mod backend;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod evaluate;
pub mod extract;
pub mod feedback;
pub mod generator;
pub mod index;
pub mod ingest;
pub mod logging;
pub mod retriever;
pub mod retry;
pub mod sqlite_store;
