//! # Lorebook Core
//!
//! Fully client-side retrieval-augmented question answering over a
//! user-owned corpus of text and PDF documents. All content, derived
//! artifacts (chunks, term statistics, embeddings), and query computation
//! stay on the local device.
//!
//! ## Modules
//!
//! - [`engine`] - Pipeline orchestrator: ingest, query, delete, reset
//! - [`index`] - BM25 lexical index, brute-force vector search, fusion
//! - [`retrieval`] - Named retrieval strategies (lexical, semantic, hybrid)
//! - [`storage`] - Object store over the persisted schema (redb + in-memory)
//! - [`chunking`] - Sentence-aware sliding-window chunking
//! - [`text`] - Tokenization shared by index and query time
//! - [`embedding`] - Embedder contract + deterministic hashing embedder
//! - [`extract`] - Page extraction contract (txt/md built in, PDF injected)
//! - [`generation`] - Extractive composer and post-processing
//! - [`config`] - Live config, presets, versioned persistence
//! - [`events`] - Bounded per-query event log
//! - [`latency`] - Query latency ring buffer with percentiles
//! - [`registry`] - Id-keyed strategy registries
//! - [`samples`] - First-run sample corpus
//! - [`error`] - Error taxonomy

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod events;
pub mod extract;
pub mod generation;
pub mod index;
pub mod latency;
pub mod registry;
pub mod retrieval;
pub mod samples;
pub mod storage;
pub mod text;
pub mod types;

pub use engine::{EngineStats, RagEngine, SnapshotState};
pub use error::EngineError;
pub use types::{
    CancelToken, ChatMode, Citation, DocId, DocKind, IngestInput, IngestReport, QueryRequest,
    QueryResult, RetrievalMode,
};
