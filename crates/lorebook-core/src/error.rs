//! Error types for lorebook-core.
//!
//! Each subsystem defines its own `thiserror` enum; the orchestrator folds
//! them into [`EngineError`], whose variants form the taxonomy surfaced to
//! callers: input, transient resource, consistency, programmer, and
//! cancellation errors.

use thiserror::Error;

/// Errors that can occur during text chunking.
#[derive(Debug, Clone, Error)]
pub enum ChunkingError {
    /// Invalid chunking configuration (size or overlap out of range)
    #[error("Invalid chunking config: {0}")]
    InvalidConfig(String),
    /// Unknown chunking strategy id
    #[error("Unknown chunking strategy: {0}")]
    UnknownStrategy(String),
}

/// Errors that can occur during embedding operations.
#[derive(Debug, Clone, Error)]
pub enum EmbedError {
    /// Embedder not initialized or model load failed
    #[error("Embedder unavailable: {0}")]
    Unavailable(String),
    /// Inference failed for a particular input
    #[error("Embedding failed: {0}")]
    Failed(String),
    /// Produced vector has the wrong dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension advertised by the embedder
        expected: usize,
        /// Dimension actually produced
        actual: usize,
    },
    /// Initialization exceeded the configured deadline
    #[error("Embedder initialization timed out after {0} ms")]
    InitTimeout(u64),
}

/// Errors that can occur during page extraction.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// File kind has no registered extractor
    #[error("Unsupported document kind: {0}")]
    Unsupported(String),
    /// Extraction failed in a way that could not be reported as empty pages
    #[error("Extraction failed: {0}")]
    Failed(String),
}

/// Errors that can occur during retrieval.
#[derive(Debug, Clone, Error)]
pub enum RetrieveError {
    /// Query embedding failed (fatal for semantic/hybrid modes)
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbedError),
    /// Retrieval configuration out of range
    #[error("Invalid retrieval config: {0}")]
    InvalidConfig(String),
}

/// Errors that can occur during answer generation or post-processing.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// The generator or post-processor failed
    #[error("Generation failed: {0}")]
    Failed(String),
    /// The generator exceeded its deadline
    #[error("Generation timed out")]
    Timeout,
}

/// Top-level error surfaced by the engine.
///
/// Variants map one-to-one onto the error taxonomy: callers receive either
/// a complete query result or exactly one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad caller input: unsupported kind, empty content, malformed config.
    /// Never mutates persisted state.
    #[error("Invalid input: {0}")]
    Input(String),

    /// Transient resource failure (model load, store write) that persisted
    /// after one retry. Partial state may remain per the cancellation rules.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Internal inconsistency (dimension mismatch, dangling snapshot
    /// reference). The engine self-heals by rebuilding the affected index
    /// and retrying once before surfacing this.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// Unknown strategy id or violated invariant. Fails fast, never
    /// swallowed.
    #[error("Programmer error: {0}")]
    Programmer(String),

    /// Operation canceled by the caller's token. Not an error at the log
    /// level.
    #[error("Operation canceled")]
    Canceled,
}

impl EngineError {
    /// Returns true if this error is worth recording in the event log.
    pub fn is_loggable(&self) -> bool {
        !matches!(self, EngineError::Canceled)
    }
}

impl From<crate::storage::StoreError> for EngineError {
    fn from(err: crate::storage::StoreError) -> Self {
        EngineError::Resource(err.to_string())
    }
}

impl From<ChunkingError> for EngineError {
    fn from(err: ChunkingError) -> Self {
        match err {
            ChunkingError::UnknownStrategy(id) => {
                EngineError::Programmer(format!("unknown chunking strategy '{id}'"))
            }
            other => EngineError::Input(other.to_string()),
        }
    }
}

impl From<EmbedError> for EngineError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::DimensionMismatch { .. } => EngineError::Consistency(err.to_string()),
            other => EngineError::Resource(other.to_string()),
        }
    }
}

impl From<ExtractError> for EngineError {
    fn from(err: ExtractError) -> Self {
        EngineError::Input(err.to_string())
    }
}

impl From<RetrieveError> for EngineError {
    fn from(err: RetrieveError) -> Self {
        match err {
            RetrieveError::Embedding(e) => EngineError::from(e),
            RetrieveError::InvalidConfig(msg) => EngineError::Input(msg),
        }
    }
}
