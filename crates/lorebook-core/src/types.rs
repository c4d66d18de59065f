//! Core record types shared across the engine.
//!
//! Identifiers are opaque strings: a document id embeds its upload
//! timestamp (re-ingesting the same bytes yields a new identity by
//! design), and a chunk id is derived from its document id plus a global
//! per-ingest ordinal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns the current Unix timestamp in milliseconds.
///
/// Uses `instant::SystemTime` for cross-platform timing. If the system
/// clock is before UNIX_EPOCH (extremely unlikely), returns 0 instead of
/// panicking.
pub fn current_timestamp_ms() -> u64 {
    instant::SystemTime::now()
        .duration_since(instant::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Unique document identifier, stable across the document's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Generates a fresh document id.
    ///
    /// The id embeds the upload timestamp and an atomic sequence number,
    /// so two ingests of byte-identical content always produce distinct
    /// documents.
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let seq = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("doc-{}-{}", current_timestamp_ms(), seq))
    }

    /// Wraps an existing raw id (deserialization, tests).
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique chunk identifier: `"{doc_id}-chunk-{ordinal}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Derives the chunk id for `ordinal` within `doc_id`.
    pub fn new(doc_id: &DocId, ordinal: usize) -> Self {
        Self(format!("{}-chunk-{}", doc_id.as_str(), ordinal))
    }

    /// Wraps an existing raw id (deserialization, tests).
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Supported document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocKind {
    /// Binary PDF; raw bytes are kept as a blob for preview.
    Pdf,
    /// UTF-8 plain text.
    Txt,
    /// UTF-8 markdown.
    Md,
}

impl DocKind {
    /// Detects the kind from a filename extension.
    ///
    /// Returns `None` for unsupported extensions.
    pub fn from_name(name: &str) -> Option<Self> {
        let ext = name.rsplit('.').next()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocKind::Pdf),
            "txt" | "text" | "log" => Some(DocKind::Txt),
            "md" | "markdown" => Some(DocKind::Md),
            _ => None,
        }
    }

    /// Whether the raw bytes should be retained as a blob.
    pub fn keeps_blob(&self) -> bool {
        matches!(self, DocKind::Pdf)
    }

    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocKind::Pdf => "pdf",
            DocKind::Txt => "txt",
            DocKind::Md => "md",
        }
    }
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion status flags for a document.
///
/// Flags are monotonic with respect to ingestion progress: once set, a
/// flag is only cleared by deleting the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocStatus {
    /// Page extraction completed
    pub parsed: bool,
    /// All chunk vectors persisted
    pub indexed_vector: bool,
    /// Lexical snapshot includes this document's chunks
    pub indexed_lexical: bool,
    /// Last ingestion error, if the document is in the error state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A persisted document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocRecord {
    /// Unique document identifier
    pub id: DocId,
    /// Human-readable name (usually the original filename)
    pub name: String,
    /// Document kind
    pub kind: DocKind,
    /// Original size in bytes
    pub byte_size: usize,
    /// Upload timestamp (Unix ms)
    pub uploaded_at: u64,
    /// Ingestion status flags
    pub status: DocStatus,
}

/// A single extracted page, transient between extraction and chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 1-based page number, strictly increasing within a document
    pub page_number: u32,
    /// Extracted text for this page
    pub text: String,
}

/// A persisted chunk: an addressable substring of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique chunk identifier (`"{doc_id}-chunk-{ordinal}"`)
    pub id: ChunkId,
    /// Owning document
    pub doc_id: DocId,
    /// Page this chunk was cut from (1-based)
    pub page_number: u32,
    /// Trimmed chunk text, always non-empty
    pub text: String,
    /// Start offset into the producing page's text (inclusive, in chars)
    pub start_offset: usize,
    /// End offset into the producing page's text (exclusive, in chars)
    pub end_offset: usize,
    /// Approximate token count: ceil(|text| / 4)
    pub token_estimate: usize,
}

/// A citation derived from a retrieved chunk joined to its document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Cited chunk
    pub chunk_id: ChunkId,
    /// Owning document
    pub doc_id: DocId,
    /// Document name at citation time
    pub doc_name: String,
    /// Page the passage appears on
    pub page_number: u32,
    /// The cited passage text
    pub text: String,
    /// Retrieval score, if the citation came from a ranked result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

/// A user-owned note with embedded citations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    /// Unique note identifier
    pub id: String,
    /// Note title
    pub title: String,
    /// Note body
    pub body: String,
    /// Citations captured when the note was created
    pub citations: Vec<Citation>,
    /// Creation timestamp (Unix ms)
    pub created_at: u64,
}

/// Retrieval mode selecting the ranking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// BM25 over the lexical snapshot
    Lexical,
    /// Cosine similarity over stored vectors
    Semantic,
    /// Both rankers, min-max normalized and convex-combined
    Hybrid,
}

impl RetrievalMode {
    /// The retriever id this mode resolves to.
    pub fn strategy_id(&self) -> &'static str {
        match self {
            RetrievalMode::Lexical => "lexical",
            RetrievalMode::Semantic => "semantic",
            RetrievalMode::Hybrid => "hybrid",
        }
    }

    /// Parses a mode name. `"bm25"` is accepted as a legacy alias for
    /// `"lexical"` and normalized here, at the edge.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "lexical" | "bm25" => Some(RetrievalMode::Lexical),
            "semantic" => Some(RetrievalMode::Semantic),
            "hybrid" => Some(RetrievalMode::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.strategy_id())
    }
}

/// Whether a query only retrieves or also generates an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Retrieval only
    #[default]
    Search,
    /// Retrieval plus generated answer over the top chunks
    Chat,
}

/// A query request.
///
/// Unset fields fall back to the engine's current configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    /// Query text
    pub text: String,
    /// Retrieval mode override
    #[serde(default)]
    pub mode: Option<RetrievalMode>,
    /// Result count override (clamped to 1..=30)
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Semantic weight override for hybrid mode (clamped to 0..=1)
    #[serde(default)]
    pub alpha: Option<f32>,
    /// Search vs chat behavior
    #[serde(default)]
    pub chat_mode: ChatMode,
    /// Post-processing override: `Some(false)` disables configured
    /// post-processors, `Some(true)` enables `polish` even if unconfigured
    #[serde(default)]
    pub polish: Option<bool>,
}

impl QueryRequest {
    /// Convenience constructor for a plain search query.
    pub fn search(text: impl Into<String>, mode: RetrievalMode) -> Self {
        Self {
            text: text.into(),
            mode: Some(mode),
            ..Default::default()
        }
    }
}

/// Per-stage latency breakdown for one query, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    /// Retrieval stage duration
    pub retrieval_ms: u64,
    /// Generation stage duration, when a chat answer was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_ms: Option<u64>,
    /// Post-processing duration, when post-processors ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polish_ms: Option<u64>,
    /// Total wall-clock duration
    pub total_ms: u64,
}

/// The result of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Retrieved chunks in rank order
    pub chunks: Vec<ChunkRecord>,
    /// Citations, one per retrieved chunk, preserving rank
    pub citations: Vec<Citation>,
    /// Final scores aligned with `chunks`
    pub scores: Vec<f32>,
    /// Per-stage latency
    pub latency: LatencyBreakdown,
    /// Generated answer for chat-mode queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_answer: Option<String>,
}

/// Input tuple for ingestion.
#[derive(Debug, Clone)]
pub struct IngestInput {
    /// Display name, usually the original filename
    pub name: String,
    /// Document kind
    pub kind: DocKind,
    /// Raw bytes (UTF-8 for txt/md, binary for pdf)
    pub bytes: Vec<u8>,
}

/// Report returned by a successful ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Identifier of the ingested document
    pub doc_id: DocId,
    /// Number of pages extracted
    pub pages: usize,
    /// Number of chunks persisted
    pub chunks: usize,
    /// Wall-clock duration in milliseconds
    pub elapsed_ms: u64,
}

/// Progress emitted during ingestion. The final event always carries
/// `fraction == 1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestProgress {
    /// Human-readable stage name
    pub stage: &'static str,
    /// Completion fraction in [0, 1]
    pub fraction: f32,
}

/// Cooperative cancellation token observed at ingest suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancelToken {
    /// Creates a token in the not-canceled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns true once `cancel` has been called.
    pub fn is_canceled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
