//! Pipeline orchestrator.
//!
//! [`RagEngine`] owns the object store, the strategy registries, the
//! event log, and the latency tracker, and drives the two pipelines:
//!
//! - **Ingest**: extract pages, persist the doc (and blob for PDF), chunk,
//!   persist chunks, embed and persist vectors, then rebuild the lexical
//!   snapshot over the whole corpus. A cancellation token is observed at
//!   every suspension point; partial writes stay in place on cancel and a
//!   re-ingest starts fresh under a new document id.
//! - **Query**: resolve the retriever from the request mode, capture the
//!   chunk set and snapshot, retrieve, join citations, optionally generate
//!   a chat answer, run best-effort post-processing, and record latency
//!   and events. Stages run in strict order; a consistency failure
//!   triggers one snapshot rebuild and a single retry.

use crate::chunking::{ChunkerStrategy, SentenceWindowChunker};
use crate::config::{RagConfig, CONFIG_METADATA_KEY, MAX_TOP_K, MIN_TOP_K};
use crate::embedding::{Embedder, EmbedderInit, HashEmbedder};
use crate::error::EngineError;
use crate::events::{EventKind, EventLog};
use crate::extract::{CompositeExtractor, PageExtractor};
use crate::generation::{ExtractiveComposer, Generator, PolishProcessor, PostProcessor};
use crate::index::lexical::LexicalSnapshot;
use crate::latency::{LatencySummary, LatencyTracker};
use crate::registry::Registry;
use crate::retrieval::{
    HybridRetriever, LexicalRetriever, RetrievalConfig, RetrievalContext, Retriever,
    SemanticRetriever,
};
use crate::samples::{sample_inputs, SAMPLE_SEEDED_KEY};
use crate::storage::ObjectStore;
use crate::types::{
    current_timestamp_ms, CancelToken, ChatMode, ChunkRecord, Citation, DocId, DocRecord,
    DocStatus, IngestInput, IngestProgress, IngestReport, LatencyBreakdown, NoteRecord,
    PageText, QueryRequest, QueryResult,
};
use instant::Instant;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Metadata flag raised when stored vectors no longer match the embedder.
pub const NEEDS_REEMBED_KEY: &str = "needs_reembed";

/// Back-off before the single retry of a transient failure.
const RETRY_BACKOFF_MS: u64 = 150;

/// How many top chunks feed chat-mode generation.
const GENERATION_CHUNKS: usize = 5;

/// Retries a transient operation exactly once after a short back-off.
macro_rules! retry_once {
    ($expr:expr) => {{
        match $expr.await {
            Ok(value) => Ok(value),
            Err(first) => {
                tracing::warn!(error = %first, "Transient failure, retrying once");
                std::thread::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS));
                $expr.await
            }
        }
    }};
}

fn check_cancel(cancel: &CancelToken) -> Result<(), EngineError> {
    if cancel.is_canceled() {
        Err(EngineError::Canceled)
    } else {
        Ok(())
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Lifecycle of the persisted lexical snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotState {
    /// No snapshot persisted; the first query rebuilds lazily
    Absent,
    /// Chunk set mutated since the snapshot was written
    Stale,
    /// Snapshot matches the persisted chunk set
    Fresh,
}

/// Corpus and diagnostics summary.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Persisted documents
    pub docs: usize,
    /// Persisted chunks
    pub chunks: usize,
    /// Persisted vectors
    pub vectors: usize,
    /// Saved notes
    pub notes: usize,
    /// Lexical snapshot lifecycle state
    pub snapshot_state: SnapshotState,
    /// Query latency summary
    pub latency: LatencySummary,
}

/// The retrieval-augmented QA engine.
///
/// Owns all mutable state; callers thread a single engine value through
/// operations. At most one ingest and one query are in flight at a time,
/// enforced by `&mut self`.
pub struct RagEngine<S: ObjectStore> {
    store: S,
    embedder: Arc<dyn Embedder>,
    extractor: Arc<dyn PageExtractor>,
    config: RagConfig,
    chunkers: Registry<dyn ChunkerStrategy>,
    embedders: Registry<dyn Embedder>,
    retrievers: Registry<dyn Retriever>,
    generators: Registry<dyn Generator>,
    post_processors: Registry<dyn PostProcessor>,
    events: EventLog,
    latency: LatencyTracker,
    snapshot_cache: Option<Arc<LexicalSnapshot>>,
    snapshot_state: SnapshotState,
    next_query_id: u64,
}

impl<S: ObjectStore> RagEngine<S> {
    /// Creates an engine over `store` with the given embedder and page
    /// extractor, registering all built-in strategies and loading any
    /// persisted configuration (discarded on version mismatch).
    pub async fn new(
        store: S,
        embedder: Arc<dyn Embedder>,
        extractor: Arc<dyn PageExtractor>,
    ) -> Result<Self, EngineError> {
        let mut chunkers: Registry<dyn ChunkerStrategy> = Registry::new();
        chunkers.register("sentence-window", Arc::new(SentenceWindowChunker));

        let mut retrievers: Registry<dyn Retriever> = Registry::new();
        retrievers.register("lexical", Arc::new(LexicalRetriever));
        retrievers.register("semantic", Arc::new(SemanticRetriever));
        retrievers.register("hybrid", Arc::new(HybridRetriever));

        let mut generators: Registry<dyn Generator> = Registry::new();
        generators.register("simple-extractive", Arc::new(ExtractiveComposer));

        let mut post_processors: Registry<dyn PostProcessor> = Registry::new();
        post_processors.register("polish", Arc::new(PolishProcessor));

        let mut embedders: Registry<dyn Embedder> = Registry::new();
        embedders.register(embedder.id().to_string(), embedder.clone());

        let mut config = match store.get_metadata(CONFIG_METADATA_KEY).await? {
            Some(bytes) => RagConfig::from_persisted_bytes(&bytes).unwrap_or_default(),
            None => RagConfig::default(),
        };
        // The live embedder is the source of truth for the embedding id.
        config.embedding = embedder.id().to_string();

        let snapshot_state = if store.get_lexical_snapshot().await?.is_some() {
            SnapshotState::Fresh
        } else {
            SnapshotState::Absent
        };

        let engine = Self {
            store,
            embedder,
            extractor,
            config,
            chunkers,
            embedders,
            retrievers,
            generators,
            post_processors,
            events: EventLog::new(),
            latency: LatencyTracker::new(),
            snapshot_cache: None,
            snapshot_state,
            next_query_id: 0,
        };
        engine.validate_config(&engine.config)?;
        Ok(engine)
    }

    /// Creates an engine with the built-in hashing embedder and the
    /// composite extractor (no PDF provider).
    pub async fn with_defaults(store: S) -> Result<Self, EngineError> {
        Self::new(
            store,
            Arc::new(HashEmbedder::default_instance()),
            Arc::new(CompositeExtractor::new()),
        )
        .await
    }

    // =========================================================================
    // Accessors and extension points
    // =========================================================================

    /// The underlying object store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the engine, returning the store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// The live configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The event log (subscribe for per-query diagnostics).
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Query latency summary.
    pub fn latency_summary(&self) -> LatencySummary {
        self.latency.summary()
    }

    /// Lexical snapshot lifecycle state.
    pub fn snapshot_state(&self) -> SnapshotState {
        self.snapshot_state
    }

    /// Registers an additional retriever (idempotent under its id).
    pub fn register_retriever(&mut self, retriever: Arc<dyn Retriever>) {
        self.retrievers.register(retriever.id(), retriever);
    }

    /// Registers an additional generator (idempotent under its id).
    pub fn register_generator(&mut self, generator: Arc<dyn Generator>) {
        self.generators.register(generator.id(), generator);
    }

    /// Registers an additional post-processor (idempotent under its id).
    pub fn register_post_processor(&mut self, processor: Arc<dyn PostProcessor>) {
        self.post_processors.register(processor.id(), processor);
    }

    /// Registers an additional chunker (idempotent under its id).
    pub fn register_chunker(&mut self, chunker: Arc<dyn ChunkerStrategy>) {
        self.chunkers.register(chunker.id(), chunker);
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Checks that every strategy id the config references is registered
    /// and that all parameters are within range.
    pub fn validate_config(&self, config: &RagConfig) -> Result<(), EngineError> {
        config.validate_ranges().map_err(EngineError::Input)?;

        let missing = |kind: &str, id: &str| {
            EngineError::Programmer(format!("unknown {kind} strategy '{id}'"))
        };
        if !self.chunkers.contains(&config.chunking.strategy) {
            return Err(missing("chunking", &config.chunking.strategy));
        }
        if !self.embedders.contains(&config.embedding) {
            return Err(missing("embedding", &config.embedding));
        }
        if !self.retrievers.contains(&config.retrieval.strategy) {
            return Err(missing("retrieval", &config.retrieval.strategy));
        }
        if !self.generators.contains(&config.generation.strategy) {
            return Err(missing("generation", &config.generation.strategy));
        }
        for id in &config.post_process {
            if !self.post_processors.contains(id) {
                return Err(missing("post-process", id));
            }
        }
        Ok(())
    }

    /// Replaces the live configuration after validation and persists it.
    pub async fn set_config(&mut self, config: RagConfig) -> Result<(), EngineError> {
        self.validate_config(&config)?;
        self.config = config;
        self.persist_config().await
    }

    /// Applies a named preset, keeping the live embedder selection.
    pub async fn apply_preset(&mut self, preset: crate::config::Preset) -> Result<(), EngineError> {
        let mut config = RagConfig::preset(preset);
        config.embedding = self.embedder.id().to_string();
        self.set_config(config).await
    }

    /// Exports the live configuration as JSON.
    pub fn export_config(&self) -> String {
        self.config.export_json()
    }

    /// Imports a previously exported configuration.
    pub async fn import_config(&mut self, json: &str) -> Result<(), EngineError> {
        let mut config = RagConfig::import_json(json).map_err(EngineError::Input)?;
        config.embedding = self.embedder.id().to_string();
        self.set_config(config).await
    }

    async fn persist_config(&self) -> Result<(), EngineError> {
        self.store
            .put_metadata(CONFIG_METADATA_KEY, &self.config.to_persisted_bytes())
            .await?;
        Ok(())
    }

    // =========================================================================
    // Ingest
    // =========================================================================

    /// Ingests one document end-to-end.
    ///
    /// On failure after the document row is persisted, the document is
    /// marked with an error status; recovery is delete-and-reingest. On
    /// cancellation, committed partial writes remain and the operation
    /// returns [`EngineError::Canceled`].
    #[instrument(skip_all, fields(name = %input.name, kind = %input.kind))]
    pub async fn ingest<F>(
        &mut self,
        input: IngestInput,
        cancel: &CancelToken,
        mut on_progress: F,
    ) -> Result<IngestReport, EngineError>
    where
        F: FnMut(IngestProgress),
    {
        if input.bytes.is_empty() {
            return Err(EngineError::Input(format!("'{}' has no content", input.name)));
        }

        let start = Instant::now();
        check_cancel(cancel)?;
        let pages = self.extractor.extract(&input.bytes, input.kind).await?;
        on_progress(IngestProgress {
            stage: "extract",
            fraction: 0.1,
        });

        let mut doc = DocRecord {
            id: DocId::generate(),
            name: input.name.clone(),
            kind: input.kind,
            byte_size: input.bytes.len(),
            uploaded_at: current_timestamp_ms(),
            status: DocStatus {
                parsed: true,
                ..Default::default()
            },
        };
        check_cancel(cancel)?;
        retry_once!(self.store.put_doc(&doc))?;

        match self
            .ingest_pipeline(&mut doc, &input, &pages, cancel, &mut on_progress)
            .await
        {
            Ok(chunk_count) => {
                on_progress(IngestProgress {
                    stage: "complete",
                    fraction: 1.0,
                });
                let elapsed = elapsed_ms(start);
                info!(
                    doc = %doc.id,
                    pages = pages.len(),
                    chunks = chunk_count,
                    elapsed_ms = elapsed,
                    "Ingest complete"
                );
                Ok(IngestReport {
                    doc_id: doc.id,
                    pages: pages.len(),
                    chunks: chunk_count,
                    elapsed_ms: elapsed,
                })
            }
            Err(err) => {
                if err.is_loggable() {
                    doc.status.error = Some(err.to_string());
                    let _ = self.store.put_doc(&doc).await;
                }
                Err(err)
            }
        }
    }

    async fn ingest_pipeline<F>(
        &mut self,
        doc: &mut DocRecord,
        input: &IngestInput,
        pages: &[PageText],
        cancel: &CancelToken,
        on_progress: &mut F,
    ) -> Result<usize, EngineError>
    where
        F: FnMut(IngestProgress),
    {
        if input.kind.keeps_blob() {
            check_cancel(cancel)?;
            retry_once!(self.store.put_blob(&doc.id, &input.bytes))?;
        }

        let chunker = self
            .chunkers
            .get(&self.config.chunking.strategy)
            .ok_or_else(|| {
                EngineError::Programmer(format!(
                    "unknown chunking strategy '{}'",
                    self.config.chunking.strategy
                ))
            })?;
        let chunks = chunker.chunk(&doc.id, pages, &self.config.chunking.params())?;
        on_progress(IngestProgress {
            stage: "chunk",
            fraction: 0.3,
        });

        for chunk in &chunks {
            check_cancel(cancel)?;
            retry_once!(self.store.put_chunk(chunk))?;
        }

        self.embed_missing(&chunks, cancel).await?;
        doc.status.indexed_vector = true;
        retry_once!(self.store.put_doc(doc))?;
        on_progress(IngestProgress {
            stage: "embed",
            fraction: 0.8,
        });

        check_cancel(cancel)?;
        self.rebuild_lexical_snapshot().await?;
        self.mark_all_docs_lexical().await?;
        doc.status.indexed_lexical = true;

        Ok(chunks.len())
    }

    /// Embeds every chunk that has no persisted vector yet.
    ///
    /// Restartable and idempotent: chunks with an existing vector are
    /// skipped, so an interrupted run picks up where it left off.
    async fn embed_missing(
        &self,
        chunks: &[ChunkRecord],
        cancel: &CancelToken,
    ) -> Result<usize, EngineError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        self.ensure_embedder_ready().await?;

        let mut missing: Vec<&ChunkRecord> = Vec::new();
        for chunk in chunks {
            check_cancel(cancel)?;
            if self.store.get_vector(&chunk.id).await?.is_none() {
                missing.push(chunk);
            }
        }
        if missing.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = missing.iter().map(|c| c.text.clone()).collect();
        let vectors = retry_once!(self.embedder.embed_batch(&texts))?;

        for (chunk, vector) in missing.iter().zip(vectors.iter()) {
            if vector.len() != self.embedder.dimensions() {
                return Err(EngineError::Consistency(format!(
                    "embedder '{}' produced dimension {} instead of {}",
                    self.embedder.id(),
                    vector.len(),
                    self.embedder.dimensions()
                )));
            }
            check_cancel(cancel)?;
            retry_once!(self.store.put_vector(&chunk.id, vector))?;
        }
        Ok(missing.len())
    }

    async fn mark_all_docs_lexical(&self) -> Result<(), EngineError> {
        for mut doc in self.store.list_docs().await? {
            if !doc.status.indexed_lexical {
                doc.status.indexed_lexical = true;
                self.store.put_doc(&doc).await?;
            }
        }
        Ok(())
    }

    async fn ensure_embedder_ready(&self) -> Result<(), EngineError> {
        if self.embedder.is_ready() {
            return Ok(());
        }
        let init = EmbedderInit {
            deadline_ms: self.config.model_init_deadline_ms,
        };
        retry_once!(self.embedder.initialize(&init))?;
        Ok(())
    }

    // =========================================================================
    // Lexical snapshot lifecycle
    // =========================================================================

    /// Rebuilds the lexical snapshot over every persisted chunk and
    /// persists it atomically.
    pub async fn rebuild_lexical_snapshot(&mut self) -> Result<(), EngineError> {
        let chunks = self.store.all_chunks().await?;
        let snapshot = LexicalSnapshot::build(&chunks);
        retry_once!(self.store.put_lexical_snapshot(&snapshot))?;
        self.snapshot_cache = Some(Arc::new(snapshot));
        self.snapshot_state = SnapshotState::Fresh;
        Ok(())
    }

    /// Returns the current snapshot, rebuilding lazily when absent or
    /// stale.
    async fn ensure_snapshot(&mut self) -> Result<Arc<LexicalSnapshot>, EngineError> {
        match self.snapshot_state {
            SnapshotState::Fresh => {
                if self.snapshot_cache.is_none() {
                    match self.store.get_lexical_snapshot().await? {
                        Some(snapshot) => self.snapshot_cache = Some(Arc::new(snapshot)),
                        None => self.rebuild_lexical_snapshot().await?,
                    }
                }
            }
            SnapshotState::Absent | SnapshotState::Stale => {
                self.rebuild_lexical_snapshot().await?;
            }
        }
        self.snapshot_cache
            .clone()
            .ok_or_else(|| EngineError::Programmer("snapshot cache empty after rebuild".into()))
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Executes one query.
    ///
    /// A consistency failure (dangling snapshot reference) triggers one
    /// snapshot rebuild and a single retry before surfacing.
    #[instrument(skip_all, fields(mode = ?request.mode))]
    pub async fn query(&mut self, request: QueryRequest) -> Result<QueryResult, EngineError> {
        let result = match self.query_attempt(&request).await {
            Err(EngineError::Consistency(msg)) => {
                warn!(error = %msg, "Consistency error, rebuilding index and retrying once");
                self.rebuild_lexical_snapshot().await?;
                self.query_attempt(&request).await
            }
            other => other,
        };

        if let Err(ref err) = result {
            if err.is_loggable() {
                self.events.record(
                    EventKind::Error,
                    json!({ "stage": "query", "message": err.to_string() }),
                    None,
                );
            }
        }
        result
    }

    async fn query_attempt(&mut self, request: &QueryRequest) -> Result<QueryResult, EngineError> {
        if request.text.trim().is_empty() {
            return Err(EngineError::Input("query text is empty".to_string()));
        }

        let query_id = self.next_query_id;
        self.next_query_id += 1;
        let total_start = Instant::now();

        let mode = request
            .mode
            .map(|m| m.strategy_id().to_string())
            .unwrap_or_else(|| self.config.retrieval.strategy.clone());
        self.events.record(
            EventKind::QueryStart,
            json!({ "query_id": query_id, "text": request.text, "mode": mode }),
            None,
        );

        let retriever = self
            .retrievers
            .get(&mode)
            .ok_or_else(|| EngineError::Programmer(format!("unknown retrieval strategy '{mode}'")))?;

        let retrieval_config = RetrievalConfig {
            top_k: request
                .top_k
                .unwrap_or(self.config.retrieval.top_k)
                .clamp(MIN_TOP_K, MAX_TOP_K),
            alpha: request
                .alpha
                .unwrap_or(self.config.retrieval.alpha)
                .clamp(0.0, 1.0),
        };

        // Capture the corpus view for this query: snapshot and vectors are
        // read once and never refetched mid-query.
        let snapshot = self.ensure_snapshot().await?;
        let vectors = if retriever.requires_embeddings() {
            self.ensure_embedder_ready().await?;
            self.store.iter_vectors().await?
        } else {
            Vec::new()
        };

        let retrieval_start = Instant::now();
        let context = RetrievalContext {
            snapshot: &snapshot,
            vectors: &vectors,
            embedder: self.embedder.clone(),
        };
        let retrieval = retriever
            .retrieve(&request.text, &context, &retrieval_config)
            .await?;
        let retrieval_ms = elapsed_ms(retrieval_start);
        self.events.record(
            EventKind::RetrievalComplete,
            json!({ "query_id": query_id, "results": retrieval.ranked.len() }),
            Some(retrieval_ms),
        );

        if !retrieval.skipped.is_empty() {
            warn!(
                skipped = retrieval.skipped.len(),
                "Stored vectors with mismatched dimension, flagging corpus for re-embedding"
            );
            let _ = self.store.put_metadata(NEEDS_REEMBED_KEY, b"true").await;
        }

        // Join ranked chunks to their documents, preserving rank.
        let mut chunks = Vec::with_capacity(retrieval.ranked.len());
        let mut citations = Vec::with_capacity(retrieval.ranked.len());
        let mut scores = Vec::with_capacity(retrieval.ranked.len());
        let mut doc_cache: HashMap<DocId, DocRecord> = HashMap::new();

        for (chunk_id, score) in &retrieval.ranked {
            let chunk = self.store.get_chunk(chunk_id).await?.ok_or_else(|| {
                EngineError::Consistency(format!(
                    "chunk '{chunk_id}' referenced by ranking is missing"
                ))
            })?;
            let doc = match doc_cache.get(&chunk.doc_id) {
                Some(doc) => doc.clone(),
                None => {
                    let doc = self.store.get_doc(&chunk.doc_id).await?.ok_or_else(|| {
                        EngineError::Consistency(format!(
                            "document '{}' for chunk '{chunk_id}' is missing",
                            chunk.doc_id
                        ))
                    })?;
                    doc_cache.insert(chunk.doc_id.clone(), doc.clone());
                    doc
                }
            };
            citations.push(Citation {
                chunk_id: chunk.id.clone(),
                doc_id: doc.id.clone(),
                doc_name: doc.name.clone(),
                page_number: chunk.page_number,
                text: chunk.text.clone(),
                score: Some(*score),
            });
            scores.push(*score);
            chunks.push(chunk);
        }
        self.events.record(
            EventKind::ContextBuilt,
            json!({ "query_id": query_id, "citations": citations.len() }),
            None,
        );

        // Chat-mode generation is best-effort: a failure still returns the
        // retrieval result, with an error entry in the event log.
        let mut generated_answer: Option<String> = None;
        let mut generation_ms: Option<u64> = None;
        if request.chat_mode == ChatMode::Chat && !citations.is_empty() {
            let generator = self
                .generators
                .get(&self.config.generation.strategy)
                .ok_or_else(|| {
                    EngineError::Programmer(format!(
                        "unknown generation strategy '{}'",
                        self.config.generation.strategy
                    ))
                })?;
            let top_chunks: Vec<ChunkRecord> =
                chunks.iter().take(GENERATION_CHUNKS).cloned().collect();

            let generation_start = Instant::now();
            match generator
                .generate(&request.text, &top_chunks, self.config.generation.max_tokens)
                .await
            {
                Ok(output) => {
                    let ms = elapsed_ms(generation_start);
                    self.events.record(
                        EventKind::GenerationComplete,
                        json!({
                            "query_id": query_id,
                            "model": output.model_id,
                            "chunks_used": output.chunks_used,
                            "context_length": output.context_length,
                        }),
                        Some(ms),
                    );
                    generation_ms = Some(ms);
                    generated_answer = Some(output.answer);
                }
                Err(err) => {
                    warn!(error = %err, "Generation failed, returning retrieval-only result");
                    self.events.record(
                        EventKind::Error,
                        json!({
                            "query_id": query_id,
                            "stage": "generation",
                            "message": err.to_string(),
                        }),
                        None,
                    );
                }
            }
        }

        // Post-processing is best-effort too: the first failure
        // short-circuits the chain and the prior answer is kept.
        let mut polish_ms: Option<u64> = None;
        if let Some(initial) = generated_answer.clone() {
            let processors = self.effective_post_processors(request);
            if !processors.is_empty() {
                let polish_start = Instant::now();
                let mut answer = initial;
                for id in &processors {
                    let processor = self.post_processors.get(id).ok_or_else(|| {
                        EngineError::Programmer(format!("unknown post-process strategy '{id}'"))
                    })?;
                    let step_start = Instant::now();
                    match processor.process(&answer, &request.text, &chunks).await {
                        Ok(next) => {
                            self.events.record(
                                EventKind::PolishComplete,
                                json!({ "query_id": query_id, "processor": id }),
                                Some(elapsed_ms(step_start)),
                            );
                            answer = next;
                        }
                        Err(err) => {
                            warn!(processor = %id, error = %err, "Post-processor failed, keeping prior answer");
                            self.events.record(
                                EventKind::Error,
                                json!({
                                    "query_id": query_id,
                                    "stage": format!("polish:{id}"),
                                    "message": err.to_string(),
                                }),
                                None,
                            );
                            break;
                        }
                    }
                }
                polish_ms = Some(elapsed_ms(polish_start));
                generated_answer = Some(answer);
            }
        }

        let total_ms = elapsed_ms(total_start);
        self.latency.record(total_ms);
        self.events.record(
            EventKind::QueryComplete,
            json!({ "query_id": query_id, "results": chunks.len() }),
            Some(total_ms),
        );

        Ok(QueryResult {
            chunks,
            citations,
            scores,
            latency: LatencyBreakdown {
                retrieval_ms,
                generation_ms,
                polish_ms,
                total_ms,
            },
            generated_answer,
        })
    }

    fn effective_post_processors(&self, request: &QueryRequest) -> Vec<String> {
        let mut processors = self.config.post_process.clone();
        match request.polish {
            Some(false) => processors.clear(),
            Some(true) => {
                if !processors.iter().any(|p| p == "polish") {
                    processors.push("polish".to_string());
                }
            }
            None => {}
        }
        processors
    }

    // =========================================================================
    // Corpus maintenance
    // =========================================================================

    /// Deletes a document and everything derived from it: chunks,
    /// vectors, and the raw blob. The lexical snapshot is rebuilt over the
    /// remaining corpus.
    #[instrument(skip(self))]
    pub async fn delete_doc(&mut self, id: &DocId) -> Result<(), EngineError> {
        if self.store.get_doc(id).await?.is_none() {
            return Err(EngineError::Input(format!("unknown document '{id}'")));
        }

        let chunks = self.store.chunks_for_doc(id).await?;
        for chunk in &chunks {
            self.store.delete_vector(&chunk.id).await?;
            self.store.delete_chunk(&chunk.id).await?;
        }
        self.store.delete_blob(id).await?;
        self.store.delete_doc(id).await?;

        self.snapshot_cache = None;
        self.snapshot_state = SnapshotState::Stale;
        self.rebuild_lexical_snapshot().await?;

        info!(doc = %id, chunks = chunks.len(), "Deleted document");
        Ok(())
    }

    /// Clears every persisted collection and all in-memory diagnostics,
    /// then re-persists the live configuration.
    pub async fn reset(&mut self) -> Result<(), EngineError> {
        self.store.clear().await?;
        self.snapshot_cache = None;
        self.snapshot_state = SnapshotState::Absent;
        self.events.clear();
        self.latency.clear();
        self.persist_config().await
    }

    /// Swaps the embedder, invalidating every stored vector and
    /// re-embedding the whole corpus with the new model.
    ///
    /// Returns the number of chunks re-embedded.
    pub async fn swap_embedder(
        &mut self,
        embedder: Arc<dyn Embedder>,
        cancel: &CancelToken,
    ) -> Result<usize, EngineError> {
        info!(
            from = self.embedder.id(),
            to = embedder.id(),
            "Swapping embedder, invalidating stored vectors"
        );
        self.store.clear_vectors().await?;
        self.embedders.register(embedder.id().to_string(), embedder.clone());
        self.embedder = embedder;
        self.config.embedding = self.embedder.id().to_string();
        self.persist_config().await?;

        let chunks = self.store.all_chunks().await?;
        let count = self.embed_missing(&chunks, cancel).await?;
        let _ = self.store.delete_metadata(NEEDS_REEMBED_KEY).await;
        Ok(count)
    }

    /// Seeds the starter corpus iff the corpus is empty and the seeded
    /// flag is unset. Returns the number of documents ingested.
    pub async fn seed_samples(&mut self) -> Result<usize, EngineError> {
        if self.store.doc_count().await? > 0 {
            return Ok(0);
        }
        if self.store.get_metadata(SAMPLE_SEEDED_KEY).await?.is_some() {
            return Ok(0);
        }

        let inputs = sample_inputs();
        let count = inputs.len();
        let cancel = CancelToken::new();
        for input in inputs {
            self.ingest(input, &cancel, |_| {}).await?;
        }
        self.store.put_metadata(SAMPLE_SEEDED_KEY, b"true").await?;
        info!(docs = count, "Seeded sample corpus");
        Ok(count)
    }

    // =========================================================================
    // Notes
    // =========================================================================

    /// Saves a note with its citations.
    pub async fn save_note(
        &mut self,
        title: &str,
        body: &str,
        citations: Vec<Citation>,
    ) -> Result<NoteRecord, EngineError> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let seq = COUNTER.fetch_add(1, Ordering::SeqCst);

        let note = NoteRecord {
            id: format!("note-{}-{}", current_timestamp_ms(), seq),
            title: title.to_string(),
            body: body.to_string(),
            citations,
            created_at: current_timestamp_ms(),
        };
        self.store.put_note(&note).await?;
        Ok(note)
    }

    /// Retrieves a note by id.
    pub async fn get_note(&self, id: &str) -> Result<Option<NoteRecord>, EngineError> {
        Ok(self.store.get_note(id).await?)
    }

    /// Lists all saved notes.
    pub async fn list_notes(&self) -> Result<Vec<NoteRecord>, EngineError> {
        Ok(self.store.list_notes().await?)
    }

    /// Deletes a note.
    pub async fn delete_note(&mut self, id: &str) -> Result<(), EngineError> {
        Ok(self.store.delete_note(id).await?)
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Corpus and diagnostics summary.
    pub async fn stats(&self) -> Result<EngineStats, EngineError> {
        Ok(EngineStats {
            docs: self.store.doc_count().await?,
            chunks: self.store.chunk_count().await?,
            vectors: self.store.vector_count().await?,
            notes: self.store.list_notes().await?.len(),
            snapshot_state: self.snapshot_state,
            latency: self.latency.summary(),
        })
    }
}
