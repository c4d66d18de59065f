//! Retrieval strategies.
//!
//! Three built-in retrievers cover the query modes: `lexical` scores the
//! BM25 snapshot, `semantic` scans stored vectors by cosine similarity,
//! and `hybrid` fuses both rankings. Each retriever sees an immutable
//! view of the corpus captured at query start and returns ranked chunk
//! ids; the orchestrator owns the join back to documents.

use crate::embedding::Embedder;
use crate::error::RetrieveError;
use crate::index::lexical::LexicalSnapshot;
use crate::index::{fusion, vector};
use crate::types::ChunkId;
use async_trait::async_trait;
use std::sync::Arc;

/// Default result count.
pub const DEFAULT_TOP_K: usize = 10;
/// Default semantic weight for hybrid fusion.
pub const DEFAULT_ALPHA: f32 = 0.5;

/// One numeric field of a retriever's config schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigField {
    /// Field name
    pub name: &'static str,
    /// Inclusive minimum
    pub min: f64,
    /// Inclusive maximum
    pub max: f64,
    /// Default value
    pub default: f64,
}

/// Declarative config schema exposed by each retriever.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigSchema {
    /// Accepted fields
    pub fields: &'static [ConfigField],
}

const TOP_K_FIELD: ConfigField = ConfigField {
    name: "top_k",
    min: 1.0,
    max: 30.0,
    default: DEFAULT_TOP_K as f64,
};

const ALPHA_FIELD: ConfigField = ConfigField {
    name: "alpha",
    min: 0.0,
    max: 1.0,
    default: DEFAULT_ALPHA as f64,
};

/// Effective per-query retrieval parameters (config merged with request
/// overrides and clamped by the orchestrator).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    /// Result count
    pub top_k: usize,
    /// Semantic weight for hybrid fusion
    pub alpha: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// Immutable corpus view captured at query start.
pub struct RetrievalContext<'a> {
    /// The lexical snapshot in effect for this query
    pub snapshot: &'a LexicalSnapshot,
    /// All persisted `(chunk id, embedding)` pairs
    pub vectors: &'a [(ChunkId, Vec<f32>)],
    /// The configured embedder
    pub embedder: Arc<dyn Embedder>,
}

/// Ranked retrieval output.
#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    /// `(chunk id, score)` pairs in rank order, truncated to top-K
    pub ranked: Vec<(ChunkId, f32)>,
    /// Chunks skipped due to vector dimension mismatch; non-empty output
    /// flags the corpus for re-embedding
    pub skipped: Vec<ChunkId>,
}

/// A named retrieval strategy.
#[async_trait(?Send)]
pub trait Retriever: Send + Sync {
    /// Strategy id used in configuration and query modes.
    fn id(&self) -> &'static str;

    /// Human-readable name.
    fn name(&self) -> &'static str;

    /// Whether this strategy needs stored vectors and a ready embedder.
    fn requires_embeddings(&self) -> bool;

    /// Declarative config schema.
    fn config_schema(&self) -> ConfigSchema;

    /// Produces the ranked result for `query` over the captured corpus
    /// view.
    async fn retrieve(
        &self,
        query: &str,
        ctx: &RetrievalContext<'_>,
        config: &RetrievalConfig,
    ) -> Result<Retrieval, RetrieveError>;
}

/// BM25-only retrieval.
#[derive(Debug, Default)]
pub struct LexicalRetriever;

#[async_trait(?Send)]
impl Retriever for LexicalRetriever {
    fn id(&self) -> &'static str {
        "lexical"
    }

    fn name(&self) -> &'static str {
        "BM25 keyword search"
    }

    fn requires_embeddings(&self) -> bool {
        false
    }

    fn config_schema(&self) -> ConfigSchema {
        static FIELDS: [ConfigField; 1] = [TOP_K_FIELD];
        ConfigSchema { fields: &FIELDS }
    }

    async fn retrieve(
        &self,
        query: &str,
        ctx: &RetrievalContext<'_>,
        config: &RetrievalConfig,
    ) -> Result<Retrieval, RetrieveError> {
        Ok(Retrieval {
            ranked: ctx.snapshot.search(query, config.top_k),
            skipped: Vec::new(),
        })
    }
}

/// Cosine-similarity retrieval over stored vectors.
#[derive(Debug, Default)]
pub struct SemanticRetriever;

#[async_trait(?Send)]
impl Retriever for SemanticRetriever {
    fn id(&self) -> &'static str {
        "semantic"
    }

    fn name(&self) -> &'static str {
        "Vector similarity search"
    }

    fn requires_embeddings(&self) -> bool {
        true
    }

    fn config_schema(&self) -> ConfigSchema {
        static FIELDS: [ConfigField; 1] = [TOP_K_FIELD];
        ConfigSchema { fields: &FIELDS }
    }

    async fn retrieve(
        &self,
        query: &str,
        ctx: &RetrievalContext<'_>,
        config: &RetrievalConfig,
    ) -> Result<Retrieval, RetrieveError> {
        let query_vector = ctx.embedder.embed(query).await?;
        let scan = vector::search(ctx.vectors, &query_vector, config.top_k);
        Ok(Retrieval {
            ranked: scan.ranked,
            skipped: scan.skipped,
        })
    }
}

/// Fused lexical + semantic retrieval.
///
/// Both rankers run over the full corpus; normalization and fusion
/// operate on the complete per-ranker result sets and top-K truncation
/// happens only afterwards.
#[derive(Debug, Default)]
pub struct HybridRetriever;

#[async_trait(?Send)]
impl Retriever for HybridRetriever {
    fn id(&self) -> &'static str {
        "hybrid"
    }

    fn name(&self) -> &'static str {
        "Hybrid fused search"
    }

    fn requires_embeddings(&self) -> bool {
        true
    }

    fn config_schema(&self) -> ConfigSchema {
        static FIELDS: [ConfigField; 2] = [TOP_K_FIELD, ALPHA_FIELD];
        ConfigSchema { fields: &FIELDS }
    }

    async fn retrieve(
        &self,
        query: &str,
        ctx: &RetrievalContext<'_>,
        config: &RetrievalConfig,
    ) -> Result<Retrieval, RetrieveError> {
        let lexical = ctx.snapshot.score_all(query);

        let query_vector = ctx.embedder.embed(query).await?;
        let scan = vector::scan_all(ctx.vectors, &query_vector);

        let mut ranked = fusion::fuse_hybrid(&scan.ranked, &lexical, config.alpha);
        ranked.truncate(config.top_k);

        Ok(Retrieval {
            ranked,
            skipped: scan.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbedderInit, HashEmbedder};
    use crate::types::{ChunkRecord, DocId};

    fn make_chunk(doc: &str, ordinal: usize, text: &str) -> ChunkRecord {
        let doc_id = DocId::from_raw(doc);
        ChunkRecord {
            id: ChunkId::new(&doc_id, ordinal),
            doc_id,
            page_number: 1,
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            token_estimate: text.len().div_ceil(4),
        }
    }

    async fn make_corpus(
        texts: &[(&str, &str)],
    ) -> (
        Vec<ChunkRecord>,
        LexicalSnapshot,
        Vec<(ChunkId, Vec<f32>)>,
        Arc<dyn Embedder>,
    ) {
        let embedder = HashEmbedder::new(128);
        embedder.initialize(&EmbedderInit::default()).await.unwrap();
        let embedder: Arc<dyn Embedder> = Arc::new(embedder);

        let chunks: Vec<ChunkRecord> = texts
            .iter()
            .map(|(doc, text)| make_chunk(doc, 0, text))
            .collect();
        let snapshot = LexicalSnapshot::build(&chunks);

        let mut vectors = Vec::new();
        for chunk in &chunks {
            let v = embedder.embed(&chunk.text).await.unwrap();
            vectors.push((chunk.id.clone(), v));
        }
        (chunks, snapshot, vectors, embedder)
    }

    #[tokio::test]
    async fn test_lexical_retriever_exact_match() {
        let (chunks, snapshot, vectors, embedder) = make_corpus(&[
            ("doc-a", "The quick brown fox jumps over the lazy dog"),
            ("doc-b", "Machine learning algorithms process data efficiently"),
        ])
        .await;
        let ctx = RetrievalContext {
            snapshot: &snapshot,
            vectors: &vectors,
            embedder,
        };

        let result = LexicalRetriever
            .retrieve("lazy dog", &ctx, &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(result.ranked.len(), 1);
        assert_eq!(result.ranked[0].0, chunks[0].id);
        assert!(result.ranked[0].1 > 0.0);
    }

    #[tokio::test]
    async fn test_semantic_retriever_ranks_by_similarity() {
        let (chunks, snapshot, vectors, embedder) = make_corpus(&[
            ("doc-a", "the lazy dog sleeps"),
            ("doc-b", "completely unrelated quantum physics topic"),
        ])
        .await;
        let ctx = RetrievalContext {
            snapshot: &snapshot,
            vectors: &vectors,
            embedder,
        };

        let result = SemanticRetriever
            .retrieve("lazy dog sleeps", &ctx, &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(result.ranked.len(), 2);
        assert_eq!(result.ranked[0].0, chunks[0].id);
        assert!(result.ranked[0].1 > result.ranked[1].1);
    }

    #[tokio::test]
    async fn test_hybrid_alpha_boundaries() {
        // Every chunk matches the query lexically with a distinct score,
        // so no zero-score ties blur the boundary comparison.
        let (_, snapshot, vectors, embedder) = make_corpus(&[
            ("doc-a", "The quick brown fox jumps over the lazy dog"),
            ("doc-b", "A dog chases another dog around the yard"),
            ("doc-c", "Lazy afternoons suit one sleepy dog just fine"),
        ])
        .await;
        let ctx = RetrievalContext {
            snapshot: &snapshot,
            vectors: &vectors,
            embedder: embedder.clone(),
        };

        let lexical = LexicalRetriever
            .retrieve("lazy dog", &ctx, &RetrievalConfig { top_k: 3, alpha: 0.5 })
            .await
            .unwrap();
        let semantic = SemanticRetriever
            .retrieve("lazy dog", &ctx, &RetrievalConfig { top_k: 3, alpha: 0.5 })
            .await
            .unwrap();

        // alpha = 0 reduces hybrid to the lexical ranking.
        let hybrid_lex = HybridRetriever
            .retrieve("lazy dog", &ctx, &RetrievalConfig { top_k: 3, alpha: 0.0 })
            .await
            .unwrap();
        let lex_ids: Vec<&ChunkId> = lexical.ranked.iter().map(|(id, _)| id).collect();
        let hybrid_lex_top: Vec<&ChunkId> = hybrid_lex
            .ranked
            .iter()
            .take(lex_ids.len())
            .map(|(id, _)| id)
            .collect();
        assert_eq!(hybrid_lex_top, lex_ids);

        // alpha = 1 reduces hybrid to the semantic ranking.
        let hybrid_sem = HybridRetriever
            .retrieve("lazy dog", &ctx, &RetrievalConfig { top_k: 3, alpha: 1.0 })
            .await
            .unwrap();
        let sem_ids: Vec<&ChunkId> = semantic.ranked.iter().map(|(id, _)| id).collect();
        let hybrid_sem_ids: Vec<&ChunkId> =
            hybrid_sem.ranked.iter().map(|(id, _)| id).collect();
        assert_eq!(hybrid_sem_ids, sem_ids);
    }

    #[tokio::test]
    async fn test_hybrid_skips_mismatched_vectors() {
        let (chunks, snapshot, mut vectors, embedder) = make_corpus(&[
            ("doc-a", "alpha content here"),
            ("doc-b", "beta content here"),
        ])
        .await;
        // Corrupt one stored vector's dimension.
        vectors[1].1 = vec![1.0, 2.0];
        let ctx = RetrievalContext {
            snapshot: &snapshot,
            vectors: &vectors,
            embedder,
        };

        let result = HybridRetriever
            .retrieve("alpha content", &ctx, &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(result.skipped, vec![chunks[1].id.clone()]);
        assert!(result
            .ranked
            .iter()
            .any(|(id, _)| id == &chunks[0].id));
    }

    #[tokio::test]
    async fn test_stop_word_query_lexical_empty_semantic_ranked() {
        let (_, snapshot, vectors, embedder) =
            make_corpus(&[("doc-a", "the quick brown fox")]).await;
        let ctx = RetrievalContext {
            snapshot: &snapshot,
            vectors: &vectors,
            embedder,
        };

        let lexical = LexicalRetriever
            .retrieve("the of and", &ctx, &RetrievalConfig::default())
            .await
            .unwrap();
        assert!(lexical.ranked.is_empty());

        let semantic = SemanticRetriever
            .retrieve("the of and", &ctx, &RetrievalConfig::default())
            .await
            .unwrap();
        assert_eq!(semantic.ranked.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_corpus_all_modes() {
        let embedder = HashEmbedder::new(64);
        embedder.initialize(&EmbedderInit::default()).await.unwrap();
        let snapshot = LexicalSnapshot::empty();
        let ctx = RetrievalContext {
            snapshot: &snapshot,
            vectors: &[],
            embedder: Arc::new(embedder),
        };

        for retriever in [
            &LexicalRetriever as &dyn Retriever,
            &SemanticRetriever,
            &HybridRetriever,
        ] {
            let result = retriever
                .retrieve("anything", &ctx, &RetrievalConfig::default())
                .await
                .unwrap();
            assert!(result.ranked.is_empty(), "{} not empty", retriever.id());
        }
    }

    #[test]
    fn test_schemas_expose_expected_fields() {
        assert_eq!(LexicalRetriever.config_schema().fields.len(), 1);
        assert_eq!(SemanticRetriever.config_schema().fields.len(), 1);
        let hybrid = HybridRetriever.config_schema();
        assert_eq!(hybrid.fields.len(), 2);
        assert!(hybrid.fields.iter().any(|f| f.name == "alpha"));
        assert!(!LexicalRetriever.requires_embeddings());
        assert!(HybridRetriever.requires_embeddings());
    }
}
