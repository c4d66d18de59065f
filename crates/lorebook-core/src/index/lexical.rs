//! BM25 lexical index over chunk texts.
//!
//! The index is a single persisted snapshot of corpus-wide statistics:
//! document frequency per term, term frequency per chunk, the ordered
//! chunk-id list, and the average chunk length. It is rebuilt over the
//! whole corpus after every ingest so the snapshot is always exactly the
//! corpus, and it is loaded wholesale at query time.
//!
//! Chunk length is defined as the sum of term frequencies after stop-word
//! removal; the same definition is used at build and score time so
//! statistics stay corpus-comparable.

use crate::text::tokenize;
use crate::types::{ChunkId, ChunkRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// BM25 term-frequency saturation parameter.
pub const BM25_K1: f64 = 1.5;
/// BM25 length-normalization parameter.
pub const BM25_B: f64 = 0.75;

/// Term frequency counts for one chunk.
pub type TermCounts = HashMap<String, u32>;

/// Persisted image of BM25 statistics over the whole corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalSnapshot {
    /// Global document frequency: term -> number of chunks containing it
    pub df: HashMap<String, u32>,
    /// Per-chunk term frequency
    pub tf: HashMap<ChunkId, TermCounts>,
    /// Chunk ids in build order; ties in scoring resolve to the earlier id
    pub chunk_ids: Vec<ChunkId>,
    /// Average chunk length in tokens (tf-sum definition)
    pub avg_doc_length: f64,
}

impl LexicalSnapshot {
    /// Builds a snapshot over the given chunk set.
    ///
    /// The chunk order passed here becomes the snapshot order used for
    /// tie-breaking, so callers must pass a deterministically ordered set.
    pub fn build(chunks: &[ChunkRecord]) -> Self {
        let mut df: HashMap<String, u32> = HashMap::new();
        let mut tf: HashMap<ChunkId, TermCounts> = HashMap::new();
        let mut chunk_ids = Vec::with_capacity(chunks.len());
        let mut total_tokens = 0u64;

        for chunk in chunks {
            let mut counts: TermCounts = HashMap::new();
            for token in tokenize(&chunk.text) {
                *counts.entry(token).or_insert(0) += 1;
            }
            for term in counts.keys() {
                *df.entry(term.clone()).or_insert(0) += 1;
            }
            total_tokens += counts.values().map(|&c| u64::from(c)).sum::<u64>();
            chunk_ids.push(chunk.id.clone());
            tf.insert(chunk.id.clone(), counts);
        }

        let avg_doc_length = if chunk_ids.is_empty() {
            0.0
        } else {
            total_tokens as f64 / chunk_ids.len() as f64
        };

        Self {
            df,
            tf,
            chunk_ids,
            avg_doc_length,
        }
    }

    /// An empty snapshot (absent corpus).
    pub fn empty() -> Self {
        Self::build(&[])
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.chunk_ids.len()
    }

    /// Returns true if no chunks are indexed.
    pub fn is_empty(&self) -> bool {
        self.chunk_ids.is_empty()
    }

    /// Scores every chunk against `query` and returns the non-zero scores
    /// in descending order.
    ///
    /// Query tokens pass through the same tokenizer as index time; each
    /// query occurrence contributes separately (duplicates are not
    /// deduped). Unknown terms contribute nothing. On equal scores the
    /// chunk earlier in snapshot order wins.
    pub fn score_all(&self, query: &str) -> Vec<(ChunkId, f32)> {
        let tokens = tokenize(query);
        if tokens.is_empty() || self.chunk_ids.is_empty() {
            return Vec::new();
        }

        let n = self.chunk_ids.len() as f64;
        let mut scored: Vec<(ChunkId, f32)> = Vec::new();

        for chunk_id in &self.chunk_ids {
            let Some(counts) = self.tf.get(chunk_id) else {
                continue;
            };
            let chunk_len: f64 = counts.values().map(|&c| f64::from(c)).sum();

            let mut score = 0.0f64;
            for token in &tokens {
                let df = f64::from(self.df.get(token).copied().unwrap_or(0));
                if df == 0.0 {
                    continue;
                }
                let tf = f64::from(counts.get(token).copied().unwrap_or(0));
                if tf == 0.0 {
                    continue;
                }
                let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
                let denom = tf + BM25_K1 * (1.0 - BM25_B + BM25_B * chunk_len / self.avg_doc_length);
                score += idf * tf * (BM25_K1 + 1.0) / denom;
            }

            if score > 0.0 {
                scored.push((chunk_id.clone(), score as f32));
            }
        }

        // Stable sort: equal scores keep snapshot order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Scores the corpus and truncates to the top `k` chunks.
    pub fn search(&self, query: &str, k: usize) -> Vec<(ChunkId, f32)> {
        let mut ranked = self.score_all(query);
        ranked.truncate(k);
        ranked
    }
}
