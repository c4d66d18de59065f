//! Embedding model contract and the built-in deterministic embedder.
//!
//! The engine treats embedders polymorphically through [`Embedder`]; a
//! model-backed implementation lives outside the core and plugs in through
//! the same trait. Swapping embedders invalidates every stored vector.

use crate::error::EmbedError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

/// Initialization parameters passed to [`Embedder::initialize`].
#[derive(Debug, Clone)]
pub struct EmbedderInit {
    /// Deadline for model initialization in milliseconds. Implementations
    /// MUST return (or fail) within this bound.
    pub deadline_ms: u64,
}

impl Default for EmbedderInit {
    fn default() -> Self {
        Self {
            deadline_ms: 120_000,
        }
    }
}

/// External vector producer.
///
/// # Contract
///
/// - Deterministic given identical input after initialization.
/// - Output is a real-valued vector of exactly `dimensions()` length.
/// - If `normalized()` is true, `|v| = 1 ± 1e-6`.
/// - `initialize` is called at most once per process before any embed
///   call; afterwards the embedder is treated as an immutable capability.
#[async_trait(?Send)]
pub trait Embedder: Send + Sync {
    /// Stable embedder identifier (participates in config validation).
    fn id(&self) -> &str;

    /// Fixed output dimension.
    fn dimensions(&self) -> usize;

    /// Whether output vectors are L2-normalized.
    fn normalized(&self) -> bool;

    /// True once `initialize` has completed.
    fn is_ready(&self) -> bool;

    /// Loads whatever the implementation needs (model weights, tokenizer).
    async fn initialize(&self, init: &EmbedderInit) -> Result<(), EmbedError>;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embeds a batch of texts, one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

/// 64-bit FNV-1a hash.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    for &b in bytes {
        hash ^= u64::from(b);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Deterministic feature-hashing embedder.
///
/// Hashes word unigrams and bigrams into a fixed-dimension signed
/// accumulator and L2-normalizes the result. Fully offline and
/// deterministic, so semantic and hybrid retrieval work without model
/// assets; a real model-backed embedder replaces this through the
/// [`Embedder`] trait.
///
/// Unlike the lexical tokenizer, no stop-words are removed here: a query
/// made entirely of stop-words still embeds to a usable vector.
pub struct HashEmbedder {
    id: String,
    dimensions: usize,
    ready: AtomicBool,
}

impl HashEmbedder {
    /// Creates an embedder with the given output dimension.
    pub fn new(dimensions: usize) -> Self {
        Self {
            id: format!("hash-{dimensions}"),
            dimensions,
            ready: AtomicBool::new(false),
        }
    }

    /// The default 256-dimension instance.
    pub fn default_instance() -> Self {
        Self::new(256)
    }

    fn words(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_string())
            .collect()
    }

    fn accumulate(&self, acc: &mut [f32], feature: &str) {
        let hash = fnv1a(feature.as_bytes());
        let bucket = (hash % self.dimensions as u64) as usize;
        let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
        acc[bucket] += sign;
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut acc = vec![0.0f32; self.dimensions];
        let words = Self::words(text);

        for word in &words {
            self.accumulate(&mut acc, word);
        }
        for pair in words.windows(2) {
            self.accumulate(&mut acc, &format!("{} {}", pair[0], pair[1]));
        }

        let norm: f32 = acc.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut acc {
                *x /= norm;
            }
        }
        acc
    }
}

#[async_trait(?Send)]
impl Embedder for HashEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn normalized(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn initialize(&self, _init: &EmbedderInit) -> Result<(), EmbedError> {
        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if !self.is_ready() {
            return Err(EmbedError::Unavailable(
                "embedder not initialized".to_string(),
            ));
        }
        Ok(self.embed_sync(text))
    }
}
