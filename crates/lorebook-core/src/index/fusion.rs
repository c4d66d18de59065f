//! Score normalization and hybrid fusion.
//!
//! BM25 and cosine scores live on incomparable scales, so each ranker's
//! scores are min-max normalized to [0, 1] over its *full* result set
//! before being convex-combined. Normalizing only a truncated prefix
//! would make fusion unstable at the top-K boundary; truncation happens
//! after fusion.

use crate::types::ChunkId;
use std::collections::HashMap;

/// Min-max normalizes a ranker's scores to [0, 1].
///
/// When every input score is equal (including a single result), every
/// chunk maps to 1.0.
pub fn min_max_normalize(results: &[(ChunkId, f32)]) -> HashMap<ChunkId, f32> {
    if results.is_empty() {
        return HashMap::new();
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for (_, score) in results {
        min = min.min(*score);
        max = max.max(*score);
    }

    results
        .iter()
        .map(|(id, score)| {
            let norm = if max == min {
                1.0
            } else {
                (score - min) / (max - min)
            };
            (id.clone(), norm)
        })
        .collect()
}

/// Fuses semantic and lexical rankings with semantic weight `alpha`.
///
/// `final = alpha * norm_semantic + (1 - alpha) * norm_lexical`; a chunk
/// missing from one ranker contributes 0 on that side. Ties break by
/// lexical-normalized score, then by chunk id. The full fused ranking is
/// returned; callers truncate to top-K afterwards.
pub fn fuse_hybrid(
    semantic: &[(ChunkId, f32)],
    lexical: &[(ChunkId, f32)],
    alpha: f32,
) -> Vec<(ChunkId, f32)> {
    let alpha = alpha.clamp(0.0, 1.0);
    let norm_semantic = min_max_normalize(semantic);
    let norm_lexical = min_max_normalize(lexical);

    let mut fused: HashMap<ChunkId, f32> = HashMap::new();
    for id in norm_semantic.keys().chain(norm_lexical.keys()) {
        if fused.contains_key(id) {
            continue;
        }
        let sem = norm_semantic.get(id).copied().unwrap_or(0.0);
        let lex = norm_lexical.get(id).copied().unwrap_or(0.0);
        fused.insert(id.clone(), alpha * sem + (1.0 - alpha) * lex);
    }

    let mut combined: Vec<(ChunkId, f32)> = fused.into_iter().collect();
    combined.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let lex_a = norm_lexical.get(&a.0).copied().unwrap_or(0.0);
                let lex_b = norm_lexical.get(&b.0).copied().unwrap_or(0.0);
                lex_b
                    .partial_cmp(&lex_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.0.cmp(&b.0))
    });
    combined
}
