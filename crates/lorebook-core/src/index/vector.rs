//! Brute-force cosine similarity search over persisted vectors.
//!
//! Every stored embedding is compared against the query vector. Chunks
//! whose stored vector has the wrong dimension are skipped with a warning
//! and reported back so the caller can flag the corpus for re-embedding;
//! the rest of the corpus still participates.

use crate::types::ChunkId;
use tracing::warn;

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// Returns 0.0 when either vector has zero magnitude, so degenerate
/// inputs rank last instead of poisoning the sort with NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|y| y * y).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Result of one brute-force vector scan.
#[derive(Debug, Clone, Default)]
pub struct VectorScan {
    /// `(chunk id, similarity)` pairs, similarity descending, chunk id
    /// ascending on ties
    pub ranked: Vec<(ChunkId, f32)>,
    /// Chunks skipped because their stored vector had the wrong dimension
    pub skipped: Vec<ChunkId>,
}

/// Scores every stored vector against the query.
///
/// The full ranking is returned (no truncation) so hybrid fusion can
/// normalize over the complete result set; callers truncate afterwards.
pub fn scan_all(vectors: &[(ChunkId, Vec<f32>)], query: &[f32]) -> VectorScan {
    let mut scan = VectorScan::default();

    for (chunk_id, embedding) in vectors {
        if embedding.len() != query.len() {
            warn!(
                chunk = %chunk_id,
                expected = query.len(),
                actual = embedding.len(),
                "Skipping vector with mismatched dimension"
            );
            scan.skipped.push(chunk_id.clone());
            continue;
        }
        let similarity = cosine_similarity(query, embedding);
        scan.ranked.push((chunk_id.clone(), similarity));
    }

    scan.ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scan
}

/// Scans and truncates to the top `k` chunks.
pub fn search(vectors: &[(ChunkId, Vec<f32>)], query: &[f32], k: usize) -> VectorScan {
    let mut scan = scan_all(vectors, query);
    scan.ranked.truncate(k);
    scan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> ChunkId {
        ChunkId::from_raw(raw)
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.5, 0.3, 0.2];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_scan_orders_by_similarity() {
        let vectors = vec![
            (id("c-0"), vec![0.0, 1.0, 0.0]),
            (id("c-1"), vec![1.0, 0.0, 0.0]),
            (id("c-2"), vec![0.9, 0.1, 0.0]),
        ];
        let scan = scan_all(&vectors, &[1.0, 0.0, 0.0]);
        assert_eq!(scan.ranked.len(), 3);
        assert_eq!(scan.ranked[0].0, id("c-1"));
        assert_eq!(scan.ranked[1].0, id("c-2"));
        assert!(scan.skipped.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_skips_only_offender() {
        let vectors = vec![
            (id("c-0"), vec![1.0, 0.0, 0.0]),
            (id("c-1"), vec![1.0, 0.0]), // wrong dimension
            (id("c-2"), vec![0.5, 0.5, 0.0]),
        ];
        let scan = scan_all(&vectors, &[1.0, 0.0, 0.0]);
        assert_eq!(scan.ranked.len(), 2);
        assert_eq!(scan.skipped, vec![id("c-1")]);
    }

    #[test]
    fn test_tie_breaks_by_chunk_id() {
        let vectors = vec![
            (id("c-b"), vec![1.0, 0.0]),
            (id("c-a"), vec![1.0, 0.0]),
        ];
        let scan = scan_all(&vectors, &[1.0, 0.0]);
        assert_eq!(scan.ranked[0].0, id("c-a"));
        assert_eq!(scan.ranked[1].0, id("c-b"));
    }

    #[test]
    fn test_search_truncates() {
        let vectors: Vec<(ChunkId, Vec<f32>)> = (0..20)
            .map(|i| (id(&format!("c-{i:02}")), vec![i as f32, 1.0]))
            .collect();
        let scan = search(&vectors, &[1.0, 0.0], 5);
        assert_eq!(scan.ranked.len(), 5);
    }

    #[test]
    fn test_empty_input() {
        let scan = scan_all(&[], &[1.0, 0.0]);
        assert!(scan.ranked.is_empty());
        assert!(scan.skipped.is_empty());
    }
}
