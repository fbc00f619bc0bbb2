//! Relevance ranking of segments against a query

use crate::error::{Error, Result};
use crate::provider::EmbeddingProvider;
use crate::types::{RelevanceScore, Segment};
use log::debug;
use std::cmp::Ordering;

/// Cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]. Empty, mismatched or zero-norm vectors score
/// 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> RelevanceScore {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    let similarity = (dot / denom) as f32;
    if similarity.is_nan() {
        0.0
    } else {
        similarity.clamp(-1.0, 1.0)
    }
}

/// Rank segments by similarity to `query`, most relevant first.
///
/// The query and all segments are embedded in one request. Equal scores
/// keep their original segment order. Embedding failures are returned to
/// the caller untouched.
pub async fn rank_segments(
    segments: &[Segment],
    query: &str,
    embedder: &dyn EmbeddingProvider,
    top_k: Option<usize>,
) -> Result<Vec<(Segment, RelevanceScore)>> {
    if segments.is_empty() {
        return Ok(Vec::new());
    }

    let mut texts = Vec::with_capacity(segments.len() + 1);
    texts.push(query.to_string());
    texts.extend(segments.iter().map(|s| s.text().to_string()));

    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != texts.len() {
        return Err(Error::ProviderError(format!(
            "Expected {} embeddings, got {}",
            texts.len(),
            vectors.len()
        )));
    }

    let (query_vector, segment_vectors) = vectors.split_at(1);
    let mut ranked: Vec<(Segment, RelevanceScore)> = segments
        .iter()
        .zip(segment_vectors)
        .map(|(segment, vector)| (segment.clone(), cosine_similarity(&query_vector[0], vector)))
        .collect();

    // sort_by is stable, so ties stay in segment order
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    if let Some(k) = top_k {
        ranked.truncate(k);
    }

    debug!(
        "Ranked {} segment(s), top score {:.4}",
        ranked.len(),
        ranked.first().map(|(_, score)| *score).unwrap_or(0.0)
    );

    Ok(ranked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmbeddingVector;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    /// Returns a fixed vector per text, [0, 0] for unknown texts
    struct TableEmbedder {
        table: HashMap<&'static str, EmbeddingVector>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(entries: &[(&'static str, [f32; 2])]) -> Self {
            Self {
                table: entries.iter().map(|(k, v)| (*k, v.to_vec())).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for TableEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| self.table.get(t.as_str()).cloned().unwrap_or_else(|| vec![0.0, 0.0]))
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<EmbeddingVector>> {
            Err(Error::ProviderError("embedding service unavailable".to_string()))
        }
    }

    fn segments(texts: &[&str]) -> Vec<Segment> {
        texts.iter().enumerate().map(|(i, t)| Segment::new(i, *t)).collect()
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_rank_orders_by_similarity() {
        let embedder = TableEmbedder::new(&[
            ("fruit", [1.0, 0.0]),
            ("apple", [0.9, 0.1]),
            ("car", [0.0, 1.0]),
            ("banana", [0.7, 0.3]),
        ]);
        let ranked = rank_segments(&segments(&["car", "banana", "apple"]), "fruit", &embedder, None)
            .await
            .unwrap();

        let order: Vec<&str> = ranked.iter().map(|(s, _)| s.text()).collect();
        assert_eq!(order, vec!["apple", "banana", "car"]);
        assert!(ranked[0].1 > ranked[1].1);
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rank_ties_keep_original_order() {
        let embedder = TableEmbedder::new(&[
            ("q", [1.0, 0.0]),
            ("x", [1.0, 1.0]),
            ("y", [2.0, 2.0]),
            ("z", [1.0, 0.0]),
        ]);
        let ranked = rank_segments(&segments(&["x", "y", "z"]), "q", &embedder, None)
            .await
            .unwrap();

        let order: Vec<usize> = ranked.iter().map(|(s, _)| s.index()).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[tokio::test]
    async fn test_rank_top_k() {
        let embedder = TableEmbedder::new(&[
            ("q", [1.0, 0.0]),
            ("a", [1.0, 0.0]),
            ("b", [0.5, 0.5]),
        ]);
        let ranked = rank_segments(&segments(&["b", "a", "c"]), "q", &embedder, Some(2))
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].0.text(), "a");
    }

    #[tokio::test]
    async fn test_rank_empty_segments_skips_provider() {
        let embedder = TableEmbedder::new(&[]);
        let ranked = rank_segments(&[], "q", &embedder, None).await.unwrap();
        assert!(ranked.is_empty());
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rank_propagates_provider_error() {
        let err = rank_segments(&segments(&["a"]), "q", &FailingEmbedder, None)
            .await
            .unwrap_err();
        assert!(err.is_provider_error());
    }
}
