use async_trait::async_trait;
use lumen_core::error::{LumenError, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// A stored chunk and how similar it is to a query, in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub content: String,
    pub similarity: f32,
}

/// Append-only store of (chunk text, embedding) records.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Append one record. Duplicate content is allowed.
    async fn insert(&self, content: &str, embedding: &[f32]) -> Result<()>;

    /// Records with `similarity > min_similarity`, most similar first, at
    /// most `k` of them. Equal similarities keep insertion order.
    async fn query_top_k(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>>;
}

/// Cosine similarity between two vectors. Zero-norm or mismatched vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Filter, order and truncate scored candidates given in insertion order.
pub fn rank(candidates: Vec<ScoredChunk>, k: usize, min_similarity: f32) -> Vec<ScoredChunk> {
    let mut ranked: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter(|c| c.similarity > min_similarity)
        .collect();
    // stable sort keeps insertion order among ties
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked.truncate(k);
    ranked
}

/// Knowledge store held entirely in memory. The first insert fixes the
/// embedding dimensionality.
#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    records: RwLock<Vec<(String, Vec<f32>)>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn insert(&self, content: &str, embedding: &[f32]) -> Result<()> {
        let mut records = self.records.write().await;
        if let Some((_, first)) = records.first() {
            if first.len() != embedding.len() {
                return Err(LumenError::Database(format!(
                    "embedding has {} dimensions, store expects {}",
                    embedding.len(),
                    first.len()
                )));
            }
        }
        records.push((content.to_string(), embedding.to_vec()));
        Ok(())
    }

    async fn query_top_k(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let records = self.records.read().await;
        let scored = records
            .iter()
            .map(|(content, embedding)| ScoredChunk {
                content: content.clone(),
                similarity: cosine_similarity(query, embedding),
            })
            .collect();
        Ok(rank(scored, k, min_similarity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_score_one() {
        let v = [0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_zero_norm_scores_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_mismatched_dimensions_rejected() {
        let store = InMemoryKnowledgeStore::new();
        store.insert("first", &[1.0, 0.0]).await.unwrap();

        let result = store.insert("wider", &[1.0, 0.0, 0.0]).await;
        assert!(matches!(result, Err(LumenError::Database(_))));
        assert_eq!(store.len().await, 1);
        store.insert("second", &[0.0, 1.0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_respects_threshold_limit_and_order() {
        let store = InMemoryKnowledgeStore::new();
        let vectors: [(&str, [f32; 2]); 7] = [
            ("east", [1.0, 0.0]),
            ("north", [0.0, 1.0]),
            ("west", [-1.0, 0.0]),
            ("north-east", [1.0, 1.0]),
            ("mostly-east", [1.0, 0.2]),
            ("slightly-east", [1.0, 0.9]),
            ("east-again", [2.0, 0.0]),
        ];
        for (content, embedding) in &vectors {
            store.insert(content, embedding).await.unwrap();
        }

        let query = [1.0, 0.1];
        for k in 0..=8 {
            for min in [-1.0, 0.0, 0.5, 0.9, 0.99] {
                let results = store.query_top_k(&query, k, min).await.unwrap();
                assert!(results.len() <= k);
                assert!(results.iter().all(|r| r.similarity > min));
                assert!(results
                    .windows(2)
                    .all(|w| w[0].similarity >= w[1].similarity));
            }
        }
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let store = InMemoryKnowledgeStore::new();
        store.insert("first", &[1.0, 0.0]).await.unwrap();
        store.insert("second", &[2.0, 0.0]).await.unwrap();
        store.insert("third", &[3.0, 0.0]).await.unwrap();

        let results = store.query_top_k(&[1.0, 0.0], 2, 0.5).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let store = InMemoryKnowledgeStore::new();
        store.insert("same", &[1.0]).await.unwrap();
        store.insert("same", &[1.0]).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.query_top_k(&[1.0], 4, 0.5).await.unwrap().len(), 2);
    }
}
