use std::sync::Arc;

use lumen_core::config::RetrievalConfig;
use lumen_core::error::Result;

use crate::service::chunker::chunk;
use crate::service::knowledge::{KnowledgeStore, ScoredChunk};
use crate::service::llm::Embedder;

pub const RESOURCE_CREATED: &str = "Resource successfully created and embedded.";

/// Ingests new knowledge and answers similarity queries against it.
pub struct RetrievalService {
    embedder: Arc<Embedder>,
    store: Arc<dyn KnowledgeStore>,
    top_k: usize,
    min_similarity: f32,
}

impl RetrievalService {
    pub fn new(
        embedder: Arc<Embedder>,
        store: Arc<dyn KnowledgeStore>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k: config.top_k,
            min_similarity: config.min_similarity,
        }
    }

    /// Chunk, embed in one batch, then insert each chunk.
    ///
    /// Nothing is inserted when the embedding call fails. Inserts are not
    /// transactional: a failure midway leaves the earlier chunks stored.
    pub async fn add_resource(&self, content: &str) -> Result<String> {
        let chunks = chunk(content);
        let embeddings = self.embedder.embed_batch(&chunks).await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            self.store.insert(chunk, embedding).await?;
        }

        tracing::info!(chunks = chunks.len(), "resource added to knowledge base");
        Ok(RESOURCE_CREATED.to_string())
    }

    /// The stored chunks most similar to `question`. An empty result is not an error.
    pub async fn get_information(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed_one(question).await?;
        let found = self
            .store
            .query_top_k(&query, self.top_k, self.min_similarity)
            .await?;
        tracing::debug!(found = found.len(), "knowledge base queried");
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::knowledge::InMemoryKnowledgeStore;
    use crate::testing::StubEmbedding;
    use async_trait::async_trait;
    use lumen_core::error::LumenError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Maps text to a vector by which topic it mentions.
    fn topic_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        if lower.contains("paris") || lower.contains("france") {
            vec![1.0, 0.0]
        } else {
            vec![0.0, 1.0]
        }
    }

    fn service(
        embedding: Arc<StubEmbedding>,
        store: Arc<dyn KnowledgeStore>,
    ) -> RetrievalService {
        RetrievalService::new(
            Arc::new(Embedder::new(embedding)),
            store,
            &RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_add_then_get_round_trip() {
        let embedding = Arc::new(StubEmbedding::new(topic_vector));
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let retrieval = service(embedding, store);

        let confirmation = retrieval
            .add_resource("Paris is the capital of France. Bananas are yellow.")
            .await
            .unwrap();
        assert_eq!(confirmation, RESOURCE_CREATED);

        let found = retrieval
            .get_information("What is the capital of France?")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].content.contains("Paris"));
        assert!((found[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_empty_content_skips_embedding() {
        let embedding = Arc::new(StubEmbedding::new(topic_vector));
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let retrieval = service(embedding.clone(), store.clone());

        let confirmation = retrieval.add_resource("  ").await.unwrap();

        assert_eq!(confirmation, RESOURCE_CREATED);
        assert_eq!(embedding.calls(), 0);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let embedding = Arc::new(StubEmbedding::new(topic_vector));
        let retrieval = service(embedding, Arc::new(InMemoryKnowledgeStore::new()));
        assert!(retrieval.get_information("anything").await.unwrap().is_empty());
    }

    /// Accepts a fixed number of inserts, then fails.
    struct FailingStore {
        inner: InMemoryKnowledgeStore,
        allowed: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl KnowledgeStore for FailingStore {
        async fn insert(&self, content: &str, embedding: &[f32]) -> Result<()> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(LumenError::Database("disk full".to_string()));
            }
            self.inner.insert(content, embedding).await
        }

        async fn query_top_k(
            &self,
            query: &[f32],
            k: usize,
            min_similarity: f32,
        ) -> Result<Vec<ScoredChunk>> {
            self.inner.query_top_k(query, k, min_similarity).await
        }
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_earlier_chunks() {
        let embedding = Arc::new(StubEmbedding::new(topic_vector));
        let store = Arc::new(FailingStore {
            inner: InMemoryKnowledgeStore::new(),
            allowed: 1,
            attempts: AtomicUsize::new(0),
        });
        let retrieval = service(embedding, store.clone());

        let result = retrieval.add_resource("one. two. three").await;

        assert!(matches!(result, Err(LumenError::Database(_))));
        assert_eq!(store.inner.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_embedding_inserts_nothing() {
        let embedding = Arc::new(StubEmbedding::new(topic_vector).truncating());
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let retrieval = service(embedding, store.clone());

        assert!(retrieval.add_resource("one. two").await.is_err());
        assert!(store.is_empty().await);
    }
}
