use std::sync::Arc;

use lumen_core::config::Config;
use lumen_core::error::{LumenError, Result};
use lumen_llm::ollama::{OllamaEmbedding, OllamaLlm};
use lumen_llm::openai::{OpenAiEmbedding, OpenAiLlm};
use lumen_llm::provider::{EmbeddingProvider, LlmProvider};

/// Maps text to vectors through the configured embedding provider.
///
/// Errors from the provider propagate unchanged; there is no retry here.
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }

    /// Embed every text in one remote call, returning vectors in input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        tracing::debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            count = refs.len(),
            "embedding batch"
        );
        let vectors = self.provider.embed(&refs).await?;

        if vectors.len() != texts.len() {
            return Err(LumenError::Embedding(format!(
                "expected {} vectors, provider returned {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    /// Embed a single query. The literal two-character sequence `\n` is
    /// replaced by a space before the text is sent.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let input = text.replace("\\n", " ");
        tracing::debug!(
            provider = self.provider.name(),
            model = self.provider.model(),
            "embedding query"
        );
        self.provider
            .embed(&[input.as_str()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| LumenError::Embedding("no embedding returned".to_string()))
    }
}

/// Build the chat model named by `[llm] provider`.
pub fn create_llm(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    let llm = &config.llm;
    match llm.provider.as_str() {
        "openai" => Ok(Arc::new(
            OpenAiLlm::new(llm.api_key.clone(), llm.model.clone()).with_base_url(&llm.base_url),
        )),
        "ollama" => Ok(Arc::new(OllamaLlm::new(
            config.ollama.base_url.clone(),
            llm.model.clone(),
        ))),
        other => Err(LumenError::Config(format!(
            "unknown LLM provider: '{other}'. Supported: openai, ollama"
        ))),
    }
}

/// Build the embedding model named by `[embedding] provider`.
pub fn create_embedding(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiEmbedding::new(
            embedding.api_key.clone(),
            embedding.model.clone(),
            embedding.dimensions,
        ))),
        "ollama" => Ok(Arc::new(OllamaEmbedding::new(
            config.ollama.base_url.clone(),
            embedding.model.clone(),
            embedding.dimensions,
        ))),
        other => Err(LumenError::Config(format!(
            "unknown embedding provider: '{other}'. Supported: openai, ollama"
        ))),
    }
}
