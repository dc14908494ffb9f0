use async_trait::async_trait;
use lumen_core::error::Result;
use lumen_core::types::{ChatRequest, ChatResponse, ToolDefinition};
use tokio::sync::mpsc;

/// An incremental piece of a streamed model response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Text(String),
    Reasoning(String),
    /// The model started emitting a tool call.
    ToolCallStart { id: String, name: String },
    /// A fragment of a tool call's JSON arguments.
    ToolCallArgs { id: String, delta: String },
}

/// Trait for LLM chat completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat request with tool definitions. The LLM may return tool calls
    /// in the response's `tool_calls` field instead of (or alongside) text content.
    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse>;

    /// Stream a chat response, sending deltas through the channel as they
    /// arrive. Returns the assembled response once the provider is done.
    ///
    /// A closed receiver is not an error: generation runs to completion
    /// whether or not anyone is still listening.
    /// Default implementation falls back to non-streaming `chat_with_tools`.
    async fn chat_stream(
        &self,
        request: ChatRequest,
        tools: &[ToolDefinition],
        tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> Result<ChatResponse> {
        let response = self.chat_with_tools(request, tools).await?;
        if !response.reasoning.is_empty() {
            let _ = tx.send(StreamDelta::Reasoning(response.reasoning.clone()));
        }
        if !response.content.is_empty() {
            let _ = tx.send(StreamDelta::Text(response.content.clone()));
        }
        Ok(response)
    }

    /// Return the provider name (e.g. "openai", "ollama").
    fn name(&self) -> &str;
}

/// Trait for text embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one or more text strings in a single request, one vector per
    /// input in input order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Return the dimensionality of the embedding vectors.
    fn dimensions(&self) -> usize;

    /// Return the provider name (e.g. "openai", "ollama").
    fn name(&self) -> &str;

    /// Return the embedding model identifier.
    fn model(&self) -> &str;
}
