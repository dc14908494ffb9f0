use async_trait::async_trait;
use lumen_core::error::{LumenError, Result};
use lumen_core::types::{
    new_id, ChatMessage, ChatRequest, ChatResponse, ToolCallRequest, ToolDefinition, Usage,
};
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::provider::{EmbeddingProvider, LlmProvider};

fn llm_error(message: String) -> LumenError {
    LumenError::Llm {
        provider: "ollama".to_string(),
        message,
    }
}

/// Ollama local LLM chat provider.
pub struct OllamaLlm {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaLlm {
    /// Create a new Ollama LLM provider.
    ///
    /// # Arguments
    /// * `base_url` - Ollama server URL (e.g. "http://localhost:11434")
    /// * `model` - Model identifier (e.g. "llama3.1")
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
        }
    }

    /// Ollama takes tool-call arguments as objects, not JSON strings.
    fn build_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                if m.tool_calls.is_empty() {
                    json!({ "role": m.role, "content": m.content })
                } else {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|tc| json!({ "function": { "name": tc.name, "arguments": tc.arguments } }))
                        .collect();
                    json!({ "role": "assistant", "content": m.content, "tool_calls": calls })
                }
            })
            .collect()
    }
}

/// Extract `message.tool_calls`. Ollama does not assign call ids, so each
/// call gets a fresh one.
fn parse_tool_calls(message: &Value) -> Vec<ToolCallRequest> {
    message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let name = tc["function"]["name"].as_str()?;
                    let arguments = match &tc["function"]["arguments"] {
                        Value::Null => json!({}),
                        Value::String(raw) => serde_json::from_str(raw)
                            .unwrap_or_else(|_| Value::String(raw.clone())),
                        other => other.clone(),
                    };
                    Some(ToolCallRequest {
                        id: new_id("call"),
                        name: name.to_string(),
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LlmProvider for OllamaLlm {
    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert("messages".to_string(), json!(Self::build_messages(&request.messages)));
        body.insert("stream".to_string(), json!(false));

        if !tools.is_empty() {
            let tools: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body.insert("tools".to_string(), json!(tools));
        }

        if let Some(temp) = request.temperature {
            body.insert("options".to_string(), json!({ "temperature": temp }));
        }

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&Value::Object(body))
            .send()
            .await
            .map_err(|e| llm_error(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        let response_text = response
            .text()
            .await
            .map_err(|e| llm_error(format!("failed to read response body: {e}")))?;

        if !(200..300).contains(&status) {
            return Err(LumenError::Http {
                status,
                body: response_text,
            });
        }

        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| llm_error(format!("failed to parse response JSON: {e}")))?;

        let message = &parsed["message"];
        if message.is_null() {
            return Err(llm_error("missing message in response".to_string()));
        }
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["thinking"].as_str().unwrap_or("").to_string();
        let tool_calls = parse_tool_calls(message);

        let usage = match (
            parsed["prompt_eval_count"].as_u64(),
            parsed["eval_count"].as_u64(),
        ) {
            (Some(input), Some(output)) => Some(Usage {
                input_tokens: input as u32,
                output_tokens: output as u32,
            }),
            _ => None,
        };

        Ok(ChatResponse {
            content,
            reasoning,
            tool_calls,
            usage,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Ollama local embedding provider.
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dims: usize,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding provider.
    ///
    /// # Arguments
    /// * `base_url` - Ollama server URL (e.g. "http://localhost:11434")
    /// * `model` - Embedding model identifier (e.g. "nomic-embed-text")
    /// * `dims` - Expected embedding dimensionality (e.g. 768)
    pub fn new(base_url: String, model: String, dims: usize) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
            dims,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LumenError::Embedding(format!("ollama request failed: {e}")))?;

        let status = response.status().as_u16();
        let response_text = response.text().await.map_err(|e| {
            LumenError::Embedding(format!("ollama failed to read response body: {e}"))
        })?;

        if !(200..300).contains(&status) {
            return Err(LumenError::Http {
                status,
                body: response_text,
            });
        }

        let parsed: Value = serde_json::from_str(&response_text).map_err(|e| {
            LumenError::Embedding(format!("ollama failed to parse response JSON: {e}"))
        })?;

        let embeddings_arr = parsed["embeddings"].as_array().ok_or_else(|| {
            LumenError::Embedding("missing embeddings array in ollama response".to_string())
        })?;

        embeddings_arr
            .iter()
            .map(|item| {
                item.as_array()
                    .ok_or_else(|| {
                        LumenError::Embedding(
                            "expected array for embedding in ollama response".to_string(),
                        )
                    })?
                    .iter()
                    .map(|v| {
                        v.as_f64().map(|f| f as f32).ok_or_else(|| {
                            LumenError::Embedding(
                                "non-numeric value in ollama embedding array".to_string(),
                            )
                        })
                    })
                    .collect::<Result<Vec<f32>>>()
            })
            .collect()
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
