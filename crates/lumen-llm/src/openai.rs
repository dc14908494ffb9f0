use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use lumen_core::error::{LumenError, Result};
use lumen_core::types::{
    new_id, ChatMessage, ChatRequest, ChatResponse, ToolCallRequest, ToolDefinition, Usage,
};
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::provider::{EmbeddingProvider, LlmProvider, StreamDelta};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn llm_error(message: String) -> LumenError {
    LumenError::Llm {
        provider: "openai".to_string(),
        message,
    }
}

/// Parse streamed or complete tool-call arguments. An empty string means no
/// arguments; text that is not JSON is kept as a string so the tool layer
/// can report a validation error to the model.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_usage(parsed: &Value) -> Option<Usage> {
    match (
        parsed["usage"]["prompt_tokens"].as_u64(),
        parsed["usage"]["completion_tokens"].as_u64(),
    ) {
        (Some(input), Some(output)) => Some(Usage {
            input_tokens: input as u32,
            output_tokens: output as u32,
        }),
        _ => None,
    }
}

/// OpenAI chat completion provider. Also works against any
/// OpenAI-compatible endpoint via [`OpenAiLlm::with_base_url`].
pub struct OpenAiLlm {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiLlm {
    /// Create a new OpenAI LLM provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Model identifier (e.g. "gpt-4o")
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    /// Point the provider at another OpenAI-compatible endpoint. An empty
    /// string keeps the default.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        if !base_url.is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    /// Build the messages array, including assistant tool calls and tool results.
    fn build_messages(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|m| {
                if !m.tool_calls.is_empty() {
                    let calls: Vec<Value> = m
                        .tool_calls
                        .iter()
                        .map(|tc| {
                            json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                },
                            })
                        })
                        .collect();
                    let content = if m.content.is_empty() {
                        Value::Null
                    } else {
                        json!(m.content)
                    };
                    json!({ "role": "assistant", "content": content, "tool_calls": calls })
                } else if let Some(id) = &m.tool_call_id {
                    json!({ "role": "tool", "tool_call_id": id, "content": m.content })
                } else {
                    json!({ "role": m.role, "content": m.content })
                }
            })
            .collect()
    }

    fn build_body(&self, request: &ChatRequest, tools: &[ToolDefinition], stream: bool) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert("messages".to_string(), json!(Self::build_messages(&request.messages)));

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
        if let Some(max_tokens) = request.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if let Some(temp) = request.temperature {
            body.insert("temperature".to_string(), json!(temp));
        }
        if stream {
            body.insert("stream".to_string(), json!(true));
            body.insert("stream_options".to_string(), json!({ "include_usage": true }));
        }
        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| llm_error(format!("request failed: {e}")))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(LumenError::Http { status, body });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for OpenAiLlm {
    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let body = self.build_body(&request, tools, false);
        let response = self.post(&body).await?;
        let response_text = response
            .text()
            .await
            .map_err(|e| llm_error(format!("failed to read response body: {e}")))?;

        let parsed: Value = serde_json::from_str(&response_text)
            .map_err(|e| llm_error(format!("failed to parse response JSON: {e}")))?;

        let message = parsed["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .map(|choice| &choice["message"])
            .ok_or_else(|| llm_error("missing choices[0].message in response".to_string()))?;

        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();
        let tool_calls = message["tool_calls"]
            .as_array()
            .map(|calls| {
                calls
                    .iter()
                    .map(|tc| ToolCallRequest {
                        id: tc["id"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| new_id("call")),
                        name: tc["function"]["name"].as_str().unwrap_or("").to_string(),
                        arguments: parse_arguments(
                            tc["function"]["arguments"].as_str().unwrap_or(""),
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            content,
            reasoning,
            tool_calls,
            usage: parse_usage(&parsed),
        })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
        tools: &[ToolDefinition],
        tx: mpsc::UnboundedSender<StreamDelta>,
    ) -> Result<ChatResponse> {
        let body = self.build_body(&request, tools, true);
        let response = self.post(&body).await?;

        let mut state = StreamState::default();
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| llm_error(format!("stream read error: {e}")))?;
            buffer.extend_from_slice(&chunk);

            // SSE: one `data: <json>` per line, terminated by `data: [DONE]`
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                if state.process_line(&line, &tx) {
                    break 'read;
                }
            }
        }

        Ok(state.finish())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates a streamed chat completion.
#[derive(Debug, Default)]
struct StreamState {
    content: String,
    reasoning: String,
    /// Partial calls keyed by the provider's `index`.
    calls: BTreeMap<u64, PartialToolCall>,
    usage: Option<Usage>,
}

impl StreamState {
    /// Handle one SSE line. Returns true once the terminal `[DONE]` marker is seen.
    fn process_line(&mut self, line: &str, tx: &mpsc::UnboundedSender<StreamDelta>) -> bool {
        let Some(data) = line.trim().strip_prefix("data:") else {
            return false;
        };
        let data = data.trim();
        if data == "[DONE]" {
            return true;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(chunk) => self.apply(&chunk, tx),
            Err(e) => tracing::debug!("openai: skipping unparsable stream chunk: {e}"),
        }
        false
    }

    fn apply(&mut self, chunk: &Value, tx: &mpsc::UnboundedSender<StreamDelta>) {
        if let Some(usage) = parse_usage(chunk) {
            self.usage = Some(usage);
        }

        let Some(delta) = chunk["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .map(|choice| &choice["delta"])
        else {
            return;
        };

        if let Some(text) = delta["content"].as_str().filter(|t| !t.is_empty()) {
            self.content.push_str(text);
            let _ = tx.send(StreamDelta::Text(text.to_string()));
        }

        if let Some(text) = delta["reasoning_content"].as_str().filter(|t| !t.is_empty()) {
            self.reasoning.push_str(text);
            let _ = tx.send(StreamDelta::Reasoning(text.to_string()));
        }

        let Some(calls) = delta["tool_calls"].as_array() else {
            return;
        };
        for call in calls {
            let index = call["index"].as_u64().unwrap_or(0);
            let slot = self.calls.entry(index).or_default();

            if let Some(id) = call["id"].as_str() {
                slot.id = id.to_string();
            }
            if slot.id.is_empty() {
                slot.id = new_id("call");
            }
            if let Some(name) = call["function"]["name"].as_str().filter(|n| !n.is_empty()) {
                slot.name = name.to_string();
                let _ = tx.send(StreamDelta::ToolCallStart {
                    id: slot.id.clone(),
                    name: slot.name.clone(),
                });
            }
            if let Some(args) = call["function"]["arguments"].as_str().filter(|a| !a.is_empty()) {
                slot.arguments.push_str(args);
                let _ = tx.send(StreamDelta::ToolCallArgs {
                    id: slot.id.clone(),
                    delta: args.to_string(),
                });
            }
        }
    }

    fn finish(self) -> ChatResponse {
        let tool_calls = self
            .calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|c| ToolCallRequest {
                arguments: parse_arguments(&c.arguments),
                id: c.id,
                name: c.name,
            })
            .collect();

        ChatResponse {
            content: self.content,
            reasoning: self.reasoning,
            tool_calls,
            usage: self.usage,
        }
    }
}

/// OpenAI embedding provider.
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding provider.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `model` - Embedding model identifier (e.g. "text-embedding-ada-002")
    /// * `dims` - Expected embedding dimensionality (e.g. 1536)
    pub fn new(api_key: String, model: String, dims: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            dims,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{OPENAI_BASE_URL}/embeddings"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LumenError::Embedding(format!("openai request failed: {e}")))?;

        let status = response.status().as_u16();
        let response_text = response.text().await.map_err(|e| {
            LumenError::Embedding(format!("openai failed to read response body: {e}"))
        })?;

        if !(200..300).contains(&status) {
            return Err(LumenError::Http {
                status,
                body: response_text,
            });
        }

        let parsed: Value = serde_json::from_str(&response_text).map_err(|e| {
            LumenError::Embedding(format!("openai failed to parse response JSON: {e}"))
        })?;

        parse_embeddings(&parsed)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Extract `data[].embedding` ordered by each item's `index`.
fn parse_embeddings(parsed: &Value) -> Result<Vec<Vec<f32>>> {
    let data = parsed["data"]
        .as_array()
        .ok_or_else(|| LumenError::Embedding("missing data array in response".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
        let embedding = item["embedding"]
            .as_array()
            .ok_or_else(|| LumenError::Embedding("missing embedding array in data item".to_string()))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| {
                        LumenError::Embedding("non-numeric value in embedding array".to_string())
                    })
            })
            .collect::<Result<Vec<f32>>>()?;
        indexed.push((index, embedding));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, embedding)| embedding).collect())
}
