//! Stub providers shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use lumen_core::error::Result;
use lumen_core::types::{ChatRequest, ChatResponse, ToolCallRequest, ToolDefinition};
use lumen_llm::provider::{EmbeddingProvider, LlmProvider};
use serde_json::Value;

type EmbedFn = Box<dyn Fn(&str) -> Vec<f32> + Send + Sync>;

pub struct StubEmbedding {
    embed: EmbedFn,
    truncate: bool,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl StubEmbedding {
    pub fn new(embed: impl Fn(&str) -> Vec<f32> + Send + Sync + 'static) -> Self {
        Self {
            embed: Box::new(embed),
            truncate: false,
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Return one vector fewer than requested.
    pub fn truncating(mut self) -> Self {
        self.truncate = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedding {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .unwrap()
            .extend(texts.iter().map(|t| t.to_string()));
        let mut out: Vec<Vec<f32>> = texts.iter().map(|t| (self.embed)(t)).collect();
        if self.truncate {
            out.pop();
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-embedding"
    }
}

type RespondFn = Box<dyn Fn(usize, &ChatRequest) -> Result<ChatResponse> + Send + Sync>;

/// A chat model whose reply to the n-th call (0-based) is scripted.
pub struct StubLlm {
    respond: RespondFn,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubLlm {
    pub fn new(
        respond: impl Fn(usize, &ChatRequest) -> Result<ChatResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    async fn chat_with_tools(
        &self,
        request: ChatRequest,
        _tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = (self.respond)(n, &request);
        self.requests.lock().unwrap().push(request);
        response
    }

    fn name(&self) -> &str {
        "stub"
    }
}

pub fn text_reply(content: &str) -> ChatResponse {
    ChatResponse {
        content: content.to_string(),
        ..Default::default()
    }
}

pub fn tool_reply(id: &str, name: &str, arguments: Value) -> ChatResponse {
    ChatResponse {
        tool_calls: vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
        ..Default::default()
    }
}
