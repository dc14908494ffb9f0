//! Data-stream wire format: one `<code>:<json>` line per event.

use std::any::Any;

use lumen_core::types::Usage;
use serde::Serialize;
use serde_json::{json, Value};

pub const DATA_STREAM_HEADER: &str = "x-vercel-ai-data-stream";
pub const DATA_STREAM_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl StreamUsage {
    pub fn add(&mut self, usage: Option<&Usage>) {
        if let Some(usage) = usage {
            self.prompt_tokens += usage.input_tokens;
            self.completion_tokens += usage.output_tokens;
        }
    }
}

/// One event of a streamed chat response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StartStep {
        message_id: String,
    },
    Text(String),
    Reasoning(String),
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },
    ToolCallDelta {
        tool_call_id: String,
        args_text_delta: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolResult {
        tool_call_id: String,
        result: Value,
    },
    Error(String),
    FinishStep {
        finish_reason: FinishReason,
        usage: StreamUsage,
        is_continued: bool,
    },
    /// Completion marker; always the last event of a response.
    FinishMessage {
        finish_reason: FinishReason,
        usage: StreamUsage,
    },
}

impl StreamEvent {
    fn code(&self) -> char {
        match self {
            Self::StartStep { .. } => 'f',
            Self::Text(_) => '0',
            Self::Reasoning(_) => 'g',
            Self::ToolCallStart { .. } => 'b',
            Self::ToolCallDelta { .. } => 'c',
            Self::ToolCall { .. } => '9',
            Self::ToolResult { .. } => 'a',
            Self::Error(_) => '3',
            Self::FinishStep { .. } => 'e',
            Self::FinishMessage { .. } => 'd',
        }
    }

    fn payload(&self) -> Value {
        match self {
            Self::StartStep { message_id } => json!({ "messageId": message_id }),
            Self::Text(text) | Self::Reasoning(text) | Self::Error(text) => json!(text),
            Self::ToolCallStart {
                tool_call_id,
                tool_name,
            } => json!({ "toolCallId": tool_call_id, "toolName": tool_name }),
            Self::ToolCallDelta {
                tool_call_id,
                args_text_delta,
            } => json!({ "toolCallId": tool_call_id, "argsTextDelta": args_text_delta }),
            Self::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => json!({ "toolCallId": tool_call_id, "toolName": tool_name, "args": args }),
            Self::ToolResult {
                tool_call_id,
                result,
            } => json!({ "toolCallId": tool_call_id, "result": result }),
            Self::FinishStep {
                finish_reason,
                usage,
                is_continued,
            } => json!({
                "finishReason": finish_reason,
                "usage": usage,
                "isContinued": is_continued,
            }),
            Self::FinishMessage {
                finish_reason,
                usage,
            } => json!({ "finishReason": finish_reason, "usage": usage }),
        }
    }

    /// Encode as a single newline-terminated line.
    pub fn encode(&self) -> String {
        format!("{}:{}\n", self.code(), self.payload())
    }
}

/// Something that went wrong during generation, as it was raised.
#[derive(Debug)]
pub enum Thrown {
    Missing,
    Text(String),
    Error(Box<dyn std::error::Error + Send + Sync>),
    Value(Value),
}

impl Thrown {
    /// Recover a message from a panic payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let payload = match payload.downcast::<String>() {
            Ok(s) => return Self::Text(*s),
            Err(other) => other,
        };
        let payload = match payload.downcast::<&'static str>() {
            Ok(s) => return Self::Text(s.to_string()),
            Err(other) => other,
        };
        match payload.downcast::<Value>() {
            Ok(v) => Self::Value(*v),
            Err(_) => Self::Missing,
        }
    }
}

/// Message shown to the client for an error.
pub fn error_message(thrown: &Thrown) -> String {
    match thrown {
        Thrown::Missing => "unknown error".to_string(),
        Thrown::Text(s) => s.clone(),
        Thrown::Error(e) => e.to_string(),
        Thrown::Value(v) => v.to_string(),
    }
}
