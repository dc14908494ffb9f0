use std::collections::{HashMap, HashSet};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

const MESSAGE_ID_PREFIX: &str = "msgs";
const MESSAGE_ID_SIZE: usize = 16;

/// Generate an id of the form `{prefix}-` followed by 16 random alphanumerics.
pub fn new_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(MESSAGE_ID_SIZE)
        .map(char::from)
        .collect();
    format!("{prefix}-{suffix}")
}

/// Generate a server-side message id.
pub fn new_message_id() -> String {
    new_id(MESSAGE_ID_PREFIX)
}

/// Unix epoch timestamp in seconds.
pub fn now_unix() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPart {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPart {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResultPart {
    /// The result as text for the provider: strings pass through, anything
    /// else is serialized as JSON.
    pub fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Part {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool-call")]
    ToolCall(ToolCallPart),
    #[serde(rename = "tool-result")]
    ToolResult(ToolResultPart),
}

/// Keep the parts that parse. Clients also send part types the server has
/// no use for (`step-start`, `reasoning`, `source`, ...); those are dropped.
fn deserialize_parts<'de, D>(deserializer: D) -> Result<Vec<Part>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect())
}

/// A conversation message as stored and as exchanged with the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(
        default,
        deserialize_with = "deserialize_parts",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub parts: Vec<Part>,
}

impl Message {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
            parts: vec![],
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallPart> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolCall(call) => Some(call),
            _ => None,
        })
    }

    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResultPart> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    /// `content`, or the joined text parts when a client only sent parts.
    pub fn text_content(&self) -> String {
        if !self.content.is_empty() {
            return self.content.clone();
        }
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Convert conversation history into provider messages.
///
/// Each tool call is emitted once, at its first occurrence, and its result
/// follows immediately. A client that resends an assistant message with
/// its client-side results can therefore repeat calls and results already
/// stored. Calls that never received a result (an unanswered client-side
/// tool) are dropped, as are results with no call.
pub fn to_chat_messages(history: &[Message]) -> Vec<ChatMessage> {
    let mut results: HashMap<&str, &ToolResultPart> = HashMap::new();
    for result in history.iter().flat_map(|m| m.tool_results()) {
        results.entry(result.tool_call_id.as_str()).or_insert(result);
    }

    let mut emitted: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(history.len());
    for message in history {
        let answered: Vec<(&ToolCallPart, &ToolResultPart)> = message
            .tool_calls()
            .filter_map(|c| {
                let result = results.get(c.tool_call_id.as_str())?;
                emitted.insert(c.tool_call_id.as_str()).then_some((c, *result))
            })
            .collect();
        let content = message.text_content();

        if !answered.is_empty() {
            let calls = answered
                .iter()
                .map(|(c, _)| ToolCallRequest {
                    id: c.tool_call_id.clone(),
                    name: c.tool_name.clone(),
                    arguments: c.args.clone(),
                })
                .collect();
            let mut assistant = ChatMessage::assistant_tool_calls(calls);
            assistant.content = content;
            out.push(assistant);
            for (call, result) in answered {
                out.push(ChatMessage::tool_result(&call.tool_call_id, result.result_text()));
            }
        } else if !content.is_empty() || message.parts.is_empty() {
            out.push(ChatMessage::text(message.role.as_str(), content));
        }
    }
    out
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    /// Tool calls made by the assistant (non-empty when role="assistant" and LLM wants to call tools).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// The tool call ID this message is a result for (set when role="tool").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    /// Create a plain text message (no tool calls).
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Create an assistant message with tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: String::new(),
            tool_calls,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Option<Usage>,
}

/// Definition of a tool that can be called by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
