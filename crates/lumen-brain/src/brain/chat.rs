use lumen_core::types::{
    new_message_id, to_chat_messages, ChatMessage, ChatRequest, Message, Part, Role,
    ToolCallPart, ToolResultPart,
};
use lumen_llm::provider::StreamDelta;
use serde_json::Value;
use tokio::sync::mpsc;

use super::Brain;
use crate::stream::{error_message, FinishReason, StreamEvent, StreamUsage, Thrown};
use crate::tool::ToolOutput;

/// Result of one generation.
#[derive(Debug, Clone)]
pub struct Generation {
    /// Assistant and tool messages produced, in order.
    pub messages: Vec<Message>,
    pub finish_reason: FinishReason,
    pub steps: usize,
}

impl Generation {
    fn failed(steps: usize) -> Self {
        Self {
            messages: Vec::new(),
            finish_reason: FinishReason::Error,
            steps,
        }
    }
}

fn to_stream_event(delta: StreamDelta) -> StreamEvent {
    match delta {
        StreamDelta::Text(text) => StreamEvent::Text(text),
        StreamDelta::Reasoning(text) => StreamEvent::Reasoning(text),
        StreamDelta::ToolCallStart { id, name } => StreamEvent::ToolCallStart {
            tool_call_id: id,
            tool_name: name,
        },
        StreamDelta::ToolCallArgs { id, delta } => StreamEvent::ToolCallDelta {
            tool_call_id: id,
            args_text_delta: delta,
        },
    }
}

impl Brain {
    /// Run the step loop under the configured wall-clock cap. Every event
    /// goes to `tx`; a closed receiver does not stop generation.
    pub async fn generate(
        &self,
        system: &str,
        history: &[Message],
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Generation {
        match tokio::time::timeout(self.max_duration, self.run_steps(system, history, tx)).await {
            Ok(generation) => generation,
            Err(_) => {
                tracing::warn!(
                    "generation exceeded {}s, abandoning",
                    self.max_duration.as_secs()
                );
                let thrown = Thrown::Text(format!(
                    "generation timed out after {}s",
                    self.max_duration.as_secs()
                ));
                let _ = tx.send(StreamEvent::Error(error_message(&thrown)));
                let _ = tx.send(StreamEvent::FinishMessage {
                    finish_reason: FinishReason::Error,
                    usage: StreamUsage::default(),
                });
                Generation::failed(0)
            }
        }
    }

    async fn run_steps(
        &self,
        system: &str,
        history: &[Message],
        tx: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Generation {
        let definitions = self.tools.definitions();
        let mut context = vec![ChatMessage::text("system", system)];
        context.extend(to_chat_messages(history));

        let mut produced = Vec::new();
        let mut usage = StreamUsage::default();
        let mut finish_reason = FinishReason::Stop;
        let mut steps = 0;

        while steps < self.max_steps {
            steps += 1;
            let message_id = new_message_id();
            let _ = tx.send(StreamEvent::StartStep {
                message_id: message_id.clone(),
            });

            let request = ChatRequest {
                messages: context.clone(),
                max_tokens: None,
                temperature: None,
            };
            let (delta_tx, mut delta_rx) = mpsc::unbounded_channel();
            let call = self.llm.chat_stream(request, &definitions, delta_tx);
            let forward = async {
                while let Some(delta) = delta_rx.recv().await {
                    let _ = tx.send(to_stream_event(delta));
                }
            };
            let (result, ()) = tokio::join!(call, forward);

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(step = steps, "model call failed: {e}");
                    let _ = tx.send(StreamEvent::Error(error_message(&Thrown::Error(Box::new(e)))));
                    let _ = tx.send(StreamEvent::FinishMessage {
                        finish_reason: FinishReason::Error,
                        usage,
                    });
                    return Generation::failed(steps);
                }
            };
            usage.add(response.usage.as_ref());
            tracing::debug!(
                step = steps,
                tool_calls = response.tool_calls.len(),
                "model step complete"
            );

            let mut assistant = Message::assistant(response.content.clone());
            assistant.id = message_id;

            if response.tool_calls.is_empty() {
                produced.push(assistant);
                finish_reason = FinishReason::Stop;
                let _ = tx.send(StreamEvent::FinishStep {
                    finish_reason,
                    usage,
                    is_continued: false,
                });
                break;
            }

            for call in &response.tool_calls {
                assistant.parts.push(Part::ToolCall(ToolCallPart {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                }));
                let _ = tx.send(StreamEvent::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                });
            }
            let mut assistant_context = ChatMessage::assistant_tool_calls(response.tool_calls.clone());
            assistant_context.content = response.content.clone();
            context.push(assistant_context);

            let mut tool_message = Message::text(Role::Tool, "");
            let mut awaiting_client = false;
            for call in &response.tool_calls {
                let (result, is_error) = match self.tools.execute(&call.name, &call.arguments).await {
                    Ok(ToolOutput::Value(value)) => (value, false),
                    Ok(ToolOutput::Client) => {
                        awaiting_client = true;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(tool = %call.name, "tool failed: {e}");
                        let message = error_message(&Thrown::Error(Box::new(e)));
                        (Value::String(message), true)
                    }
                };

                let _ = tx.send(StreamEvent::ToolResult {
                    tool_call_id: call.id.clone(),
                    result: result.clone(),
                });
                let part = ToolResultPart {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result,
                    is_error,
                };
                context.push(ChatMessage::tool_result(&call.id, part.result_text()));
                tool_message.parts.push(Part::ToolResult(part));
            }

            produced.push(assistant);
            if !tool_message.parts.is_empty() {
                produced.push(tool_message);
            }
            finish_reason = FinishReason::ToolCalls;
            let _ = tx.send(StreamEvent::FinishStep {
                finish_reason,
                usage,
                is_continued: false,
            });

            if awaiting_client {
                tracing::debug!(step = steps, "waiting for client-side tool result");
                break;
            }
        }

        if steps == self.max_steps && finish_reason == FinishReason::ToolCalls {
            tracing::info!(steps, "step budget exhausted");
        }

        let _ = tx.send(StreamEvent::FinishMessage {
            finish_reason,
            usage,
        });
        Generation {
            messages: produced,
            finish_reason,
            steps,
        }
    }
}
