mod chat;

pub use chat::Generation;

use std::sync::Arc;
use std::time::Duration;

use lumen_core::types::Message;
use lumen_llm::provider::LlmProvider;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::service::conversation::ConversationStore;
use crate::stream::{error_message, FinishReason, StreamEvent, StreamUsage, Thrown};
use crate::tool::ToolRegistry;

/// System prompt for stored conversations: answers must come from the knowledge base.
pub const KNOWLEDGE_BASE_PROMPT: &str = r#"You are a helpful assistant. Check your knowledge base before answering any questions.
Only respond to questions using information from tool calls.
if no relevant information is found in the tool calls, respond, "Sorry, I don't know.""#;

/// System prompt for one-off message lists.
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant.";

/// One chat request, after its body shape has been recognised.
#[derive(Debug, Clone)]
pub enum Turn {
    /// A new message for a stored conversation. History is loaded before
    /// generation and saved after it.
    Conversation { id: String, message: Message },
    /// A complete message list supplied by the client. Nothing is loaded or saved.
    Messages(Vec<Message>),
}

/// Append a client message to history. A message carrying the id of a
/// stored message replaces it in place (the client resends an assistant
/// message once it has filled in a client-side tool result, and a server
/// tool result from the same step may already follow it).
pub fn append_client_message(mut history: Vec<Message>, message: Message) -> Vec<Message> {
    match history.iter().rposition(|m| m.id == message.id) {
        Some(index) => history[index] = message,
        None => history.push(message),
    }
    history
}

/// The conversation orchestrator: runs the bounded tool-calling loop for a
/// turn and persists the outcome.
pub struct Brain {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    conversations: Arc<dyn ConversationStore>,
    max_steps: usize,
    max_duration: Duration,
}

impl Brain {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        conversations: Arc<dyn ConversationStore>,
        max_steps: usize,
        max_duration: Duration,
    ) -> Self {
        Self {
            llm,
            tools,
            conversations,
            max_steps,
            max_duration,
        }
    }

    /// Start a turn in the background and return the handle of its
    /// completion observer.
    ///
    /// Generation runs in its own task. The observer waits for it and saves
    /// history, so dropping the receiving end of `tx` cancels neither.
    pub fn start(self: &Arc<Self>, turn: Turn, tx: mpsc::UnboundedSender<StreamEvent>) -> JoinHandle<()> {
        let brain = Arc::clone(self);
        tokio::spawn(async move { brain.observe(turn, tx).await })
    }

    async fn observe(self: Arc<Self>, turn: Turn, tx: mpsc::UnboundedSender<StreamEvent>) {
        let (conversation_id, system, history) = match turn {
            Turn::Conversation { id, message } => match self.conversations.load(&id).await {
                Ok(previous) => {
                    let history = append_client_message(previous, message);
                    (Some(id), KNOWLEDGE_BASE_PROMPT, history)
                }
                Err(e) => {
                    tracing::error!(chat_id = %id, "failed to load history: {e}");
                    fail(&tx, Thrown::Error(Box::new(e)));
                    return;
                }
            },
            Turn::Messages(messages) => (None, DEFAULT_PROMPT, messages),
        };

        let generation = {
            let brain = Arc::clone(&self);
            let history = history.clone();
            let tx = tx.clone();
            tokio::spawn(async move { brain.generate(system, &history, &tx).await })
        };

        let generation = match generation.await {
            Ok(generation) => generation,
            Err(e) => {
                let thrown = if e.is_panic() {
                    Thrown::from_panic(e.into_panic())
                } else {
                    Thrown::Missing
                };
                tracing::error!("generation task failed: {}", error_message(&thrown));
                fail(&tx, thrown);
                return;
            }
        };

        tracing::info!(
            steps = generation.steps,
            finish_reason = ?generation.finish_reason,
            "generation finished"
        );

        let Some(id) = conversation_id else {
            return;
        };
        if generation.finish_reason == FinishReason::Error {
            tracing::warn!(chat_id = %id, "generation failed, history not saved");
            return;
        }

        let mut updated = history;
        updated.extend(generation.messages);
        match self.conversations.save(&id, &updated).await {
            Ok(()) => tracing::debug!(chat_id = %id, messages = updated.len(), "history saved"),
            Err(e) => tracing::error!(chat_id = %id, "failed to save history: {e}"),
        }
    }
}

fn fail(tx: &mpsc::UnboundedSender<StreamEvent>, thrown: Thrown) {
    let _ = tx.send(StreamEvent::Error(error_message(&thrown)));
    let _ = tx.send(StreamEvent::FinishMessage {
        finish_reason: FinishReason::Error,
        usage: StreamUsage::default(),
    });
}
