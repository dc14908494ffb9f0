use std::collections::HashMap;

use async_trait::async_trait;
use lumen_core::error::Result;
use lumen_core::types::Message;
use tokio::sync::RwLock;

/// Ordered message history per conversation id.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// History for `id`; an unknown id is an empty conversation.
    async fn load(&self, id: &str) -> Result<Vec<Message>>;

    /// Replace the whole history for `id`.
    async fn save(&self, id: &str, messages: &[Message]) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    chats: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(&self, id: &str) -> Result<Vec<Message>> {
        Ok(self.chats.read().await.get(id).cloned().unwrap_or_default())
    }

    async fn save(&self, id: &str, messages: &[Message]) -> Result<()> {
        self.chats
            .write()
            .await
            .insert(id.to_string(), messages.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_id_is_empty() {
        let store = InMemoryConversationStore::new();
        assert!(store.load("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryConversationStore::new();
        store
            .save("c1", &[Message::user("one"), Message::assistant("two")])
            .await
            .unwrap();
        store.save("c1", &[Message::user("three")]).await.unwrap();

        let history = store.load("c1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "three");
    }
}
