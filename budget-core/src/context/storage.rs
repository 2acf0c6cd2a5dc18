use super::Conversation;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence collaborator for conversations.
///
/// A conversation owns its turns; deleting it deletes them.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>>;
    async fn save(&self, conversation: &Conversation) -> Result<()>;
    async fn delete(&self, conversation_id: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn load(&self, conversation_id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(conversation_id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation.clone());
        Ok(())
    }

    async fn delete(&self, conversation_id: &str) -> Result<bool> {
        Ok(self.conversations.write().await.remove(conversation_id).is_some())
    }
}
