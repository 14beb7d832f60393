//! Conversation Persistence
//!
//! The orchestrator creates, loads, renames and deletes conversations
//! through [`ConversationRepository`]. Durable storage lives behind the
//! trait; this crate ships only [`InMemoryRepository`].

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{ChatError, ChatResult};
use crate::model::{Conversation, ConversationId, NewConversation};

/// Create/read/update/delete of conversations by identifier
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Create a conversation and return the stored record
    async fn create(&self, draft: NewConversation) -> ChatResult<Conversation>;

    /// Get a conversation, `None` if it does not exist
    async fn get(&self, id: &ConversationId) -> ChatResult<Option<Conversation>>;

    /// List all conversations, most recently updated first
    async fn list(&self) -> ChatResult<Vec<Conversation>>;

    /// Overwrite a stored conversation
    async fn update(&self, conversation: &Conversation) -> ChatResult<()>;

    /// Delete a conversation
    async fn delete(&self, id: &ConversationId) -> ChatResult<()>;
}

/// Process-local repository
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    conversations: DashMap<ConversationId, Conversation>,
}

impl InMemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the repository is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryRepository {
    async fn create(&self, draft: NewConversation) -> ChatResult<Conversation> {
        let conversation = Conversation::new(draft);
        tracing::debug!(
            conversation_id = %conversation.id,
            title = %conversation.title,
            "Created conversation"
        );
        self.conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn get(&self, id: &ConversationId) -> ChatResult<Option<Conversation>> {
        Ok(self.conversations.get(id).map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> ChatResult<Vec<Conversation>> {
        let mut all: Vec<Conversation> = self
            .conversations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }

    async fn update(&self, conversation: &Conversation) -> ChatResult<()> {
        match self.conversations.get_mut(&conversation.id) {
            Some(mut entry) => {
                *entry = conversation.clone();
                Ok(())
            }
            None => Err(ChatError::ConversationNotFound(conversation.id.clone())),
        }
    }

    async fn delete(&self, id: &ConversationId) -> ChatResult<()> {
        self.conversations
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))
    }
}
