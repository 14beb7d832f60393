//! Conversation Store
//!
//! Explicit state container for the conversation list, the current
//! conversation and the session flags. Every change goes through a named
//! transition; readers get borrowed views.
//!
//! The current conversation is held as an identifier into the collection,
//! never as a second copy, so a message added "to the current conversation"
//! is by construction visible in the collection too.
//!
//! The store itself is synchronous. Async callers share it as a
//! [`SharedStore`] and take the lock only between awaits.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ChatError, ChatResult};
use crate::model::{
    Conversation, ConversationId, ConversationPayload, Message, MessageId, MessageStatus,
    Settings,
};

/// Store handle shared between the orchestrator and presentation layers
pub type SharedStore = Arc<Mutex<ConversationStore>>;

/// Conversation state container
#[derive(Clone, Debug, Default)]
pub struct ConversationStore {
    /// All known conversations, newest first
    conversations: Vec<Conversation>,
    /// Currently selected conversation
    current_id: Option<ConversationId>,
    /// A list/load operation is running
    loading: bool,
    /// A send is running
    sending: bool,
    /// Last reported error (last write wins)
    error: Option<String>,
}

impl ConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in a [`SharedStore`]
    #[must_use]
    pub fn shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// All conversations
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Conversation by ID
    #[must_use]
    pub fn conversation(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| &c.id == id)
    }

    /// Identifier of the current conversation
    #[must_use]
    pub fn current_id(&self) -> Option<&ConversationId> {
        self.current_id.as_ref()
    }

    /// The current conversation
    #[must_use]
    pub fn current(&self) -> Option<&Conversation> {
        self.current_id.as_ref().and_then(|id| self.conversation(id))
    }

    /// Whether a load is running
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Whether a send is running
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Last reported error
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn conversation_mut(&mut self, id: &ConversationId) -> ChatResult<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))
    }

    fn current_id_or_err(&self) -> ChatResult<ConversationId> {
        self.current_id
            .clone()
            .ok_or(ChatError::NoActiveConversation)
    }

    // ========================================================================
    // Conversation transitions
    // ========================================================================

    /// Replace the whole collection
    ///
    /// The current selection survives only if it is still in the new set.
    pub fn set_all_conversations(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        if let Some(id) = &self.current_id {
            if self.conversation(id).is_none() {
                self.current_id = None;
            }
        }
    }

    /// Add a conversation at the front, replacing one with the same ID
    pub fn add_conversation(&mut self, conversation: Conversation) {
        self.conversations.retain(|c| c.id != conversation.id);
        self.conversations.insert(0, conversation);
    }

    /// Replace a conversation record
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] if the ID is unknown.
    pub fn update_conversation(&mut self, conversation: Conversation) -> ChatResult<()> {
        let slot = self.conversation_mut(&conversation.id)?;
        *slot = conversation;
        Ok(())
    }

    /// Overwrite a conversation's record fields with an authoritative payload
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] if the ID is unknown.
    pub fn apply_conversation_payload(
        &mut self,
        id: &ConversationId,
        payload: &ConversationPayload,
    ) -> ChatResult<()> {
        self.conversation_mut(id)?.apply_payload(payload);
        Ok(())
    }

    /// Remove a conversation and its messages
    ///
    /// Clears the current pointer if it pointed here.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] if the ID is unknown.
    pub fn delete_conversation(&mut self, id: &ConversationId) -> ChatResult<Conversation> {
        let index = self
            .conversations
            .iter()
            .position(|c| &c.id == id)
            .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))?;

        if self.current_id.as_ref() == Some(id) {
            self.current_id = None;
        }
        Ok(self.conversations.remove(index))
    }

    /// Select a conversation, or clear the selection with `None`
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] if the ID is unknown.
    pub fn set_current_conversation(&mut self, id: Option<ConversationId>) -> ChatResult<()> {
        if let Some(ref id) = id {
            if self.conversation(id).is_none() {
                return Err(ChatError::ConversationNotFound(id.clone()));
            }
        }
        self.current_id = id;
        Ok(())
    }

    /// Shallow-merge into the current conversation's settings
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveConversation`] without a selection.
    pub fn update_settings(&mut self, settings: Settings) -> ChatResult<()> {
        let id = self.current_id_or_err()?;
        let conversation = self.conversation_mut(&id)?;
        for (key, value) in settings {
            conversation.settings.insert(key, value);
        }
        conversation.updated_at = chrono::Utc::now();
        Ok(())
    }

    // ========================================================================
    // Message transitions
    // ========================================================================

    /// Append a message to the current conversation
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveConversation`] without a selection.
    pub fn add_message(&mut self, message: Message) -> ChatResult<()> {
        let id = self.current_id_or_err()?;
        self.add_message_to(&id, message)
    }

    /// Append a message to a specific conversation
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] if the ID is unknown.
    pub fn add_message_to(&mut self, id: &ConversationId, message: Message) -> ChatResult<()> {
        let conversation = self.conversation_mut(id)?;
        conversation.messages.push(message);
        conversation.recompute_aggregates();
        Ok(())
    }

    /// Replace the message `target` with `replacement`, keeping its position
    ///
    /// The replacement may carry a different identifier (a server-assigned
    /// one replacing a placeholder) but not a different role, and its status
    /// must be a valid step from the current one.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MessageNotFound`], [`ChatError::RoleChanged`] or
    /// [`ChatError::InvalidTransition`].
    pub fn update_message(
        &mut self,
        id: &ConversationId,
        target: &MessageId,
        replacement: Message,
    ) -> ChatResult<()> {
        let conversation = self.conversation_mut(id)?;
        let slot = conversation
            .messages
            .iter_mut()
            .find(|m| &m.id == target)
            .ok_or_else(|| ChatError::MessageNotFound(target.clone()))?;

        if slot.role != replacement.role {
            return Err(ChatError::RoleChanged(target.clone()));
        }
        if !slot.status.can_transition_to(replacement.status) {
            return Err(ChatError::InvalidTransition {
                from: slot.status,
                to: replacement.status,
            });
        }

        *slot = replacement;
        conversation.recompute_aggregates();
        Ok(())
    }

    /// Overwrite a message's content, leaving its status alone
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::MessageNotFound`] if either ID is unknown.
    pub fn set_message_content(
        &mut self,
        id: &ConversationId,
        target: &MessageId,
        content: &str,
    ) -> ChatResult<()> {
        let message = self.message_mut(id, target)?;
        content.clone_into(&mut message.content);
        message.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Move a message to `failed`, keeping whatever content it has
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidTransition`] if the message already
    /// completed.
    pub fn fail_message(&mut self, id: &ConversationId, target: &MessageId) -> ChatResult<()> {
        self.message_mut(id, target)?
            .transition(MessageStatus::Failed)
    }

    fn message_mut(&mut self, id: &ConversationId, target: &MessageId) -> ChatResult<&mut Message> {
        self.conversation_mut(id)?
            .messages
            .iter_mut()
            .find(|m| &m.id == target)
            .ok_or_else(|| ChatError::MessageNotFound(target.clone()))
    }

    // ========================================================================
    // Session flags
    // ========================================================================

    /// Set the loading flag
    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Set the sending flag
    pub fn set_sending(&mut self, sending: bool) {
        self.sending = sending;
    }

    /// Record an error, replacing any previous one
    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Dismiss the error
    pub fn clear_error(&mut self) {
        self.error = None;
    }
}
