//! Conversation Data Model
//!
//! Conversations, messages and the identifiers that tie them together,
//! plus the loosely-typed payload shapes the producer sends back in a
//! `complete` frame.
//!
//! # Message lifecycle
//!
//! ```text
//!   user:       sending ──► sent
//!                  └──────► failed
//!   assistant:  processing ──► completed
//!                   └────────► failed
//! ```
//!
//! `sent`, `completed` and `failed` are terminal. A message's role never
//! changes after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};

/// Free-form per-conversation settings
pub type Settings = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Identifiers
// ============================================================================

/// Conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Generate a new unique conversation ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw identifier
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("msg_{}", Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Model output
    Assistant,
}

/// Delivery status of a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Accepted (terminal for user messages)
    Sent,
    /// User message on its way out
    Sending,
    /// Assistant placeholder receiving deltas
    Processing,
    /// Assistant reply finalized
    Completed,
    /// Delivery or generation failed
    Failed,
}

impl MessageStatus {
    /// Whether no further transition is allowed
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Sent | Self::Completed | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a valid lifecycle step
    ///
    /// Staying in the same status is allowed so content can be rewritten
    /// without a status change.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Sending, Self::Sent | Self::Failed)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }

    /// Lowercase wire name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Sending => "sending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional accounting attached to a message
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Tokens consumed by this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<u32>,
    /// Cost of this message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// A message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Owning conversation
    pub conversation_id: ConversationId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// Lifecycle status
    pub status: MessageStatus,
    /// Token accounting, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Create a user message, already accepted
    #[must_use]
    pub fn user(conversation_id: ConversationId, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::User,
            content: content.into(),
            status: MessageStatus::Sent,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an empty assistant placeholder awaiting deltas
    #[must_use]
    pub fn placeholder(conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            conversation_id,
            role: MessageRole::Assistant,
            content: String::new(),
            status: MessageStatus::Processing,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Token count from metadata (0 when unknown)
    #[must_use]
    pub fn tokens(&self) -> u64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.tokens)
            .map_or(0, u64::from)
    }

    /// Cost from metadata (0.0 when unknown)
    #[must_use]
    pub fn cost(&self) -> f64 {
        self.metadata.as_ref().and_then(|m| m.cost).unwrap_or(0.0)
    }

    /// Move to a new status, enforcing the lifecycle
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidTransition`] for a step the lifecycle forbids.
    pub fn transition(&mut self, next: MessageStatus) -> ChatResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ChatError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next == MessageStatus::Processing && self.role != MessageRole::Assistant {
            return Err(ChatError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// Fields needed to create a conversation through the persistence collaborator
#[derive(Clone, Debug, Default)]
pub struct NewConversation {
    /// Owning user, if the deployment tracks one
    pub user_id: Option<String>,
    /// Display title
    pub title: String,
    /// Model identifier
    pub model: String,
    /// Initial settings
    pub settings: Settings,
}

/// A conversation and its ordered messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,
    /// Owning user
    #[serde(default)]
    pub user_id: Option<String>,
    /// Display title
    pub title: String,
    /// Model used for this conversation
    pub model: String,
    /// Free-form settings
    #[serde(default)]
    pub settings: Settings,
    /// Whether the conversation is active (not archived)
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Number of messages
    #[serde(default)]
    pub message_count: u32,
    /// Cumulative tokens
    #[serde(default)]
    pub total_tokens: u64,
    /// Cumulative cost
    #[serde(default)]
    pub total_cost: f64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
    /// Ordered messages
    #[serde(default)]
    pub messages: Vec<Message>,
}

fn default_true() -> bool {
    true
}

impl Conversation {
    /// Create an empty conversation
    #[must_use]
    pub fn new(draft: NewConversation) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            user_id: draft.user_id,
            title: draft.title,
            model: draft.model,
            settings: draft.settings,
            is_active: true,
            message_count: 0,
            total_tokens: 0,
            total_cost: 0.0,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    /// Get message by ID
    #[must_use]
    pub fn get_message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Recompute count, tokens and cost from the message sequence
    pub fn recompute_aggregates(&mut self) {
        self.message_count = u32::try_from(self.messages.len()).unwrap_or(u32::MAX);
        self.total_tokens = self.messages.iter().map(Message::tokens).sum();
        self.total_cost = self.messages.iter().map(Message::cost).sum();
        self.updated_at = Utc::now();
    }

    /// Overwrite the record fields with an authoritative payload
    ///
    /// Messages are left alone; the payload only carries aggregates and
    /// descriptive fields.
    pub fn apply_payload(&mut self, payload: &ConversationPayload) {
        if let Some(title) = &payload.title {
            self.title.clone_from(title);
        }
        if let Some(model) = &payload.model {
            self.model.clone_from(model);
        }
        if let Some(settings) = &payload.settings {
            self.settings.clone_from(settings);
        }
        if let Some(active) = payload.is_active {
            self.is_active = active;
        }
        if let Some(count) = payload.message_count {
            self.message_count = count;
        }
        if let Some(tokens) = payload.total_tokens {
            self.total_tokens = tokens;
        }
        if let Some(cost) = payload.total_cost {
            self.total_cost = cost;
        }
        self.updated_at = payload.updated_at.unwrap_or_else(Utc::now);
    }
}

// ============================================================================
// Producer payloads
// ============================================================================

/// Token and cost accounting for one completion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens generated
    pub completion_tokens: u32,
    /// Total tokens billed
    pub total_tokens: u32,
    /// Cost, if the producer prices requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

/// Authoritative message as sent by the producer
///
/// Every field is optional; gaps are filled from the placeholder it replaces.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessagePayload {
    /// Server-assigned ID
    pub id: Option<MessageId>,
    /// Owning conversation
    pub conversation_id: Option<ConversationId>,
    /// Role (assistant when absent)
    pub role: Option<MessageRole>,
    /// Final content
    pub content: Option<String>,
    /// Final status
    pub status: Option<MessageStatus>,
    /// Accounting
    pub metadata: Option<MessageMetadata>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated_at: Option<DateTime<Utc>>,
}

impl MessagePayload {
    /// Build the message that replaces `placeholder`
    ///
    /// The status is always `completed`, whatever the payload says: a
    /// `complete` event is terminal success, and an assistant reply only
    /// ends `completed` or `failed`. Usage fills in token metadata the
    /// payload left out.
    #[must_use]
    pub fn into_message(self, placeholder: &Message, usage: Option<&Usage>) -> Message {
        if let Some(status) = self.status.filter(|s| *s != MessageStatus::Completed) {
            tracing::debug!(status = %status, "Completion payload status overridden");
        }
        let metadata = match (self.metadata, usage) {
            (Some(meta), _) if meta.tokens.is_some() => Some(meta),
            (meta, Some(usage)) => Some(MessageMetadata {
                tokens: Some(usage.total_tokens),
                cost: meta.and_then(|m| m.cost).or(usage.cost),
            }),
            (meta, None) => meta,
        };
        Message {
            id: self.id.unwrap_or_else(|| placeholder.id.clone()),
            conversation_id: self
                .conversation_id
                .unwrap_or_else(|| placeholder.conversation_id.clone()),
            role: self.role.unwrap_or(MessageRole::Assistant),
            content: self.content.unwrap_or_else(|| placeholder.content.clone()),
            status: MessageStatus::Completed,
            metadata,
            created_at: self.created_at.unwrap_or(placeholder.created_at),
            updated_at: self.updated_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Authoritative conversation record as sent by the producer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationPayload {
    /// Conversation ID
    pub id: Option<ConversationId>,
    /// Title
    pub title: Option<String>,
    /// Model
    pub model: Option<String>,
    /// Settings
    pub settings: Option<Settings>,
    /// Active flag
    pub is_active: Option<bool>,
    /// Message count
    pub message_count: Option<u32>,
    /// Cumulative tokens
    pub total_tokens: Option<u64>,
    /// Cumulative cost
    pub total_cost: Option<f64>,
    /// Last modification time
    pub updated_at: Option<DateTime<Utc>>,
}
