//! Chat Pipeline Errors
//!
//! One error type for every failure a send can end in. Malformed stream
//! frames are deliberately absent: the decoder drops them and logs, they
//! never reach a caller.

use thiserror::Error;

use crate::model::{ConversationId, MessageId, MessageStatus};

/// Result alias used throughout the crate
pub type ChatResult<T> = Result<T, ChatError>;

/// Errors surfaced by the transport, orchestrator and store
#[derive(Debug, Error)]
pub enum ChatError {
    /// The endpoint answered with a non-success status; no body was read
    #[error("request failed with status {status}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Status line rendered for humans (e.g. "500 Internal Server Error")
        reason: String,
    },

    /// The request could not be sent
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The body failed or went idle after the status was accepted
    #[error("connection interrupted: {0}")]
    Interrupted(String),

    /// The producer reported an error frame
    #[error("{0}")]
    Protocol(String),

    /// The stream ended without a `complete` or `error` event
    #[error("stream ended before the response completed")]
    UnexpectedEnd,

    /// The send was cancelled before it resolved
    #[error("send cancelled")]
    Cancelled,

    /// Another send is still resolving for this conversation
    #[error("a message is already being sent in conversation {0}")]
    SendInFlight(ConversationId),

    /// A message status change outside the allowed lifecycle
    #[error("invalid message status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: MessageStatus,
        /// Requested status
        to: MessageStatus,
    },

    /// A replacement message tried to change the role of an existing one
    #[error("message {0} cannot change role")]
    RoleChanged(MessageId),

    /// No message with this identifier in the conversation
    #[error("message not found: {0}")]
    MessageNotFound(MessageId),

    /// No conversation with this identifier
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// A transition needed a current conversation and there is none
    #[error("no active conversation")]
    NoActiveConversation,

    /// The non-streaming response body was not a valid completion payload
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChatError {
    /// Build a status error from a reqwest status code
    #[must_use]
    pub fn status(status: reqwest::StatusCode) -> Self {
        Self::Status {
            status: status.as_u16(),
            reason: status.to_string(),
        }
    }

    /// Whether this error came from the network layer rather than the producer
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Status { .. } | Self::Http(_) | Self::Interrupted(_)
        )
    }

    /// Text written to the store's error slot
    ///
    /// Status errors name the full status line so the failing code is visible.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { reason, .. } => format!("request failed with status {reason}"),
            other => other.to_string(),
        }
    }
}
