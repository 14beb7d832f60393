//! Transport Traits
//!
//! The orchestrator talks to the chat endpoint only through [`ChatTransport`],
//! so the HTTP client can be swapped for an in-process script in tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ChatResult;
use crate::model::ConversationId;
use crate::stream::CompletePayload;

/// Ordered byte chunks of a streamed response body
pub type ChunkStream = Pin<Box<dyn Stream<Item = ChatResult<Vec<u8>>> + Send>>;

/// Body of a chat request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The user-entered text
    pub message: String,
    /// Target conversation
    pub conversation_id: ConversationId,
    /// Whether the response should be streamed
    pub stream: bool,
}

impl ChatRequest {
    /// Create a streamed request
    pub fn new(message: impl Into<String>, conversation_id: ConversationId) -> Self {
        Self {
            message: message.into(),
            conversation_id,
            stream: true,
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Transport to the chat endpoint
///
/// Authentication, if any, is the implementation's concern; callers hand
/// over a bare [`ChatRequest`].
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Get the transport name (for logs)
    fn name(&self) -> &str;

    /// Issue a streamed request and return its body as byte chunks
    ///
    /// A non-success status is returned as
    /// [`ChatError::Status`](crate::ChatError::Status) before any body is
    /// read. If `cancel` fires while the request is being opened the call
    /// returns [`ChatError::Cancelled`](crate::ChatError::Cancelled).
    async fn open(&self, request: &ChatRequest, cancel: &CancellationToken)
        -> ChatResult<ChunkStream>;

    /// Issue a non-streamed request and return the completion payload
    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> ChatResult<CompletePayload>;
}
