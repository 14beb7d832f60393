//! Stream Events
//!
//! Typed events produced by the decoder, and the frame shapes they are
//! parsed from.

use serde::{Deserialize, Serialize};

use crate::model::{ConversationPayload, MessagePayload, Usage};

/// Terminal success payload: the authoritative message plus optional
/// conversation aggregates and usage accounting
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    /// The finalized assistant message
    #[serde(default)]
    pub message: MessagePayload,
    /// Updated conversation record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationPayload>,
    /// Usage accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// An event decoded from the response stream
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// An incremental text fragment (not the running total)
    ContentDelta {
        /// The fragment
        text: String,
    },
    /// The response completed successfully
    Complete(Box<CompletePayload>),
    /// The producer reported a failure
    Error {
        /// Human-readable reason
        reason: String,
    },
    /// The `[DONE]` sentinel; always the last event of a stream
    EndOfStream,
}

impl StreamEvent {
    /// Whether this event resolves the send (success or failure)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error { .. })
    }
}

/// JSON payload of one `data: ` line, selected by its `type` field
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum Frame {
    Content { content: String },
    Complete { data: CompletePayload },
    Error { error: String },
}

impl From<Frame> for StreamEvent {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Content { content } => Self::ContentDelta { text: content },
            Frame::Complete { data } => Self::Complete(Box::new(data)),
            Frame::Error { error } => Self::Error { reason: error },
        }
    }
}
