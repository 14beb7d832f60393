//! Scripted Transport
//!
//! An in-process [`ChatTransport`] that replays canned responses in order.
//! Used by tests and by offline demos; no socket is ever opened.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::traits::{ChatRequest, ChatTransport, ChunkStream};
use crate::error::{ChatError, ChatResult};
use crate::stream::CompletePayload;

/// One canned reply
#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    /// Stream these chunks, then end the body
    Chunks(Vec<Vec<u8>>),
    /// Stream these chunks, then keep the body open forever
    ChunksThenHang(Vec<Vec<u8>>),
    /// Stream these chunks, then drop the connection
    ChunksThenDrop(Vec<Vec<u8>>),
    /// Reject the request with this HTTP status
    Status(u16),
    /// Answer a non-streamed request
    Complete(CompletePayload),
}

impl ScriptedResponse {
    /// Build a chunked reply from string slices
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Chunks(to_bytes(chunks))
    }

    /// Build a reply that stays open after the given chunks
    pub fn hanging<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::ChunksThenHang(to_bytes(chunks))
    }

    /// Build a reply whose connection drops after the given chunks
    pub fn dropping<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::ChunksThenDrop(to_bytes(chunks))
    }
}

fn to_bytes<I, S>(chunks: I) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    chunks
        .into_iter()
        .map(|c| c.as_ref().as_bytes().to_vec())
        .collect()
}

/// Transport that answers from a queue of [`ScriptedResponse`]s
#[derive(Default)]
pub struct ScriptedTransport {
    /// Replies not yet used
    responses: Mutex<VecDeque<ScriptedResponse>>,
    /// Every request received, in order
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    /// Create a transport with the given replies
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another reply
    pub fn push(&self, response: ScriptedResponse) {
        self.responses.lock().push_back(response);
    }

    /// Requests received so far
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Replies not yet consumed
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    fn next_response(&self, request: &ChatRequest) -> ChatResult<ScriptedResponse> {
        self.requests.lock().push(request.clone());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| ChatError::Protocol("no scripted response left".to_string()))
    }
}

fn status_error(code: u16) -> ChatError {
    let status = reqwest::StatusCode::from_u16(code)
        .unwrap_or(reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    ChatError::status(status)
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn open(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> ChatResult<ChunkStream> {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        match self.next_response(request)? {
            ScriptedResponse::Chunks(chunks) => {
                Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok::<_, ChatError>))))
            }
            ScriptedResponse::ChunksThenHang(chunks) => {
                let head = stream::iter(chunks.into_iter().map(Ok::<_, ChatError>));
                Ok(Box::pin(head.chain(stream::pending())))
            }
            ScriptedResponse::ChunksThenDrop(chunks) => {
                let head = stream::iter(chunks.into_iter().map(Ok::<_, ChatError>));
                let tail = stream::once(async {
                    Err(ChatError::Interrupted("connection reset by peer".to_string()))
                });
                Ok(Box::pin(head.chain(tail)))
            }
            ScriptedResponse::Status(code) => Err(status_error(code)),
            ScriptedResponse::Complete(_) => Err(ChatError::Protocol(
                "scripted completion served to a streamed request".to_string(),
            )),
        }
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> ChatResult<CompletePayload> {
        if cancel.is_cancelled() {
            return Err(ChatError::Cancelled);
        }

        match self.next_response(request)? {
            ScriptedResponse::Complete(payload) => Ok(payload),
            ScriptedResponse::Status(code) => Err(status_error(code)),
            _ => Err(ChatError::Protocol(
                "scripted stream served to a non-streamed request".to_string(),
            )),
        }
    }
}
