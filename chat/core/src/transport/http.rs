//! HTTP Transport
//!
//! reqwest-based client for the chat endpoint. The request is a JSON POST;
//! a streamed response body is handed back chunk by chunk, untouched, for
//! the decoder to frame.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::traits::{ChatRequest, ChatTransport, ChunkStream};
use crate::config::EndpointConfig;
use crate::error::{ChatError, ChatResult};
use crate::stream::CompletePayload;

/// HTTP client for the chat endpoint
#[derive(Clone)]
pub struct HttpTransport {
    /// Endpoint base URL (scheme, host, port)
    base_url: String,
    /// Path of the chat route
    chat_path: String,
    /// Bearer token attached to every request
    api_token: Option<String>,
    /// Longest silence tolerated while waiting for headers or body data
    idle_timeout: Duration,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with default timeouts
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, chat_path: impl Into<String>) -> ChatResult<Self> {
        Self::build(
            base_url.into(),
            chat_path.into(),
            None,
            Duration::from_secs(120),
            Duration::from_secs(10),
        )
    }

    /// Create from an endpoint configuration
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &EndpointConfig) -> ChatResult<Self> {
        Self::build(
            config.base_url.clone(),
            config.chat_path.clone(),
            config.api_token.clone(),
            config.timeout,
            config.connect_timeout,
        )
    }

    fn build(
        base_url: String,
        chat_path: String,
        api_token: Option<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> ChatResult<Self> {
        // No whole-request timeout: a streamed reply may legitimately run for minutes
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_path,
            api_token,
            idle_timeout: timeout,
            http_client,
        })
    }

    /// Attach a bearer token to every request
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Get the chat endpoint URL
    #[must_use]
    pub fn chat_url(&self) -> String {
        if self.chat_path.starts_with('/') {
            format!("{}{}", self.base_url, self.chat_path)
        } else {
            format!("{}/{}", self.base_url, self.chat_path)
        }
    }

    /// POST the request and check the status line
    async fn post(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> ChatResult<reqwest::Response> {
        let mut builder = self.http_client.post(self.chat_url()).json(request);
        if let Some(ref token) = self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = tokio::time::timeout(self.idle_timeout, builder.send()) => {
                result.map_err(|_| idle_error(self.idle_timeout))??
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                conversation_id = %request.conversation_id,
                "Chat endpoint rejected request"
            );
            return Err(ChatError::status(status));
        }

        Ok(response)
    }
}

fn idle_error(timeout: Duration) -> ChatError {
    ChatError::Interrupted(format!("no data from endpoint for {timeout:?}"))
}

#[async_trait]
impl ChatTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn open(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> ChatResult<ChunkStream> {
        let response = self.post(request, cancel).await?;
        let idle = self.idle_timeout;

        // Each read gets its own deadline; the stream ends after the first error
        let body = Some(Box::pin(response.bytes_stream()));
        let chunks = futures::stream::unfold(body, move |body| async move {
            let mut body = body?;
            match tokio::time::timeout(idle, body.next()).await {
                Ok(Some(Ok(bytes))) => Some((Ok(bytes.to_vec()), Some(body))),
                Ok(Some(Err(e))) => Some((Err(ChatError::Interrupted(e.to_string())), None)),
                Ok(None) => None,
                Err(_) => Some((Err(idle_error(idle)), None)),
            }
        });

        Ok(Box::pin(chunks))
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> ChatResult<CompletePayload> {
        let response = self.post(request, cancel).await?;

        let body = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = tokio::time::timeout(self.idle_timeout, response.bytes()) => {
                result.map_err(|_| idle_error(self.idle_timeout))??
            }
        };

        Ok(serde_json::from_slice(&body)?)
    }
}
