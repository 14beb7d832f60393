//! Message Orchestrator
//!
//! Drives one send from user text to a finalized (or failed) assistant
//! message:
//!
//! ```text
//!   send(text)
//!     │
//!     ├─► resolve conversation (create through the repository if none)
//!     ├─► reserve the conversation (one send in flight per conversation)
//!     ├─► store: + user message (sent), + assistant placeholder (processing)
//!     ├─► transport.open ──► decoder.feed ──► events
//!     │        content  → placeholder.content = running total
//!     │        complete → placeholder replaced by the authoritative message
//!     │        error / transport failure / early end / cancel
//!     │                 → placeholder failed, error slot written
//!     └─► release the reservation
//! ```
//!
//! The store lock is only ever taken between awaits.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::error::{ChatError, ChatResult};
use crate::model::{
    ConversationId, ConversationPayload, Message, MessageId, MessageStatus, NewConversation,
    Settings,
};
use crate::persistence::ConversationRepository;
use crate::store::SharedStore;
use crate::stream::{CompletePayload, StreamDecoder, StreamEvent};
use crate::transport::{ChatRequest, ChatTransport};

/// Progress pushed to presentation layers while sends resolve
#[derive(Clone, Debug, PartialEq)]
pub enum ChatUpdate {
    /// A message was appended to a conversation
    MessageAdded {
        /// Owning conversation
        conversation_id: ConversationId,
        /// The new message
        message: Message,
    },
    /// More assistant text arrived
    ContentDelta {
        /// Owning conversation
        conversation_id: ConversationId,
        /// The placeholder being filled
        message_id: MessageId,
        /// The new fragment only
        delta: String,
    },
    /// The placeholder was replaced by the authoritative message
    MessageCompleted {
        /// Owning conversation
        conversation_id: ConversationId,
        /// Identifier the placeholder had
        placeholder_id: MessageId,
        /// The final message
        message: Message,
    },
    /// The placeholder was marked failed
    MessageFailed {
        /// Owning conversation
        conversation_id: ConversationId,
        /// The failed placeholder
        message_id: MessageId,
        /// Error shown to the user
        reason: String,
    },
}

/// Text recorded when a send ends without resolving
const CANCELLED_REASON: &str = "send cancelled";

/// Holds a conversation's in-flight slot until dropped
///
/// While `placeholder` is set the send has not resolved it. Dropping the
/// guard in that state (the send future was dropped mid-flight) fails the
/// placeholder so it cannot stay `processing`.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<ConversationId, CancellationToken>,
    store: &'a SharedStore,
    updates: Option<&'a mpsc::Sender<ChatUpdate>>,
    conversation_id: ConversationId,
    placeholder: Option<MessageId>,
}

impl InFlightGuard<'_> {
    fn track(&mut self, placeholder_id: &MessageId) {
        self.placeholder = Some(placeholder_id.clone());
    }

    fn resolved(&mut self) {
        self.placeholder = None;
    }

    fn fail_abandoned(&self, placeholder_id: &MessageId) {
        let failed = {
            let mut store = self.store.lock();
            let processing = store
                .conversation(&self.conversation_id)
                .and_then(|c| c.get_message(placeholder_id))
                .is_some_and(|m| m.status == MessageStatus::Processing);
            if processing && store.fail_message(&self.conversation_id, placeholder_id).is_ok() {
                store.set_error(CANCELLED_REASON);
                true
            } else {
                false
            }
        };
        if !failed {
            return;
        }

        tracing::warn!(
            conversation_id = %self.conversation_id,
            message_id = %placeholder_id,
            "Send dropped before resolving; placeholder failed"
        );
        if let Some(tx) = self.updates {
            let update = ChatUpdate::MessageFailed {
                conversation_id: self.conversation_id.clone(),
                message_id: placeholder_id.clone(),
                reason: CANCELLED_REASON.to_string(),
            };
            if let Err(e) = tx.try_send(update) {
                tracing::warn!("Failed to send chat update: {}", e);
            }
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(placeholder_id) = self.placeholder.take() {
            self.fail_abandoned(&placeholder_id);
        }
        self.in_flight.remove(&self.conversation_id);
        let still_sending = !self.in_flight.is_empty();
        self.store.lock().set_sending(still_sending);
    }
}

/// Turns user text into conversation state through a [`ChatTransport`]
pub struct MessageOrchestrator<T: ChatTransport, R: ConversationRepository> {
    /// Transport to the chat endpoint
    transport: Arc<T>,
    /// Persistence collaborator
    repository: Arc<R>,
    /// Conversation state
    store: SharedStore,
    /// Session defaults (model, streaming, titles)
    session: SessionConfig,
    /// Cancellation token of each conversation's in-flight send
    in_flight: DashMap<ConversationId, CancellationToken>,
    /// Optional feed for presentation layers
    updates: Option<mpsc::Sender<ChatUpdate>>,
}

impl<T: ChatTransport, R: ConversationRepository> MessageOrchestrator<T, R> {
    /// Create an orchestrator over an explicitly constructed store
    pub fn new(transport: T, repository: R, store: SharedStore, session: SessionConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            repository: Arc::new(repository),
            store,
            session,
            in_flight: DashMap::new(),
            updates: None,
        }
    }

    /// Push [`ChatUpdate`]s to `tx` as sends progress
    #[must_use]
    pub fn with_updates(mut self, tx: mpsc::Sender<ChatUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Get the store handle
    #[must_use]
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Get the transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the repository
    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Get the session defaults
    #[must_use]
    pub fn session(&self) -> &SessionConfig {
        &self.session
    }

    /// Whether a send is resolving for this conversation
    #[must_use]
    pub fn is_in_flight(&self, conversation_id: &ConversationId) -> bool {
        self.in_flight.contains_key(conversation_id)
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Send `text` and resolve the assistant reply
    ///
    /// Without `conversation_id` the current conversation is used, or a new
    /// one is created when nothing is selected.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the send. By then the placeholder is
    /// `failed` and the store's error slot holds the same message.
    /// [`ChatError::SendInFlight`] is returned without touching the store.
    pub async fn send(
        &self,
        text: &str,
        conversation_id: Option<ConversationId>,
    ) -> ChatResult<Message> {
        self.send_with_cancel(text, conversation_id, CancellationToken::new())
            .await
    }

    /// [`send`](Self::send) with a caller-owned cancellation token
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send); a fired token yields [`ChatError::Cancelled`].
    pub async fn send_with_cancel(
        &self,
        text: &str,
        conversation_id: Option<ConversationId>,
        cancel: CancellationToken,
    ) -> ChatResult<Message> {
        let conversation_id = match self.resolve_conversation(conversation_id, text).await {
            Ok(id) => id,
            Err(e) => {
                self.store.lock().set_error(e.user_message());
                return Err(e);
            }
        };

        let mut guard = self.reserve(&conversation_id, &cancel)?;

        tracing::info!(
            conversation_id = %conversation_id,
            transport = self.transport.name(),
            stream = self.session.stream,
            "Sending message"
        );

        self.execute(text, &conversation_id, &cancel, &mut guard)
            .await
    }

    /// Cancel the in-flight send of a conversation
    ///
    /// Returns `false` if nothing was in flight.
    pub fn cancel(&self, conversation_id: &ConversationId) -> bool {
        match self.in_flight.get(conversation_id) {
            Some(token) => {
                token.cancel();
                tracing::debug!(conversation_id = %conversation_id, "Cancelled in-flight send");
                true
            }
            None => false,
        }
    }

    fn reserve(
        &self,
        conversation_id: &ConversationId,
        cancel: &CancellationToken,
    ) -> ChatResult<InFlightGuard<'_>> {
        match self.in_flight.entry(conversation_id.clone()) {
            Entry::Occupied(_) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    "Rejected send: another send is in flight"
                );
                return Err(ChatError::SendInFlight(conversation_id.clone()));
            }
            Entry::Vacant(slot) => {
                slot.insert(cancel.clone());
            }
        }

        self.store.lock().set_sending(true);
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            store: &self.store,
            updates: self.updates.as_ref(),
            conversation_id: conversation_id.clone(),
            placeholder: None,
        })
    }

    async fn resolve_conversation(
        &self,
        requested: Option<ConversationId>,
        text: &str,
    ) -> ChatResult<ConversationId> {
        if let Some(id) = requested {
            let known = self.store.lock().conversation(&id).is_some();
            if !known {
                let conversation = self
                    .repository
                    .get(&id)
                    .await?
                    .ok_or_else(|| ChatError::ConversationNotFound(id.clone()))?;
                self.store.lock().add_conversation(conversation);
            }
            return Ok(id);
        }

        let current = self.store.lock().current_id().cloned();
        if let Some(id) = current {
            return Ok(id);
        }

        let conversation = self
            .repository
            .create(NewConversation {
                user_id: None,
                title: self.session.title_for(text),
                model: self.session.model.clone(),
                settings: Settings::new(),
            })
            .await?;
        let id = conversation.id.clone();

        tracing::info!(
            conversation_id = %id,
            title = %conversation.title,
            "Created conversation for first message"
        );

        let mut store = self.store.lock();
        store.add_conversation(conversation);
        store.set_current_conversation(Some(id.clone()))?;
        Ok(id)
    }

    async fn execute(
        &self,
        text: &str,
        conversation_id: &ConversationId,
        cancel: &CancellationToken,
        guard: &mut InFlightGuard<'_>,
    ) -> ChatResult<Message> {
        let user = Message::user(conversation_id.clone(), text);
        let placeholder = Message::placeholder(conversation_id.clone());
        {
            let mut store = self.store.lock();
            store.clear_error();
            store.add_message_to(conversation_id, user.clone())?;
            store.add_message_to(conversation_id, placeholder.clone())?;
        }
        guard.track(&placeholder.id);
        self.notify(ChatUpdate::MessageAdded {
            conversation_id: conversation_id.clone(),
            message: user,
        })
        .await;
        self.notify(ChatUpdate::MessageAdded {
            conversation_id: conversation_id.clone(),
            message: placeholder.clone(),
        })
        .await;

        let request =
            ChatRequest::new(text, conversation_id.clone()).with_stream(self.session.stream);
        let outcome = if self.session.stream {
            self.stream_reply(&request, &placeholder.id, cancel).await
        } else {
            self.transport.complete(&request, cancel).await
        };

        let result =
            outcome.and_then(|payload| self.finalize(conversation_id, &placeholder, payload));
        if let Err(ref e) = result {
            self.fail_placeholder(conversation_id, &placeholder.id, &e.user_message());
        }
        guard.resolved();

        match result {
            Ok(message) => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    message_id = %message.id,
                    tokens = message.tokens(),
                    chars = message.content.chars().count(),
                    "Send completed"
                );
                self.notify(ChatUpdate::MessageCompleted {
                    conversation_id: conversation_id.clone(),
                    placeholder_id: placeholder.id.clone(),
                    message: message.clone(),
                })
                .await;
                self.persist_quietly(conversation_id).await;
                Ok(message)
            }
            Err(e) => {
                let reason = e.user_message();
                tracing::warn!(
                    conversation_id = %conversation_id,
                    reason = %reason,
                    transport = e.is_transport(),
                    "Send failed"
                );
                self.notify(ChatUpdate::MessageFailed {
                    conversation_id: conversation_id.clone(),
                    message_id: placeholder.id.clone(),
                    reason,
                })
                .await;
                self.persist_quietly(conversation_id).await;
                Err(e)
            }
        }
    }

    /// Read the streamed reply until a terminal event
    async fn stream_reply(
        &self,
        request: &ChatRequest,
        placeholder_id: &MessageId,
        cancel: &CancellationToken,
    ) -> ChatResult<CompletePayload> {
        let conversation_id = &request.conversation_id;
        let mut chunks = self.transport.open(request, cancel).await?;
        let mut decoder = StreamDecoder::new();
        // Owned by this send alone
        let mut content = String::new();

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ChatError::Cancelled),
                next = chunks.next() => next,
            };

            let ended = next.is_none();
            let events = match next {
                Some(chunk) => decoder.feed(&chunk?),
                None => decoder.finish(),
            };

            for event in events {
                match event {
                    StreamEvent::ContentDelta { text } => {
                        content.push_str(&text);
                        self.store
                            .lock()
                            .set_message_content(conversation_id, placeholder_id, &content)?;
                        self.notify(ChatUpdate::ContentDelta {
                            conversation_id: conversation_id.clone(),
                            message_id: placeholder_id.clone(),
                            delta: text,
                        })
                        .await;
                    }
                    StreamEvent::Complete(payload) => {
                        if decoder.skipped_frames() > 0 {
                            tracing::debug!(
                                conversation_id = %conversation_id,
                                skipped = decoder.skipped_frames(),
                                "Stream completed with skipped frames"
                            );
                        }
                        return Ok(*payload);
                    }
                    StreamEvent::Error { reason } => return Err(ChatError::Protocol(reason)),
                    StreamEvent::EndOfStream => return Err(ChatError::UnexpectedEnd),
                }
            }

            if ended {
                return Err(ChatError::UnexpectedEnd);
            }
        }
    }

    /// Swap the placeholder for the authoritative message
    fn finalize(
        &self,
        conversation_id: &ConversationId,
        placeholder: &Message,
        payload: CompletePayload,
    ) -> ChatResult<Message> {
        let mut store = self.store.lock();

        // Fill gaps from the placeholder as streamed, not as created
        let streamed = store
            .conversation(conversation_id)
            .and_then(|c| c.get_message(&placeholder.id))
            .cloned()
            .unwrap_or_else(|| placeholder.clone());

        let message = payload
            .message
            .into_message(&streamed, payload.usage.as_ref());
        store.update_message(conversation_id, &placeholder.id, message.clone())?;

        if let Some(ref record) = payload.conversation {
            store.apply_conversation_payload(conversation_id, record)?;
        }
        Ok(message)
    }

    fn fail_placeholder(
        &self,
        conversation_id: &ConversationId,
        placeholder_id: &MessageId,
        reason: &str,
    ) {
        let mut store = self.store.lock();
        if let Err(e) = store.fail_message(conversation_id, placeholder_id) {
            // The conversation may have been deleted under the send
            tracing::debug!(
                conversation_id = %conversation_id,
                error = %e,
                "Could not mark placeholder failed"
            );
        }
        store.set_error(reason);
    }

    // ========================================================================
    // Conversation operations
    // ========================================================================

    /// Load every conversation from the repository into the store
    ///
    /// # Errors
    ///
    /// Returns the repository error, also written to the error slot.
    pub async fn load_conversations(&self) -> ChatResult<usize> {
        self.store.lock().set_loading(true);
        let result = self.repository.list().await;

        let mut store = self.store.lock();
        store.set_loading(false);
        match result {
            Ok(conversations) => {
                let count = conversations.len();
                store.set_all_conversations(conversations);
                tracing::debug!(count, "Loaded conversations");
                Ok(count)
            }
            Err(e) => {
                store.set_error(e.user_message());
                Err(e)
            }
        }
    }

    /// Make a conversation current, fetching it if the store lacks it
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] if neither the store nor
    /// the repository has it.
    pub async fn select_conversation(&self, conversation_id: &ConversationId) -> ChatResult<()> {
        let known = self.store.lock().conversation(conversation_id).is_some();
        if !known {
            let conversation = self
                .repository
                .get(conversation_id)
                .await?
                .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.clone()))?;
            self.store.lock().add_conversation(conversation);
        }
        self.store
            .lock()
            .set_current_conversation(Some(conversation_id.clone()))
    }

    /// Rename a conversation
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ConversationNotFound`] or the repository error.
    pub async fn rename_conversation(
        &self,
        conversation_id: &ConversationId,
        title: impl Into<String>,
    ) -> ChatResult<()> {
        let payload = ConversationPayload {
            title: Some(title.into()),
            ..Default::default()
        };
        self.store
            .lock()
            .apply_conversation_payload(conversation_id, &payload)?;
        self.persist(conversation_id).await
    }

    /// Shallow-merge settings into the current conversation
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveConversation`] or the repository error.
    pub async fn update_settings(&self, settings: Settings) -> ChatResult<()> {
        let conversation_id = {
            let mut store = self.store.lock();
            store.update_settings(settings)?;
            store
                .current_id()
                .cloned()
                .ok_or(ChatError::NoActiveConversation)?
        };
        self.persist(&conversation_id).await
    }

    /// Delete a conversation, cancelling its in-flight send first
    ///
    /// # Errors
    ///
    /// Returns the repository error, or [`ChatError::ConversationNotFound`]
    /// if the store does not hold it.
    pub async fn delete_conversation(&self, conversation_id: &ConversationId) -> ChatResult<()> {
        if self.cancel(conversation_id) {
            tracing::info!(
                conversation_id = %conversation_id,
                "Cancelled send of deleted conversation"
            );
        }
        self.repository.delete(conversation_id).await?;
        self.store.lock().delete_conversation(conversation_id)?;
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn persist(&self, conversation_id: &ConversationId) -> ChatResult<()> {
        let snapshot = self
            .store
            .lock()
            .conversation(conversation_id)
            .cloned()
            .ok_or_else(|| ChatError::ConversationNotFound(conversation_id.clone()))?;
        self.repository.update(&snapshot).await
    }

    async fn persist_quietly(&self, conversation_id: &ConversationId) {
        if let Err(e) = self.persist(conversation_id).await {
            tracing::warn!(
                conversation_id = %conversation_id,
                error = %e,
                "Failed to persist conversation"
            );
        }
    }

    async fn notify(&self, update: ChatUpdate) {
        if let Some(ref tx) = self.updates {
            if let Err(e) = tx.send(update).await {
                tracing::warn!("Failed to send chat update: {}", e);
            }
        }
    }
}
