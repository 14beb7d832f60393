//! Chat Core - Streaming Chat Session Pipeline
//!
//! This crate turns a user's message into a consistent conversation
//! transcript while the model's reply streams in over HTTP. It is headless:
//! a terminal client, a web frontend or a test harness all drive it the
//! same way.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         Presentation                             │
//! │        chat-cli  ·  other surfaces  ·  tests                     │
//! │                 │ send / cancel          ▲ ChatUpdate             │
//! └─────────────────┼────────────────────────┼───────────────────────┘
//!                   ▼                        │
//! ┌──────────────────────────────────────────┴───────────────────────┐
//! │                     MessageOrchestrator                          │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────────┐  │
//! │  │ ChatTransport│─►│StreamDecoder │─►│   ConversationStore    │  │
//! │  │ (HTTP/script)│  │ (data: lines)│  │ (conversations, flags) │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────────┘  │
//! │           ConversationRepository (create / list / update)        │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`MessageOrchestrator`]: Runs a send end to end
//! - [`StreamDecoder`]: Turns response bytes into [`StreamEvent`]s
//! - [`ChatTransport`]: The endpoint seam ([`HttpTransport`], [`ScriptedTransport`])
//! - [`ConversationStore`]: Conversation state with named transitions
//! - [`ConversationRepository`]: Persistence collaborator
//!
//! # Quick Start
//!
//! ```ignore
//! use chat_core::{
//!     config::load_config, ConversationStore, HttpTransport, InMemoryRepository,
//!     MessageOrchestrator,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let transport = HttpTransport::from_config(&config.endpoint)?;
//!     let orchestrator = MessageOrchestrator::new(
//!         transport,
//!         InMemoryRepository::new(),
//!         ConversationStore::new().shared(),
//!         config.session.clone(),
//!     );
//!
//!     let reply = orchestrator.send("Hello!", None).await?;
//!     println!("{}", reply.content);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: Layered TOML / environment / CLI configuration
//! - [`error`]: Error taxonomy
//! - [`model`]: Conversations, messages, identifiers, producer payloads
//! - [`orchestrator`]: The send pipeline and conversation operations
//! - [`persistence`]: Repository trait and in-memory implementation
//! - [`store`]: Conversation state container
//! - [`stream`]: Line protocol decoding
//! - [`transport`]: HTTP and scripted transports

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod persistence;
pub mod store;
pub mod stream;
pub mod transport;

pub use config::{ChatConfig, ConfigError, ConfigOverrides, ConfigSource};
pub use error::{ChatError, ChatResult};
pub use model::{
    Conversation, ConversationId, Message, MessageId, MessageMetadata, MessageRole,
    MessageStatus, NewConversation, Settings, Usage,
};
pub use orchestrator::{ChatUpdate, MessageOrchestrator};
pub use persistence::{ConversationRepository, InMemoryRepository};
pub use store::{ConversationStore, SharedStore};
pub use stream::{CompletePayload, StreamDecoder, StreamEvent};
pub use transport::{
    ChatRequest, ChatTransport, HttpTransport, ScriptedResponse, ScriptedTransport,
};
