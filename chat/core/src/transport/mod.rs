//! Chat Endpoint Transports
//!
//! How a [`ChatRequest`] reaches the producer and how its response body
//! comes back.
//!
//! # Transports
//!
//! - **HTTP**: JSON POST via reqwest; the streamed body is returned chunk
//!   by chunk for [`StreamDecoder`](crate::stream::StreamDecoder)
//! - **Scripted**: in-process replay of canned replies, for tests and
//!   offline runs
//!
//! # Cancellation
//!
//! Every call takes a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! A token that fires while the request is being opened aborts it with
//! [`ChatError::Cancelled`](crate::ChatError::Cancelled); once the body is
//! flowing, the caller is responsible for dropping the stream.

mod http;
mod scripted;
mod traits;

pub use http::HttpTransport;
pub use scripted::{ScriptedResponse, ScriptedTransport};
pub use traits::{ChatRequest, ChatTransport, ChunkStream};
