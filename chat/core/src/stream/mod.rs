//! Streaming Response Decoding
//!
//! The chat endpoint answers a streamed request with newline-terminated
//! lines. Only lines starting with `data: ` carry a payload:
//!
//! ```text
//! data: {"type":"content","content":"Hel"}
//! data: {"type":"content","content":"lo"}
//! data: {"type":"complete","data":{"message":{"id":"m1","content":"Hello"}}}
//! data: [DONE]
//! ```
//!
//! [`StreamDecoder`] turns those bytes into [`StreamEvent`]s no matter where
//! the transport cut the chunks. Content events carry deltas, never the
//! running total; reassembly is the orchestrator's job.

mod decoder;
mod event;

pub use decoder::{StreamDecoder, DATA_PREFIX, DONE_SENTINEL};
pub use event::{CompletePayload, StreamEvent};
