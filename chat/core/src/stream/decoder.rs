//! Line-Framed Stream Decoder
//!
//! Turns arbitrarily chunked response bytes into [`StreamEvent`]s.

use super::event::{Frame, StreamEvent};

/// Prefix that marks a payload-carrying line
pub const DATA_PREFIX: &str = "data: ";

/// Payload that terminates the stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest payload excerpt written to the log for a skipped frame
const LOG_EXCERPT_CHARS: usize = 120;

/// Incremental decoder for the `data: `-framed line protocol
///
/// Bytes are buffered until a newline arrives, so a frame (or a UTF-8
/// sequence) split across chunks is reassembled before it is parsed. The
/// events produced are the same however the input is chunked.
///
/// Malformed frames and frames with an unknown `type` are logged and
/// dropped; one bad line never aborts the stream.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    /// Bytes after the last newline seen
    buffer: Vec<u8>,
    /// Set once the sentinel (or end of input) has been processed
    finished: bool,
    /// Frames dropped because they failed to parse
    skipped: u64,
}

impl StreamDecoder {
    /// Create a decoder with an empty carry-over buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sentinel has been seen; later input is ignored
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of frames dropped so far
    #[must_use]
    pub fn skipped_frames(&self) -> u64 {
        self.skipped
    }

    /// Feed the next chunk and return the events it completes, in order
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;

        while let Some(pos) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + pos;
            let line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
            start = end + 1;

            if let Some(event) = self.decode_line(&line) {
                let done = event == StreamEvent::EndOfStream;
                events.push(event);
                if done {
                    self.finished = true;
                    self.buffer.clear();
                    return events;
                }
            }
        }

        self.buffer.drain(..start);
        events
    }

    /// Signal end of input
    ///
    /// A final line that arrived without its newline is decoded here.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let rest = std::mem::take(&mut self.buffer);
        if rest.is_empty() {
            return Vec::new();
        }

        let line = String::from_utf8_lossy(&rest).into_owned();
        self.decode_line(&line).into_iter().collect()
    }

    /// Decode one complete line (without its newline)
    fn decode_line(&mut self, line: &str) -> Option<StreamEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            if !line.is_empty() {
                tracing::trace!(line = %excerpt(line), "Ignoring non-data line");
            }
            return None;
        };

        if payload == DONE_SENTINEL {
            return Some(StreamEvent::EndOfStream);
        }

        match serde_json::from_str::<Frame>(payload) {
            Ok(frame) => Some(frame.into()),
            Err(e) => {
                self.skipped += 1;
                tracing::warn!(
                    error = %e,
                    payload = %excerpt(payload),
                    "Skipping malformed stream frame"
                );
                None
            }
        }
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= LOG_EXCERPT_CHARS {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(LOG_EXCERPT_CHARS).collect();
        cut.push('…');
        cut
    }
}
