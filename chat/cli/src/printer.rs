//! Transcript printer
//!
//! Renders [`ChatUpdate`]s from the orchestrator to stdout as they arrive.

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

use chat_core::{ChatUpdate, MessageRole};

/// Turns updates into terminal text
#[derive(Debug, Default)]
pub struct Transcript {
    /// Printed after each resolved reply (interactive mode)
    prompt: Option<&'static str>,
    /// Whether the current reply has streamed any text yet
    streamed: bool,
}

impl Transcript {
    /// Transcript that re-prints `prompt` after every reply
    pub fn with_prompt(prompt: &'static str) -> Self {
        Self {
            prompt: Some(prompt),
            streamed: false,
        }
    }

    /// Text to print for an update, if any
    pub fn render(&mut self, update: &ChatUpdate) -> Option<String> {
        match update {
            ChatUpdate::MessageAdded { message, .. } => match message.role {
                // The user just typed it
                MessageRole::User => None,
                MessageRole::Assistant => {
                    self.streamed = false;
                    Some("assistant: ".to_string())
                }
            },
            ChatUpdate::ContentDelta { delta, .. } => {
                self.streamed = true;
                Some(delta.clone())
            }
            ChatUpdate::MessageCompleted { message, .. } => {
                let mut text = if self.streamed {
                    String::new()
                } else {
                    message.content.clone()
                };
                text.push('\n');
                self.finish(text)
            }
            ChatUpdate::MessageFailed { reason, .. } => {
                let text = format!("\n[failed: {reason}]\n");
                self.finish(text)
            }
        }
    }

    fn finish(&mut self, mut text: String) -> Option<String> {
        self.streamed = false;
        if let Some(prompt) = self.prompt {
            text.push_str(prompt);
        }
        Some(text)
    }
}

/// Print updates until the orchestrator drops its sender
pub async fn run(mut rx: mpsc::Receiver<ChatUpdate>, mut transcript: Transcript) {
    let mut stdout = tokio::io::stdout();

    while let Some(update) = rx.recv().await {
        let Some(text) = transcript.render(&update) else {
            continue;
        };
        let written = async {
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            warn!(error = %e, "Failed to write transcript");
            break;
        }
    }
}
