//! Interactive mode
//!
//! Reads lines from async stdin. Plain lines are sent; lines starting with
//! `/` are commands.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tracing::warn;

use chat_core::{ConversationId, ConversationStore};

use crate::{send_interruptible, Orchestrator};

/// Prompt printed before each input line
pub const PROMPT: &str = "> ";

const HELP: &str = "\
Commands:
  /new              start a new conversation with the next message
  /list             list conversations (* marks the current one)
  /rename <title>   rename the current conversation
  /delete           delete the current conversation
  /help             show this help
  /quit             exit (Ctrl-D also works)

Ctrl-C while a reply is streaming cancels it.
";

/// One line of input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Blank line
    Empty,
    /// Text to send
    Send(String),
    /// `/new`
    New,
    /// `/list`
    List,
    /// `/rename <title>`
    Rename(String),
    /// `/delete`
    Delete,
    /// `/help`
    Help,
    /// `/quit` or `/exit`
    Quit,
    /// Anything else starting with `/`
    Unknown(String),
}

impl Command {
    /// Parse one input line
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name {
            "new" => Self::New,
            "list" => Self::List,
            "rename" if !arg.is_empty() => Self::Rename(arg.to_string()),
            "delete" => Self::Delete,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// One line per conversation, current one starred
pub fn list_lines(store: &ConversationStore) -> String {
    if store.conversations().is_empty() {
        return "No conversations yet.\n".to_string();
    }

    let current = store.current_id();
    store
        .conversations()
        .iter()
        .map(|c| {
            let marker = if Some(&c.id) == current { '*' } else { ' ' };
            format!(
                "{marker} {}  ({} messages)  {}\n",
                c.title, c.message_count, c.id
            )
        })
        .collect()
}

async fn say(out: &mut Stdout, text: &str) -> std::io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(PROMPT.as_bytes()).await?;
    out.flush().await
}

/// Run until `/quit` or end of input
pub async fn run(orchestrator: &Orchestrator) -> Result<()> {
    let mut out = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    say(&mut out, "Type a message, or /help for commands.\n").await?;

    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Empty => say(&mut out, "").await?,
            Command::Quit => break,
            Command::Send(text) => {
                // The printer reports failures and re-prints the prompt
                if let Err(e) = send_interruptible(orchestrator, &text).await {
                    warn!(error = %e, "Send failed");
                }
            }
            Command::New => {
                orchestrator.store().lock().set_current_conversation(None)?;
                say(&mut out, "Next message starts a new conversation.\n").await?;
            }
            Command::List => {
                let listing = list_lines(&orchestrator.store().lock());
                say(&mut out, &listing).await?;
            }
            Command::Rename(title) => {
                let reply = match current(orchestrator) {
                    Some(id) => match orchestrator.rename_conversation(&id, title).await {
                        Ok(()) => "Renamed.\n".to_string(),
                        Err(e) => format!("Rename failed: {e}\n"),
                    },
                    None => "No current conversation.\n".to_string(),
                };
                say(&mut out, &reply).await?;
            }
            Command::Delete => {
                let reply = match current(orchestrator) {
                    Some(id) => match orchestrator.delete_conversation(&id).await {
                        Ok(()) => "Deleted.\n".to_string(),
                        Err(e) => format!("Delete failed: {e}\n"),
                    },
                    None => "No current conversation.\n".to_string(),
                };
                say(&mut out, &reply).await?;
            }
            Command::Help => say(&mut out, HELP).await?,
            Command::Unknown(cmd) => {
                say(&mut out, &format!("Unknown command {cmd}; try /help\n")).await?;
            }
        }
    }

    Ok(())
}

fn current(orchestrator: &Orchestrator) -> Option<ConversationId> {
    orchestrator.store().lock().current_id().cloned()
}
