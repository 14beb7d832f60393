//! chat-cli - Terminal surface for the chat pipeline
//!
//! Sends messages to a chat endpoint and prints the assistant's reply as it
//! streams in.
//!
//! # Usage
//!
//! ```bash
//! # Interactive session
//! chat-cli
//!
//! # One message, then exit
//! chat-cli "What is a monad?"
//!
//! # Different endpoint, no streaming
//! chat-cli --base-url http://10.0.0.5:3000 --no-stream
//!
//! # Verbose logging
//! RUST_LOG=debug chat-cli
//! ```
//!
//! Ctrl-C cancels the reply in progress. The partial reply is kept and
//! marked failed.

mod printer;
mod repl;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use chat_core::config::{load_config, load_config_from_path};
use chat_core::{
    ConfigOverrides, ConversationStore, HttpTransport, InMemoryRepository, Message,
    MessageOrchestrator,
};

use printer::Transcript;

/// Orchestrator as wired by this binary
pub type Orchestrator = MessageOrchestrator<HttpTransport, InMemoryRepository>;

/// Chat with a streaming endpoint from the terminal
#[derive(Parser, Debug)]
#[command(name = "chat-cli")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "CHAT_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Endpoint base URL (overrides config)
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Model for new conversations (overrides config)
    #[arg(short = 'm', long)]
    model: Option<String>,

    /// Request whole replies instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Debug logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Message to send; starts an interactive session when omitted
    #[arg(value_name = "MESSAGE")]
    message: Vec<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(url) = &self.base_url {
            overrides = overrides.with_base_url(url.clone());
        }
        if let Some(model) = &self.model {
            overrides = overrides.with_model(model.clone());
        }
        if self.no_stream {
            overrides = overrides.with_stream(false);
        }
        overrides
    }
}

/// Log to stderr so stdout carries only the transcript
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("chat_cli={level},chat_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Send one message; Ctrl-C cancels it
pub async fn send_interruptible(orchestrator: &Orchestrator, text: &str) -> Result<Message> {
    let cancel = CancellationToken::new();
    let send = orchestrator.send_with_cancel(text, None, cancel.clone());
    tokio::pin!(send);

    let result = tokio::select! {
        result = &mut send => result,
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling reply");
            cancel.cancel();
            send.await
        }
    };

    Ok(result?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => load_config_from_path(Some(path.clone())),
        None => load_config(),
    }
    .context("Failed to load configuration")?;
    args.overrides().apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        source = %config.source(),
        base_url = %config.endpoint.base_url,
        model = %config.session.model,
        stream = config.session.stream,
        "Configuration loaded"
    );

    let transport =
        HttpTransport::from_config(&config.endpoint).context("Failed to build HTTP client")?;

    let (tx, rx) = mpsc::channel(256);
    let orchestrator = MessageOrchestrator::new(
        transport,
        InMemoryRepository::new(),
        ConversationStore::new().shared(),
        config.session.clone(),
    )
    .with_updates(tx);

    let one_shot = (!args.message.is_empty()).then(|| args.message.join(" "));
    let transcript = if one_shot.is_some() {
        Transcript::default()
    } else {
        Transcript::with_prompt(repl::PROMPT)
    };
    let printer = tokio::spawn(printer::run(rx, transcript));

    let outcome = match one_shot {
        Some(text) => send_interruptible(&orchestrator, &text).await.map(|_| ()),
        None => repl::run(&orchestrator).await,
    };

    // Closing the update channel lets the printer drain and exit
    drop(orchestrator);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "Printer task failed");
    }

    outcome
}
