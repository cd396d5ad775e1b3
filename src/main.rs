use anyhow::Context;

use taskmaster_ai::channels::CliChannel;
use taskmaster_ai::chat::{ChatSession, SessionConfig};
use taskmaster_ai::config::AssistantConfig;
use taskmaster_ai::error::{ConfigError, Error, Result};
use taskmaster_ai::llm::create_provider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(()) => Ok(()),
        Err(Error::Config(ConfigError::MissingEnvVar(var))) => {
            eprintln!("Error: {} not set", var);
            eprintln!("  export {}=...", var);
            std::process::exit(1);
        }
        Err(e @ Error::Config(_)) => Err(e).context("invalid configuration"),
        Err(e) => Err(e).context("chat loop failed"),
    }
}

async fn run() -> Result<()> {
    let config = AssistantConfig::from_env()?;

    eprintln!("🤖 TaskMaster AI v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Endpoint: {}", config.api_base);
    eprintln!(
        "   Replies: {}",
        if config.stream { "streamed" } else { "whole" }
    );
    eprintln!("   Type a message and press Enter. /help for commands, /quit to exit.\n");

    let llm = create_provider(&config);
    let session = ChatSession::new(llm, SessionConfig::from(&config));

    CliChannel::new(session, config.user_id.clone()).run().await
}
