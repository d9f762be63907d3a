//! Chat Relay Server
//!
//! Runs the streaming chat relay as a standalone HTTP server.

use anyhow::Result;
use chat_relay::{run_server, RelayConfig};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "chat-relay-server")]
#[command(about = "Streaming relay between a chat UI and an OpenAI-compatible completion service")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "50505", env = "CHAT_RELAY_PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "CHAT_RELAY_HOST")]
    host: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_relay=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = RelayConfig::from_env();

    info!("Starting Chat Relay Server");
    info!("  Model: {}", config.model);
    info!("  Listening on: {}:{}", args.host, args.port);

    run_server(config, &args.host, args.port).await?;

    Ok(())
}
