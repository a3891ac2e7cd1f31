//! relay-gateway: WhatsApp to LLM relay
//!
//! Usage:
//!   relay-gateway           - Start the webhook server
//!   relay-gateway --help    - Show help
//!   relay-gateway --version - Show version

use std::sync::Arc;

use relay_core::{
    Config, ConversationChain, HistoryStore, InMemoryHistoryStore, LlmClient, RedisHistoryStore,
    SamplingParams,
};
use relay_whatsapp::WhatsAppBot;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    /// Webhook server
    Server,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match parse_args() {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("relay-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server => {}
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting relay-gateway...");
    tracing::info!(
        "LLM provider: {:?}, model: {}",
        config.llm.provider,
        config.llm.model
    );

    run_server(config).await
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Server
}

/// Print help message
fn print_help() {
    println!("relay-gateway - WhatsApp to LLM relay");
    println!();
    println!("Usage:");
    println!("  relay-gateway           Start the webhook server");
    println!("  relay-gateway --help    Show this help message");
    println!("  relay-gateway --version Show version");
    println!();
    println!("Settings are read from relay-gateway.toml when present, then from the environment.");
    println!();
    println!("Environment Variables:");
    println!("  WHATSAPP_API_TOKEN        Graph API access token (required)");
    println!("  WHATSAPP_CLOUD_NUMBER_ID  Sending phone number id (required)");
    println!("  META_VERIFY_TOKEN         Webhook verification token (required)");
    println!("  META_APP_SECRET           App secret for X-Hub-Signature-256 checks");
    println!("  REPLICATE_API_TOKEN       Replicate API token (or LLM_API_KEY)");
    println!("  LLM_PROVIDER              replicate or openai (default: replicate)");
    println!("  LLM_MODEL                 Model id (default: meta/llama-2-13b-chat)");
    println!("  LLM_BASE_URL              Custom API endpoint");
    println!("  SESSION_TTL_SECS          Conversation lifetime (default: 600)");
    println!("  REDIS_URL                 Redis history store (default: in memory)");
    println!("  SERVER_PORT               Listen port (default: 5000)");
}

/// Wire the store, chain and bot, then serve until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let llm = LlmClient::new(&config)
        .map_err(|e| anyhow::anyhow!("Failed to create LLM client: {}", e))?;

    let history: Arc<dyn HistoryStore> = match &config.session.redis_url {
        Some(url) => {
            let store = RedisHistoryStore::connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?;
            tracing::info!("Conversation history stored in Redis");
            Arc::new(store)
        }
        None => {
            tracing::info!("REDIS_URL not set, keeping conversation history in memory");
            Arc::new(InMemoryHistoryStore::new())
        }
    };

    let chain = Arc::new(ConversationChain::new(
        Arc::new(llm),
        history,
        SamplingParams::from(&config.llm),
    ));

    let bot = WhatsAppBot::new(&config, chain)
        .map_err(|e| anyhow::anyhow!("Failed to create WhatsApp bot: {}", e))?;

    tracing::info!("Session TTL: {}s", config.session.ttl_secs);
    tracing::info!("Press Ctrl+C to exit");

    bot.start(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Webhook server error: {}", e))?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
