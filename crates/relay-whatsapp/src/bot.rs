//! WhatsApp bot wrapper

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::info;

use relay_core::{Config, ConversationChain};

use crate::cloud_api::{CloudApiClient, MessageSender};
use crate::error::{Result, WhatsAppError};
use crate::webhook::{create_webhook_router, WebhookState};

/// WhatsApp bot: Cloud API client plus the webhook server
pub struct WhatsAppBot {
    sender: Arc<dyn MessageSender>,
    chain: Arc<ConversationChain>,
    verify_token: String,
    app_secret: Option<String>,
    session_ttl: Duration,
    port: u16,
}

impl WhatsAppBot {
    /// Create a new WhatsApp bot
    pub fn new(config: &Config, chain: Arc<ConversationChain>) -> Result<Self> {
        let client = CloudApiClient::new(&config.whatsapp)?;

        Ok(Self::with_sender(config, chain, Arc::new(client)))
    }

    /// Create a bot that replies through a custom sender
    pub fn with_sender(
        config: &Config,
        chain: Arc<ConversationChain>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            sender,
            chain,
            verify_token: config.whatsapp.verify_token.clone(),
            app_secret: config.whatsapp.app_secret.clone(),
            session_ttl: Duration::from_secs(config.session.ttl_secs),
            port: config.server.port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn into_state(self) -> WebhookState {
        WebhookState {
            sender: self.sender,
            chain: self.chain,
            verify_token: self.verify_token,
            app_secret: self.app_secret,
            session_ttl: self.session_ttl,
        }
    }

    /// Serve the webhook until `shutdown` resolves
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WhatsAppError::Config(format!("Failed to bind {}: {}", addr, e)))?;

        info!("WhatsApp webhook server listening on {}", addr);
        self.serve(listener, shutdown).await
    }

    /// Serve the webhook on an already bound listener
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_webhook_router(self.into_state());

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| WhatsAppError::Http(format!("Server error: {}", e)))?;

        info!("WhatsApp webhook server stopped");
        Ok(())
    }
}
