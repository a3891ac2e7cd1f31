//! relay-whatsapp: WhatsApp Cloud API front end for the relay
//!
//! Receives webhook events from Meta, generates a reply through
//! [`relay_core::ConversationChain`] and sends it back with the Graph API.

pub mod bot;
pub mod cloud_api;
pub mod error;
pub mod payload;
pub mod webhook;

pub use bot::WhatsAppBot;
pub use cloud_api::{CloudApiClient, MessageSender};
pub use error::{Result, WhatsAppError};
pub use payload::{classify, InboundEvent, InboundMessage, MessageKind, UNSUPPORTED_NOTICE};
pub use webhook::{create_webhook_router, WebhookOutcome, WebhookState};
