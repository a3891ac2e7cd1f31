//! Webhook payload decoding
//!
//! Payload reference:
//! <https://developers.facebook.com/docs/whatsapp/cloud-api/webhooks/payload-examples#text-messages>

use serde::Deserialize;

use crate::error::{Result, WhatsAppError};

/// Body used in place of message kinds the relay cannot forward
pub const UNSUPPORTED_NOTICE: &str = "Sorry, we only support text messages for now.😊";

#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    pub from: String,
    pub id: Option<String>,
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub text: Option<TextContent>,
    pub reaction: Option<ReactionContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ReactionContent {
    pub message_id: Option<String>,
    /// Absent when the user removes a reaction
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Reaction,
    Unsupported,
}

/// A message normalized to the text the model should see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender phone number, also the session id
    pub from: String,
    pub kind: MessageKind,
    pub body: String,
}

impl From<&WebhookMessage> for InboundMessage {
    fn from(message: &WebhookMessage) -> Self {
        let (kind, body) = if let Some(text) = &message.text {
            (MessageKind::Text, text.body.clone())
        } else if let Some(emoji) = message.reaction.as_ref().and_then(|r| r.emoji.clone()) {
            (MessageKind::Reaction, emoji)
        } else {
            (MessageKind::Unsupported, UNSUPPORTED_NOTICE.to_string())
        };

        Self {
            from: message.from.clone(),
            kind,
            body,
        }
    }
}

/// What an inbound webhook call turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// No top-level `object` marker
    Unrecognized,
    /// Recognized, but carries no messages (e.g. delivery status updates)
    NoMessages,
    Message(InboundMessage),
}

/// Classify a decoded JSON body.
///
/// Only the `object` marker's presence is checked. The first message of the
/// first change that carries messages is decoded; the rest of the body is
/// never validated.
pub fn classify(payload: serde_json::Value) -> Result<InboundEvent> {
    if payload.get("object").is_none() {
        return Ok(InboundEvent::Unrecognized);
    }

    let Some(raw) = first_message(&payload) else {
        return Ok(InboundEvent::NoMessages);
    };

    let message: WebhookMessage = serde_json::from_value(raw.clone())
        .map_err(|e| WhatsAppError::InvalidPayload(e.to_string()))?;

    Ok(InboundEvent::Message(InboundMessage::from(&message)))
}

/// `entry[].changes[].value.messages[0]` of the first change with messages
fn first_message(payload: &serde_json::Value) -> Option<&serde_json::Value> {
    payload
        .get("entry")?
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("changes")?.as_array())
        .flatten()
        .filter_map(|change| change.get("value")?.get("messages")?.as_array())
        .find_map(|messages| messages.first())
}
