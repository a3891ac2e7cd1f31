//! WhatsApp Cloud API client

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use relay_core::WhatsAppConfig;

use crate::error::Result;

/// Sends text replies to WhatsApp users
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send `body` to `recipient` and return the gateway's status code.
    ///
    /// Only transport failures are errors; a non-2xx status is returned as is.
    async fn send_text(&self, body: &str, recipient: &str) -> Result<StatusCode>;
}

/// WhatsApp Cloud API (Graph API) client
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    client: Client,
    api_token: String,
    phone_number_id: String,
    base_url: String,
}

/// Outgoing text message envelope
#[derive(Debug, Serialize)]
struct SendMessagePayload<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    text: TextPayload<'a>,
}

#[derive(Debug, Serialize)]
struct TextPayload<'a> {
    preview_url: bool,
    body: &'a str,
}

impl CloudApiClient {
    /// Create a new Cloud API client
    pub fn new(config: &WhatsAppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_token: config.api_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base_url, self.phone_number_id)
    }
}

#[async_trait]
impl MessageSender for CloudApiClient {
    async fn send_text(&self, body: &str, recipient: &str) -> Result<StatusCode> {
        info!("Sending WhatsApp message to {}", recipient);

        let payload = SendMessagePayload {
            messaging_product: "whatsapp",
            to: recipient,
            message_type: "text",
            text: TextPayload {
                preview_url: false,
                body,
            },
        };

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("WhatsApp API accepted message to {}: {}", recipient, status);
        } else {
            let text = response.text().await.unwrap_or_default();
            warn!("WhatsApp API returned {} for {}: {}", status, recipient, text);
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WhatsAppError;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_url: &str) -> WhatsAppConfig {
        WhatsAppConfig {
            api_token: "EAAG-token".to_string(),
            phone_number_id: "106540352242922".to_string(),
            verify_token: "verify".to_string(),
            app_secret: None,
            api_url: api_url.to_string(),
            timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_send_text_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/106540352242922/messages"))
            .and(header("authorization", "Bearer EAAG-token"))
            .and(body_json(json!({
                "messaging_product": "whatsapp",
                "to": "2348012345678",
                "type": "text",
                "text": { "preview_url": false, "body": "Hello back" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messaging_product": "whatsapp",
                "messages": [{ "id": "wamid.HBgM" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudApiClient::new(&test_config(&server.uri())).unwrap();
        let status = client.send_text("Hello back", "2348012345678").await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Invalid OAuth access token." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CloudApiClient::new(&test_config(&server.uri())).unwrap();
        let status = client.send_text("Hi", "2348012345678").await.unwrap();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_transport_failure_is_an_error() {
        // Nothing listens on port 9 (discard)
        let client = CloudApiClient::new(&test_config("http://127.0.0.1:9")).unwrap();
        let result = client.send_text("Hi", "2348012345678").await;
        assert!(matches!(result, Err(WhatsAppError::Http(_))));
    }

    #[test]
    fn test_messages_url_trims_slash() {
        let config = test_config("https://graph.facebook.com/v18.0/");
        let client = CloudApiClient::new(&config).unwrap();
        assert_eq!(
            client.messages_url(),
            "https://graph.facebook.com/v18.0/106540352242922/messages"
        );
    }
}
