//! Webhook routes for the WhatsApp Cloud API
//!
//! `GET /webhook` answers Meta's subscription challenge, `POST /webhook`
//! receives message events and replies through the model.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use relay_core::ConversationChain;

use crate::cloud_api::MessageSender;
use crate::error::{Result, WhatsAppError};
use crate::payload::{classify, InboundEvent};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex>` of the raw body, signed with the app secret
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Webhook server state
pub struct WebhookState {
    pub sender: Arc<dyn MessageSender>,
    pub chain: Arc<ConversationChain>,
    pub verify_token: String,
    /// When set, every POST must carry a valid signature
    pub app_secret: Option<String>,
    pub session_ttl: Duration,
}

/// Successful webhook outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Reply generated and delivered
    Received,
    /// Recognized event without messages
    NoContent,
    /// Not a WhatsApp Business event
    NotFound,
}

impl IntoResponse for WebhookOutcome {
    fn into_response(self) -> Response {
        match self {
            WebhookOutcome::Received => (StatusCode::OK, "EVENT_RECEIVED").into_response(),
            WebhookOutcome::NoContent => StatusCode::NO_CONTENT.into_response(),
            WebhookOutcome::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
        }
    }
}

/// Query parameters of Meta's verification request
#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

impl WebhookState {
    /// Challenge to echo back, or `None` when the subscription must be refused
    pub fn verify_subscription(&self, mode: &str, token: &str, challenge: &str) -> Option<String> {
        if mode == "subscribe" && token == self.verify_token {
            Some(challenge.to_string())
        } else {
            None
        }
    }

    /// Check `X-Hub-Signature-256` against the raw body
    pub fn verify_signature(&self, headers: &HeaderMap, body: &[u8]) -> Result<()> {
        let Some(secret) = &self.app_secret else {
            return Ok(());
        };

        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        if signature_matches(secret, body, signature) {
            Ok(())
        } else {
            Err(WhatsAppError::SignatureVerificationFailed)
        }
    }

    /// Route one decoded webhook body: classify, generate, deliver
    pub async fn handle_event(&self, payload: serde_json::Value) -> Result<WebhookOutcome> {
        let message = match classify(payload)? {
            InboundEvent::Unrecognized => return Ok(WebhookOutcome::NotFound),
            InboundEvent::NoMessages => return Ok(WebhookOutcome::NoContent),
            InboundEvent::Message(message) => message,
        };

        info!("Received {:?} message from {}", message.kind, message.from);

        let reply = self
            .chain
            .invoke(&message.from, &message.body, self.session_ttl)
            .await
            .map_err(|e| {
                error!("LLM error: {}", e);
                WhatsAppError::Completion(e)
            })?;

        let status = self
            .sender
            .send_text(&reply, &message.from)
            .await
            .map_err(|e| {
                error!("WhatsApp client error: {}", e);
                e
            })?;

        if !status.is_success() {
            error!("WhatsApp API rejected reply to {}: {}", message.from, status);
            return Err(WhatsAppError::Delivery(status.to_string()));
        }

        Ok(WebhookOutcome::Received)
    }
}

fn signature_matches(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_sig) = header.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&expected).is_ok()
}

/// Create webhook router
pub fn create_webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Liveness check
async fn index() -> Html<&'static str> {
    Html("<p>Hello Llama 2</p>")
}

/// Handle Meta's subscription verification
async fn verify_webhook(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let verified = state.verify_subscription(
        query.mode.as_deref().unwrap_or_default(),
        query.verify_token.as_deref().unwrap_or_default(),
        query.challenge.as_deref().unwrap_or_default(),
    );

    match verified {
        Some(challenge) => {
            info!("Webhook verified successfully");
            (StatusCode::OK, challenge)
        }
        None => {
            warn!("Webhook verification failed: invalid mode or token");
            (StatusCode::FORBIDDEN, "Forbidden".to_string())
        }
    }
}

/// Handle an incoming message event
async fn receive_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<WebhookOutcome> {
    state.verify_signature(&headers, &body).inspect_err(|_| {
        warn!("Rejected webhook with missing or invalid signature");
    })?;

    let payload: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
        warn!("Webhook body is not JSON: {}", e);
        WhatsAppError::InvalidPayload(e.to_string())
    })?;

    debug!("Incoming webhook: {}", payload);

    state.handle_event(payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use relay_core::{
        ChatCompletion, CompletionRequest, HistoryStore, InMemoryHistoryStore, SamplingParams,
    };
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    const SENDER: &str = "2348012345678";

    struct StubLlm {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatCompletion for StubLlm {
        async fn complete(&self, _request: CompletionRequest) -> relay_core::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| relay_core::Error::LlmApi("503 Service Unavailable".to_string()))
        }
    }

    enum SendBehaviour {
        Status(StatusCode),
        TransportError,
    }

    struct RecordingSender {
        behaviour: SendBehaviour,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send_text(&self, body: &str, recipient: &str) -> Result<StatusCode> {
            self.sent
                .lock()
                .unwrap()
                .push((body.to_string(), recipient.to_string()));
            match self.behaviour {
                SendBehaviour::Status(status) => Ok(status),
                SendBehaviour::TransportError => {
                    Err(WhatsAppError::Http("connection reset".to_string()))
                }
            }
        }
    }

    struct Harness {
        llm: Arc<StubLlm>,
        sender: Arc<RecordingSender>,
        store: Arc<InMemoryHistoryStore>,
        router: Router,
    }

    fn harness(
        reply: Option<&'static str>,
        behaviour: SendBehaviour,
        app_secret: Option<&str>,
    ) -> Harness {
        let llm = Arc::new(StubLlm {
            reply,
            calls: AtomicUsize::new(0),
        });
        let sender = Arc::new(RecordingSender {
            behaviour,
            sent: Mutex::new(vec![]),
        });
        let store = Arc::new(InMemoryHistoryStore::new());
        let chain = Arc::new(ConversationChain::new(
            llm.clone(),
            store.clone(),
            SamplingParams::default(),
        ));

        let router = create_webhook_router(WebhookState {
            sender: sender.clone(),
            chain,
            verify_token: "hub-secret".to_string(),
            app_secret: app_secret.map(str::to_string),
            session_ttl: Duration::from_secs(600),
        });

        Harness {
            llm,
            sender,
            store,
            router,
        }
    }

    fn text_payload(body: &str) -> serde_json::Value {
        json!({
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "8856996819413533",
                "changes": [{
                    "value": {
                        "messaging_product": "whatsapp",
                        "messages": [{
                            "from": SENDER,
                            "id": "wamid.HBgM",
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": body }
                        }]
                    },
                    "field": "messages"
                }]
            }]
        })
    }

    fn post(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read_body(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_index_page() {
        let h = harness(Some("unused"), SendBehaviour::Status(StatusCode::OK), None);
        let response = h.router.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "<p>Hello Llama 2</p>");
    }

    #[tokio::test]
    async fn test_verify_echoes_challenge() {
        let h = harness(None, SendBehaviour::Status(StatusCode::OK), None);
        let response = h
            .router
            .oneshot(get(
                "/webhook?hub.mode=subscribe&hub.verify_token=hub-secret&hub.challenge=1158201444",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "1158201444");
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_token_or_mode() {
        for uri in [
            "/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1",
            "/webhook?hub.mode=unsubscribe&hub.verify_token=hub-secret&hub.challenge=1",
            "/webhook",
        ] {
            let h = harness(None, SendBehaviour::Status(StatusCode::OK), None);
            let response = h.router.oneshot(get(uri)).await.unwrap();

            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{}", uri);
            assert_eq!(read_body(response).await, "Forbidden");
        }
    }

    #[tokio::test]
    async fn test_end_to_end_text_message() {
        let h = harness(Some("Hello back"), SendBehaviour::Status(StatusCode::OK), None);
        let response = h
            .router
            .oneshot(post(text_payload("Hi").to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_body(response).await, "EVENT_RECEIVED");

        let sent = h.sender.sent.lock().unwrap();
        assert_eq!(
            *sent,
            vec![("Hello back".to_string(), SENDER.to_string())]
        );

        let history = h.store.load(SENDER).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Hi");
        assert_eq!(history[1].content, "Hello back");
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let h = harness(Some("unused"), SendBehaviour::Status(StatusCode::OK), None);
        let response = h
            .router
            .oneshot(post(json!({ "entry": [] }).to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_messages_is_no_content() {
        let h = harness(Some("unused"), SendBehaviour::Status(StatusCode::OK), None);
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": { "statuses": [{ "status": "read" }] } }] }]
        });
        let response = h.router.oneshot(post(payload.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_failure_skips_delivery() {
        let h = harness(None, SendBehaviour::Status(StatusCode::OK), None);
        let response = h
            .router
            .oneshot(post(text_payload("Hi").to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body, json!({ "message": "Internal server error" }));

        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);
        assert!(h.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_transport_failure() {
        let h = harness(Some("Hello back"), SendBehaviour::TransportError, None);
        let response = h
            .router
            .oneshot(post(text_payload("Hi").to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body, json!({ "message": "Internal server error" }));
        assert_eq!(h.sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_rejected_by_gateway() {
        let h = harness(
            Some("Hello back"),
            SendBehaviour::Status(StatusCode::BAD_REQUEST),
            None,
        );
        let response = h
            .router
            .oneshot(post(text_payload("Hi").to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_reaction_is_forwarded_as_emoji() {
        let h = harness(Some("Glad you liked it"), SendBehaviour::Status(StatusCode::OK), None);
        let payload = json!({
            "object": "whatsapp_business_account",
            "entry": [{ "changes": [{ "value": { "messages": [{
                "from": SENDER,
                "type": "reaction",
                "reaction": { "message_id": "wamid.X", "emoji": "👍" }
            }] } }] }]
        });
        let response = h.router.oneshot(post(payload.to_string())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.store.load(SENDER).await.unwrap()[0].content, "👍");
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let h = harness(Some("unused"), SendBehaviour::Status(StatusCode::OK), None);
        let response = h.router.oneshot(post("{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_signature_required_when_secret_configured() {
        let secret = "app-secret";
        let body = text_payload("Hi").to_string();

        let h = harness(Some("Hello back"), SendBehaviour::Status(StatusCode::OK), Some(secret));
        let response = h.router.oneshot(post(body.clone())).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(h.sender.sent.lock().unwrap().is_empty());

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body.as_bytes());
        let signature = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        let h = harness(Some("Hello back"), SendBehaviour::Status(StatusCode::OK), Some(secret));
        let mut request = post(body);
        request
            .headers_mut()
            .insert("X-Hub-Signature-256", signature.parse().unwrap());
        let response = h.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_signature_matches() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(body);
        let valid = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

        assert!(signature_matches("secret", body, &valid));
        assert!(!signature_matches("other", body, &valid));
        assert!(!signature_matches("secret", body, "sha256=zz"));
        assert!(!signature_matches("secret", body, ""));
    }
}
