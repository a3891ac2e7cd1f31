//! Chat completion types

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Fixed sampling parameters passed to the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 0.01,
            top_p: 1.0,
            max_new_tokens: 500,
        }
    }
}

impl From<&crate::config::LlmConfig> for SamplingParams {
    fn from(config: &crate::config::LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_p: config.top_p,
            max_new_tokens: config.max_new_tokens,
        }
    }
}

/// A single generation request: system instructions, prior turns and the new input
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub history: Vec<ChatTurn>,
    pub input: String,
    pub sampling: SamplingParams,
}

impl CompletionRequest {
    pub fn builder(input: impl Into<String>) -> CompletionRequestBuilder {
        CompletionRequestBuilder::new(input)
    }

    /// System, history and input flattened into one ordered list
    pub fn turns(&self) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(self.history.len() + 2);
        if !self.system.is_empty() {
            turns.push(ChatTurn::system(&self.system));
        }
        turns.extend(self.history.iter().cloned());
        turns.push(ChatTurn::human(&self.input));
        turns
    }
}

/// Builder for [`CompletionRequest`]
pub struct CompletionRequestBuilder {
    system: String,
    history: Vec<ChatTurn>,
    input: String,
    sampling: SamplingParams,
}

impl CompletionRequestBuilder {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            system: String::new(),
            history: vec![],
            input: input.into(),
            sampling: SamplingParams::default(),
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn history(mut self, history: Vec<ChatTurn>) -> Self {
        self.history = history;
        self
    }

    pub fn sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn build(self) -> CompletionRequest {
        CompletionRequest {
            system: self.system,
            history: self.history,
            input: self.input,
            sampling: self.sampling,
        }
    }
}

// ============================================================================
// Replicate predictions API
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    /// Model version hash; omitted when posting to a model-scoped endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub prompt: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_new_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PredictionStatus::Starting | PredictionStatus::Processing)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionUrls {
    pub get: String,
}

impl Prediction {
    /// Language models stream tokens, so output is usually a list of string chunks
    pub fn output_text(&self) -> Option<String> {
        match self.output.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(chunks) => Some(
                chunks
                    .iter()
                    .filter_map(|c| c.as_str())
                    .collect::<String>(),
            ),
            _ => None,
        }
    }

    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        }
    }
}

// ============================================================================
// OpenAI-compatible chat completions API
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiMessage {
    pub role: String,
    pub content: String,
}

impl From<&ChatTurn> for OpenAiMessage {
    fn from(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            Role::System => "system",
            Role::Human => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role: role.to_string(),
            content: turn.content.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OpenAiMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl ChatCompletionRequest {
    pub fn from_request(model: &str, request: &CompletionRequest) -> Self {
        Self {
            model: model.to_string(),
            messages: request.turns().iter().map(OpenAiMessage::from).collect(),
            temperature: request.sampling.temperature,
            top_p: request.sampling.top_p,
            max_tokens: request.sampling.max_new_tokens,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessageResponse,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessageResponse {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OpenAiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}
