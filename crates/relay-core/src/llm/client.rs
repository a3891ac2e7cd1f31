//! LLM API HTTP Client
//!
//! Supports the Replicate predictions API (Llama 2 chat models) and
//! OpenAI-compatible chat completion servers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::{Config, LlmProvider};
use crate::error::{Error, Result};

use super::prompt::llama2_chat_prompt;
use super::types::*;

/// Something that turns a prompt into generated text
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Generate the assistant reply for `request`
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// LLM API client
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: LlmProvider,
    timeout: Duration,
    poll_interval: Duration,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            api_key: config.llm.api_key.clone(),
            model: config.llm.model.clone(),
            base_url: config.llm_base_url().trim_end_matches('/').to_string(),
            provider: config.llm.provider.clone(),
            timeout,
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Create with custom base URL (for testing or custom endpoints)
    pub fn with_base_url(config: &Config, base_url: String) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.base_url = base_url.trim_end_matches('/').to_string();
        Ok(client)
    }

    /// Override how often a pending prediction is re-fetched
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Get the model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the provider type
    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }

    /// `owner/name:version` is split into a model path and a version hash
    fn model_version(&self) -> (&str, Option<&str>) {
        match self.model.split_once(':') {
            Some((model, version)) => (model, Some(version)),
            None => (self.model.as_str(), None),
        }
    }

    /// Run a prediction on Replicate, waiting for it to finish
    async fn send_replicate_request(&self, request: &CompletionRequest) -> Result<String> {
        let (model, version) = self.model_version();
        let url = match version {
            Some(_) => format!("{}/predictions", self.base_url),
            None => format!("{}/models/{}/predictions", self.base_url, model),
        };

        let body = PredictionRequest {
            version: version.map(str::to_string),
            input: PredictionInput {
                prompt: llama2_chat_prompt(request),
                temperature: request.sampling.temperature,
                top_p: request.sampling.top_p,
                max_new_tokens: request.sampling.max_new_tokens,
            },
        };

        debug!("Sending prediction to Replicate: {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await?;

        let mut prediction = Self::parse_prediction(response).await?;

        while !prediction.status.is_terminal() {
            let Some(get_url) = prediction.urls.as_ref().map(|u| u.get.clone()) else {
                return Err(Error::PredictionIncomplete(format!(
                    "prediction {} is {:?} and has no polling URL",
                    prediction.id, prediction.status
                )));
            };

            debug!("Prediction {} still {:?}, polling", prediction.id, prediction.status);
            tokio::time::sleep(self.poll_interval).await;

            let response = self.client.get(&get_url).bearer_auth(&self.api_key).send().await?;
            prediction = Self::parse_prediction(response).await?;
        }

        match prediction.status {
            PredictionStatus::Succeeded => {
                let text = prediction.output_text().unwrap_or_default();
                info!("Replicate prediction {} succeeded ({} chars)", prediction.id, text.len());
                Ok(text)
            }
            PredictionStatus::Failed => {
                warn!("Replicate prediction {} failed", prediction.id);
                Err(Error::LlmApi(prediction.error_message()))
            }
            other => Err(Error::PredictionIncomplete(format!(
                "prediction {} ended as {:?}",
                prediction.id, other
            ))),
        }
    }

    async fn parse_prediction(response: reqwest::Response) -> Result<Prediction> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("Replicate API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse prediction: {} - {}", e, body)))
    }

    /// Send request to an OpenAI-compatible API
    async fn send_openai_request(&self, request: &CompletionRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!("Sending request to OpenAI-compatible API: {}", url);

        let body = ChatCompletionRequest::from_request(&self.model, request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!("OpenAI API error: {} - {}", status, body);
            return Err(Error::LlmApi(format!("{}: {}", status, body)));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| Error::LlmApi(format!("Failed to parse response: {} - {}", e, body)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::LlmApi("response contained no choices".to_string()))?;

        info!(
            "OpenAI API response: finish_reason={:?}, tokens={}",
            choice.finish_reason,
            parsed.usage.map(|u| u.completion_tokens).unwrap_or(0)
        );

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[async_trait]
impl ChatCompletion for LlmClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let generation = async {
            match self.provider {
                LlmProvider::Replicate => self.send_replicate_request(&request).await,
                LlmProvider::OpenAi => self.send_openai_request(&request).await,
            }
        };

        let text = tokio::time::timeout(self.timeout, generation)
            .await
            .map_err(|_| {
                Error::PredictionIncomplete(format!("no result within {:?}", self.timeout))
            })??;

        let text = text.trim();
        if text.is_empty() {
            return Err(Error::LlmApi("model returned an empty completion".to_string()));
        }

        Ok(text.to_string())
    }
}
