//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables (a `.env` file is loaded by the binary first)
//! 2. `relay-gateway.toml` in the working directory
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::Error;

/// Default config file name looked up by [`Config::load`]
pub const CONFIG_FILE_NAME: &str = "relay-gateway.toml";

/// Llama 2 13B chat hosted on Replicate
pub const DEFAULT_MODEL: &str =
    "meta/llama-2-13b-chat:f4e2de70d66816a838a89eeeb621910adffb0dd0baba3976c96980970978018d";

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Replicate predictions API (Llama 2 chat prompt format)
    #[default]
    Replicate,
    /// OpenAI-compatible chat completions API (vLLM, llama.cpp server, etc.)
    OpenAi,
}

impl LlmProvider {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "openai" | "vllm" | "ollama" | "llamacpp" => LlmProvider::OpenAi,
            _ => LlmProvider::Replicate,
        }
    }

    /// Endpoint used when no base URL is configured
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::Replicate => "https://api.replicate.com/v1",
            LlmProvider::OpenAi => "https://api.openai.com/v1",
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key (Replicate token or bearer key)
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// API provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling threshold
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: u32,

    /// Request timeout for a whole generation, in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            provider: LlmProvider::Replicate,
            base_url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_new_tokens: default_max_new_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// WhatsApp Cloud API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    /// Bearer token for the Cloud API
    pub api_token: String,

    /// Phone number id messages are sent from
    pub phone_number_id: String,

    /// Secret echoed back by Meta during webhook subscription
    pub verify_token: String,

    /// App secret used to check `X-Hub-Signature-256` (optional)
    pub app_secret: Option<String>,

    #[serde(default = "default_whatsapp_api_url")]
    pub api_url: String,

    #[serde(default = "default_whatsapp_timeout")]
    pub timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            phone_number_id: String::new(),
            verify_token: String::new(),
            app_secret: None,
            api_url: default_whatsapp_api_url(),
            timeout_secs: default_whatsapp_timeout(),
        }
    }
}

/// Conversation history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a conversation survives without new turns
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Redis URL; the in-memory store is used when unset
    pub redis_url: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            redis_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port for the webhook server
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
        }
    }
}

/// Main configuration for relay-gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_temperature() -> f32 {
    0.01
}

fn default_top_p() -> f32 {
    1.0
}

fn default_max_new_tokens() -> u32 {
    500
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_whatsapp_api_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_whatsapp_timeout() -> u64 {
    30
}

fn default_session_ttl() -> u64 {
    600
}

fn default_server_port() -> u16 {
    5000
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment.
    ///
    /// Unknown variables expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&Self::expand_env_vars(&toml_content))?;
        cfg.apply_env_overrides();
        cfg.validate()?;

        Ok(cfg)
    }

    fn from_toml_str(content: &str) -> crate::Result<Self> {
        let toml: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;
        Ok(Self::from_toml_config(toml))
    }

    /// Load from `relay-gateway.toml` if present, otherwise from the environment only
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            return Self::from_toml_file(CONFIG_FILE_NAME);
        }

        Self::from_env()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_toml_config(toml: TomlConfig) -> Self {
        let defaults = Config::default();

        let llm = toml.llm.unwrap_or_default();
        let llm_config = LlmConfig {
            api_key: llm.api_key.unwrap_or_default(),
            model: llm.model.unwrap_or(defaults.llm.model),
            provider: llm
                .provider
                .as_deref()
                .map(LlmProvider::parse)
                .unwrap_or_default(),
            base_url: llm.base_url,
            temperature: llm.temperature.unwrap_or(defaults.llm.temperature),
            top_p: llm.top_p.unwrap_or(defaults.llm.top_p),
            max_new_tokens: llm.max_new_tokens.unwrap_or(defaults.llm.max_new_tokens),
            timeout_secs: llm.timeout_secs.unwrap_or(defaults.llm.timeout_secs),
        };

        let whatsapp = toml.whatsapp.unwrap_or_default();
        let whatsapp_config = WhatsAppConfig {
            api_token: whatsapp.api_token.unwrap_or_default(),
            phone_number_id: whatsapp.phone_number_id.unwrap_or_default(),
            verify_token: whatsapp.verify_token.unwrap_or_default(),
            app_secret: whatsapp.app_secret.filter(|s| !s.is_empty()),
            api_url: whatsapp.api_url.unwrap_or(defaults.whatsapp.api_url),
            timeout_secs: whatsapp.timeout_secs.unwrap_or(defaults.whatsapp.timeout_secs),
        };

        let session = toml.session.unwrap_or_default();
        let session_config = SessionConfig {
            ttl_secs: session.ttl_secs.unwrap_or(defaults.session.ttl_secs),
            redis_url: session.redis_url.filter(|s| !s.is_empty()),
        };

        let server = toml.server.unwrap_or_default();
        let server_config = ServerConfig {
            port: server.port.unwrap_or(defaults.server.port),
        };

        Config {
            llm: llm_config,
            whatsapp: whatsapp_config,
            session: session_config,
            server: server_config,
        }
    }

    /// Override settings with environment variables
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        // LLM
        if let Some(provider) = non_empty("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider);
        }
        if let Some(key) = non_empty("LLM_API_KEY").or_else(|| non_empty("REPLICATE_API_TOKEN")) {
            self.llm.api_key = key;
        }
        if let Some(model) = non_empty("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = non_empty("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(t) = non_empty("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.llm.temperature = t;
        }
        if let Some(p) = non_empty("LLM_TOP_P").and_then(|v| v.parse().ok()) {
            self.llm.top_p = p;
        }
        if let Some(n) = non_empty("LLM_MAX_NEW_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_new_tokens = n;
        }
        if let Some(secs) = non_empty("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.llm.timeout_secs = secs;
        }

        // WhatsApp
        if let Some(token) = non_empty("WHATSAPP_API_TOKEN") {
            self.whatsapp.api_token = token;
        }
        if let Some(id) = non_empty("WHATSAPP_CLOUD_NUMBER_ID") {
            self.whatsapp.phone_number_id = id;
        }
        if let Some(token) = non_empty("META_VERIFY_TOKEN") {
            self.whatsapp.verify_token = token;
        }
        if let Some(secret) = non_empty("META_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret);
        }
        if let Some(url) = non_empty("WHATSAPP_API_URL") {
            self.whatsapp.api_url = url;
        }
        if let Some(secs) = non_empty("WHATSAPP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.whatsapp.timeout_secs = secs;
        }

        // Session
        if let Some(ttl) = non_empty("SESSION_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.session.ttl_secs = ttl;
        }
        if let Some(url) = non_empty("REDIS_URL") {
            self.session.redis_url = Some(url);
        }

        // Server
        if let Some(port) = non_empty("SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
    }

    /// Check that every required credential is present
    pub fn validate(&self) -> crate::Result<()> {
        let required = [
            ("WHATSAPP_API_TOKEN", &self.whatsapp.api_token),
            ("WHATSAPP_CLOUD_NUMBER_ID", &self.whatsapp.phone_number_id),
            ("META_VERIFY_TOKEN", &self.whatsapp.verify_token),
            ("REPLICATE_API_TOKEN or LLM_API_KEY", &self.llm.api_key),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!("missing settings: {}", missing.join(", "))))
        }
    }

    /// Effective LLM endpoint
    pub fn llm_base_url(&self) -> String {
        self.llm
            .base_url
            .clone()
            .unwrap_or_else(|| self.llm.provider.default_base_url().to_string())
    }
}

// ============================================================================
// TOML file layout
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    whatsapp: Option<TomlWhatsAppConfig>,
    session: Option<TomlSessionConfig>,
    server: Option<TomlServerConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    /// "replicate" or "openai"
    provider: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    top_p: Option<f32>,
    max_new_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlWhatsAppConfig {
    api_token: Option<String>,
    phone_number_id: Option<String>,
    verify_token: Option<String>,
    app_secret: Option<String>,
    api_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlSessionConfig {
    ttl_secs: Option<u64>,
    redis_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlServerConfig {
    port: Option<u16>,
}
