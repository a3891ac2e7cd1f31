//! relay-core: WhatsApp LLM Relay Core Library
//!
//! Configuration, chat completion clients, prompt construction and
//! the TTL-bounded conversation history used by the relay gateway.

pub mod config;
pub mod error;
pub mod llm;
pub mod session;

pub use config::{Config, LlmConfig, LlmProvider, ServerConfig, SessionConfig, WhatsAppConfig};
pub use error::{Error, Result};
pub use llm::{
    ChatCompletion, ChatTurn, CompletionRequest, ConversationChain, LlmClient, Role,
    SamplingParams, SYSTEM_PROMPT,
};
#[cfg(feature = "redis-backend")]
pub use session::RedisHistoryStore;
pub use session::{HistoryStore, InMemoryHistoryStore, SessionLocks};
