//! LLM API client, prompt formatting and the conversation chain
//!
//! Supports Replicate-hosted Llama 2 chat models and OpenAI-compatible APIs.

mod chain;
mod client;
mod prompt;
mod types;

pub use chain::ConversationChain;
pub use client::{ChatCompletion, LlmClient};
pub use prompt::{llama2_chat_prompt, OPENING_GREETING, SYSTEM_PROMPT};
pub use types::*;
