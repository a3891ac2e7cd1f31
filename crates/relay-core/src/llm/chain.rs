//! Conversation chain: history lookup, generation and history append

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::Result;
use crate::session::{HistoryStore, SessionLocks};

use super::client::ChatCompletion;
use super::prompt::SYSTEM_PROMPT;
use super::types::{ChatTurn, CompletionRequest, SamplingParams};

/// Runs one conversational turn scoped to a session.
///
/// The system prompt is prepended to every request and never written to the
/// history store. Turns of the same session are serialized so two messages
/// from one sender cannot interleave their read and append.
pub struct ConversationChain {
    llm: Arc<dyn ChatCompletion>,
    history: Arc<dyn HistoryStore>,
    locks: SessionLocks,
    system_prompt: String,
    sampling: SamplingParams,
}

impl ConversationChain {
    pub fn new(
        llm: Arc<dyn ChatCompletion>,
        history: Arc<dyn HistoryStore>,
        sampling: SamplingParams,
    ) -> Self {
        Self {
            llm,
            history,
            locks: SessionLocks::new(),
            system_prompt: SYSTEM_PROMPT.to_string(),
            sampling,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Generate a reply to `input` in the context of `session_id`.
    ///
    /// On success the human turn and the reply are appended to the session
    /// and its TTL is refreshed. Nothing is stored when generation fails.
    pub async fn invoke(&self, session_id: &str, input: &str, ttl: Duration) -> Result<String> {
        let result = {
            let _guard = self.locks.lock(session_id).await;
            self.run_turn(session_id, input, ttl).await
        };
        self.locks.prune();

        let reply = result?;
        info!("Generated reply for session {} ({} chars)", session_id, reply.len());
        Ok(reply)
    }

    /// Load, generate and append. Caller holds the session lock.
    async fn run_turn(&self, session_id: &str, input: &str, ttl: Duration) -> Result<String> {
        let history = self.history.load(session_id).await?;
        debug!("Loaded {} turns for session {}", history.len(), session_id);

        let request = CompletionRequest::builder(input)
            .system(&self.system_prompt)
            .history(history)
            .sampling(self.sampling)
            .build();

        let reply = self.llm.complete(request).await?;

        self.history
            .append(
                session_id,
                &[ChatTurn::human(input), ChatTurn::assistant(&reply)],
                ttl,
            )
            .await?;

        Ok(reply)
    }

    /// Forget everything stored for a session
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        self.history.clear(session_id).await
    }
}
