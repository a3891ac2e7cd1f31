//! Conversation history storage

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::llm::ChatTurn;
use crate::Result;

/// Key-value store mapping a session id to its ordered turns, with a TTL
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Turns stored for `session_id`, oldest first. Unknown or expired sessions are empty.
    async fn load(&self, session_id: &str) -> Result<Vec<ChatTurn>>;

    /// Append `turns` and reset the session's time-to-live to `ttl`
    async fn append(&self, session_id: &str, turns: &[ChatTurn], ttl: Duration) -> Result<()>;

    /// Drop the session entirely
    async fn clear(&self, session_id: &str) -> Result<()>;
}

/// A single conversation session
#[derive(Debug, Clone)]
struct Session {
    turns: Vec<ChatTurn>,
    expires_at: Instant,
}

impl Session {
    fn new(ttl: Duration) -> Self {
        Self {
            turns: Vec::new(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-memory history store, used when no Redis URL is configured
#[derive(Debug, Default, Clone)]
pub struct InMemoryHistoryStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl InMemoryHistoryStore {
    /// Create a new session store
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of sessions that have not expired
    pub async fn session_count(&self) -> usize {
        let now = Instant::now();
        let sessions = self.sessions.read().await;
        sessions.values().filter(|s| !s.is_expired(now)).count()
    }

    /// Remove expired sessions, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        before - sessions.len()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn load(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|s| !s.is_expired(Instant::now()))
            .map(|s| s.turns.clone())
            .unwrap_or_default())
    }

    async fn append(&self, session_id: &str, turns: &[ChatTurn], ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;

        // Sweep on write so abandoned sessions do not accumulate
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        if sessions.len() != before {
            debug!("Purged {} expired sessions", before - sessions.len());
        }

        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(ttl));
        session.turns.extend_from_slice(turns);
        session.expires_at = now + ttl;

        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }
}
