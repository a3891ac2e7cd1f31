//! Redis-backed history store
//!
//! Layout is compatible with LangChain's `RedisChatMessageHistory`: each
//! session is a list at `message_store:{session_id}`, newest message at the
//! head, and every write refreshes the key's expiry.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::HistoryStore;
use crate::llm::{ChatTurn, Role};
use crate::{Error, Result};

/// Default key prefix for session lists
pub const DEFAULT_KEY_PREFIX: &str = "message_store:";

/// Stored message envelope
#[derive(Debug, Serialize, Deserialize)]
struct StoredMessage {
    #[serde(rename = "type")]
    kind: String,
    data: StoredMessageData,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredMessageData {
    content: String,
}

fn encode_turn(turn: &ChatTurn) -> Result<String> {
    let kind = match turn.role {
        Role::System => "system",
        Role::Human => "human",
        Role::Assistant => "ai",
    };
    let message = StoredMessage {
        kind: kind.to_string(),
        data: StoredMessageData {
            content: turn.content.clone(),
        },
    };
    Ok(serde_json::to_string(&message)?)
}

fn decode_turn(raw: &str) -> Option<ChatTurn> {
    let message: StoredMessage = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!("Skipping unreadable history entry: {}", e);
            return None;
        }
    };

    let role = match message.kind.as_str() {
        "system" => Role::System,
        "human" => Role::Human,
        "ai" => Role::Assistant,
        other => {
            warn!("Skipping history entry of unknown type: {}", other);
            return None;
        }
    };

    Some(ChatTurn {
        role,
        content: message.data.content,
    })
}

/// Turns in conversation order from an `LRANGE 0 -1` reply.
///
/// `LPUSH` stores newest first, so the list is read back to front.
fn turns_from_list(raw: &[String]) -> Vec<ChatTurn> {
    raw.iter().rev().filter_map(|r| decode_turn(r)).collect()
}

/// History store backed by Redis lists with key expiry
#[derive(Clone)]
pub struct RedisHistoryStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisHistoryStore {
    /// Connect to Redis (redis://host:port)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;

        info!("Connected to Redis history store at {}", url);

        Ok(Self {
            conn,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        })
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn load(&self, session_id: &str) -> Result<Vec<ChatTurn>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(self.key(session_id), 0, -1).await?;

        Ok(turns_from_list(&raw))
    }

    async fn append(&self, session_id: &str, turns: &[ChatTurn], ttl: Duration) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let key = self.key(session_id);
        let encoded = turns.iter().map(encode_turn).collect::<Result<Vec<_>>>()?;
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| Error::SessionStore(format!("TTL too large: {:?}", ttl)))?;

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lpush(&key, encoded)
            .ignore()
            .expire(&key, ttl_secs)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Appended {} turns to {} (ttl {}s)", turns.len(), key, ttl_secs);
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key(session_id)).await?;
        Ok(())
    }
}
