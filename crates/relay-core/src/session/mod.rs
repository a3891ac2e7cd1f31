//! Session history management
//!
//! Conversation history keyed by sender, bounded by a time-to-live.

mod locks;
#[cfg(feature = "redis-backend")]
mod redis_store;
mod store;

pub use locks::SessionLocks;
#[cfg(feature = "redis-backend")]
pub use redis_store::{RedisHistoryStore, DEFAULT_KEY_PREFIX};
pub use store::{HistoryStore, InMemoryHistoryStore};
