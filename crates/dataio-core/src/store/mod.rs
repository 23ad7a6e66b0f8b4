//! Remote store seam: hash-table commands plus pub/sub.
//!
//! The production binding is [`RedisStore`]; [`MemoryStore`] implements the
//! same contract in-process for tests and embedded runs. One store instance
//! is shared by every synced map in the process, so implementations must be
//! safe for concurrent use.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Buffer depth for subscription feeds. Slow consumers lose notices beyond
/// this; the notification protocol is advisory, so that is acceptable.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 64;

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection establishment failed. Fatal for the bootstrap layer; the
    /// map core never retries connections itself.
    #[error("store unreachable: {0}")]
    Unreachable(String),

    /// A command failed after the connection was established.
    #[error("store request failed: {0}")]
    Request(String),

    /// A command exceeded its deadline.
    #[error("store request timed out")]
    Timeout,
}

/// The key-value service contract a synced map runs against.
///
/// Hash-table commands address one logical map each; `publish` and
/// `subscribe` carry the change-notification protocol.
#[async_trait]
pub trait Store: Send + Sync {
    /// Full read of a hash table (HGETALL).
    async fn hash_get_all(&self, table: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Single-field read (HGET).
    async fn hash_get(&self, table: &str, field: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Single-field write (HSET).
    async fn hash_set(&self, table: &str, field: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Single-field delete (HDEL).
    async fn hash_del(&self, table: &str, field: &[u8]) -> StoreResult<()>;

    /// Whole-table delete (DEL).
    async fn delete_table(&self, table: &str) -> StoreResult<()>;

    /// Plain text write outside any hash table (SET).
    async fn put_text(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Broadcasts a payload on a channel (PUBLISH).
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> StoreResult<()>;

    /// Opens a feed of payloads published on a channel (SUBSCRIBE).
    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription>;

    /// Logical database index, part of every notification channel id.
    fn database_index(&self) -> i64;
}

/// Ordered best-effort feed of raw payloads from one channel.
///
/// Dropping the subscription tears the feed down.
pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Next payload, or `None` once the feed ends.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}
