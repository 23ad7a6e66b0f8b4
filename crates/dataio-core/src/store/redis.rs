//! Thin Redis binding for the store seam.
//!
//! One multiplexed connection is shared by every map in the process; each
//! subscription runs over its own pub/sub connection, pumped into the
//! [`Subscription`] feed by a background task.

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::mpsc;

use dataio_types::StoreConfig;

use super::{Store, StoreError, StoreResult, Subscription, SUBSCRIPTION_BUFFER};

/// Production [`Store`] backed by a Redis server.
pub struct RedisStore {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
    database: i64,
}

impl RedisStore {
    /// Connects to the server described by `config`.
    ///
    /// Failure here is [`StoreError::Unreachable`]. Per the bootstrap
    /// contract the caller treats it as fatal; the map layer never retries
    /// connection establishment.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        tracing::info!(
            "[RedisStore] connected to {}:{} (db {})",
            config.host,
            config.port,
            config.database
        );
        Ok(Self {
            client,
            conn,
            database: config.database,
        })
    }
}

fn request_error(e: redis::RedisError) -> StoreError {
    StoreError::Request(e.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn hash_get_all(&self, table: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut conn = self.conn.clone();
        conn.hgetall(table).await.map_err(request_error)
    }

    async fn hash_get(&self, table: &str, field: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.hget(table, field).await.map_err(request_error)
    }

    async fn hash_set(&self, table: &str, field: &[u8], value: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(table, field, value).await.map_err(request_error)?;
        Ok(())
    }

    async fn hash_del(&self, table: &str, field: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(table, field).await.map_err(request_error)?;
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(table).await.map_err(request_error)?;
        Ok(())
    }

    async fn put_text(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await.map_err(request_error)?;
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.publish(channel, payload).await.map_err(request_error)?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        pubsub.subscribe(channel).await.map_err(request_error)?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                if tx.send(msg.get_payload_bytes().to_vec()).await.is_err() {
                    break; // subscription dropped
                }
            }
        });
        Ok(Subscription::new(rx))
    }

    fn database_index(&self) -> i64 {
        self.database
    }
}
