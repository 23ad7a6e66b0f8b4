//! In-process store: hash tables plus broadcast pub/sub.
//!
//! Implements the full [`Store`] contract without a network, which is what
//! tests and embedded runs use in place of Redis.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};

use super::{Store, StoreResult, Subscription, SUBSCRIPTION_BUFFER};

/// Shared in-memory rendition of the store contract.
pub struct MemoryStore {
    tables: DashMap<String, HashMap<Vec<u8>, Vec<u8>>>,
    texts: DashMap<String, String>,
    channels: DashMap<String, broadcast::Sender<Vec<u8>>>,
    database: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_database(0)
    }

    /// Store presenting the given database index (affects channel naming only).
    pub fn with_database(database: i64) -> Self {
        Self {
            tables: DashMap::new(),
            texts: DashMap::new(),
            channels: DashMap::new(),
            database,
        }
    }

    /// Plain-text value previously written with `put_text`.
    pub fn text(&self, key: &str) -> Option<String> {
        self.texts.get(key).map(|value| value.value().clone())
    }

    /// Live subscription count on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn channel(&self, name: &str) -> broadcast::Sender<Vec<u8>> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
            .clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hash_get_all(&self, table: &str) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .tables
            .get(table)
            .map(|t| t.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hash_get(&self, table: &str, field: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.tables.get(table).and_then(|t| t.get(field).cloned()))
    }

    async fn hash_set(&self, table: &str, field: &[u8], value: &[u8]) -> StoreResult<()> {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(field.to_vec(), value.to_vec());
        Ok(())
    }

    async fn hash_del(&self, table: &str, field: &[u8]) -> StoreResult<()> {
        if let Some(mut t) = self.tables.get_mut(table) {
            t.remove(field);
        }
        Ok(())
    }

    async fn delete_table(&self, table: &str) -> StoreResult<()> {
        self.tables.remove(table);
        Ok(())
    }

    async fn put_text(&self, key: &str, value: &str) -> StoreResult<()> {
        self.texts.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> StoreResult<()> {
        // A send error just means nobody is listening right now.
        let _ = self.channel(channel).send(payload);
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<Subscription> {
        let mut feed = self.channel(channel).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        tokio::spawn(async move {
            loop {
                match feed.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break; // subscription dropped
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(
                            "[MemoryStore] subscription lagged, {} notice(s) lost",
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(Subscription::new(rx))
    }

    fn database_index(&self) -> i64 {
        self.database
    }
}
