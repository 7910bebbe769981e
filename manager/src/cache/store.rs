// File: manager/src/cache/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::database::Database;
use crate::errors::ManagerResult;

/// Key/value storage with absolute expiry times.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Returns the value if it has not expired at `now`.
    async fn get(&self, key: &str, now: DateTime<Utc>) -> ManagerResult<Option<String>>;

    async fn set(&self, key: &str, value: String, expires_at: DateTime<Utc>) -> ManagerResult<()>;

    async fn delete(&self, key: &str) -> ManagerResult<()>;

    /// Deletes the entry only while it still holds `expected`. Returns
    /// whether anything was removed.
    async fn delete_if(&self, key: &str, expected: &str) -> ManagerResult<bool>;

    /// Drops every entry expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> ManagerResult<u64>;

    async fn len(&self) -> ManagerResult<u64>;
}

#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (String, DateTime<Utc>)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str, now: DateTime<Utc>) -> ManagerResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: String, expires_at: DateTime<Utc>) -> ManagerResult<()> {
        self.entries.write().await.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> ManagerResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn delete_if(&self, key: &str, expected: &str) -> ManagerResult<bool> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|(value, _)| value == expected) {
            entries.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> ManagerResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - entries.len()) as u64)
    }

    async fn len(&self) -> ManagerResult<u64> {
        Ok(self.entries.read().await.len() as u64)
    }
}

/// Store backed by the `health_cache` table, so cached health survives a
/// manager restart within the TTL window.
pub struct SqliteCacheStore {
    database: Arc<Database>,
}

impl SqliteCacheStore {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, key: &str, now: DateTime<Utc>) -> ManagerResult<Option<String>> {
        Ok(self.database.get_cache_entry(key, now.timestamp_millis()).await?)
    }

    async fn set(&self, key: &str, value: String, expires_at: DateTime<Utc>) -> ManagerResult<()> {
        Ok(self
            .database
            .set_cache_entry(key, &value, expires_at.timestamp_millis())
            .await?)
    }

    async fn delete(&self, key: &str) -> ManagerResult<()> {
        Ok(self.database.delete_cache_entry(key).await?)
    }

    async fn delete_if(&self, key: &str, expected: &str) -> ManagerResult<bool> {
        Ok(self.database.delete_cache_entry_if(key, expected).await?)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> ManagerResult<u64> {
        Ok(self
            .database
            .purge_expired_cache_entries(now.timestamp_millis())
            .await?)
    }

    async fn len(&self) -> ManagerResult<u64> {
        Ok(self.database.count_cache_entries().await?)
    }
}
