//! TTL-bounded cache of health snapshots
//!
//! The cache is never the authoritative health state; it lets readers (and a
//! freshly restarted manager) answer health queries without waiting for a
//! probe. Entries that fail to decode are reported as misses and deleted in
//! the background, unless a fresh value replaced them in the meantime.

mod store;

pub use store::{CacheStore, MemoryCacheStore, SqliteCacheStore};

use chrono::Duration as ChronoDuration;
use mockable::{Clock, DefaultClock};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::cache::KEY_PREFIX;
use crate::errors::{ManagerError, ManagerResult};
use crate::health::HealthSnapshot;
use crate::ServiceId;

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub store: &'static str,
    pub ttl_seconds: u64,
    pub entries: u64,
}

#[derive(Clone)]
pub struct HealthCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl HealthCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self::with_clock(store, ttl, Arc::new(DefaultClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore>, ttl: Duration, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { store, ttl, clock }
    }

    pub fn key(service_id: ServiceId) -> String {
        format!("{}{}", KEY_PREFIX, service_id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Writes the snapshot with a fresh TTL, overwriting any prior entry.
    pub async fn set_service_health(&self, service_id: ServiceId, snapshot: &HealthSnapshot) -> ManagerResult<()> {
        let value = serde_json::to_string(snapshot)?;
        let ttl = ChronoDuration::from_std(self.ttl)
            .map_err(|e| ManagerError::Config(format!("cache ttl out of range: {}", e)))?;
        let expires_at = self.clock.utc() + ttl;
        self.store.set(&Self::key(service_id), value, expires_at).await
    }

    /// Returns the cached snapshot, or `None` on a miss. Store failures and
    /// undecodable entries are also misses.
    pub async fn get_service_health(&self, service_id: ServiceId) -> Option<HealthSnapshot> {
        let key = Self::key(service_id);
        let raw = match self.store.get(&key, self.clock.utc()).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Health cache read failed for service {}: {}", service_id, e);
                return None;
            }
        };

        match serde_json::from_str::<HealthSnapshot>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    "Discarding corrupted health cache entry for service {}: {}",
                    service_id, e
                );
                let store = self.store.clone();
                tokio::spawn(async move {
                    match store.delete_if(&key, &raw).await {
                        Ok(true) => debug!("Deleted corrupted cache entry {}", key),
                        Ok(false) => debug!("Corrupted cache entry {} was already replaced", key),
                        Err(e) => warn!("Failed to delete corrupted cache entry {}: {}", key, e),
                    }
                });
                None
            }
        }
    }

    pub async fn delete_service_health(&self, service_id: ServiceId) -> ManagerResult<()> {
        self.store.delete(&Self::key(service_id)).await
    }

    pub async fn clean_expired_entries(&self) -> ManagerResult<u64> {
        let purged = self.store.purge_expired(self.clock.utc()).await?;
        debug!("Health cache cleanup removed {} entries", purged);
        Ok(purged)
    }

    pub async fn stats(&self) -> ManagerResult<CacheStats> {
        Ok(CacheStats {
            store: self.store.kind(),
            ttl_seconds: self.ttl.as_secs(),
            entries: self.store.len().await?,
        })
    }
}
