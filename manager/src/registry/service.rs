use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cache::HealthCache;
use crate::config::ServiceConfig;
use crate::errors::{ManagerError, ManagerResult};
use crate::health::{execute_probe, HealthSnapshot};
use crate::transport::{McpTransport, TransportKind};
use crate::ServiceId;

/// A registered backend: its configuration, its exclusively owned adapter, and
/// its current health snapshot.
///
/// The adapter mutex is the per-service lock: probes, restarts, and shutdown
/// for one service run one at a time, while other services proceed freely.
pub struct ManagedService {
    id: ServiceId,
    config: ServiceConfig,
    adapter: Mutex<Box<dyn McpTransport>>,
    health: RwLock<HealthSnapshot>,
    /// Set without the lock when the service is unregistered or replaced, so
    /// a probe already in flight discards its outcome.
    retired: AtomicBool,
}

impl std::fmt::Debug for ManagedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedService")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("retired", &self.retired)
            .finish_non_exhaustive()
    }
}

impl ManagedService {
    pub(crate) fn new(config: ServiceConfig, adapter: Box<dyn McpTransport>) -> Self {
        Self {
            id: config.id,
            config,
            adapter: Mutex::new(adapter),
            health: RwLock::new(HealthSnapshot::new(Utc::now())),
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn display_name(&self) -> &str {
        self.config.display_name.as_deref().unwrap_or(&self.config.name)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.config.transport.kind()
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn health(&self) -> HealthSnapshot {
        self.health.read().await.clone()
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    async fn cache_snapshot(&self, cache: &HealthCache, snapshot: &HealthSnapshot) {
        if let Err(e) = cache.set_service_health(self.id, snapshot).await {
            warn!("Failed to cache health for service {}: {}", self.id, e);
        }
    }

    /// Probes the adapter and folds the outcome into the snapshot and cache.
    /// Returns `ServiceNotFound` if the service was removed meanwhile.
    pub(crate) async fn probe(&self, deadline: Duration, cache: &HealthCache) -> ManagerResult<HealthSnapshot> {
        let mut adapter = self.adapter.lock().await;
        if self.is_retired() {
            debug!("Discarding probe for removed service {}", self.id);
            return Err(ManagerError::ServiceNotFound(self.id));
        }
        self.probe_locked(adapter.as_mut(), deadline, cache).await
    }

    async fn probe_locked(
        &self,
        adapter: &mut dyn McpTransport,
        deadline: Duration,
        cache: &HealthCache,
    ) -> ManagerResult<HealthSnapshot> {
        let outcome = execute_probe(adapter, deadline).await;
        if self.is_retired() {
            debug!("Service {} was removed during its probe, dropping the result", self.id);
            return Err(ManagerError::ServiceNotFound(self.id));
        }

        let snapshot = {
            let mut health = self.health.write().await;
            let previous = health.status;
            match outcome.result {
                Ok(()) => health.record_success(Utc::now(), outcome.response_time),
                Err(e) => {
                    debug!("Probe of service {} failed: {}", self.id, e);
                    health.record_failure(Utc::now(), outcome.response_time, e.to_string());
                }
            }
            if health.status != previous {
                info!(
                    "Service {} ({}) health changed: {} -> {}",
                    self.id, self.config.name, previous, health.status
                );
            }
            health.clone()
        };

        self.cache_snapshot(cache, &snapshot).await;
        Ok(snapshot)
    }

    /// Stops and starts the adapter, resets the snapshot, then probes, all
    /// under the service lock. The reset, and a failed start, are cached
    /// immediately.
    pub(crate) async fn restart(
        &self,
        grace: Duration,
        deadline: Duration,
        cache: &HealthCache,
    ) -> ManagerResult<HealthSnapshot> {
        let mut adapter = self.adapter.lock().await;
        if self.is_retired() {
            return Err(ManagerError::ServiceNotFound(self.id));
        }

        if let Err(e) = adapter.stop(grace).await {
            warn!("Error stopping service {} for restart: {}", self.id, e);
        }
        let reset = HealthSnapshot::new(Utc::now());
        *self.health.write().await = reset.clone();
        self.cache_snapshot(cache, &reset).await;

        if let Err(e) = adapter.start().await {
            warn!("Service {} failed to start on restart: {}", self.id, e);
            let snapshot = {
                let mut health = self.health.write().await;
                health.record_failure(Utc::now(), Duration::ZERO, e.to_string());
                health.clone()
            };
            self.cache_snapshot(cache, &snapshot).await;
            return Err(e);
        }
        info!("Restarted service {} ({})", self.id, self.config.name);

        self.probe_locked(adapter.as_mut(), deadline, cache).await
    }

    /// Marks the service removed and releases its adapter once any in-flight
    /// operation has finished.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        if self.retired.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut adapter = self.adapter.lock().await;
        if let Err(e) = adapter.stop(grace).await {
            warn!("Error stopping service {}: {}", self.id, e);
        }
    }
}
