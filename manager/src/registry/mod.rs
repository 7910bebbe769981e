//! Service registry
//!
//! Concurrency-safe map of service id to [`ManagedService`]. The map lock is
//! only held to look up, insert, or remove entries; everything that touches a
//! backend goes through the service's own lock.

mod service;

pub use service::ManagedService;

use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::HealthCache;
use crate::config::{Config, ServiceConfig};
use crate::constants::{probe, process};
use crate::database::Database;
use crate::errors::{ManagerError, ManagerResult};
use crate::health::{HealthSnapshot, HealthStatus};
use crate::transport::build_adapter;
use crate::ServiceId;

#[derive(Debug, Clone, Copy)]
pub struct RegistrySettings {
    /// Deadline for scheduled probes
    pub probe_timeout: Duration,
    /// Deadline for probes somebody is waiting on
    pub force_probe_timeout: Duration,
    pub stop_grace_period: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            probe_timeout: probe::DEFAULT_TIMEOUT,
            force_probe_timeout: probe::FORCE_TIMEOUT,
            stop_grace_period: process::STOP_GRACE_PERIOD,
        }
    }
}

impl RegistrySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            probe_timeout: config.probe_timeout(),
            force_probe_timeout: config.force_probe_timeout(),
            stop_grace_period: config.stop_grace_period(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthSource {
    Cache,
    Registry,
    Default,
}

/// Result of a health read through the cache, registry, default fallback.
#[derive(Debug, Clone, Serialize)]
pub struct HealthView {
    pub service_id: ServiceId,
    pub status: HealthStatus,
    pub source: HealthSource,
    pub snapshot: Option<HealthSnapshot>,
}

pub struct ServiceRegistry {
    services: RwLock<HashMap<ServiceId, Arc<ManagedService>>>,
    cache: HealthCache,
    database: Arc<Database>,
    settings: RegistrySettings,
}

impl ServiceRegistry {
    pub fn new(cache: HealthCache, database: Arc<Database>, settings: RegistrySettings) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            cache,
            database,
            settings,
        }
    }

    pub fn settings(&self) -> RegistrySettings {
        self.settings
    }

    pub fn cache(&self) -> &HealthCache {
        &self.cache
    }

    /// Registers every enabled, non-deleted service row. Rows that fail to
    /// register are logged and skipped. Returns how many were registered.
    pub async fn initialize(&self) -> ManagerResult<usize> {
        let rows = self.database.get_enabled_services().await?;
        info!("Registering {} enabled services", rows.len());

        let mut registered = 0;
        for row in rows {
            if row.is_installing() {
                debug!("Skipping service {} while its installation is pending", row.id);
                continue;
            }
            let result = match row.to_service_config() {
                Ok(config) => self.register_service(config).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => registered += 1,
                Err(e) => error!("Failed to register service {} ({}): {}", row.id, row.name, e),
            }
        }

        info!("Registry initialized with {} services", registered);
        Ok(registered)
    }

    /// Builds and starts the adapter for `config` and stores it. An existing
    /// entry with the same id is stopped, and its cached health dropped,
    /// before the new adapter starts.
    #[instrument(skip(self, config), fields(service_id = config.id, transport = %config.transport.kind()))]
    pub async fn register_service(&self, config: ServiceConfig) -> ManagerResult<()> {
        let mut adapter = build_adapter(&config.name, &config.transport)?;
        let service_id = config.id;

        let previous = self.services.write().await.remove(&service_id);
        if let Some(previous) = previous {
            info!("Replacing existing registration of service {}", service_id);
            self.retire(&previous).await;
        }

        adapter.start().await?;
        let target = config.transport.target();
        let service = Arc::new(ManagedService::new(config, adapter));

        // A concurrent registration of the same id may have landed meanwhile
        let raced = self.services.write().await.insert(service_id, service);
        if let Some(raced) = raced {
            warn!("Service {} was registered concurrently, stopping the other instance", service_id);
            raced.shutdown(self.settings.stop_grace_period).await;
        }

        info!("Registered service {} -> {}", service_id, target);
        Ok(())
    }

    /// Stops a service already taken out of the map and drops its cache entry.
    async fn retire(&self, service: &ManagedService) {
        service.shutdown(self.settings.stop_grace_period).await;
        if let Err(e) = self.cache.delete_service_health(service.id()).await {
            warn!("Failed to invalidate cached health for {}: {}", service.id(), e);
        }
    }

    /// Loads the service row and registers it.
    pub async fn register_from_database(&self, service_id: ServiceId) -> ManagerResult<()> {
        let row = self
            .database
            .get_service(service_id)
            .await?
            .ok_or(ManagerError::ServiceNotFound(service_id))?;
        self.register_service(row.to_service_config()?).await
    }

    /// Registers the service from its row unless it is already registered.
    pub async fn ensure_registered(&self, service_id: ServiceId) -> ManagerResult<()> {
        if self.contains(service_id).await {
            return Ok(());
        }
        self.register_from_database(service_id).await
    }

    #[instrument(skip(self))]
    pub async fn unregister_service(&self, service_id: ServiceId) -> ManagerResult<()> {
        let service = self
            .services
            .write()
            .await
            .remove(&service_id)
            .ok_or(ManagerError::ServiceNotFound(service_id))?;

        self.retire(&service).await;
        info!("Unregistered service {}", service_id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn restart_service(&self, service_id: ServiceId) -> ManagerResult<HealthSnapshot> {
        let service = self.get_service(service_id).await?;
        service
            .restart(
                self.settings.stop_grace_period,
                self.settings.force_probe_timeout,
                &self.cache,
            )
            .await
    }

    pub async fn get_service(&self, service_id: ServiceId) -> ManagerResult<Arc<ManagedService>> {
        self.services
            .read()
            .await
            .get(&service_id)
            .cloned()
            .ok_or(ManagerError::ServiceNotFound(service_id))
    }

    pub async fn contains(&self, service_id: ServiceId) -> bool {
        self.services.read().await.contains_key(&service_id)
    }

    pub async fn service_ids(&self) -> Vec<ServiceId> {
        let mut ids: Vec<_> = self.services.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn list_services(&self) -> Vec<Arc<ManagedService>> {
        let mut services: Vec<_> = self.services.read().await.values().cloned().collect();
        services.sort_by_key(|s| s.id());
        services
    }

    /// Interactive probe, bounded by the force timeout.
    pub async fn force_check_service_health(&self, service_id: ServiceId) -> ManagerResult<HealthSnapshot> {
        self.probe_service(service_id, self.settings.force_probe_timeout).await
    }

    /// Scheduled probe, bounded by the regular probe timeout.
    pub async fn check_service_health(&self, service_id: ServiceId) -> ManagerResult<HealthSnapshot> {
        self.probe_service(service_id, self.settings.probe_timeout).await
    }

    /// The probe runs on its own task so the snapshot and cache are updated
    /// even if the caller stops waiting.
    async fn probe_service(&self, service_id: ServiceId, deadline: Duration) -> ManagerResult<HealthSnapshot> {
        let service = self.get_service(service_id).await?;
        let cache = self.cache.clone();
        let handle = tokio::spawn(async move { service.probe(deadline, &cache).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(ManagerError::ProbeFailure(format!("probe task failed: {}", e))),
        }
    }

    /// Persists the in-memory status of a registered service to its row.
    pub async fn update_mcp_service_health(&self, service_id: ServiceId) -> ManagerResult<()> {
        let service = self.get_service(service_id).await?;
        let snapshot = service.health().await;

        if !self
            .database
            .update_health_status(service_id, snapshot.status.as_str())
            .await?
        {
            return Err(ManagerError::ServiceNotFound(service_id));
        }
        debug!("Persisted health {} for service {}", snapshot.status, service_id);
        Ok(())
    }

    /// Health read that never fails: cache first, then the in-memory
    /// snapshot, then `unknown`.
    pub async fn get_service_health(&self, service_id: ServiceId) -> HealthView {
        if let Some(snapshot) = self.cache.get_service_health(service_id).await {
            return HealthView {
                service_id,
                status: snapshot.status,
                source: HealthSource::Cache,
                snapshot: Some(snapshot),
            };
        }

        if let Ok(service) = self.get_service(service_id).await {
            let snapshot = service.health().await;
            return HealthView {
                service_id,
                status: snapshot.status,
                source: HealthSource::Registry,
                snapshot: Some(snapshot),
            };
        }

        HealthView {
            service_id,
            status: HealthStatus::Unknown,
            source: HealthSource::Default,
            snapshot: None,
        }
    }

    /// Stops every adapter and empties the registry.
    pub async fn shutdown(&self) {
        let services: Vec<_> = self.services.write().await.drain().map(|(_, s)| s).collect();
        info!("Stopping {} managed services", services.len());

        let grace = self.settings.stop_grace_period;
        join_all(services.iter().map(|service| service.shutdown(grace))).await;
    }
}
