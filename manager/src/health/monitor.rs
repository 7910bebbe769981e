// File: manager/src/health/monitor.rs
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{HealthSnapshot, HealthStatus};
use crate::registry::ServiceRegistry;
use crate::ServiceId;

/// Periodically probes every registered service.
#[derive(Clone)]
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Probes all registered services in parallel, each bounded by its own
    /// timeout. Services removed mid-cycle are skipped silently.
    pub async fn check_all_services(&self) -> Vec<(ServiceId, HealthSnapshot)> {
        let service_ids = self.registry.service_ids().await;
        let mut tasks = Vec::with_capacity(service_ids.len());

        for service_id in service_ids {
            let registry = self.registry.clone();
            tasks.push(tokio::spawn(async move {
                (service_id, registry.check_service_health(service_id).await)
            }));
        }

        let mut snapshots = Vec::new();
        for result in join_all(tasks).await {
            match result {
                Ok((service_id, Ok(snapshot))) => {
                    if snapshot.status == HealthStatus::Unhealthy {
                        warn!(
                            "Service {} unhealthy: {}",
                            service_id,
                            snapshot.error_message.as_deref().unwrap_or("unknown error")
                        );
                    }
                    snapshots.push((service_id, snapshot));
                }
                Ok((service_id, Err(e))) if e.is_not_found() => {
                    debug!("Service {} was removed during the health cycle", service_id);
                }
                Ok((service_id, Err(e))) => error!("Health check failed for service {}: {}", service_id, e),
                Err(e) => error!("Health check task panicked: {}", e),
            }
        }

        snapshots
    }

    /// Spawns the scheduling loop. The first cycle runs after one interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Health monitor started ({}s interval)", self.interval.as_secs());
            let mut check_count: u64 = 0;
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                check_count += 1;

                let snapshots = self.check_all_services().await;
                let healthy = snapshots.iter().filter(|(_, s)| s.is_healthy()).count();
                info!(
                    "Health check cycle #{} completed: {}/{} services healthy",
                    check_count,
                    healthy,
                    snapshots.len()
                );
            }
        })
    }
}
