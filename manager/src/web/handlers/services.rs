// Service registry endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::{info, warn};

use super::common::{api_error, ApiResponse, ApiResult};
use crate::health::HealthSnapshot;
use crate::registry::HealthView;
use crate::web::{AppState, ServiceSummary};
use crate::ServiceId;

/// List registered services with their current health
pub async fn list_services(State(state): State<AppState>) -> ApiResult<Vec<ServiceSummary>> {
    let services = state.registry.list_services().await;
    let mut summaries = Vec::with_capacity(services.len());

    for service in services {
        let health = state.registry.get_service_health(service.id()).await;
        summaries.push(ServiceSummary {
            service_id: service.id(),
            name: service.name().to_string(),
            display_name: service.display_name().to_string(),
            transport: service.transport_kind(),
            target: service.config().transport.target(),
            enabled: service.enabled(),
            health,
        });
    }

    Ok(Json(ApiResponse::success(summaries)))
}

/// Cached health read; falls back to the registry, then to `unknown`
pub async fn get_service_health(
    Path(service_id): Path<ServiceId>,
    State(state): State<AppState>,
) -> ApiResult<HealthView> {
    Ok(Json(ApiResponse::success(
        state.registry.get_service_health(service_id).await,
    )))
}

/// Probe a service now and persist the resulting status
pub async fn check_service_health(
    Path(service_id): Path<ServiceId>,
    State(state): State<AppState>,
) -> ApiResult<HealthSnapshot> {
    info!("Manual health check requested for service {}", service_id);

    if let Err(e) = state.registry.ensure_registered(service_id).await {
        return Err(api_error(&format!("Failed to register service {}", service_id), e));
    }

    let snapshot = match state.registry.force_check_service_health(service_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => return Err(api_error(&format!("Health check of service {} failed", service_id), e)),
    };

    if let Err(e) = state.registry.update_mcp_service_health(service_id).await {
        warn!("Failed to persist health of service {}: {}", service_id, e);
    }

    Ok(Json(ApiResponse::success(snapshot)))
}

/// Stop and start a service's backend, then probe it
pub async fn restart_service(
    Path(service_id): Path<ServiceId>,
    State(state): State<AppState>,
) -> ApiResult<HealthSnapshot> {
    info!("Restart requested for service {}", service_id);

    if let Err(e) = state.registry.ensure_registered(service_id).await {
        return Err(api_error(&format!("Failed to register service {}", service_id), e));
    }

    match state.registry.restart_service(service_id).await {
        Ok(snapshot) => {
            if let Err(e) = state.registry.update_mcp_service_health(service_id).await {
                warn!("Failed to persist health of service {}: {}", service_id, e);
            }
            Ok(Json(ApiResponse::success(snapshot)))
        }
        Err(e) => Err(api_error(&format!("Failed to restart service {}", service_id), e)),
    }
}

/// Entry count and TTL of the health cache
pub async fn get_cache_stats(State(state): State<AppState>) -> ApiResult<crate::cache::CacheStats> {
    match state.registry.cache().stats().await {
        Ok(stats) => Ok(Json(ApiResponse::success(stats))),
        Err(e) => Err(api_error("Failed to read cache stats", e)),
    }
}
