// Package market endpoints: install, uninstall, and installation status

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::common::{api_error, ApiError, ApiResponse, ApiResult};
use crate::config::ServiceConfig;
use crate::database::ServiceRecord;
use crate::errors::ManagerError;
use crate::installer::{runtime_transport, InstallRequest, InstallationTask, PackageManager};
use crate::web::{status_from_installed_version, AppState, InstallAccepted, InstallationStatusView};
use crate::ServiceId;

#[derive(Debug, Deserialize)]
pub struct InstallPackageRequest {
    pub package_name: String,
    pub package_manager: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct UninstallPackageRequest {
    pub service_id: ServiceId,
}

#[derive(Debug, Serialize)]
pub struct UninstallResult {
    pub service_id: ServiceId,
    pub cancelled_installation: bool,
    pub status: String,
}

fn database_error(context: &str, err: sqlx::Error) -> ApiError {
    api_error(context, ManagerError::from(err))
}

/// Create (or reuse) the service row for a package and start installing it.
/// A package that is already installed is reported, not reinstalled.
pub async fn install_package(
    State(state): State<AppState>,
    Json(request): Json<InstallPackageRequest>,
) -> ApiResult<InstallAccepted> {
    let manager: PackageManager = request
        .package_manager
        .parse()
        .map_err(|e| api_error("Rejected installation request", e))?;

    let package_name = request.package_name.trim().to_string();
    if package_name.is_empty() {
        return Err(api_error(
            "Rejected installation request",
            ManagerError::InvalidRequest("package name is required".to_string()),
        ));
    }

    let existing = state
        .database
        .find_service_by_package(manager.as_str(), &package_name)
        .await
        .map_err(|e| database_error("Failed to look up package", e))?;

    if let Some(row) = existing.as_ref() {
        if row.installed_version.is_some() && !row.is_installing() {
            info!("Package {} already installed as service {}", package_name, row.id);
            return Ok(Json(ApiResponse::success(InstallAccepted {
                service_id: row.id,
                task_id: None,
                status: "already_installed".to_string(),
            })));
        }
    }

    if let Some(row) = existing.as_ref() {
        if let Some(task) = state.installer.get_task_status(row.id).await {
            if !task.status.is_terminal() {
                return Err(api_error(
                    "Rejected installation request",
                    ManagerError::TaskAlreadyActive {
                        service_id: row.id,
                        status: task.status.to_string(),
                    },
                ));
            }
        }
    }

    let config = ServiceConfig {
        id: existing.as_ref().map_or(0, |row| row.id),
        name: package_name.clone(),
        display_name: request.display_name.clone(),
        enabled: false,
        transport: runtime_transport(manager, &package_name, request.env_vars.clone()),
    };
    let mut record = ServiceRecord::from_config(&config, Utc::now())
        .map_err(|e| api_error("Failed to encode service row", ManagerError::from(e)))?;
    record.package_manager = Some(manager.as_str().to_string());
    record.source_package_name = Some(package_name.clone());

    let service_id = match existing {
        Some(row) => {
            // Previous attempt failed or was interrupted; keep the row id
            state
                .database
                .update_service(&record)
                .await
                .map_err(|e| database_error("Failed to update service row", e))?;
            row.id
        }
        None => state
            .database
            .create_service(&record)
            .await
            .map_err(|e| database_error("Failed to create service row", e))?,
    };

    let task = state
        .installer
        .submit_task(InstallRequest {
            service_id,
            package_name,
            package_manager: manager,
            version: request.version,
            env_vars: request.env_vars,
        })
        .await
        .map_err(|e| api_error(&format!("Failed to submit installation for service {}", service_id), e))?;

    Ok(Json(ApiResponse::success(InstallAccepted {
        service_id,
        task_id: Some(task.task_id.to_string()),
        status: task.status.to_string(),
    })))
}

/// Task state if one is known, otherwise derived from the service row
pub async fn get_installation_status(
    Path(service_id): Path<ServiceId>,
    State(state): State<AppState>,
) -> ApiResult<InstallationStatusView> {
    let row = state
        .database
        .get_service(service_id)
        .await
        .map_err(|e| database_error("Failed to load service row", e))?;
    let installed_version = row.as_ref().and_then(|r| r.installed_version.clone());

    if let Some(task) = state.installer.get_task_status(service_id).await {
        return Ok(Json(ApiResponse::success(InstallationStatusView::from_task(
            task,
            installed_version,
        ))));
    }

    match row {
        Some(row) => Ok(Json(ApiResponse::success(InstallationStatusView {
            service_id,
            status: status_from_installed_version(row.installed_version.as_deref()).to_string(),
            installed_version,
            task: None,
        }))),
        None => Err(api_error(
            "Installation status unavailable",
            ManagerError::ServiceNotFound(service_id),
        )),
    }
}

/// Stop a service (or cancel its pending installation) and soft-delete its row
pub async fn uninstall_package(
    State(state): State<AppState>,
    Json(request): Json<UninstallPackageRequest>,
) -> ApiResult<UninstallResult> {
    let service_id = request.service_id;
    let row = state
        .database
        .get_service(service_id)
        .await
        .map_err(|e| database_error("Failed to load service row", e))?
        .ok_or_else(|| api_error("Uninstall rejected", ManagerError::ServiceNotFound(service_id)))?;

    let active_task = state
        .installer
        .get_task_status(service_id)
        .await
        .filter(|task| !task.status.is_terminal());

    let mut cancelled_installation = false;
    if active_task.is_some() {
        // A worker past registration unregisters the service itself on cancel
        match state.installer.cancel_task(service_id).await {
            Ok(()) => cancelled_installation = true,
            Err(e) => warn!("Failed to cancel installation of service {}: {}", service_id, e),
        }
    }
    match state.registry.unregister_service(service_id).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!("Failed to stop service {} during uninstall: {}", service_id, e),
    }

    state
        .database
        .soft_delete_service(service_id)
        .await
        .map_err(|e| database_error("Failed to delete service row", e))?;

    info!("Uninstalled service {} ({})", service_id, row.name);
    Ok(Json(ApiResponse::success(UninstallResult {
        service_id,
        cancelled_installation,
        status: "uninstalled".to_string(),
    })))
}

/// Request cancellation of an active installation
pub async fn cancel_installation(
    Path(service_id): Path<ServiceId>,
    State(state): State<AppState>,
) -> ApiResult<Option<InstallationTask>> {
    state
        .installer
        .cancel_task(service_id)
        .await
        .map_err(|e| api_error(&format!("Failed to cancel installation of service {}", service_id), e))?;

    Ok(Json(ApiResponse::success(
        state.installer.get_task_status(service_id).await,
    )))
}

/// Installations that are pending or running
pub async fn list_active_tasks(State(state): State<AppState>) -> ApiResult<Vec<InstallationTask>> {
    Ok(Json(ApiResponse::success(state.installer.active_tasks().await)))
}
