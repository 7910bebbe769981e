// File: manager/src/web/mod.rs
pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::installer::{InstallationManager, InstallationStatus, InstallationTask};
use crate::registry::{HealthView, ServiceRegistry};
use crate::transport::TransportKind;
use crate::ServiceId;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ServiceRegistry>,
    pub installer: InstallationManager,
    pub database: Arc<Database>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<ServiceRegistry>,
        installer: InstallationManager,
        database: Arc<Database>,
    ) -> Self {
        Self {
            config,
            registry,
            installer,
            database,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub service_id: ServiceId,
    pub name: String,
    pub display_name: String,
    pub transport: TransportKind,
    pub target: String,
    pub enabled: bool,
    pub health: HealthView,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallAccepted {
    pub service_id: ServiceId,
    pub task_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallationStatusView {
    pub service_id: ServiceId,
    pub status: String,
    pub installed_version: Option<String>,
    pub task: Option<InstallationTask>,
}

impl InstallationStatusView {
    pub fn from_task(task: InstallationTask, installed_version: Option<String>) -> Self {
        Self {
            service_id: task.service_id,
            status: task.status.to_string(),
            installed_version,
            task: Some(task),
        }
    }
}

/// Status reported for a row with no in-memory task, e.g. after a restart.
pub fn status_from_installed_version(installed_version: Option<&str>) -> &'static str {
    match installed_version {
        Some(crate::constants::installer::INSTALLING_MARKER) => InstallationStatus::Installing.as_str(),
        Some(_) => InstallationStatus::Completed.as_str(),
        None => "not_installed",
    }
}
