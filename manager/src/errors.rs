//! Error types for the MCP service manager
//!
//! Registry and installer operations return [`ManagerError`] to their direct
//! caller. Expected failure modes of a backend (an unreachable endpoint, a
//! broken package build) are absorbed into health snapshots and task records
//! instead of being returned, so only misuse and infrastructure faults show up
//! here in practice.

use std::time::Duration;

use thiserror::Error;

use crate::ServiceId;

/// Main error type for the manager core
#[derive(Debug, Error)]
pub enum ManagerError {
    /// No managed service is registered under this id
    #[error("service {0} not found")]
    ServiceNotFound(ServiceId),

    /// No installation task is known for this service id
    #[error("no installation task found for service {0}")]
    TaskNotFound(ServiceId),

    /// The transport configuration cannot produce a working adapter
    #[error("failed to initialise transport adapter: {0}")]
    AdapterInit(String),

    /// A probe did not finish within its deadline
    #[error("health probe timed out after {}ms", .0.as_millis())]
    ProbeTimeout(Duration),

    /// A probe reached the backend but the exchange failed
    #[error("health probe failed: {0}")]
    ProbeFailure(String),

    /// The package-manager executable is not available on PATH
    #[error("package manager tool '{0}' not found on PATH")]
    InstallToolMissing(String),

    /// The package-manager process ran and exited unsuccessfully
    #[error("installation command exited with {}: {stderr}", .exit_code.map_or_else(|| "a signal".to_string(), |c| format!("code {c}")))]
    InstallExecFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The package-manager process exceeded the install timeout and was killed
    #[error("installation timed out after {}s", .0.as_secs())]
    InstallTimeout(Duration),

    /// The installation was cancelled and the package-manager process killed
    #[error("installation cancelled")]
    InstallCancelled,

    /// A second submission for a service that still has a non-terminal task
    #[error("service {service_id} already has an active installation task ({status})")]
    TaskAlreadyActive { service_id: ServiceId, status: String },

    /// The requested package manager is not one the installer knows
    #[error("unsupported package manager '{0}'")]
    UnsupportedPackageManager(String),

    /// A request that can never succeed as submitted
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A health snapshot could not be serialized for the cache
    #[error("cache serialization error: {0}")]
    CacheSerialization(#[from] serde_json::Error),

    /// The persistence collaborator failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid manager configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl ManagerError {
    /// Stable, machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ManagerError::ServiceNotFound(_) | ManagerError::TaskNotFound(_) => "not_found",
            ManagerError::AdapterInit(_) => "adapter_init_error",
            ManagerError::ProbeTimeout(_) => "probe_timeout",
            ManagerError::ProbeFailure(_) => "probe_failure",
            ManagerError::InstallToolMissing(_) => "install_tool_missing",
            ManagerError::InstallExecFailure { .. } => "install_exec_failure",
            ManagerError::InstallTimeout(_) => "install_timeout",
            ManagerError::InstallCancelled => "install_cancelled",
            ManagerError::TaskAlreadyActive { .. } => "task_already_active",
            ManagerError::UnsupportedPackageManager(_) => "unsupported_package_manager",
            ManagerError::InvalidRequest(_) => "invalid_request",
            ManagerError::CacheSerialization(_) => "cache_serialization_error",
            ManagerError::Database(_) => "database_error",
            ManagerError::Config(_) => "config_error",
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == "not_found"
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
