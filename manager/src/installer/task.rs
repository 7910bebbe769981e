// File: manager/src/installer/task.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::{ManagerError, ManagerResult};
use crate::ServiceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallationStatus {
    Pending,
    Installing,
    Completed,
    Failed,
}

impl InstallationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallationStatus::Pending => "pending",
            InstallationStatus::Installing => "installing",
            InstallationStatus::Completed => "completed",
            InstallationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InstallationStatus::Completed | InstallationStatus::Failed)
    }
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Npm,
    Pypi,
    Uv,
    Pip,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Pypi => "pypi",
            PackageManager::Uv => "uv",
            PackageManager::Pip => "pip",
        }
    }

    pub fn is_python(&self) -> bool {
        !matches!(self, PackageManager::Npm)
    }
}

impl FromStr for PackageManager {
    type Err = ManagerError;

    fn from_str(value: &str) -> ManagerResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "npm" => Ok(PackageManager::Npm),
            "pypi" => Ok(PackageManager::Pypi),
            "uv" => Ok(PackageManager::Uv),
            "pip" => Ok(PackageManager::Pip),
            other => Err(ManagerError::UnsupportedPackageManager(other.to_string())),
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    pub service_id: ServiceId,
    pub package_name: String,
    pub package_manager: PackageManager,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

/// One installation, mutated in place by its worker.
#[derive(Debug, Clone, Serialize)]
pub struct InstallationTask {
    pub task_id: Uuid,
    pub service_id: ServiceId,
    pub package_name: String,
    pub package_manager: PackageManager,
    pub version: Option<String>,
    pub env_vars: BTreeMap<String, String>,
    pub status: InstallationStatus,
    pub submitted_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub output: Option<String>,
}

impl InstallationTask {
    pub fn new(request: InstallRequest) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            service_id: request.service_id,
            package_name: request.package_name,
            package_manager: request.package_manager,
            version: request.version.filter(|v| !v.trim().is_empty()),
            env_vars: request.env_vars,
            status: InstallationStatus::Pending,
            submitted_at: Utc::now(),
            start_time: None,
            end_time: None,
            error: None,
            error_kind: None,
            output: None,
        }
    }

    pub(crate) fn mark_installing(&mut self) {
        self.status = InstallationStatus::Installing;
        self.start_time = Some(Utc::now());
    }

    pub(crate) fn mark_completed(&mut self, output: Option<String>) {
        self.status = InstallationStatus::Completed;
        self.end_time = Some(Utc::now());
        self.output = output;
    }

    pub(crate) fn mark_failed(&mut self, error: &ManagerError, output: Option<String>) {
        self.status = InstallationStatus::Failed;
        self.end_time = Some(Utc::now());
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind().to_string());
        self.output = output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_manager_parsing() {
        assert_eq!("NPM".parse::<PackageManager>().unwrap(), PackageManager::Npm);
        assert_eq!("uv".parse::<PackageManager>().unwrap(), PackageManager::Uv);
        let err = "cargo".parse::<PackageManager>().unwrap_err();
        assert_eq!(err.kind(), "unsupported_package_manager");
    }

    #[test]
    fn test_task_lifecycle_fields() {
        let mut task = InstallationTask::new(InstallRequest {
            service_id: 42,
            package_name: "left-pad".to_string(),
            package_manager: PackageManager::Npm,
            version: Some("  ".to_string()),
            env_vars: BTreeMap::new(),
        });
        assert_eq!(task.status, InstallationStatus::Pending);
        assert!(task.version.is_none());
        assert!(!task.status.is_terminal());

        task.mark_installing();
        assert!(task.start_time.is_some());

        task.mark_failed(&ManagerError::InstallCancelled, None);
        assert!(task.status.is_terminal());
        assert_eq!(task.error_kind.as_deref(), Some("install_cancelled"));
        assert!(task.end_time.is_some());
    }
}
