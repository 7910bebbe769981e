// File: manager/src/config/mod.rs
pub mod manager;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
pub use manager::ConfigManager;

use crate::constants::{cache, defaults, installer, probe, process};
use crate::transport::TransportConfig;
use crate::ServiceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_seconds: u64,
    #[serde(default = "default_force_probe_timeout")]
    pub force_probe_timeout_seconds: u64,
    #[serde(default = "default_stop_grace_period")]
    pub stop_grace_period_seconds: u64,
    #[serde(default = "default_health_cache_ttl")]
    pub health_cache_ttl_seconds: u64,
    #[serde(default)]
    pub installer: InstallerConfig,
    // Populated from config/services/*.toml
    #[serde(skip)]
    pub services: Vec<ServiceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_database_path(),
            check_interval_seconds: default_check_interval(),
            probe_timeout_seconds: default_probe_timeout(),
            force_probe_timeout_seconds: default_force_probe_timeout(),
            stop_grace_period_seconds: default_stop_grace_period(),
            health_cache_ttl_seconds: default_health_cache_ttl(),
            installer: InstallerConfig::default(),
            services: Vec::new(),
        }
    }
}

impl Config {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds.max(1))
    }

    /// Timeout for scheduled probes, clamped to the supported range.
    pub fn probe_timeout(&self) -> Duration {
        clamp_probe_timeout(Duration::from_secs(self.probe_timeout_seconds))
    }

    /// Timeout for interactive probes, clamped to the supported range.
    pub fn force_probe_timeout(&self) -> Duration {
        clamp_probe_timeout(Duration::from_secs(self.force_probe_timeout_seconds))
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_secs(self.stop_grace_period_seconds)
    }

    pub fn health_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.health_cache_ttl_seconds)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.installer.max_concurrent_installs == 0 {
            return Err("installer.max_concurrent_installs must be at least 1".to_string());
        }
        if self.installer.install_timeout_seconds == 0 {
            return Err("installer.install_timeout_seconds must be positive".to_string());
        }
        if self.health_cache_ttl_seconds == 0 {
            return Err("health_cache_ttl_seconds must be positive".to_string());
        }
        for (manager, tool) in &self.installer.tools {
            if tool.program.trim().is_empty() {
                return Err(format!("installer.tools.{} has an empty program", manager));
            }
        }
        Ok(())
    }
}

pub fn clamp_probe_timeout(timeout: Duration) -> Duration {
    timeout.clamp(probe::MIN_TIMEOUT, probe::MAX_TIMEOUT)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default = "default_max_concurrent_installs")]
    pub max_concurrent_installs: usize,
    #[serde(default = "default_install_timeout")]
    pub install_timeout_seconds: u64,
    #[serde(default = "default_task_retention_hours")]
    pub task_retention_hours: i64,
    /// Per package manager overrides of the install command
    #[serde(default)]
    pub tools: HashMap<String, ToolCommand>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_installs: default_max_concurrent_installs(),
            install_timeout_seconds: default_install_timeout(),
            task_retention_hours: default_task_retention_hours(),
            tools: HashMap::new(),
        }
    }
}

impl InstallerConfig {
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_seconds)
    }
}

/// A program plus argument template. `{package}`, `{version}` and `{spec}`
/// are substituted in every argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: ServiceId,
    pub name: String,
    pub display_name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfigFile {
    pub service: ServiceConfig,
}

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_check_interval() -> u64 {
    defaults::HEALTH_CHECK_INTERVAL_SECONDS
}

fn default_probe_timeout() -> u64 {
    probe::DEFAULT_TIMEOUT.as_secs()
}

fn default_force_probe_timeout() -> u64 {
    probe::FORCE_TIMEOUT.as_secs()
}

fn default_stop_grace_period() -> u64 {
    process::STOP_GRACE_PERIOD.as_secs()
}

fn default_health_cache_ttl() -> u64 {
    cache::DEFAULT_TTL.as_secs()
}

fn default_max_concurrent_installs() -> usize {
    installer::DEFAULT_MAX_CONCURRENT
}

fn default_install_timeout() -> u64 {
    installer::DEFAULT_TIMEOUT.as_secs()
}

fn default_task_retention_hours() -> i64 {
    crate::constants::cleanup::TASK_RETENTION_HOURS
}

fn default_enabled() -> bool {
    true
}
