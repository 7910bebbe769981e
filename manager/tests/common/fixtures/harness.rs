//! In-memory wiring of the manager for integration tests

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mcp_manager::config::{InstallerConfig, ToolCommand};
use mcp_manager::database::ServiceRecord;
use mcp_manager::web::{create_router, AppState};
use mcp_manager::{
    Config, Database, HealthCache, InstallationManager, InstallationTask, RegistrySettings,
    ServiceConfig, ServiceRegistry, SqliteCacheStore,
};

pub struct TestHarness {
    pub database: Arc<Database>,
    pub cache: HealthCache,
    pub registry: Arc<ServiceRegistry>,
    pub installer: InstallationManager,
}

/// Short deadlines so failing probes do not slow the suite down.
pub fn test_settings() -> RegistrySettings {
    RegistrySettings {
        probe_timeout: Duration::from_secs(3),
        force_probe_timeout: Duration::from_secs(5),
        stop_grace_period: Duration::from_millis(200),
    }
}

/// Installer config whose tools are `sh -c <script>` for every package manager.
pub fn scripted_installer(script: &str, install_timeout_seconds: u64) -> InstallerConfig {
    let tool = ToolCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
    };
    let tools: HashMap<String, ToolCommand> = ["npm", "pypi", "uv", "pip"]
        .iter()
        .map(|name| (name.to_string(), tool.clone()))
        .collect();

    InstallerConfig {
        max_concurrent_installs: 2,
        install_timeout_seconds,
        task_retention_hours: 24,
        tools,
    }
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_installer(scripted_installer("exit 0", 30)).await
    }

    pub async fn with_installer(installer_config: InstallerConfig) -> Self {
        let database = Arc::new(
            Database::in_memory()
                .await
                .expect("Failed to create test database"),
        );
        let cache = HealthCache::new(
            Arc::new(SqliteCacheStore::new(database.clone())),
            Duration::from_secs(3600),
        );
        let registry = Arc::new(ServiceRegistry::new(
            cache.clone(),
            database.clone(),
            test_settings(),
        ));
        let installer = InstallationManager::new(&installer_config, registry.clone(), database.clone());

        Self {
            database,
            cache,
            registry,
            installer,
        }
    }

    /// Inserts a service row and returns its id.
    pub async fn insert_service(&self, config: &ServiceConfig) -> i64 {
        let record = ServiceRecord::from_config(config, Utc::now()).expect("Failed to encode service row");
        self.database
            .create_service(&record)
            .await
            .expect("Failed to insert service row")
    }

    /// Inserts a row that looks like an npm package awaiting installation.
    pub async fn insert_package_service(&self, config: &ServiceConfig, package: &str) -> i64 {
        let mut record = ServiceRecord::from_config(config, Utc::now()).expect("Failed to encode service row");
        record.package_manager = Some("npm".to_string());
        record.source_package_name = Some(package.to_string());
        record.enabled = false;
        self.database
            .create_service(&record)
            .await
            .expect("Failed to insert service row")
    }

    pub fn router(&self) -> axum::Router {
        create_router(AppState::new(
            Arc::new(Config::default()),
            self.registry.clone(),
            self.installer.clone(),
            self.database.clone(),
        ))
    }

    /// Polls until the task for `service_id` reaches a terminal status.
    pub async fn wait_for_task(&self, service_id: i64, deadline: Duration) -> InstallationTask {
        let started = Instant::now();
        loop {
            if let Some(task) = self.installer.get_task_status(service_id).await {
                if task.status.is_terminal() {
                    return task;
                }
            }
            assert!(
                started.elapsed() < deadline,
                "installation for service {} did not finish within {:?}",
                service_id,
                deadline
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
