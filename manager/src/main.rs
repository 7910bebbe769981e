// File: manager/src/main.rs
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use mcp_manager::constants::cleanup;
use mcp_manager::database::ServiceRecord;
use mcp_manager::web::{start_web_server, AppState};
use mcp_manager::{
    ConfigManager, Database, HealthCache, HealthMonitor, InstallationManager, RegistrySettings,
    ServiceRegistry, SqliteCacheStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("mcp_manager=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting MCP Service Manager");

    // Load configuration
    let config_manager = ConfigManager::new("config".to_string()).await?;
    let config = config_manager.get_current_config();
    info!(
        "Configuration loaded: {} seeded services, {}s check interval",
        config.services.len(),
        config.check_interval_seconds
    );

    // Initialize database
    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized at {}", config.database_path);

    // Seed service rows from config files; config wins for everything but install state
    for service in &config.services {
        let record = ServiceRecord::from_config(service, Utc::now())?;
        if let Err(e) = database.upsert_service(&record).await {
            error!("Failed to seed service {} ({}): {}", service.id, service.name, e);
        }
    }

    // Health cache backed by the same database
    let cache_store = Arc::new(SqliteCacheStore::new(database.clone()));
    let health_cache = HealthCache::new(cache_store, config.health_cache_ttl());
    info!("Health cache initialized ({}s TTL)", config.health_cache_ttl_seconds);

    // Registry: start every enabled backend
    let registry = Arc::new(ServiceRegistry::new(
        health_cache.clone(),
        database.clone(),
        RegistrySettings::from_config(&config),
    ));
    let registered = registry.initialize().await?;
    info!("Service registry initialized with {} services", registered);

    let installer = InstallationManager::new(&config.installer, registry.clone(), database.clone());
    info!(
        "Installation manager initialized ({} concurrent installs)",
        config.installer.max_concurrent_installs
    );

    // Start periodic health monitoring
    let monitor = HealthMonitor::new(registry.clone(), config.check_interval());
    let monitor_handle = monitor.spawn();

    // Start periodic cleanup of finished tasks and expired cache entries
    let cleanup_installer = installer.clone();
    let retention_hours = config.installer.task_retention_hours;
    let cleanup_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(cleanup::CLEANUP_INTERVAL_SECONDS));
        interval.tick().await;

        loop {
            interval.tick().await;

            let removed = cleanup_installer.cleanup_finished_tasks(retention_hours).await;
            if removed > 0 {
                info!("Removed {} finished installation tasks", removed);
            }

            match health_cache.clean_expired_entries().await {
                Ok(0) => {}
                Ok(purged) => info!("Purged {} expired health cache entries", purged),
                Err(e) => warn!("Health cache cleanup failed: {}", e),
            }
        }
    });

    info!("Background tasks started");

    let state = AppState::new(config.clone(), registry.clone(), installer, database);
    if let Err(e) = start_web_server(state, shutdown_signal()).await {
        error!("Web server error: {}", e);
    }

    monitor_handle.abort();
    cleanup_handle.abort();
    registry.shutdown().await;
    info!("MCP Service Manager stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
