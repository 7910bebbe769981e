//! Database layer for the MCP manager.
//!
//! This module provides SQLite persistence for:
//! - Service rows (transport configuration, install state, last known health)
//! - The durable health cache table
//!
//! The module is organized into submodules:
//! - `records` - Record types (entities)
//! - `services` - Service row operations
//! - `cache` - Health cache row operations

mod cache;
mod records;
mod services;

pub use records::*;

use anyhow::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;
use tracing::{error, info};

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Expose pool for integration test queries
    #[allow(dead_code)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        info!("=== Starting database initialization ===");
        info!("Database path: {}", database_path);

        if let Some(parent) = Path::new(database_path).parent() {
            if !parent.as_os_str().is_empty() {
                info!("Ensuring parent directory exists: {:?}", parent);
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    error!("FAILED to create parent directory {:?}: {}", parent, e);
                    return Err(e.into());
                }
            }
        }

        let database_url = format!("sqlite:{}?mode=rwc", database_path);
        info!("Connecting to database with URL: {}", database_url);

        let pool = match SqlitePool::connect(&database_url).await {
            Ok(pool) => {
                info!("Successfully connected to SQLite database");
                pool
            }
            Err(e) => {
                error!("FAILED to connect to database: {}", e);
                error!("   Connection URL: {}", database_url);
                return Err(e.into());
            }
        };

        let database = Self { pool };
        database.initialize_tables().await?;

        info!("=== Database initialization completed successfully ===");
        Ok(database)
    }

    /// Single-connection in-memory database. Every connection to
    /// `sqlite::memory:` is a separate database, so the pool is capped at one.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let database = Self { pool };
        database.initialize_tables().await?;
        Ok(database)
    }

    async fn initialize_tables(&self) -> Result<()> {
        info!("Step 1: Creating mcp_services table...");
        let services_table_sql = r#"
            CREATE TABLE IF NOT EXISTS mcp_services (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                display_name TEXT,
                transport TEXT NOT NULL,
                command TEXT,
                args_json TEXT NOT NULL DEFAULT '[]',
                env_json TEXT NOT NULL DEFAULT '{}',
                url TEXT,
                headers_json TEXT NOT NULL DEFAULT '{}',
                enabled BOOLEAN NOT NULL DEFAULT 1,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                package_manager TEXT,
                source_package_name TEXT,
                installed_version TEXT,
                health_status TEXT NOT NULL DEFAULT 'unknown',
                last_health_check DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(services_table_sql).execute(&self.pool).await {
            error!("FAILED to create mcp_services table: {}", e);
            return Err(e.into());
        }
        info!("mcp_services table created");

        info!("Step 2: Creating mcp_services package index...");
        let package_index_sql = "CREATE INDEX IF NOT EXISTS idx_services_package ON mcp_services(package_manager, source_package_name)";
        if let Err(e) = sqlx::query(package_index_sql).execute(&self.pool).await {
            error!("FAILED to create mcp_services package index: {}", e);
            return Err(e.into());
        }
        info!("mcp_services package index created");

        info!("Step 3: Creating health_cache table...");
        let cache_table_sql = r#"
            CREATE TABLE IF NOT EXISTS health_cache (
                cache_key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
        "#;
        if let Err(e) = sqlx::query(cache_table_sql).execute(&self.pool).await {
            error!("FAILED to create health_cache table: {}", e);
            return Err(e.into());
        }

        let cache_index_sql = "CREATE INDEX IF NOT EXISTS idx_health_cache_expiry ON health_cache(expires_at)";
        if let Err(e) = sqlx::query(cache_index_sql).execute(&self.pool).await {
            error!("FAILED to create health_cache index: {}", e);
            return Err(e.into());
        }
        info!("health_cache table created");

        Ok(())
    }
}
