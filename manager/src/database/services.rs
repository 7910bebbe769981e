//! Service row operations.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{debug, error, info};

use super::records::ServiceRecord;
use super::Database;
use crate::ServiceId;

const SERVICE_COLUMNS: &str = r#"
    id, name, display_name, transport, command, args_json, env_json, url,
    headers_json, enabled, deleted, package_manager, source_package_name,
    installed_version, health_status, last_health_check, created_at, updated_at
"#;

fn service_from_row(row: &SqliteRow) -> sqlx::Result<ServiceRecord> {
    Ok(ServiceRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        display_name: row.try_get("display_name")?,
        transport: row.try_get("transport")?,
        command: row.try_get("command")?,
        args_json: row.try_get("args_json")?,
        env_json: row.try_get("env_json")?,
        url: row.try_get("url")?,
        headers_json: row.try_get("headers_json")?,
        enabled: row.try_get("enabled")?,
        deleted: row.try_get("deleted")?,
        package_manager: row.try_get("package_manager")?,
        source_package_name: row.try_get("source_package_name")?,
        installed_version: row.try_get("installed_version")?,
        health_status: row.try_get("health_status")?,
        last_health_check: row.try_get("last_health_check")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

impl Database {
    /// Inserts a new row and returns its id. A record id of zero or less lets
    /// SQLite assign one.
    pub async fn create_service(&self, record: &ServiceRecord) -> sqlx::Result<ServiceId> {
        debug!("Creating service row: {}", record.name);

        let explicit_id = (record.id > 0).then_some(record.id);
        let result = sqlx::query(
            r#"
            INSERT INTO mcp_services (
                id, name, display_name, transport, command, args_json, env_json, url,
                headers_json, enabled, deleted, package_manager, source_package_name,
                installed_version, health_status, last_health_check, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(explicit_id)
        .bind(&record.name)
        .bind(&record.display_name)
        .bind(&record.transport)
        .bind(&record.command)
        .bind(&record.args_json)
        .bind(&record.env_json)
        .bind(&record.url)
        .bind(&record.headers_json)
        .bind(record.enabled)
        .bind(record.deleted)
        .bind(&record.package_manager)
        .bind(&record.source_package_name)
        .bind(&record.installed_version)
        .bind(&record.health_status)
        .bind(record.last_health_check)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => {
                let id = done.last_insert_rowid();
                info!("Created service row {} ({})", id, record.name);
                Ok(id)
            }
            Err(e) => {
                error!("Failed to create service row {}: {}", record.name, e);
                Err(e)
            }
        }
    }

    /// Inserts or replaces the configuration columns of a seed service,
    /// leaving install and health state alone. A soft-deleted row is revived.
    pub async fn upsert_service(&self, record: &ServiceRecord) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mcp_services (
                id, name, display_name, transport, command, args_json, env_json, url,
                headers_json, enabled, deleted, health_status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 'unknown', ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                display_name = excluded.display_name,
                transport = excluded.transport,
                command = excluded.command,
                args_json = excluded.args_json,
                env_json = excluded.env_json,
                url = excluded.url,
                headers_json = excluded.headers_json,
                enabled = excluded.enabled,
                deleted = 0,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.display_name)
        .bind(&record.transport)
        .bind(&record.command)
        .bind(&record.args_json)
        .bind(&record.env_json)
        .bind(&record.url)
        .bind(&record.headers_json)
        .bind(record.enabled)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Upserted service row {} ({})", record.id, record.name);
        Ok(())
    }

    pub async fn get_service(&self, id: ServiceId) -> sqlx::Result<Option<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM mcp_services WHERE id = ? AND deleted = 0",
            SERVICE_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(service_from_row).transpose()
    }

    pub async fn get_all_services(&self) -> sqlx::Result<Vec<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM mcp_services WHERE deleted = 0 ORDER BY id",
            SERVICE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(service_from_row).collect()
    }

    pub async fn get_enabled_services(&self) -> sqlx::Result<Vec<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM mcp_services WHERE enabled = 1 AND deleted = 0 ORDER BY id",
            SERVICE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(service_from_row).collect()
    }

    pub async fn find_service_by_package(
        &self,
        package_manager: &str,
        package_name: &str,
    ) -> sqlx::Result<Option<ServiceRecord>> {
        let sql = format!(
            "SELECT {} FROM mcp_services WHERE package_manager = ? AND source_package_name = ? AND deleted = 0 ORDER BY id LIMIT 1",
            SERVICE_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(package_manager)
            .bind(package_name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(service_from_row).transpose()
    }

    /// Rewrites every mutable column of an existing row. Returns false when
    /// the row does not exist.
    pub async fn update_service(&self, record: &ServiceRecord) -> sqlx::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mcp_services SET
                name = ?, display_name = ?, transport = ?, command = ?, args_json = ?,
                env_json = ?, url = ?, headers_json = ?, enabled = ?, package_manager = ?,
                source_package_name = ?, installed_version = ?, updated_at = ?
            WHERE id = ? AND deleted = 0
            "#,
        )
        .bind(&record.name)
        .bind(&record.display_name)
        .bind(&record.transport)
        .bind(&record.command)
        .bind(&record.args_json)
        .bind(&record.env_json)
        .bind(&record.url)
        .bind(&record.headers_json)
        .bind(record.enabled)
        .bind(&record.package_manager)
        .bind(&record.source_package_name)
        .bind(&record.installed_version)
        .bind(Utc::now())
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_health_status(&self, id: ServiceId, status: &str) -> sqlx::Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE mcp_services SET health_status = ?, last_health_check = ?, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(status)
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_installed_version(&self, id: ServiceId, version: Option<&str>) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE mcp_services SET installed_version = ?, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(version)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_service_enabled(&self, id: ServiceId, enabled: bool) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE mcp_services SET enabled = ?, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(enabled)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Marks a row deleted and disabled. Returns false when no live row matched.
    pub async fn soft_delete_service(&self, id: ServiceId) -> sqlx::Result<bool> {
        let result = sqlx::query(
            "UPDATE mcp_services SET deleted = 1, enabled = 0, updated_at = ? WHERE id = ? AND deleted = 0",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!("Soft-deleted service row {}", id);
        }
        Ok(deleted)
    }
}
