//! Health cache row operations. Expiry times are unix milliseconds.

use sqlx::Row;
use tracing::debug;

use super::Database;

impl Database {
    pub async fn get_cache_entry(&self, key: &str, now_ms: i64) -> sqlx::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM health_cache WHERE cache_key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_ms)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get("value")).transpose()
    }

    pub async fn set_cache_entry(&self, key: &str, value: &str, expires_at_ms: i64) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO health_cache (cache_key, value, expires_at) VALUES (?, ?, ?)
            ON CONFLICT(cache_key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_cache_entry(&self, key: &str) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM health_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_cache_entry_if(&self, key: &str, value: &str) -> sqlx::Result<bool> {
        let result = sqlx::query("DELETE FROM health_cache WHERE cache_key = ? AND value = ?")
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired_cache_entries(&self, now_ms: i64) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM health_cache WHERE expires_at <= ?")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            debug!("Purged {} expired health cache rows", purged);
        }
        Ok(purged)
    }

    pub async fn count_cache_entries(&self) -> sqlx::Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM health_cache")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
