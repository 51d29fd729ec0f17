//! SQLite-Implementierung des ConfigRepository

use chrono::Utc;
use sqlx::Row;

use crate::error::DbError;
use crate::models::ConfigEntry;
use crate::repository::{ConfigRepository, DbResult};
use crate::sqlite::pool::SqliteDb;

impl ConfigRepository for SqliteDb {
    async fn get(&self, key: &str) -> DbResult<Option<ConfigEntry>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM config_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_entry(&row)?))
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<ConfigEntry> {
        let now = Utc::now();
        let now_str = now.to_rfc3339();
        sqlx::query(
            "INSERT INTO config_kv (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(&now_str)
        .execute(&self.pool)
        .await?;

        Ok(ConfigEntry {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: now,
        })
    }

    async fn all(&self) -> DbResult<Vec<ConfigEntry>> {
        let rows = sqlx::query("SELECT key, value, updated_at FROM config_kv ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> DbResult<ConfigEntry> {
    let updated_str: String = row.try_get("updated_at")?;
    let updated_at = chrono::DateTime::parse_from_rfc3339(&updated_str)
        .map_err(|e| DbError::intern(format!("ungueltiger updated_at '{updated_str}': {e}")))?
        .with_timezone(&Utc);
    Ok(ConfigEntry {
        key: row.try_get("key")?,
        value: row.try_get("value")?,
        updated_at,
    })
}
