//! System configuration repository

use serde_json::Value;
use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::system_config::ConfigEntry,
};

#[derive(Clone)]
pub struct SystemConfigRepository {
    pool: Pool<Postgres>,
}

impl SystemConfigRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> AppResult<Vec<ConfigEntry>> {
        let entries = sqlx::query_as::<_, ConfigEntry>("SELECT * FROM system_config ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn get(&self, key: &str) -> AppResult<ConfigEntry> {
        sqlx::query_as::<_, ConfigEntry>("SELECT * FROM system_config WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Configuration key '{}' not found", key)))
    }

    /// Insert or replace a key; a missing description keeps the stored one
    pub async fn upsert(
        &self,
        key: &str,
        value: &Value,
        description: Option<&str>,
        updated_by: i32,
    ) -> AppResult<ConfigEntry> {
        let entry = sqlx::query_as::<_, ConfigEntry>(
            r#"
            INSERT INTO system_config (key, value, description, updated_at, updated_by)
            VALUES ($1, $2, $3, NOW(), $4)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                description = COALESCE(EXCLUDED.description, system_config.description),
                updated_at = NOW(),
                updated_by = EXCLUDED.updated_by
            RETURNING *
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(updated_by)
        .fetch_one(&self.pool)
        .await?;
        Ok(entry)
    }
}
