//! PostgreSQL key-value store

use crate::domain::shared::{DomainError, Result};
use crate::domain::storage::KeyValueStore;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

/// Key-value store over the `kv_store` table
pub struct PgKvStore {
    pool: PgPool,
}

impl PgKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(op: &str, key: &str, e: sqlx::Error) -> DomainError {
    error!("Failed to {} {}: {}", op, key, e);
    DomainError::Persistence(format!("Database error: {}", e))
}

#[async_trait]
impl KeyValueStore for PgKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("read", key, e))?;

        Ok(row.map(|row| row.get::<String, _>("value")))
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("write", key, e))?;

        debug!("Stored {}", key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete", key, e))?;
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("write", key, e))?;

        Ok(result.rows_affected() == 1)
    }
}
