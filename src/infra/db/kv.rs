use async_trait::async_trait;
use bytes::Bytes;
use sqlx::postgres::PgPool;

use crate::cache::{KeyValueStore, StoreError};

use super::map_store_error;

/// Cache store backed by the `kv_store` table.
#[derive(Clone)]
pub struct PostgresKvStore {
    pool: PgPool,
}

impl PostgresKvStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for PostgresKvStore {
    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM kv_store WHERE key = $1)")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(map_store_error)
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let value = sqlx::query_scalar::<_, Vec<u8>>("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_store_error)?;

        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value.as_ref())
        .execute(&self.pool)
        .await
        .map_err(map_store_error)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_store_error)?;

        Ok(())
    }
}
