//! SQLite-backed [`KeyNamespace`].

use sqlx::SqlitePool;

use crate::error::StorageResult;
use crate::namespace::KeyNamespace;

/// One namespace within the `kv_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteNamespace {
    pool: SqlitePool,
    namespace: String,
}

impl SqliteNamespace {
    pub fn new(pool: SqlitePool, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.namespace
    }
}

impl KeyNamespace for SqliteNamespace {
    async fn get_int(&self, key: &str) -> StorageResult<Option<i64>> {
        let value: Option<Option<i64>> = sqlx::query_scalar(
            "SELECT int_value FROM kv_entries WHERE namespace = ? AND key = ?",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten())
    }

    async fn put_int(&self, key: &str, value: i64) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_entries (namespace, key, int_value, blob_value)
            VALUES (?, ?, ?, NULL)
            ON CONFLICT (namespace, key) DO UPDATE SET
                int_value = excluded.int_value,
                blob_value = NULL,
                updated_at = datetime('now')
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let value: Option<Option<Vec<u8>>> = sqlx::query_scalar(
            "SELECT blob_value FROM kv_entries WHERE namespace = ? AND key = ?",
        )
        .bind(&self.namespace)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.flatten())
    }

    async fn put_bytes(&self, key: &str, value: &[u8]) -> StorageResult<usize> {
        let result = sqlx::query(
            r#"
            INSERT INTO kv_entries (namespace, key, int_value, blob_value)
            VALUES (?, ?, NULL, ?)
            ON CONFLICT (namespace, key) DO UPDATE SET
                int_value = NULL,
                blob_value = excluded.blob_value,
                updated_at = datetime('now')
            "#,
        )
        .bind(&self.namespace)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(0);
        }
        Ok(value.len())
    }

    async fn remove(&self, key: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM kv_entries WHERE namespace = ? AND key = ?")
            .bind(&self.namespace)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
