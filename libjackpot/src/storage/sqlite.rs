//! SQLite-backed key/value store

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::KeyValueStore;
use crate::error::StorageError;

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file and run migrations
    pub async fn new(db_path: &str) -> Result<Self, StorageError> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Forward slashes work for the SQLite URL on every platform;
        // mode=rwc creates the file when missing
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url).await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::debug!(path = %expanded_path, "Opened state database");

        Ok(Self { pool })
    }

    /// Close the pool; later operations fail and slices fall back to memory
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT value FROM kv_store WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            DELETE FROM kv_store WHERE key = ?
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn backend_name(&self) -> &str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("state.db");
        let store = SqliteStore::new(db_path.to_str().unwrap()).await.unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_creates_parent_directories() {
        let (_store, temp_dir) = setup().await;
        assert!(temp_dir.path().join("nested").join("state.db").exists());
    }

    #[tokio::test]
    async fn test_upsert_and_remove() {
        let (store, _temp_dir) = setup().await;

        assert_eq!(store.get("user.name").await.unwrap(), None);

        store.set("user.name", "Ana").await.unwrap();
        store.set("user.name", "Luis").await.unwrap();
        assert_eq!(store.get("user.name").await.unwrap().as_deref(), Some("Luis"));

        store.remove("user.name").await.unwrap();
        store.remove("user.name").await.unwrap();
        assert_eq!(store.get("user.name").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("state.db");
        let path = db_path.to_str().unwrap();

        {
            let store = SqliteStore::new(path).await.unwrap();
            store.set("avatar.selected", "3").await.unwrap();
            store.close().await;
        }

        let store = SqliteStore::new(path).await.unwrap();
        assert_eq!(store.get("avatar.selected").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_closed_pool_reports_fault() {
        let (store, _temp_dir) = setup().await;
        store.close().await;

        assert!(store.get("user.name").await.is_err());
        assert!(store.set("user.name", "x").await.is_err());
    }
}
