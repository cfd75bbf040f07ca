//! SQLite-backed settings store.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use super::{SettingsStore, StoreError};
use crate::db::Database;

/// Persistent store over the `settings` table.
#[derive(Debug, Clone)]
pub struct SqliteSettingsStore {
    db: Database,
}

impl SqliteSettingsStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|(raw,)| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value.to_string())
        .execute(self.db.pool())
        .await?;
        debug!("setting stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM settings WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key")
                .bind(prefix)
                .fetch_all(self.db.pool())
                .await?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> SqliteSettingsStore {
        SqliteSettingsStore::new(Database::new_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_set_overwrites_existing_value() {
        let store = store().await;
        store.set("preferences", json!({"auto_download": false})).await.unwrap();
        store.set("preferences", json!({"auto_download": true})).await.unwrap();

        assert_eq!(
            store.get("preferences").await.unwrap(),
            Some(json!({"auto_download": true}))
        );
    }

    #[tokio::test]
    async fn test_prefix_listing_ignores_like_wildcards() {
        let store = store().await;
        for key in ["download_1", "downloadX1", "filterCriteria"] {
            store.set(key, json!(null)).await.unwrap();
        }
        assert_eq!(
            store.keys_with_prefix("download_").await.unwrap(),
            vec!["download_1"]
        );
    }

    #[tokio::test]
    async fn test_closed_pool_reports_unavailable() {
        let store = store().await;
        store.database().close().await;

        let err = store.get("preferences").await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");
    }
}
