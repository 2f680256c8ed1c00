//! Local record storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{LocalStore, StoredRecord},
};
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    Row,
};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const CREATE_RECORDS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS records (
        tbl TEXT NOT NULL,
        key TEXT NOT NULL,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (tbl, key)
    )
"#;

/// SQLite-backed [`LocalStore`] implementation
///
/// All logical tables share one physical `records` table keyed by
/// `(tbl, key)`; values are stored as JSON text.
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Open (or create) a store at the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
            .map_err(|e| BridgeError::DatabaseError(format!("Invalid database path: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self { pool };
        store.init().await?;

        debug!(path = ?db_path, "Initialized local record store");
        Ok(store)
    }

    /// Open the store in the platform data directory
    pub async fn open_default() -> Result<Self> {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .ok_or_else(|| {
                BridgeError::NotAvailable("No data directory on this platform".to_string())
            })?;

        Self::new(data_dir.join("fitness-core").join("local.db")).await
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    fn decode(raw: &str) -> Result<Value> {
        serde_json::from_str(raw).map_err(BridgeError::Serialization)
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_RECORDS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT value FROM records WHERE tbl = ? AND key = ?")
            .bind(table)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to get record: {}", e)))?;

        match row {
            Some(row) => {
                let raw: String = row.get(0);
                Ok(Some(Self::decode(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn get_all(&self, table: &str) -> Result<Vec<StoredRecord>> {
        let rows = sqlx::query("SELECT key, value FROM records WHERE tbl = ? ORDER BY key")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to list records: {}", e)))?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.get(0);
                let raw: String = row.get(1);
                Ok(StoredRecord::new(key, Self::decode(&raw)?))
            })
            .collect()
    }

    async fn put(&self, table: &str, key: &str, value: Value) -> Result<()> {
        let raw = serde_json::to_string(&value)?;

        sqlx::query(
            r#"
            INSERT INTO records (tbl, key, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(tbl, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(table)
        .bind(key)
        .bind(raw)
        .bind(chrono::Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to put record: {}", e)))?;

        debug!(table = table, key = key, "Stored record");
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM records WHERE tbl = ? AND key = ?")
            .bind(table)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to delete record: {}", e)))?;

        debug!(table = table, key = key, "Deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = SqliteLocalStore::in_memory().await.unwrap();

        store
            .put("workouts", "w1", json!({"id": "w1", "reps": 10}))
            .await
            .unwrap();
        let value = store.get("workouts", "w1").await.unwrap();
        assert_eq!(value, Some(json!({"id": "w1", "reps": 10})));

        store.delete("workouts", "w1").await.unwrap();
        assert_eq!(store.get("workouts", "w1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_all_is_ordered_and_scoped_to_table() {
        let store = SqliteLocalStore::in_memory().await.unwrap();

        store.put("workouts", "b", json!({"id": "b"})).await.unwrap();
        store.put("workouts", "a", json!({"id": "a"})).await.unwrap();
        store.put("meals", "c", json!({"id": "c"})).await.unwrap();

        let keys: Vec<String> = store
            .get_all("workouts")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let store = SqliteLocalStore::in_memory().await.unwrap();
        store.put("t", "k", json!(1)).await.unwrap();

        store.init().await.unwrap();
        store.init().await.unwrap();

        assert_eq!(store.get("t", "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = SqliteLocalStore::in_memory().await.unwrap();

        store.put("t", "k", json!({"v": 1})).await.unwrap();
        store.put("t", "k", json!({"v": 2})).await.unwrap();

        assert_eq!(store.get_all("t").await.unwrap().len(), 1);
        assert_eq!(store.get("t", "k").await.unwrap(), Some(json!({"v": 2})));
    }
}
