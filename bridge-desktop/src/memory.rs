//! In-process local record storage

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    storage::{LocalStore, StoredRecord},
};
use core_async::sync::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// [`LocalStore`] kept entirely in memory.
///
/// Contents are lost when the process exits. Used for tests and as a
/// scratch store on hosts without persistent storage.
#[derive(Default)]
pub struct MemoryLocalStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, table: &str) -> bool {
        self.len(table).await == 0
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn get_all(&self, table: &str) -> Result<Vec<StoredRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|t| {
                t.iter()
                    .map(|(key, value)| StoredRecord::new(key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put(&self, table: &str, key: &str, value: Value) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(t) = tables.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_table_reads_empty() {
        let store = MemoryLocalStore::new();

        assert!(store.get_all("nothing").await.unwrap().is_empty());
        assert_eq!(store.get("nothing", "k").await.unwrap(), None);
        store.delete("nothing", "k").await.unwrap();
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryLocalStore::new();

        store.put("sessions", "s2", json!({"id": "s2"})).await.unwrap();
        store.put("sessions", "s1", json!({"id": "s1"})).await.unwrap();

        let all = store.get_all("sessions").await.unwrap();
        assert_eq!(all[0].key, "s1");
        assert_eq!(all[1].key, "s2");
        assert_eq!(store.len("sessions").await, 2);

        store.delete("sessions", "s1").await.unwrap();
        assert_eq!(store.len("sessions").await, 1);
    }
}
