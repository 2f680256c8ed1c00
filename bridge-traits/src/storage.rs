//! Storage Abstractions
//!
//! Keyed table storage on the device (`LocalStore`) and the opaque remote
//! backend the outbound queue reconciles with (`RemoteStore`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A record read back from a [`LocalStore`] table together with its key.
///
/// The key is returned alongside the value so callers can address records
/// whose body is malformed (for example, missing its identity field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub key: String,
    pub value: Value,
}

impl StoredRecord {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Local keyed table storage trait
///
/// Abstracts the on-device storage engine:
/// - **Desktop**: SQLite file or in-memory map
/// - **iOS/Android**: SQLite, Realm, platform key-value stores
/// - **Web**: IndexedDB, localStorage
///
/// The core never assumes anything beyond this contract. Tables are created
/// lazily; reading a table that was never written yields an empty result.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::LocalStore;
/// use serde_json::json;
///
/// async fn save_workout(store: &dyn LocalStore) -> Result<()> {
///     store.init().await?;
///     store.put("workouts", "w1", json!({"id": "w1", "name": "Leg day"})).await?;
///     let all = store.get_all("workouts").await?;
///     assert_eq!(all.len(), 1);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Prepare the backing storage. Must be idempotent.
    async fn init(&self) -> Result<()>;

    /// Read a single record. Returns `Ok(None)` when the key is absent.
    async fn get(&self, table: &str, key: &str) -> Result<Option<Value>>;

    /// Read every record of a table in ascending key order.
    async fn get_all(&self, table: &str) -> Result<Vec<StoredRecord>>;

    /// Insert or overwrite a record.
    async fn put(&self, table: &str, key: &str, value: Value) -> Result<()>;

    /// Delete a record. Deleting an absent key is not an error.
    async fn delete(&self, table: &str, key: &str) -> Result<()>;
}

/// Remote store trait
///
/// The network-accessible backend local mutations are eventually pushed to.
/// Only the upsert/delete-by-table-and-key contract is required; transport,
/// authentication and multi-device arbitration are the implementation's
/// concern.
///
/// Implementations should return [`BridgeError::Unreachable`] for failures
/// that may succeed on a later attempt.
///
/// [`BridgeError::Unreachable`]: crate::error::BridgeError::Unreachable
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create or replace `record` in `table`.
    async fn upsert(&self, table: &str, record: Value) -> Result<()>;

    /// Remove the record identified by `key` from `table`.
    async fn delete(&self, table: &str, key: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_record() {
        let record = StoredRecord::new("w1", json!({"id": "w1"}));

        assert_eq!(record.key, "w1");
        assert_eq!(record.value["id"], "w1");
    }
}
