//! # Outbound Sync Queue
//!
//! Durable FIFO of local mutations waiting to be pushed to the remote store.
//!
//! ## Overview
//!
//! - **Persistence**: tasks live in a [`LocalStore`] table so they survive restarts
//! - **Ordering**: every task gets a monotonically increasing sequence number;
//!   the storage key is the zero-padded sequence so `get_all` returns FIFO order
//! - **Retry bookkeeping**: `attempts` and `last_error` are persisted after each
//!   failed push
//!
//! The queue never decides whether a task is retried or dropped; that is the
//! coordinator's job.

use async_trait::async_trait;
use bridge_traits::LocalStore;
use chrono::{DateTime, Utc};
use core_async::sync::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Default table holding queued tasks
pub const SYNC_QUEUE_TABLE: &str = "sync_queue";

/// Key of the persisted high-water sequence in the queue's counter table.
const SEQUENCE_KEY: &str = "last_sequence";

/// Type-safe sync task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTaskId(Uuid);

impl SyncTaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidTaskId(e.to_string()))
    }
}

impl Default for SyncTaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SyncTaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of mutation carried by a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Create and update both write the record remotely.
    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }
}

impl std::fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local mutation submitted for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncChange {
    /// Remote table the record belongs to (e.g. `workouts`)
    pub entity_type: String,
    /// Remote key of the record
    pub entity_id: String,
    pub operation: SyncOperation,
    /// Full record for create/update; ignored by the remote for delete
    pub payload: Value,
}

impl SyncChange {
    pub fn create(entity_type: impl Into<String>, entity_id: impl Into<String>, payload: Value) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            operation: SyncOperation::Create,
            payload,
        }
    }

    pub fn update(entity_type: impl Into<String>, entity_id: impl Into<String>, payload: Value) -> Self {
        Self {
            operation: SyncOperation::Update,
            ..Self::create(entity_type, entity_id, payload)
        }
    }

    pub fn delete(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: SyncOperation::Delete,
            ..Self::create(entity_type, entity_id, Value::Null)
        }
    }
}

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
    pub id: SyncTaskId,
    /// Position in the queue, assigned on push
    pub sequence: u64,
    pub owner_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub payload: Value,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl SyncTask {
    pub fn new(owner_id: impl Into<String>, change: SyncChange, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: SyncTaskId::new(),
            sequence: 0,
            owner_id: owner_id.into(),
            entity_type: change.entity_type,
            entity_id: change.entity_id,
            operation: change.operation,
            payload: change.payload,
            enqueued_at,
            attempts: 0,
            last_error: None,
        }
    }

    /// Identity of the remote record this task touches.
    pub fn entity_key(&self) -> (&str, &str) {
        (&self.entity_type, &self.entity_id)
    }

    fn storage_key(&self) -> String {
        format!("{:020}", self.sequence)
    }
}

/// Repository trait for queue persistence
#[async_trait]
pub trait SyncQueueRepository: Send + Sync {
    /// Append a task, assigning its sequence number.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails
    async fn push(&self, task: SyncTask) -> Result<SyncTask>;

    /// All queued tasks in FIFO order.
    async fn pending(&self) -> Result<Vec<SyncTask>>;

    /// Persist retry bookkeeping for a task already in the queue.
    async fn update(&self, task: &SyncTask) -> Result<()>;

    async fn remove(&self, task: &SyncTask) -> Result<()>;

    async fn len(&self) -> Result<usize>;
}

/// [`SyncQueueRepository`] over a [`LocalStore`] table.
///
/// The last assigned sequence lives in a companion `<table>_sequence` table,
/// so a removed task's key is never handed out again.
pub struct LocalSyncQueueRepository {
    store: Arc<dyn LocalStore>,
    table: String,
    sequence_table: String,
    // Serializes sequence assignment and row replacement
    write_lock: Mutex<()>,
}

impl LocalSyncQueueRepository {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self::with_table(store, SYNC_QUEUE_TABLE)
    }

    pub fn with_table(store: Arc<dyn LocalStore>, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            store,
            sequence_table: format!("{}_sequence", table),
            table,
            write_lock: Mutex::new(()),
        }
    }

    async fn next_sequence(&self) -> Result<u64> {
        let persisted = self
            .store
            .get(&self.sequence_table, SEQUENCE_KEY)
            .await?
            .and_then(|value| value.as_u64())
            .unwrap_or(0);

        // Rows written before the counter existed still occupy their key
        let highest_key = self
            .store
            .get_all(&self.table)
            .await?
            .iter()
            .filter_map(|record| record.key.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let next = persisted.max(highest_key) + 1;
        self.store
            .put(&self.sequence_table, SEQUENCE_KEY, Value::from(next))
            .await?;
        Ok(next)
    }

    /// Whether the row at the task's key still holds this task.
    async fn holds(&self, task: &SyncTask) -> Result<bool> {
        let stored = self.store.get(&self.table, &task.storage_key()).await?;
        Ok(stored
            .and_then(|value| value.get("id").cloned())
            .and_then(|id| serde_json::from_value::<SyncTaskId>(id).ok())
            == Some(task.id))
    }
}

#[async_trait]
impl SyncQueueRepository for LocalSyncQueueRepository {
    async fn push(&self, mut task: SyncTask) -> Result<SyncTask> {
        let _guard = self.write_lock.lock().await;
        task.sequence = self.next_sequence().await?;

        let value = serde_json::to_value(&task)?;
        self.store.put(&self.table, &task.storage_key(), value).await?;

        debug!(task_id = %task.id, sequence = task.sequence, "Queued sync task");
        Ok(task)
    }

    async fn pending(&self) -> Result<Vec<SyncTask>> {
        let records = self.store.get_all(&self.table).await?;

        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<SyncTask>(record.value) {
                Ok(task) => tasks.push(task),
                Err(e) => warn!(key = %record.key, error = %e, "Skipping unreadable sync task"),
            }
        }
        Ok(tasks)
    }

    async fn update(&self, task: &SyncTask) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.holds(task).await? {
            return Err(SyncError::TaskNotFound(task.id.to_string()));
        }

        let value = serde_json::to_value(task)?;
        self.store.put(&self.table, &task.storage_key(), value).await?;
        Ok(())
    }

    /// Remove a task. A no-op when the task is already gone.
    async fn remove(&self, task: &SyncTask) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if !self.holds(task).await? {
            debug!(task_id = %task.id, "Sync task already removed");
            return Ok(());
        }

        self.store.delete(&self.table, &task.storage_key()).await?;
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.pending().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemoryLocalStore;
    use serde_json::json;

    fn task(entity_id: &str) -> SyncTask {
        SyncTask::new(
            "user_1",
            SyncChange::update("workouts", entity_id, json!({"id": entity_id})),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_push_assigns_increasing_sequence() {
        let repo = LocalSyncQueueRepository::new(Arc::new(MemoryLocalStore::new()));

        let first = repo.push(task("w1")).await.unwrap();
        let second = repo.push(task("w2")).await.unwrap();

        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_eq!(repo.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pending_is_fifo_past_ten_entries() {
        let repo = LocalSyncQueueRepository::new(Arc::new(MemoryLocalStore::new()));
        for i in 0..12 {
            repo.push(task(&format!("w{}", i))).await.unwrap();
        }

        let ids: Vec<String> = repo
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.entity_id)
            .collect();
        let expected: Vec<String> = (0..12).map(|i| format!("w{}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_update_persists_attempts() {
        let repo = LocalSyncQueueRepository::new(Arc::new(MemoryLocalStore::new()));
        let mut queued = repo.push(task("w1")).await.unwrap();

        queued.attempts = 2;
        queued.last_error = Some("unreachable".to_string());
        repo.update(&queued).await.unwrap();

        let pending = repo.pending().await.unwrap();
        assert_eq!(pending[0].attempts, 2);
        assert_eq!(pending[0].last_error.as_deref(), Some("unreachable"));
    }

    #[tokio::test]
    async fn test_update_of_removed_task_fails() {
        let repo = LocalSyncQueueRepository::new(Arc::new(MemoryLocalStore::new()));
        let queued = repo.push(task("w1")).await.unwrap();
        repo.remove(&queued).await.unwrap();

        let result = repo.update(&queued).await;
        assert!(matches!(result, Err(SyncError::TaskNotFound(_))));
    }

    #[tokio::test]
    async fn test_sequence_not_reused_after_removing_last() {
        let repo = LocalSyncQueueRepository::new(Arc::new(MemoryLocalStore::new()));
        let first = repo.push(task("w1")).await.unwrap();
        repo.remove(&first).await.unwrap();

        let second = repo.push(task("w2")).await.unwrap();
        assert_eq!(second.sequence, 2);
    }

    #[tokio::test]
    async fn test_stale_remove_keeps_newer_task() {
        let repo = LocalSyncQueueRepository::new(Arc::new(MemoryLocalStore::new()));
        let stale = repo.push(task("w1")).await.unwrap();
        repo.remove(&stale).await.unwrap();
        let fresh = repo.push(task("w2")).await.unwrap();

        // Same key as `fresh` would have under key-only addressing
        let mut forged = stale.clone();
        forged.sequence = fresh.sequence;
        repo.remove(&forged).await.unwrap();
        assert!(matches!(
            repo.update(&forged).await,
            Err(SyncError::TaskNotFound(_))
        ));

        assert_eq!(repo.pending().await.unwrap(), vec![fresh]);
    }

    #[tokio::test]
    async fn test_unreadable_rows_are_skipped() {
        let store = Arc::new(MemoryLocalStore::new());
        store
            .put(SYNC_QUEUE_TABLE, "00000000000000000001", json!({"garbage": true}))
            .await
            .unwrap();
        let repo = LocalSyncQueueRepository::new(store);

        let pushed = repo.push(task("w1")).await.unwrap();
        assert_eq!(pushed.sequence, 2);
        assert_eq!(repo.pending().await.unwrap(), vec![pushed]);
    }

    #[test]
    fn test_change_constructors() {
        let delete = SyncChange::delete("workouts", "w1");
        assert_eq!(delete.operation, SyncOperation::Delete);
        assert!(!delete.operation.is_edit());
        assert!(SyncOperation::Create.is_edit());
        assert_eq!(delete.payload, Value::Null);
    }
}
