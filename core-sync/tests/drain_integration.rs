//! Integration tests for the outbound sync queue
//!
//! These tests drive a `SyncCoordinator` against persistent and in-memory
//! local stores and a mocked remote store:
//! - Guest owners never produce queue entries
//! - Retry accounting and drop after the retry cap
//! - Queue durability across coordinator instances
//! - Batching and drain coalescing
//! - Tasks discarded mid-drain never take a newer task with them

use async_trait::async_trait;
use bridge_desktop::{MemoryLocalStore, SqliteLocalStore};
use bridge_traits::{error::BridgeError, LocalStore, RemoteStore, SystemClock};
use core_async::time::{sleep, Duration};
use core_runtime::events::EventBus;
use core_sync::{
    DrainOutcome, LocalSyncQueueRepository, SyncChange, SyncConfig, SyncCoordinator,
};
use mockall::mock;
use serde_json::{json, Value};
use std::sync::Arc;

mock! {
    pub Remote {}

    #[async_trait]
    impl RemoteStore for Remote {
        async fn upsert(&self, table: &str, record: Value) -> bridge_traits::error::Result<()>;
        async fn delete(&self, table: &str, key: &str) -> bridge_traits::error::Result<()>;
    }
}

fn coordinator(
    store: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
) -> SyncCoordinator {
    SyncCoordinator::new(
        config,
        Arc::new(LocalSyncQueueRepository::new(store)),
        remote,
        None,
        Arc::new(SystemClock),
        Arc::new(EventBus::default()),
    )
    .unwrap()
}

fn workout(id: &str) -> SyncChange {
    SyncChange::create("workouts", id, json!({"id": id, "reps": 10}))
}

#[tokio::test]
async fn test_guest_owner_leaves_queue_empty() {
    let mut remote = MockRemote::new();
    remote.expect_upsert().times(0);

    let coordinator = coordinator(
        Arc::new(MemoryLocalStore::new()),
        Arc::new(remote),
        SyncConfig::default(),
    );

    for owner in ["guest", "guest_8841", "anonymous", "anon-1"] {
        let task = coordinator.enqueue(owner, workout("w1")).await.unwrap();
        assert!(task.is_none());
    }

    assert_eq!(coordinator.status().await.unwrap().pending, 0);
    match coordinator.drain().await.unwrap() {
        DrainOutcome::Completed(report) => assert_eq!(report.attempted, 0),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_remote_drops_after_three_attempts() {
    let mut remote = MockRemote::new();
    remote
        .expect_upsert()
        .withf(|table, record| table == "workouts" && record["id"] == "w1")
        .times(3)
        .returning(|_, _| Err(BridgeError::Unreachable("connection refused".to_string())));

    let coordinator = coordinator(
        Arc::new(MemoryLocalStore::new()),
        Arc::new(remote),
        SyncConfig::default(),
    );
    coordinator.enqueue("user_1", workout("w1")).await.unwrap();

    let mut dropped = 0;
    for _ in 0..3 {
        if let DrainOutcome::Completed(report) = coordinator.drain().await.unwrap() {
            dropped += report.dropped;
        }
    }
    assert_eq!(dropped, 1);

    let status = coordinator.status().await.unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.dropped_total, 1);
    assert!(status.recent_drops[0].error.contains("connection refused"));
}

#[tokio::test]
async fn test_queue_survives_coordinator_restart() {
    let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::in_memory().await.unwrap());

    {
        let mut offline = MockRemote::new();
        offline
            .expect_upsert()
            .returning(|_, _| Err(BridgeError::Unreachable("offline".to_string())));
        let first = coordinator(store.clone(), Arc::new(offline), SyncConfig::default());
        first.enqueue("user_1", workout("w1")).await.unwrap();
        first.drain().await.unwrap();
    }

    let mut online = MockRemote::new();
    online.expect_upsert().times(1).returning(|_, _| Ok(()));
    let second = coordinator(store, Arc::new(online), SyncConfig::default());

    let pending = second.pending_tasks().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 1);

    match second.drain().await.unwrap() {
        DrainOutcome::Completed(report) => {
            assert_eq!(report.applied, 1);
            assert_eq!(report.remaining, 0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_drain_processes_every_batch() {
    let mut remote = MockRemote::new();
    remote.expect_upsert().times(25).returning(|_, _| Ok(()));

    let coordinator = coordinator(
        Arc::new(MemoryLocalStore::new()),
        Arc::new(remote),
        SyncConfig {
            batch_size: 10,
            ..SyncConfig::default()
        },
    );
    for i in 0..25 {
        coordinator
            .enqueue("user_1", workout(&format!("w{}", i)))
            .await
            .unwrap();
    }

    match coordinator.drain().await.unwrap() {
        DrainOutcome::Completed(report) => {
            assert_eq!(report.applied, 25);
            assert_eq!(report.remaining, 0);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

struct SlowRemote;

#[async_trait]
impl RemoteStore for SlowRemote {
    async fn upsert(&self, _table: &str, _record: Value) -> bridge_traits::error::Result<()> {
        sleep(Duration::from_millis(50)).await;
        Ok(())
    }

    async fn delete(&self, _table: &str, _key: &str) -> bridge_traits::error::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_concurrent_drains_coalesce() {
    let coordinator = coordinator(
        Arc::new(MemoryLocalStore::new()),
        Arc::new(SlowRemote),
        SyncConfig::default(),
    );
    coordinator.enqueue("user_1", workout("w1")).await.unwrap();

    let (first, second) = tokio::join!(coordinator.drain(), coordinator.drain());
    let outcomes = [first.unwrap(), second.unwrap()];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, DrainOutcome::Completed(_)))
            .count(),
        1
    );
    assert!(outcomes.contains(&DrainOutcome::AlreadyDraining));
    assert!(!coordinator.is_draining());
}

#[tokio::test]
async fn test_discard_during_drain_keeps_new_change() {
    let coordinator = coordinator(
        Arc::new(MemoryLocalStore::new()),
        Arc::new(SlowRemote),
        SyncConfig::default(),
    );
    let first = coordinator
        .enqueue("user_1", workout("w1"))
        .await
        .unwrap()
        .unwrap();

    let (drained, second) = tokio::join!(coordinator.drain(), async {
        sleep(Duration::from_millis(10)).await;
        coordinator.discard_task(first).await.unwrap();
        coordinator
            .enqueue("user_1", workout("w2"))
            .await
            .unwrap()
            .unwrap()
    });
    assert!(matches!(drained.unwrap(), DrainOutcome::Completed(_)));

    let pending = coordinator.pending_tasks().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second);
    assert_eq!(pending[0].entity_id, "w2");
}
