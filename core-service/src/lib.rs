//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (local and remote
//! storage, session engine, platform signals) into the snapshot, sync and
//! recovery engine. Every service is constructed exactly once from a
//! [`CoreConfig`] and shared behind an `Arc`; there is no global state.
//!
//! Desktop apps typically enable the `desktop-shims` feature, which re-exports
//! the `bridge-desktop` adapters under [`desktop`] and lets
//! [`CoreConfig::builder`] fall back to a SQLite local store.
//!
//! ```ignore
//! use core_service::{CoreService, ServiceOptions};
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .local_store(store)
//!     .session_engine(engine)
//!     .enable_startup_recovery(true)
//!     .build()?;
//! let core = CoreService::bootstrap(config).await?;
//! let snapshot = core.snapshots().create("user_1", SnapshotKind::Manual, &[]).await?;
//! core.shutdown().await;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use core_async::sync::Mutex;
use core_async::time::Duration;
use core_backup::{SnapshotConfig, SnapshotManager, SnapshotScheduler};
use core_recovery::{RecoveryConfig, RecoveryReport, RecoveryScanner, RecoverySource};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_sync::{
    LocalSyncQueueRepository, SyncChange, SyncConfig, SyncCoordinator, SyncTaskId, SyncTriggers,
};
use tracing::{error, info, instrument, warn};

/// Default adapters for desktop hosts and tests.
#[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
pub mod desktop {
    pub use bridge_desktop::{
        DesktopLifecycleObserver, DesktopNetworkMonitor, MemoryLocalStore, SqliteLocalStore,
    };
}

/// Per-service settings applied at bootstrap.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub snapshot: SnapshotConfig,
    pub sync: SyncConfig,
    pub recovery: RecoveryConfig,

    /// Owner whose data is snapshotted automatically; required for scheduling
    pub automatic_snapshot_owner: Option<String>,

    pub automatic_snapshot_interval: Duration,

    /// Event bus buffer per subscriber
    pub event_capacity: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            snapshot: SnapshotConfig::default(),
            sync: SyncConfig::default(),
            recovery: RecoveryConfig::default(),
            automatic_snapshot_owner: None,
            automatic_snapshot_interval: Duration::from_secs(6 * 60 * 60),
            event_capacity: 100,
        }
    }
}

impl ServiceOptions {
    pub fn automatic_snapshots_for(mut self, owner_id: impl Into<String>, every: Duration) -> Self {
        self.automatic_snapshot_owner = Some(owner_id.into());
        self.automatic_snapshot_interval = every;
        self
    }
}

#[derive(Default)]
struct BackgroundTasks {
    triggers: Option<SyncTriggers>,
    scheduler: Option<SnapshotScheduler>,
}

/// Primary façade exposed to host applications.
pub struct CoreService {
    event_bus: Arc<EventBus>,
    snapshots: Arc<SnapshotManager>,
    sync: Option<Arc<SyncCoordinator>>,
    recovery: Option<Arc<RecoveryScanner>>,
    startup_recovery: Option<RecoveryReport>,
    background: Mutex<BackgroundTasks>,
}

impl CoreService {
    /// Bootstrap with default service options.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        Self::bootstrap_with(config, ServiceOptions::default()).await
    }

    /// Construct every service once, run the startup recovery sweep and start
    /// background loops according to the config's feature flags.
    #[instrument(skip_all, fields(device_id = %config.device_info.device_id))]
    pub async fn bootstrap_with(config: CoreConfig, options: ServiceOptions) -> Result<Self> {
        config.validate()?;
        config.local_store.init().await?;

        let event_bus = Arc::new(EventBus::new(options.event_capacity));
        let features = config.features;

        let snapshots = Arc::new(SnapshotManager::new(
            options.snapshot,
            config.local_store.clone(),
            config.clock.clone(),
            config.device_info.clone(),
            event_bus.clone(),
        )?);

        let network_monitor = if features.enable_network_awareness {
            config.network_monitor.clone()
        } else {
            None
        };

        let sync = match &config.remote_store {
            Some(remote) => Some(Arc::new(SyncCoordinator::new(
                options.sync,
                Arc::new(LocalSyncQueueRepository::new(config.local_store.clone())),
                remote.clone(),
                network_monitor.clone(),
                config.clock.clone(),
                event_bus.clone(),
            )?)),
            None => None,
        };

        let recovery = match &config.session_engine {
            Some(engine) => {
                let sources = config
                    .resolved_session_sources()
                    .into_iter()
                    .map(|(name, table, store)| RecoverySource::new(name, store, table))
                    .collect();
                Some(Arc::new(RecoveryScanner::new(
                    options.recovery,
                    sources,
                    engine.clone(),
                    config.clock.clone(),
                    event_bus.clone(),
                )?))
            }
            None => None,
        };

        let startup_recovery = match (&recovery, features.enable_startup_recovery) {
            (Some(scanner), true) => run_startup_recovery(scanner).await,
            _ => None,
        };

        let mut background = BackgroundTasks::default();

        if let (Some(coordinator), true) = (&sync, features.enable_remote_sync) {
            background.triggers = Some(
                SyncTriggers::spawn(
                    coordinator.clone(),
                    network_monitor,
                    config.lifecycle_observer.clone(),
                )
                .await,
            );
        }

        if features.enable_automatic_snapshots {
            match &options.automatic_snapshot_owner {
                Some(owner_id) => {
                    background.scheduler = Some(SnapshotScheduler::spawn(
                        snapshots.clone(),
                        owner_id.clone(),
                        options.automatic_snapshot_interval,
                    ));
                }
                None => warn!("Automatic snapshots enabled without an owner; scheduler not started"),
            }
        }

        info!(
            remote_sync = background.triggers.is_some(),
            recovery = recovery.is_some(),
            automatic_snapshots = background.scheduler.is_some(),
            "Core service ready"
        );

        Ok(Self {
            event_bus,
            snapshots,
            sync,
            recovery,
            startup_recovery,
            background: Mutex::new(background),
        })
    }

    pub fn snapshots(&self) -> &Arc<SnapshotManager> {
        &self.snapshots
    }

    /// Present when a remote store is configured.
    pub fn sync(&self) -> Option<&Arc<SyncCoordinator>> {
        self.sync.as_ref()
    }

    /// Present when a session engine is configured.
    pub fn recovery(&self) -> Option<&Arc<RecoveryScanner>> {
        self.recovery.as_ref()
    }

    /// Result of the bootstrap recovery sweep, if one ran and succeeded.
    pub fn startup_recovery(&self) -> Option<&RecoveryReport> {
        self.startup_recovery.as_ref()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Queue a local change for upload.
    ///
    /// Returns `Ok(None)` for guest owners.
    pub async fn enqueue_change(&self, owner_id: &str, change: SyncChange) -> Result<Option<SyncTaskId>> {
        let coordinator = self.sync.as_ref().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "RemoteStore".to_string(),
            message: "No RemoteStore configured; local changes cannot be queued for upload"
                .to_string(),
        })?;
        Ok(coordinator.enqueue(owner_id, change).await?)
    }

    pub async fn is_running(&self) -> bool {
        let background = self.background.lock().await;
        background.triggers.is_some() || background.scheduler.is_some()
    }

    /// Stop drain triggers and the snapshot scheduler. Idempotent.
    pub async fn shutdown(&self) {
        let mut background = self.background.lock().await;
        if let Some(triggers) = background.triggers.take() {
            triggers.shutdown().await;
        }
        if let Some(scheduler) = background.scheduler.take() {
            scheduler.shutdown().await;
        }
        info!("Core service stopped");
    }
}

async fn run_startup_recovery(scanner: &RecoveryScanner) -> Option<RecoveryReport> {
    let report = match scanner.recover_all().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Startup recovery failed");
            return None;
        }
    };

    let max_age_days = scanner.config().max_age_days;
    if let Err(e) = scanner.cleanup_older_than(max_age_days).await {
        warn!(error = %e, "Stale session cleanup failed");
    }

    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_desktop::MemoryLocalStore;
    use bridge_traits::LocalStore;
    use core_backup::SnapshotKind;
    use core_runtime::config::DeviceInfo;

    fn config(store: Arc<MemoryLocalStore>) -> CoreConfig {
        CoreConfig::builder()
            .local_store(store)
            .device_info(DeviceInfo::new("device-1", "linux", "1.0.0"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_with_local_store_only() {
        let store = Arc::new(MemoryLocalStore::new());
        let core = CoreService::bootstrap(config(store)).await.unwrap();

        assert!(core.sync().is_none());
        assert!(core.recovery().is_none());
        assert!(core.startup_recovery().is_none());
        assert!(!core.is_running().await);

        let snapshot = core
            .snapshots()
            .create("u1", SnapshotKind::Manual, &[])
            .await
            .unwrap();
        assert_eq!(core.snapshots().list("u1").await.unwrap()[0].id, snapshot.id);
    }

    #[tokio::test]
    async fn test_enqueue_without_remote_is_capability_error() {
        let core = CoreService::bootstrap(config(Arc::new(MemoryLocalStore::new())))
            .await
            .unwrap();

        let result = core
            .enqueue_change("u1", SyncChange::delete("workouts", "w1"))
            .await;
        assert!(matches!(result, Err(CoreError::CapabilityMissing { .. })));
    }

    #[tokio::test]
    async fn test_automatic_snapshots_need_owner() {
        let store = Arc::new(MemoryLocalStore::new());
        let config = CoreConfig::builder()
            .local_store(store.clone())
            .enable_automatic_snapshots(true)
            .build()
            .unwrap();

        let core = CoreService::bootstrap_with(
            config,
            ServiceOptions::default().automatic_snapshots_for("u1", Duration::from_millis(20)),
        )
        .await
        .unwrap();
        assert!(core.is_running().await);

        core_async::time::sleep(Duration::from_millis(100)).await;
        core.shutdown().await;
        assert!(!core.is_running().await);
        assert!(!store.get_all(core_backup::SNAPSHOT_METADATA_TABLE).await.unwrap().is_empty());
    }
}
