//! # Sync Coordinator
//!
//! Pushes queued local mutations to the remote store.
//!
//! ## Overview
//!
//! The `SyncCoordinator` owns the lifecycle of every [`SyncTask`]:
//! - Appends changes for signed-in owners to the durable queue (guests are ignored)
//! - Drains the queue in fixed-size batches, pushing each task independently
//! - Counts failed attempts and drops tasks that reach `max_retries`
//! - Flags entities with both a delete and an edit pending and holds them
//! - Emits progress events via `EventBus`
//!
//! ## Drain pass
//!
//! 1. Acquire the drain latch (a concurrent drain returns `AlreadyDraining`)
//! 2. Skip the pass while the network monitor reports offline
//! 3. Snapshot the pending queue
//! 4. For each batch, push per-entity groups concurrently; tasks touching the
//!    same entity run in queue order and stop at the first failure
//! 5. Remove applied tasks, persist attempts for failed ones, drop exhausted ones
//! 6. Emit `DrainCompleted`
//!
//! Every task is attempted at most once per pass. Failed tasks wait for the
//! next trigger; there is no backoff curve.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncChange, SyncCoordinator};
//!
//! coordinator
//!     .enqueue("user_42", SyncChange::update("workouts", "w1", record))
//!     .await?;
//!
//! match coordinator.drain().await? {
//!     DrainOutcome::Completed(report) => println!("applied {}", report.applied),
//!     DrainOutcome::AlreadyDraining | DrainOutcome::Offline => {}
//! }
//! ```

use crate::{
    error::{Result, SyncError},
    queue::{SyncChange, SyncOperation, SyncQueueRepository, SyncTask, SyncTaskId},
};
use bridge_traits::{Clock, NetworkMonitor, RemoteStore};
use chrono::{DateTime, Utc};
use core_async::future::join_all;
use core_async::sync::Mutex;
use core_async::time::{Duration, Instant};
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const GUEST_ID_DELIMITERS: [char; 3] = ['_', '-', ':'];

/// Sync coordinator configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tasks pushed concurrently per batch
    pub batch_size: usize,

    /// Failed attempts after which a task is dropped
    pub max_retries: u32,

    /// Period of the drain timer
    pub drain_interval: Duration,

    /// Owner id namespaces (case-insensitive) that never produce tasks.
    ///
    /// An owner matches when it equals a namespace or continues it with
    /// `_`, `-` or `:`; `guestlist_fan` is not a guest.
    pub guest_owner_prefixes: Vec<String>,

    /// Dropped tasks kept for the status report
    pub failure_history: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_retries: 3,
            drain_interval: Duration::from_secs(30),
            guest_owner_prefixes: vec![
                "guest".to_string(),
                "anonymous".to_string(),
                "anon".to_string(),
            ],
            failure_history: 50,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_retries == 0 {
            return Err(SyncError::Config("max_retries must be at least 1".to_string()));
        }
        if self.drain_interval.is_zero() {
            return Err(SyncError::Config(
                "drain_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `owner_id` belongs to a guest or anonymous user.
    pub fn is_guest(&self, owner_id: &str) -> bool {
        let owner = owner_id.trim().to_ascii_lowercase();
        owner.is_empty()
            || self.guest_owner_prefixes.iter().any(|prefix| {
                match owner.strip_prefix(prefix.to_ascii_lowercase().as_str()) {
                    Some(rest) => rest.is_empty() || rest.starts_with(GUEST_ID_DELIMITERS),
                    None => false,
                }
            })
    }
}

/// Result of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Tasks pushed to the remote store this pass
    pub attempted: u32,
    pub applied: u32,
    /// Failed and returned to the queue
    pub failed: u32,
    /// Failed and removed after reaching `max_retries`
    pub dropped: u32,
    /// Not attempted: held by a delete/edit conflict or behind a failed task
    /// for the same entity
    pub deferred: u32,
    /// Queue length after the pass
    pub remaining: u32,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Completed(DrainReport),
    /// Another drain held the latch; this request was coalesced
    AlreadyDraining,
    /// Network monitor reported no connectivity
    Offline,
}

/// A task removed from the queue after exhausting its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedTask {
    pub task_id: SyncTaskId,
    pub owner_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub attempts: u32,
    pub error: String,
    pub dropped_at: DateTime<Utc>,
}

/// An entity with both a delete and an edit pending.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ConflictKey {
    pub entity_type: String,
    pub entity_id: String,
}

/// Snapshot of the queue for hosts and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusReport {
    pub pending: usize,
    pub draining: bool,
    pub last_drain_at: Option<DateTime<Utc>>,
    pub dropped_total: u64,
    /// Most recent drops, newest last
    pub recent_drops: Vec<DroppedTask>,
    pub unresolved_conflicts: Vec<ConflictKey>,
}

#[derive(Default)]
struct SyncState {
    last_drain_at: Option<DateTime<Utc>>,
    dropped_total: u64,
    recent_drops: VecDeque<DroppedTask>,
}

enum TaskOutcome {
    Applied,
    Failed(SyncError),
    /// Skipped because an earlier task for the same entity failed
    Deferred,
}

/// Releases the drain latch when the pass ends, however it ends.
struct DrainLatch<'a>(&'a AtomicBool);

impl<'a> DrainLatch<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for DrainLatch<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sync coordinator for the outbound mutation queue
pub struct SyncCoordinator {
    config: SyncConfig,
    queue: Arc<dyn SyncQueueRepository>,
    remote: Arc<dyn RemoteStore>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    draining: AtomicBool,
    state: Mutex<SyncState>,
}

impl SyncCoordinator {
    /// Create a new sync coordinator
    ///
    /// # Arguments
    ///
    /// * `config` - Sync configuration
    /// * `queue` - Durable task storage
    /// * `remote` - Remote store tasks are pushed to
    /// * `network_monitor` - Optional connectivity check; drains are skipped while offline
    /// * `clock` - Time source for enqueue and drop timestamps
    /// * `event_bus` - Event bus for emitting sync events
    pub fn new(
        config: SyncConfig,
        queue: Arc<dyn SyncQueueRepository>,
        remote: Arc<dyn RemoteStore>,
        network_monitor: Option<Arc<dyn NetworkMonitor>>,
        clock: Arc<dyn Clock>,
        event_bus: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            queue,
            remote,
            network_monitor,
            clock,
            event_bus,
            draining: AtomicBool::new(false),
            state: Mutex::new(SyncState::default()),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Queue a local change for upload.
    ///
    /// Returns `Ok(None)` without touching the queue for guest owners.
    #[instrument(skip(self, change), fields(owner_id = %owner_id, entity_type = %change.entity_type, operation = %change.operation))]
    pub async fn enqueue(&self, owner_id: &str, change: SyncChange) -> Result<Option<SyncTaskId>> {
        if self.config.is_guest(owner_id) {
            debug!("Ignoring change from guest owner");
            return Ok(None);
        }

        if change.entity_type.trim().is_empty() || change.entity_id.trim().is_empty() {
            return Err(SyncError::InvalidTask(
                "entity_type and entity_id are required".to_string(),
            ));
        }

        let task = SyncTask::new(owner_id, change, self.clock.now());
        let task = self.queue.push(task).await?;

        let pending = self.queue.pending().await?;
        let key = ConflictKey {
            entity_type: task.entity_type.clone(),
            entity_id: task.entity_id.clone(),
        };
        if conflicting_keys(&pending).contains(&key) {
            warn!(
                entity_type = %key.entity_type,
                entity_id = %key.entity_id,
                "Delete and edit pending for the same entity; holding both until resolved"
            );
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::ConflictFlagged {
                    entity_type: key.entity_type,
                    entity_id: key.entity_id,
                }))
                .ok();
        }

        debug!(task_id = %task.id, "Enqueued sync task");
        Ok(Some(task.id))
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Run one drain pass.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainOutcome> {
        let Some(_latch) = DrainLatch::acquire(&self.draining) else {
            debug!("Drain already in progress; request coalesced");
            return Ok(DrainOutcome::AlreadyDraining);
        };

        if let Some(monitor) = &self.network_monitor {
            if !monitor.is_connected().await {
                debug!("Offline; skipping drain");
                return Ok(DrainOutcome::Offline);
            }
        }

        let started = Instant::now();
        let tasks = self.queue.pending().await?;
        let conflicts = conflicting_keys(&tasks);

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::DrainStarted {
                pending: tasks.len() as u64,
            }))
            .ok();

        let mut report = DrainReport::default();
        let mut blocked: HashSet<(String, String)> = HashSet::new();

        for batch in tasks.chunks(self.config.batch_size) {
            let mut groups: Vec<Vec<SyncTask>> = Vec::new();
            let mut group_index: HashMap<(String, String), usize> = HashMap::new();

            for task in batch {
                let key = (task.entity_type.clone(), task.entity_id.clone());
                let conflict = ConflictKey {
                    entity_type: key.0.clone(),
                    entity_id: key.1.clone(),
                };
                if conflicts.contains(&conflict) || blocked.contains(&key) {
                    report.deferred += 1;
                    continue;
                }
                match group_index.get(&key) {
                    Some(&index) => groups[index].push(task.clone()),
                    None => {
                        group_index.insert(key, groups.len());
                        groups.push(vec![task.clone()]);
                    }
                }
            }

            let results = join_all(groups.into_iter().map(|group| self.apply_group(group))).await;

            for (task, outcome) in results.into_iter().flatten() {
                match outcome {
                    TaskOutcome::Applied => {
                        report.attempted += 1;
                        report.applied += 1;
                        self.queue.remove(&task).await?;
                    }
                    TaskOutcome::Failed(err) => {
                        report.attempted += 1;
                        blocked.insert((task.entity_type.clone(), task.entity_id.clone()));
                        if self.record_failure(task, err).await? {
                            report.dropped += 1;
                        } else {
                            report.failed += 1;
                        }
                    }
                    TaskOutcome::Deferred => {
                        report.deferred += 1;
                    }
                }
            }
        }

        report.remaining = self.queue.len().await? as u32;
        report.duration_ms = started.elapsed().as_millis() as u64;

        self.state.lock().await.last_drain_at = Some(self.clock.now());

        info!(
            applied = report.applied,
            failed = report.failed,
            dropped = report.dropped,
            deferred = report.deferred,
            remaining = report.remaining,
            "Drain completed"
        );

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::DrainCompleted {
                applied: report.applied as u64,
                failed: report.failed as u64,
                dropped: report.dropped as u64,
                remaining: report.remaining as u64,
                duration_ms: report.duration_ms,
            }))
            .ok();

        Ok(DrainOutcome::Completed(report))
    }

    /// Start a drain in the background unless one is already running.
    ///
    /// Returns `false` when the request was ignored.
    pub fn request_drain(self: &Arc<Self>) -> bool {
        if self.is_draining() {
            debug!("Drain requested while draining; ignored");
            return false;
        }

        let coordinator = Arc::clone(self);
        core_async::task::spawn(async move {
            if let Err(e) = coordinator.drain().await {
                error!(error = %e, "Background drain failed");
            }
        });
        true
    }

    /// Remove a pending task, typically one side of a flagged conflict.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn discard_task(&self, task_id: SyncTaskId) -> Result<()> {
        let task = self
            .queue
            .pending()
            .await?
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| SyncError::TaskNotFound(task_id.to_string()))?;

        self.queue.remove(&task).await?;
        info!(entity_type = %task.entity_type, entity_id = %task.entity_id, "Discarded sync task");
        Ok(())
    }

    pub async fn pending_tasks(&self) -> Result<Vec<SyncTask>> {
        self.queue.pending().await
    }

    pub async fn status(&self) -> Result<SyncStatusReport> {
        let pending = self.queue.pending().await?;
        let state = self.state.lock().await;

        Ok(SyncStatusReport {
            pending: pending.len(),
            draining: self.is_draining(),
            last_drain_at: state.last_drain_at,
            dropped_total: state.dropped_total,
            recent_drops: state.recent_drops.iter().cloned().collect(),
            unresolved_conflicts: conflicting_keys(&pending).into_iter().collect(),
        })
    }

    async fn apply_group(&self, group: Vec<SyncTask>) -> Vec<(SyncTask, TaskOutcome)> {
        let mut outcomes = Vec::with_capacity(group.len());
        let mut failed = false;

        for task in group {
            if failed {
                outcomes.push((task, TaskOutcome::Deferred));
                continue;
            }
            match self.apply(&task).await {
                Ok(()) => outcomes.push((task, TaskOutcome::Applied)),
                Err(e) => {
                    failed = true;
                    outcomes.push((task, TaskOutcome::Failed(e)));
                }
            }
        }
        outcomes
    }

    async fn apply(&self, task: &SyncTask) -> Result<()> {
        let result = match task.operation {
            SyncOperation::Create | SyncOperation::Update => {
                self.remote
                    .upsert(&task.entity_type, task.payload.clone())
                    .await
            }
            SyncOperation::Delete => self.remote.delete(&task.entity_type, &task.entity_id).await,
        };
        result.map_err(SyncError::from_remote)
    }

    /// Returns `true` if the task was dropped.
    async fn record_failure(&self, mut task: SyncTask, err: SyncError) -> Result<bool> {
        task.attempts += 1;
        task.last_error = Some(err.to_string());

        if task.attempts < self.config.max_retries {
            warn!(
                task_id = %task.id,
                attempts = task.attempts,
                error = %err,
                "Sync task failed; will retry"
            );
            match self.queue.update(&task).await {
                Ok(()) => {}
                Err(SyncError::TaskNotFound(_)) => {
                    debug!(task_id = %task.id, "Failed task was discarded mid-drain")
                }
                Err(e) => return Err(e),
            }
            return Ok(false);
        }

        self.queue.remove(&task).await?;

        let failure = SyncError::PermanentFailure {
            task_id: task.id.to_string(),
            attempts: task.attempts,
            message: err.to_string(),
        };
        error!(
            task_id = %task.id,
            owner_id = %task.owner_id,
            entity_type = %task.entity_type,
            entity_id = %task.entity_id,
            error = %failure,
            "Dropping sync task"
        );

        let dropped = DroppedTask {
            task_id: task.id,
            owner_id: task.owner_id.clone(),
            entity_type: task.entity_type.clone(),
            entity_id: task.entity_id.clone(),
            operation: task.operation,
            attempts: task.attempts,
            error: err.to_string(),
            dropped_at: self.clock.now(),
        };

        {
            let mut state = self.state.lock().await;
            state.dropped_total += 1;
            state.recent_drops.push_back(dropped);
            while state.recent_drops.len() > self.config.failure_history {
                state.recent_drops.pop_front();
            }
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::TaskDropped {
                task_id: task.id.to_string(),
                entity_type: task.entity_type,
                entity_id: task.entity_id,
                attempts: task.attempts,
                message: err.to_string(),
            }))
            .ok();

        Ok(true)
    }
}

/// Entities with both a delete and a create/update pending.
fn conflicting_keys(tasks: &[SyncTask]) -> BTreeSet<ConflictKey> {
    let mut seen: HashMap<(&str, &str), (bool, bool)> = HashMap::new();
    for task in tasks {
        let entry = seen.entry(task.entity_key()).or_default();
        if task.operation.is_edit() {
            entry.0 = true;
        } else {
            entry.1 = true;
        }
    }

    seen.into_iter()
        .filter(|(_, (edit, delete))| *edit && *delete)
        .map(|((entity_type, entity_id), _)| ConflictKey {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        })
        .collect()
}
