//! # Event Bus System
//!
//! Typed, broadcast-based notifications from the snapshot, sync and recovery
//! services to whoever is listening (UI layer, telemetry, tests).
//!
//! ## Overview
//!
//! - **Event Types**: one enum per domain wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: wrapper for consuming events with filtering
//!
//! ```text
//! ┌─────────────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ SnapshotManager ├────────>│           ├────────────>│ Subscriber │
//! ├─────────────────┤         │ EventBus  │             └────────────┘
//! │ SyncCoordinator ├────────>│ (broadcast│             ┌────────────┐
//! ├─────────────────┤         │  channel) ├────────────>│ Subscriber │
//! │ RecoveryScanner ├────────>│           │             └────────────┘
//! └─────────────────┘         └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Sync(SyncEvent::DrainStarted { pending: 3 })).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync drain started");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber fell behind and missed `n`
//!   events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error; publishers in this
//! workspace ignore it with `.ok()`.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the [`EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Snapshot(SnapshotEvent),
    Sync(SyncEvent),
    Recovery(RecoveryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Snapshot(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Recovery(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::TaskDropped { .. })
            | CoreEvent::Snapshot(SnapshotEvent::IntegrityCheckFailed { .. })
            | CoreEvent::Recovery(RecoveryEvent::RecoveryFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::ConflictFlagged { .. })
            | CoreEvent::Recovery(RecoveryEvent::CorruptedQuarantined { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Snapshot(SnapshotEvent::Created { .. })
            | CoreEvent::Snapshot(SnapshotEvent::Restored { .. })
            | CoreEvent::Sync(SyncEvent::DrainCompleted { .. })
            | CoreEvent::Recovery(RecoveryEvent::SessionRecovered { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Snapshot Events
// ============================================================================

/// Events related to snapshot creation, pruning, restore and migration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SnapshotEvent {
    /// A snapshot was built and persisted.
    Created {
        snapshot_id: String,
        owner_id: String,
        /// `automatic`, `manual`, `migration` or `recovery`.
        kind: String,
        size_bytes: u64,
        categories: Vec<String>,
    },
    /// Expired or over-limit snapshots were deleted.
    Pruned { expired: u32, over_limit: u32 },
    /// A snapshot was written back into local storage.
    Restored {
        snapshot_id: String,
        owner_id: String,
        records_written: u64,
    },
    /// A stored payload no longer matches its checksum.
    IntegrityCheckFailed { snapshot_id: String },
    /// A migration ticket was issued. The token itself is never published.
    MigrationTicketIssued {
        owner_id: String,
        snapshot_id: String,
        /// Unix epoch milliseconds.
        expires_at: i64,
    },
    /// A migration ticket was consumed.
    MigrationTicketRedeemed {
        new_owner_id: String,
        snapshot_id: String,
        success: bool,
    },
}

impl SnapshotEvent {
    fn description(&self) -> &str {
        match self {
            SnapshotEvent::Created { .. } => "Snapshot created",
            SnapshotEvent::Pruned { .. } => "Snapshots pruned",
            SnapshotEvent::Restored { .. } => "Snapshot restored",
            SnapshotEvent::IntegrityCheckFailed { .. } => "Snapshot integrity check failed",
            SnapshotEvent::MigrationTicketIssued { .. } => "Migration ticket issued",
            SnapshotEvent::MigrationTicketRedeemed { .. } => "Migration ticket redeemed",
        }
    }
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events related to the outbound sync queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A drain pass started.
    DrainStarted { pending: u64 },
    /// A drain pass finished.
    DrainCompleted {
        applied: u64,
        failed: u64,
        dropped: u64,
        remaining: u64,
        duration_ms: u64,
    },
    /// A task exceeded its retry budget and was removed from the queue.
    TaskDropped {
        task_id: String,
        entity_type: String,
        entity_id: String,
        attempts: u32,
        message: String,
    },
    /// A delete and an edit are pending for the same entity.
    ConflictFlagged {
        entity_type: String,
        entity_id: String,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::DrainStarted { .. } => "Sync drain started",
            SyncEvent::DrainCompleted { .. } => "Sync drain completed",
            SyncEvent::TaskDropped { .. } => "Sync task dropped after max retries",
            SyncEvent::ConflictFlagged { .. } => "Concurrent delete and edit flagged",
        }
    }
}

// ============================================================================
// Recovery Events
// ============================================================================

/// Events related to interrupted-session recovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RecoveryEvent {
    /// Storage scan finished.
    ScanCompleted {
        candidates: u32,
        recoverable: u32,
        corrupted: u32,
    },
    /// An interrupted session was rebuilt by the session engine.
    SessionRecovered { session_id: String, handle: String },
    /// Rebuilding a session failed.
    RecoveryFailed { session_id: String, message: String },
    /// Corrupted records were deleted from their origin stores.
    CorruptedQuarantined { count: u32 },
    /// Stale session records were deleted.
    CleanedUp { deleted: u32, older_than_days: u32 },
}

impl RecoveryEvent {
    fn description(&self) -> &str {
        match self {
            RecoveryEvent::ScanCompleted { .. } => "Recovery scan completed",
            RecoveryEvent::SessionRecovered { .. } => "Session recovered",
            RecoveryEvent::RecoveryFailed { .. } => "Session recovery failed",
            RecoveryEvent::CorruptedQuarantined { .. } => "Corrupted session records removed",
            RecoveryEvent::CleanedUp { .. } => "Stale session records cleaned up",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
/// Subscribers only see events emitted after they subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let recovery_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Recovery(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned from `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_completed() -> CoreEvent {
        CoreEvent::Sync(SyncEvent::DrainCompleted {
            applied: 4,
            failed: 1,
            dropped: 0,
            remaining: 1,
            duration_ms: 12,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(drain_completed()).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Snapshot(SnapshotEvent::Created {
            snapshot_id: "s1".to_string(),
            owner_id: "u1".to_string(),
            kind: "manual".to_string(),
            size_bytes: 200,
            categories: vec!["workouts".to_string()],
        });

        assert_eq!(bus.emit(event.clone()).unwrap(), 2);
        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Recovery(_)));

        bus.emit(drain_completed()).ok();
        let recovery = CoreEvent::Recovery(RecoveryEvent::CorruptedQuarantined { count: 2 });
        bus.emit(recovery.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), recovery);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for pending in 0..5 {
            bus.emit(CoreEvent::Sync(SyncEvent::DrainStarted { pending }))
                .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let dropped = CoreEvent::Sync(SyncEvent::TaskDropped {
            task_id: "t1".to_string(),
            entity_type: "workouts".to_string(),
            entity_id: "w1".to_string(),
            attempts: 3,
            message: "unreachable".to_string(),
        });
        assert_eq!(dropped.severity(), EventSeverity::Error);

        let conflict = CoreEvent::Sync(SyncEvent::ConflictFlagged {
            entity_type: "workouts".to_string(),
            entity_id: "w1".to_string(),
        });
        assert_eq!(conflict.severity(), EventSeverity::Warning);

        assert_eq!(drain_completed().severity(), EventSeverity::Info);

        let pruned = CoreEvent::Snapshot(SnapshotEvent::Pruned {
            expired: 1,
            over_limit: 0,
        });
        assert_eq!(pruned.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = CoreEvent::Recovery(RecoveryEvent::CleanedUp {
            deleted: 1,
            older_than_days: 7,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Recovery");
        assert_eq!(json["payload"]["event"], "CleanedUp");
        assert_eq!(json["payload"]["deleted"], 1);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(drain_completed()).ok();

        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, drain_completed());
    }
}
