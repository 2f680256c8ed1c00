//! # Sync Module
//!
//! Pushes local mutations to the remote store and resolves record conflicts.
//!
//! ## Overview
//!
//! Local changes are appended to a durable queue and pushed to the
//! [`RemoteStore`](bridge_traits::RemoteStore) by a drain loop. A drain can be
//! requested by a timer, by connectivity returning or by the app moving to the
//! background; concurrent requests collapse into the running drain.
//!
//! ## Components
//!
//! - **Merge Resolver** (`merge`): The single conflict function for restores and pulls
//! - **Queue** (`queue`): Durable FIFO of `SyncTask`s over a `LocalStore` table
//! - **Sync Coordinator** (`coordinator`): Enqueue, drain latch, retry and drop
//! - **Triggers** (`triggers`): Timer, connectivity and lifecycle drain requests

pub mod coordinator;
pub mod error;
pub mod merge;
pub mod queue;
pub mod triggers;

pub use coordinator::{
    ConflictKey, DrainOutcome, DrainReport, DroppedTask, SyncConfig, SyncCoordinator,
    SyncStatusReport,
};
pub use error::{Result, SyncError};
pub use merge::{incoming_wins, parse_timestamp, MergeResolver, MergeStrategy};
pub use queue::{
    LocalSyncQueueRepository, SyncChange, SyncOperation, SyncQueueRepository, SyncTask,
    SyncTaskId, SYNC_QUEUE_TABLE,
};
pub use triggers::SyncTriggers;
