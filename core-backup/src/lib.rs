//! # Snapshot Module
//!
//! Point-in-time snapshots of local data with integrity verification,
//! retention and cross-identity migration.
//!
//! ## Components
//!
//! - **Snapshot Manager** (`manager`): create, restore, prune, verify
//! - **Migration** (`migration`): single-use tickets moving data between owners
//! - **Scheduler** (`scheduler`): periodic `automatic` snapshots
//! - **Canonical** (`canonical`): canonical JSON and SHA-256 checksums
//! - **Transform** (`transform`): hook for host-supplied compression/encryption
//!
//! ## Example
//!
//! ```ignore
//! use core_backup::{RestoreOptions, SnapshotKind, SnapshotManager};
//!
//! let metadata = manager.create("user_1", SnapshotKind::Manual, &[]).await?;
//! let summary = manager
//!     .restore(metadata.id, "user_1", RestoreOptions::default())
//!     .await?;
//! ```

pub mod canonical;
pub mod error;
pub mod manager;
pub mod migration;
pub mod model;
pub mod scheduler;
pub mod transform;

pub use error::{Result, SnapshotError};
pub use manager::{SnapshotConfig, SnapshotManager, SNAPSHOT_METADATA_TABLE, SNAPSHOT_PAYLOAD_TABLE};
pub use migration::{MigrationTicket, MIGRATION_TICKET_TABLE};
pub use model::{
    PruneReport, RestoreOptions, RestoreSummary, SnapshotData, SnapshotId, SnapshotKind,
    SnapshotMetadata, SnapshotStatus,
};
pub use scheduler::SnapshotScheduler;
pub use transform::{IdentityTransform, PayloadTransform};
