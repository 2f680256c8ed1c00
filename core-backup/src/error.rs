use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("A snapshot build is already in progress")]
    Busy,

    #[error("Snapshot size {size} bytes exceeds limit of {limit} bytes")]
    SizeExceeded { size: u64, limit: u64 },

    #[error("Snapshot {snapshot_id} failed integrity verification")]
    IntegrityMismatch { snapshot_id: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} has expired")]
    Expired(String),

    #[error("Owner {owner_id} is not allowed to access snapshot {snapshot_id}")]
    Unauthorized {
        snapshot_id: String,
        owner_id: String,
    },

    #[error("Corrupted snapshot data: {0}")]
    Corrupted(String),

    #[error("Invalid category name: {0}")]
    InvalidCategory(String),

    #[error("Invalid snapshot ID: {0}")]
    InvalidSnapshotId(String),

    #[error("Invalid snapshot configuration: {0}")]
    Config(String),

    #[error("Payload transform failed: {0}")]
    Transform(String),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
