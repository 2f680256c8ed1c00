use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Runtime error: {0}")]
    Runtime(#[from] core_runtime::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] bridge_traits::BridgeError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] core_backup::SnapshotError),

    #[error("Sync error: {0}")]
    Sync(#[from] core_sync::SyncError),

    #[error("Recovery error: {0}")]
    Recovery(#[from] core_recovery::RecoveryError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
