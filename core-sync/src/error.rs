use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote store unreachable or timed out; retried on the next drain.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// Remote store answered but refused the change; still retried up to the cap.
    #[error("Remote store rejected change: {0}")]
    Rejected(String),

    #[error("Task {task_id} dropped after {attempts} attempts: {message}")]
    PermanentFailure {
        task_id: String,
        attempts: u32,
        message: String,
    },

    #[error("Sync task {0} not found")]
    TaskNotFound(String),

    #[error("Invalid sync task: {0}")]
    InvalidTask(String),

    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),

    #[error("Invalid sync configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Classify a failed remote call.
    pub fn from_remote(err: BridgeError) -> Self {
        if err.is_transient() {
            Self::TransientIo(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
