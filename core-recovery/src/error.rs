use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecoveryError {
    /// Record failed structural validation; never reconstructed.
    #[error("Corrupted session record: {0}")]
    Corrupted(String),

    #[error("Session engine failed: {0}")]
    SessionEngine(String),

    #[error("Invalid recovery configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, RecoveryError>;
