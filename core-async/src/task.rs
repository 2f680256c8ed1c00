//! Task spawning and execution abstractions.
//!
//! - `spawn`: runs a future concurrently on the current runtime
//! - `spawn_blocking`: offloads CPU-bound work (hashing, canonical
//!   serialization of large payloads) to the blocking pool
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//!
//! async fn example() {
//!     let digest_len = task::spawn_blocking(|| vec![0u8; 32].len())
//!         .await
//!         .unwrap();
//!     assert_eq!(digest_len, 32);
//! }
//! ```

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task using the Tokio runtime.
///
/// The spawned task may run on a different thread, so the future and its
/// output must be `Send + 'static`.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_returns_value() {
        let handle = spawn(async { "done" });
        assert_eq!(handle.await.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_spawn_blocking_runs_closure() {
        let sum = spawn_blocking(|| (1..=10).sum::<u32>()).await.unwrap();
        assert_eq!(sum, 55);
    }
}
